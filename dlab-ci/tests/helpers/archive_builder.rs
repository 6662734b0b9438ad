//! In-memory zip archives for import tests

use serde_json::{json, Value};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Builds a compendium zip file entry by entry
#[derive(Debug, Default, Clone)]
pub struct ArchiveBuilder {
    files: Vec<(String, Vec<u8>)>,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard manifest for the 5e plugin
    pub fn with_manifest(self, name: &str, content_types: &[&str]) -> Self {
        self.json("manifest.json", manifest(name, content_types))
    }

    pub fn json(self, path: &str, value: Value) -> Self {
        let bytes = serde_json::to_vec_pretty(&value).unwrap();
        self.file(path, &bytes)
    }

    pub fn file(mut self, path: &str, bytes: &[u8]) -> Self {
        self.files.push((path.to_string(), bytes.to_vec()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (path, bytes) in &self.files {
            writer.start_file(path.as_str(), options).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }
}

pub fn manifest(name: &str, content_types: &[&str]) -> Value {
    json!({
        "name": name,
        "version": "1.0.0",
        "pluginId": "dnd-5e-2024",
        "description": "Test content",
        "contentTypes": content_types,
    })
}

/// A tiny file with a PNG signature; `seed` varies the bytes
pub fn png(seed: u8) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];
    bytes.extend_from_slice(b"IHDR");
    bytes.extend(std::iter::repeat(seed).take(16));
    bytes
}
