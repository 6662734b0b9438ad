//! Compendium archive access
//!
//! An archive is loaded fully into memory once, as a map of normalized
//! archive-relative paths to bytes. Zip archives are decoded on the
//! blocking pool.

pub mod content;
pub mod manifest_reader;

pub use content::{load_records, singular, ContentError, ContentLoad, SourceRecord};
pub use manifest_reader::{read_manifest, ManifestError, ResolvedManifest, MANIFEST_FILE};

use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Invalid zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsafe archive path: {0}")]
    UnsafePath(String),

    #[error("Archive exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("Archive task failed: {0}")]
    Task(String),
}

/// In-memory view of an import archive
#[derive(Debug, Clone, Default)]
pub struct CompendiumArchive {
    entries: BTreeMap<String, Arc<[u8]>>,
}

impl CompendiumArchive {
    /// Build from `(path, bytes)` pairs
    ///
    /// When every entry sits under one top-level folder that holds the
    /// manifest (the usual result of zipping a folder), that folder is
    /// stripped.
    pub fn from_entries<I, P, B>(entries: I) -> Result<Self, ArchiveError>
    where
        I: IntoIterator<Item = (P, B)>,
        P: AsRef<str>,
        B: Into<Vec<u8>>,
    {
        let mut map = BTreeMap::new();
        for (path, bytes) in entries {
            let normalized = normalize_path(path.as_ref())?;
            if normalized.is_empty() {
                continue;
            }
            map.insert(normalized, Arc::from(bytes.into().into_boxed_slice()));
        }
        Ok(Self {
            entries: strip_wrapping_folder(map),
        })
    }

    /// Decode zip bytes, enforcing `max_bytes` over the uncompressed total
    pub fn from_zip_bytes(bytes: &[u8], max_bytes: u64) -> Result<Self, ArchiveError> {
        let mut zip = zip::ZipArchive::new(Cursor::new(bytes))?;
        let mut total: u64 = 0;
        let mut entries = Vec::with_capacity(zip.len());

        for index in 0..zip.len() {
            let mut file = zip.by_index(index)?;
            if file.is_dir() {
                continue;
            }
            total = total.saturating_add(file.size());
            if total > max_bytes {
                return Err(ArchiveError::TooLarge { limit: max_bytes });
            }
            let name = file.name().to_string();
            let mut buf = Vec::with_capacity(file.size() as usize);
            // Declared sizes can lie; cap the actual read too
            (&mut file).take(max_bytes + 1).read_to_end(&mut buf)?;
            if buf.len() as u64 > max_bytes {
                return Err(ArchiveError::TooLarge { limit: max_bytes });
            }
            entries.push((name, buf));
        }

        Self::from_entries(entries)
    }

    /// Decode zip bytes on the blocking pool
    pub async fn open_zip(bytes: Vec<u8>, max_bytes: u64) -> Result<Self, ArchiveError> {
        tokio::task::spawn_blocking(move || Self::from_zip_bytes(&bytes, max_bytes))
            .await
            .map_err(|e| ArchiveError::Task(e.to_string()))?
    }

    pub fn read(&self, path: &str) -> Option<Arc<[u8]>> {
        let normalized = normalize_path(path).ok()?;
        self.entries.get(&normalized).cloned()
    }

    pub fn contains(&self, path: &str) -> bool {
        normalize_path(path)
            .map(|p| self.entries.contains_key(&p))
            .unwrap_or(false)
    }

    /// Files under `dir` (recursively), in path order
    pub fn files_under(&self, dir: &str) -> Vec<&str> {
        let prefix = match normalize_path(dir) {
            Ok(p) if p.is_empty() => String::new(),
            Ok(p) => format!("{}/", p),
            Err(_) => return Vec::new(),
        };
        self.entries
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .map(|(path, _)| path.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Normalize an archive path: `/` separators, no `.` segments, no leading slash.
///
/// Rejects `..` segments and absolute or drive-qualified paths.
pub fn normalize_path(path: &str) -> Result<String, ArchiveError> {
    let unified = path.replace('\\', "/");
    if unified.starts_with('/') || unified.contains(':') {
        return Err(ArchiveError::UnsafePath(path.to_string()));
    }

    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(ArchiveError::UnsafePath(path.to_string())),
            other => segments.push(other),
        }
    }
    Ok(segments.join("/"))
}

/// Join an archive directory and a relative path
pub fn join_path(dir: &str, relative: &str) -> String {
    if dir.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), relative.trim_start_matches('/'))
    }
}

fn strip_wrapping_folder(entries: BTreeMap<String, Arc<[u8]>>) -> BTreeMap<String, Arc<[u8]>> {
    if entries.contains_key(MANIFEST_FILE) {
        return entries;
    }

    let mut roots = entries.keys().map(|path| path.split('/').next().unwrap_or_default());
    let first = match roots.next() {
        Some(first) => first.to_string(),
        None => return entries,
    };
    if roots.any(|root| root != first) {
        return entries;
    }

    let prefix = format!("{}/", first);
    if !entries.contains_key(&format!("{}{}", prefix, MANIFEST_FILE)) {
        return entries;
    }

    tracing::debug!(folder = %first, "Stripping wrapping folder from archive");
    entries
        .into_iter()
        .filter_map(|(path, bytes)| path.strip_prefix(&prefix).map(|p| (p.to_string(), bytes)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        for (name, bytes) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("./content//spells.json").unwrap(), "content/spells.json");
        assert_eq!(normalize_path("assets\\tokens\\goblin.png").unwrap(), "assets/tokens/goblin.png");
        assert_eq!(normalize_path(".").unwrap(), "");
        assert!(normalize_path("../etc/passwd").is_err());
        assert!(normalize_path("content/../../x").is_err());
        assert!(normalize_path("/abs/path").is_err());
        assert!(normalize_path("C:/windows").is_err());
    }

    #[test]
    fn test_zip_round_trip_and_directory_listing() {
        let bytes = zip_bytes(&[
            ("manifest.json", b"{}"),
            ("content/spells/a.json", b"[]"),
            ("content/spells/b.json", b"[]"),
            ("content/spellsbook.json", b"[]"),
        ]);
        let archive = CompendiumArchive::from_zip_bytes(&bytes, 1024 * 1024).unwrap();

        assert_eq!(archive.len(), 4);
        assert!(archive.contains("./manifest.json"));
        assert_eq!(
            archive.files_under("content/spells"),
            vec!["content/spells/a.json", "content/spells/b.json"]
        );
        assert!(archive.files_under("content/monsters").is_empty());
    }

    #[test]
    fn test_zip_size_limit() {
        let bytes = zip_bytes(&[("manifest.json", &[0u8; 2048])]);
        let result = CompendiumArchive::from_zip_bytes(&bytes, 1024);
        assert!(matches!(result, Err(ArchiveError::TooLarge { limit: 1024 })));
    }

    #[test]
    fn test_zip_rejects_traversal() {
        let archive = CompendiumArchive::from_entries(vec![("../evil.json", b"{}".to_vec())]);
        assert!(matches!(archive, Err(ArchiveError::UnsafePath(_))));
    }

    #[test]
    fn test_wrapping_folder_is_stripped() {
        let archive = CompendiumArchive::from_entries(vec![
            ("my-pack/manifest.json", b"{}".to_vec()),
            ("my-pack/content/items.json", b"[]".to_vec()),
        ])
        .unwrap();
        assert!(archive.contains("manifest.json"));
        assert!(archive.contains("content/items.json"));
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "a.png"), "a.png");
        assert_eq!(join_path("assets/", "/a.png"), "assets/a.png");
    }
}
