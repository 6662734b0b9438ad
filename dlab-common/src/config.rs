//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration is deliberately small: where the root folder
//! lives, which port to bind, and how to log. Everything that can change
//! at runtime lives in the database `settings` table.

use crate::{Error, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "DLAB_ROOT_FOLDER";

/// File name of the service database inside the root folder
pub const DATABASE_FILE: &str = "dlab.db";

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Built-in fallbacks used when nothing else is configured
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    /// OS-dependent defaults for the current platform
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: default_log_level(),
        }
    }
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/dlab (or /var/lib/dlab for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("dlab"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/dlab"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("dlab"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/dlab"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("dlab"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\dlab"))
    } else {
        PathBuf::from("./dlab_data")
    }
}

/// Default location of a module's TOML file (`~/.config/dlab/<module>.toml`,
/// falling back to `/etc/dlab/<module>.toml` on Linux)
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    let file_name = format!("{}.toml", module_name);
    let user_config = dirs::config_dir().map(|d| d.join("dlab").join(&file_name));

    if let Some(path) = &user_config {
        if path.exists() {
            return user_config;
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/dlab").join(&file_name);
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Load and parse a TOML file into `T`
pub fn load_toml_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Load a TOML file, falling back to `T::default()` when it is missing or broken
///
/// A missing or malformed configuration file never prevents startup.
pub fn load_toml_or_default<T: DeserializeOwned + Default>(path: Option<&Path>) -> T {
    let Some(path) = path else {
        debug!("No TOML config file found, using defaults");
        return T::default();
    };

    match load_toml_config(path) {
        Ok(config) => config,
        Err(e) => {
            warn!("{} - continuing with defaults", e);
            T::default()
        }
    }
}

/// Root folder resolution in priority order:
/// 1. Command-line argument
/// 2. `DLAB_ROOT_FOLDER` environment variable
/// 3. TOML `root_folder`
/// 4. OS-dependent compiled default
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_value: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            toml_value: None,
        }
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_toml_value(mut self, path: Option<PathBuf>) -> Self {
        self.toml_value = path;
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            debug!(module = %self.module_name, "Root folder from command line");
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                debug!(module = %self.module_name, "Root folder from {}", ROOT_FOLDER_ENV);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_value {
            debug!(module = %self.module_name, "Root folder from TOML config");
            return path.clone();
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder on first run and locates files inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            tracing::info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Deserialize)]
    struct Sample {
        #[serde(default)]
        logging: LoggingConfig,
        port: Option<u16>,
    }

    #[test]
    fn test_load_toml_or_default_missing_file() {
        let sample: Sample = load_toml_or_default(Some(Path::new("/nonexistent/dlab.toml")));
        assert!(sample.port.is_none());
        assert_eq!(sample.logging.level, "info");
    }

    #[test]
    fn test_load_toml_config_parses_logging() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.toml");
        std::fs::write(&path, "port = 5800\n[logging]\nlevel = \"debug\"\n").unwrap();

        let sample: Sample = load_toml_config(&path).unwrap();
        assert_eq!(sample.port, Some(5800));
        assert_eq!(sample.logging.level, "debug");
    }

    #[test]
    fn test_initializer_database_path() {
        let init = RootFolderInitializer::new(PathBuf::from("/data/dlab"));
        assert_eq!(init.database_path(), PathBuf::from("/data/dlab/dlab.db"));
    }
}
