//! Configuration for the import pipeline.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (H5P_IMPORT_HOME, H5P_IMPORT_PATH_PREFIX)
//! 2. Config file (.h5p-import/config.yaml)
//! 3. Defaults (~/.h5p-import)
//!
//! Config file discovery:
//! - Searches current directory and parents for .h5p-import/config.yaml
//! - Paths in config file are relative to the .h5p-import/ directory
//!
//! The resolved [`Settings`] value is passed explicitly to every component
//! that needs it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Directory holding the config file
pub const CONFIG_DIR: &str = ".h5p-import";

/// Config file name inside [`CONFIG_DIR`]
pub const CONFIG_FILE_NAME: &str = "config.yaml";

pub const ENV_HOME: &str = "H5P_IMPORT_HOME";
pub const ENV_PATH_PREFIX: &str = "H5P_IMPORT_PATH_PREFIX";

pub const DEFAULT_PATH_PREFIX: &str = "h5p-content";
pub const DEFAULT_MAX_ARCHIVE_BYTES: u64 = 50 * 1024 * 1024;
pub const DEFAULT_MAX_CONCURRENT_UPLOADS: usize = 16;
pub const DEFAULT_NAME_MAX_LENGTH: usize = 100;

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default)]
    pub path_prefix: Option<String>,
    #[serde(default)]
    pub staging_dir: Option<String>,
    #[serde(default)]
    pub catalog_path: Option<String>,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub storage: Option<StorageConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitsConfig {
    pub max_archive_bytes: Option<u64>,
    pub max_concurrent_uploads: Option<usize>,
    pub name_max_length: Option<usize>,
}

/// Storage backend selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Objects stored below a local directory
    Local { root: PathBuf },

    /// Objects stored behind an HTTP object gateway
    Remote {
        endpoint: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
}

/// Errors raised by [`Settings::validate`]
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("path prefix must not be empty")]
    EmptyPathPrefix,

    #[error("path prefix must not start with '/': {0}")]
    AbsolutePathPrefix(String),

    #[error("max_concurrent_uploads must be at least 1")]
    ZeroConcurrency,

    #[error("name_max_length must be at least 1")]
    ZeroNameLength,
}

/// Resolved settings with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    /// State directory
    pub home: PathBuf,
    /// Storage key prefix for every package root
    pub path_prefix: String,
    /// Parent of the per-import staging directories
    pub staging_dir: PathBuf,
    /// Record catalog file
    pub catalog_path: PathBuf,
    pub max_archive_bytes: u64,
    pub max_concurrent_uploads: usize,
    /// Host limit on record display names, in characters
    pub name_max_length: usize,
    pub storage: StorageConfig,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl Settings {
    /// Defaults rooted at `home`
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            path_prefix: DEFAULT_PATH_PREFIX.to_string(),
            staging_dir: home.join("tmp"),
            catalog_path: home.join("catalog.json"),
            max_archive_bytes: DEFAULT_MAX_ARCHIVE_BYTES,
            max_concurrent_uploads: DEFAULT_MAX_CONCURRENT_UPLOADS,
            name_max_length: DEFAULT_NAME_MAX_LENGTH,
            storage: StorageConfig::Local {
                root: home.join("storage"),
            },
            config_file: None,
            home,
        }
    }

    /// Check invariants the pipeline relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path_prefix.trim().is_empty() {
            return Err(ConfigError::EmptyPathPrefix);
        }
        if self.path_prefix.starts_with('/') {
            return Err(ConfigError::AbsolutePathPrefix(self.path_prefix.clone()));
        }
        if self.max_concurrent_uploads == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.name_max_length == 0 {
            return Err(ConfigError::ZeroNameLength);
        }
        Ok(())
    }
}

/// Find config file by searching `start` and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config directory
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Merge defaults, an optional config file and environment overrides
fn build_settings(
    default_home: PathBuf,
    config: Option<(PathBuf, ConfigFile)>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let (config_path, file) = match config {
        Some((path, file)) => (Some(path), file),
        None => (None, ConfigFile::default()),
    };
    let base_dir = config_path
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let home = if let Some(env_home) = env(ENV_HOME) {
        PathBuf::from(env_home)
    } else if let Some(ref home) = file.home {
        resolve_path(&base_dir, home)
    } else {
        default_home
    };

    let mut settings = Settings::with_home(home);
    settings.config_file = config_path;

    if let Some(prefix) = env(ENV_PATH_PREFIX).or(file.path_prefix) {
        settings.path_prefix = prefix;
    }
    if let Some(ref dir) = file.staging_dir {
        settings.staging_dir = resolve_path(&base_dir, dir);
    }
    if let Some(ref path) = file.catalog_path {
        settings.catalog_path = resolve_path(&base_dir, path);
    }
    if let Some(bytes) = file.limits.max_archive_bytes {
        settings.max_archive_bytes = bytes;
    }
    if let Some(uploads) = file.limits.max_concurrent_uploads {
        settings.max_concurrent_uploads = uploads;
    }
    if let Some(length) = file.limits.name_max_length {
        settings.name_max_length = length;
    }
    if let Some(storage) = file.storage {
        settings.storage = match storage {
            StorageConfig::Local { root } => StorageConfig::Local {
                root: resolve_path(&base_dir, &root.to_string_lossy()),
            },
            remote => remote,
        };
    }

    settings
}

/// Load settings from all sources and validate them
pub fn load_settings() -> Result<Settings> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(CONFIG_DIR);

    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let config = match find_config_file(&cwd) {
        Some(path) => {
            let file = load_config_file(&path)?;
            Some((path, file))
        }
        None => None,
    };

    let settings = build_settings(default_home, config, |key| std::env::var(key).ok());
    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_file() {
        let settings = build_settings(PathBuf::from("/home/u/.h5p-import"), None, no_env);

        assert_eq!(settings.home, PathBuf::from("/home/u/.h5p-import"));
        assert_eq!(settings.path_prefix, "h5p-content");
        assert_eq!(settings.staging_dir, PathBuf::from("/home/u/.h5p-import/tmp"));
        assert_eq!(settings.max_archive_bytes, 50 * 1024 * 1024);
        assert_eq!(settings.max_concurrent_uploads, 16);
        assert_eq!(
            settings.storage,
            StorageConfig::Local {
                root: PathBuf::from("/home/u/.h5p-import/storage")
            }
        );
        assert!(settings.config_file.is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir).unwrap();

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
version: "1.0"
path_prefix: packages
staging_dir: ./staging
limits:
  max_archive_bytes: 1024
  max_concurrent_uploads: 4
storage:
  kind: remote
  endpoint: http://127.0.0.1:9000
  token: secret
"#
        )
        .unwrap();

        let parsed = load_config_file(&config_path).unwrap();
        let settings = build_settings(
            PathBuf::from("/default"),
            Some((config_path.clone(), parsed)),
            no_env,
        );

        assert_eq!(settings.path_prefix, "packages");
        assert_eq!(settings.staging_dir, config_dir.join("./staging"));
        assert_eq!(settings.max_archive_bytes, 1024);
        assert_eq!(settings.max_concurrent_uploads, 4);
        assert_eq!(settings.name_max_length, DEFAULT_NAME_MAX_LENGTH);
        assert_eq!(
            settings.storage,
            StorageConfig::Remote {
                endpoint: "http://127.0.0.1:9000".to_string(),
                token: Some("secret".to_string()),
            }
        );
        assert_eq!(settings.config_file, Some(config_path));
    }

    #[test]
    fn test_env_overrides_file() {
        let file = ConfigFile {
            path_prefix: Some("from-file".to_string()),
            home: Some("state".to_string()),
            ..ConfigFile::default()
        };
        let env: HashMap<&str, &str> = [(ENV_HOME, "/env/home"), (ENV_PATH_PREFIX, "from-env")]
            .into_iter()
            .collect();

        let settings = build_settings(
            PathBuf::from("/default"),
            Some((PathBuf::from("/project/.h5p-import/config.yaml"), file)),
            |key| env.get(key).map(|v| v.to_string()),
        );

        assert_eq!(settings.home, PathBuf::from("/env/home"));
        assert_eq!(settings.catalog_path, PathBuf::from("/env/home/catalog.json"));
        assert_eq!(settings.path_prefix, "from-env");
    }

    #[test]
    fn test_find_config_file_in_parent() {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join(CONFIG_FILE_NAME), "version: \"1.0\"\n").unwrap();

        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            find_config_file(&nested),
            Some(config_dir.join(CONFIG_FILE_NAME))
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = Settings::with_home("/tmp/h5p");

        settings.path_prefix = String::new();
        assert_eq!(settings.validate(), Err(ConfigError::EmptyPathPrefix));

        settings.path_prefix = "/abs".to_string();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::AbsolutePathPrefix(_))
        ));

        settings.path_prefix = "ok".to_string();
        settings.max_concurrent_uploads = 0;
        assert_eq!(settings.validate(), Err(ConfigError::ZeroConcurrency));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project/.h5p-import");

        assert_eq!(
            resolve_path(&base, "storage"),
            PathBuf::from("/home/user/project/.h5p-import/storage")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }
}
