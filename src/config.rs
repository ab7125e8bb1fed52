//! Configuration module for hotwire.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file (`.hotwire/settings.toml`)
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `HW_` and use double underscores
//! to separate nested levels:
//! - `HW_BUILD__PARALLEL_THREADS=8` sets `build.parallel_threads`
//! - `HW_WATCH__DEBOUNCE_MS=150` sets `watch.debounce_ms`
//! - `HW_LOGGING__DEFAULT=debug` sets `logging.default`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Name of the per-workspace settings directory.
pub const LOCAL_DIR: &str = ".hotwire";

/// Name of the settings file inside [`LOCAL_DIR`].
pub const SETTINGS_FILE: &str = "settings.toml";

/// Name of the workspace description file at the workspace root.
pub const WORKSPACE_FILE: &str = "hotwire.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Workspace root directory (where hotwire.toml is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,

    /// Build configuration
    #[serde(default)]
    pub build: BuildConfig,

    /// Watch configuration
    #[serde(default)]
    pub watch: WatchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BuildConfig {
    /// Upper bound on modules compiled concurrently
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,

    /// Overrides every module's output root with `<output_dir>/<module id>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    /// Glob patterns excluded from module source roots
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,

    /// Regex patterns matched against call-expression callees to find log call sites
    #[serde(default = "default_logger_patterns")]
    pub logger_patterns: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// Quiet period before a burst of events for one path is classified
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Capacity of the delta event channel handed to subscribers
    #[serde(default = "default_event_channel_size")]
    pub event_channel_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for every target
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-target overrides, e.g. `compiler = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_parallel_threads() -> usize {
    num_cpus::get()
}
fn default_debounce_ms() -> u64 {
    300
}
fn default_event_channel_size() -> usize {
    256
}
fn default_log_level() -> String {
    "warn".to_string()
}
fn default_ignore_patterns() -> Vec<String> {
    vec![
        "node_modules/**".to_string(),
        ".git/**".to_string(),
        "*.generated.*".to_string(),
    ]
}
fn default_logger_patterns() -> Vec<String> {
    vec![
        r"^(this\.)?logger\.(trace|debug|info|warn|error)$".to_string(),
        r"^(this\.)?log\.(trace|debug|info|warn|error)$".to_string(),
    ]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            workspace_root: None,
            build: BuildConfig::default(),
            watch: WatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            parallel_threads: default_parallel_threads(),
            output_dir: None,
            ignore_patterns: default_ignore_patterns(),
            logger_patterns: default_logger_patterns(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            event_channel_size: default_event_channel_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(LOCAL_DIR).join(SETTINGS_FILE));

        Self::figment(&config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.workspace_root.is_none() {
                    settings.workspace_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref()).extract().map_err(Box::new)
    }

    fn figment(config_path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels, single underscore stays
            .merge(Env::prefixed("HW_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find the settings file by looking for a `.hotwire` directory
    /// from the current directory up to the filesystem root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(LOCAL_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join(SETTINGS_FILE));
            }
        }

        None
    }

    /// Get the workspace root directory (nearest ancestor holding `hotwire.toml`
    /// or a `.hotwire` directory)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|a| a.join(WORKSPACE_FILE).is_file() || a.join(LOCAL_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Resolved workspace root, falling back to the current directory
    pub fn resolved_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file under `root/.hotwire`
    pub fn init_config_file(root: &Path, force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = root.join(LOCAL_DIR).join(SETTINGS_FILE);

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        let settings = Settings {
            workspace_root: Some(root.to_path_buf()),
            ..Settings::default()
        };
        settings.save(&config_path)?;

        Ok(config_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert!(settings.build.parallel_threads > 0);
        assert_eq!(settings.logging.default, "warn");
        assert!(!settings.build.logger_patterns.is_empty());
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2

[build]
parallel_threads = 4
ignore_patterns = ["custom/**"]
output_dir = "out"

[logging]
default = "info"

[logging.modules]
compiler = "debug"
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.build.parallel_threads, 4);
        assert_eq!(settings.build.ignore_patterns, vec!["custom/**"]);
        assert_eq!(settings.build.output_dir, Some(PathBuf::from("out")));
        assert_eq!(settings.logging.default, "info");
        assert_eq!(settings.logging.modules["compiler"], "debug");
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        fs::write(&config_path, "[build]\nparallel_threads = 16\n").unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.build.parallel_threads, 16);
        assert_eq!(settings.version, 1);
        assert!(!settings.build.ignore_patterns.is_empty());
        assert_eq!(settings.watch.event_channel_size, 256);
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.build.parallel_threads = 2;
        settings.watch.event_channel_size = 16;

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.build.parallel_threads, 2);
        assert_eq!(loaded.watch.event_channel_size, 16);
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(&config_path, "[watch]\ndebounce_ms = 500\n").unwrap();

        unsafe {
            std::env::set_var("HW_WATCH__DEBOUNCE_MS", "125");
        }
        let settings = Settings::load_from(&config_path).unwrap();
        unsafe {
            std::env::remove_var("HW_WATCH__DEBOUNCE_MS");
        }

        assert_eq!(settings.watch.debounce_ms, 125);
    }

    #[test]
    fn test_init_config_file_refuses_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let path = Settings::init_config_file(temp_dir.path(), false).unwrap();
        assert!(path.exists());
        assert!(Settings::init_config_file(temp_dir.path(), false).is_err());
        assert!(Settings::init_config_file(temp_dir.path(), true).is_ok());
    }
}
