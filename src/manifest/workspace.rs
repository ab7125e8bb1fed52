//! The `hotwire.toml` workspace description.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::ConfigurationError;
use crate::config::WORKSPACE_FILE;

fn default_build_location() -> PathBuf {
    PathBuf::from(".hotwire/build")
}

fn default_profiles() -> Vec<String> {
    vec!["default".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceDescription {
    /// Id of the main module.
    pub main: String,

    #[serde(default = "default_build_location")]
    pub build_location: PathBuf,

    #[serde(default, rename = "module")]
    pub modules: Vec<ModuleDescription>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleDescription {
    pub id: String,
    pub name: Option<String>,
    pub source_root: PathBuf,
    pub output_root: Option<PathBuf>,
    #[serde(default = "default_profiles")]
    pub profiles: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl WorkspaceDescription {
    /// Read `hotwire.toml` from a workspace root.
    pub fn read(root: &Path) -> Result<Self, ConfigurationError> {
        let path = root.join(WORKSPACE_FILE);
        let text = std::fs::read_to_string(&path).map_err(|source| {
            ConfigurationError::Unreadable {
                path: path.clone(),
                source,
            }
        })?;
        Self::parse(&text, &path)
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigurationError> {
        toml::from_str(text).map_err(|e| ConfigurationError::Invalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
