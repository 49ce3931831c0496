//! Configuration loading functions.

use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use super::error::ConfigError;
use super::types::Config;

const PROJECT_CONFIG_FILES: &[&str] = &[
    ".halluscan.yaml",
    ".halluscan.yml",
    ".halluscan.json",
    ".halluscan.toml",
];

impl Config {
    /// Load configuration from a file, chosen by extension.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let config: Config = match ext.as_str() {
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })?,
            "json" => serde_json::from_str(&content).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?,
            "toml" => toml::from_str(&content).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })?,
            _ => {
                return Err(ConfigError::UnsupportedFormat {
                    path: path.to_path_buf(),
                    extension: ext,
                });
            }
        };
        config.validate()?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load configuration from the project directory or global config.
    ///
    /// Search order:
    /// 1. `.halluscan.yaml`, `.halluscan.yml`, `.halluscan.json`,
    ///    `.halluscan.toml` in the project root
    /// 2. `<config dir>/halluscan/config.yaml`
    /// 3. Default configuration
    ///
    /// A file that fails to load is skipped with a warning.
    pub fn load(project_root: Option<&Path>) -> Self {
        let project = project_root
            .into_iter()
            .flat_map(|root| PROJECT_CONFIG_FILES.iter().map(move |name| root.join(name)));
        let global = dirs::config_dir().map(|dir| dir.join("halluscan").join("config.yaml"));

        for path in project.chain(global) {
            if !path.exists() {
                continue;
            }
            match Self::from_file(&path) {
                Ok(config) => return config,
                Err(e) => warn!(error = %e, "Ignoring unusable config file"),
            }
        }

        Self::default()
    }
}
