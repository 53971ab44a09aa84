//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Configuration for parley
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server base URL
    pub server: Option<String>,
    /// Bearer token (alternative to the PARLEY_TOKEN env var)
    pub token: Option<String>,
    /// Seconds a stalled stream read may take before the turn is failed
    pub idle_timeout_secs: Option<u64>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("parley")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        // Check for PARLEY_CONFIG_PATH env var first
        if let Ok(path) = std::env::var("PARLEY_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        fs::create_dir_all(dir)?;

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            server: Some("http://localhost:8000".to_string()),
            token: None,
            idle_timeout_secs: None,
        };

        default_config.save()?;
        Ok(path)
    }
}

/// Example configuration shown after `--init-config`
pub fn example_config() -> &'static str {
    r#"# parley configuration

# Server base URL
server = "http://localhost:8000"

# Bearer token; PARLEY_TOKEN overrides this
# token = "..."

# Fail a turn when a stream read stalls this long (seconds)
# idle_timeout_secs = 120
"#
}
