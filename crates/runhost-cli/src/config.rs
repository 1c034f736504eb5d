//! Configuration loading and types

use std::path::{Path, PathBuf};

use runhost_exec::PlatformPrefix;
use serde::Deserialize;

/// Top-level configuration read from `runhost.toml`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
    /// Local execution settings
    #[serde(default)]
    pub local: LocalConfig,
    /// Remote execution settings
    #[serde(default)]
    pub remote: RemoteConfig,
}

/// Logging settings
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Local execution settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocalConfig {
    /// Shell prefix tokens, e.g. `["sh", "-c"]`; detected from the OS when unset
    pub prefix: Option<Vec<String>>,
    /// Default working folder
    pub folder: Option<PathBuf>,
}

impl LocalConfig {
    /// Prefix to hand to the local executor
    #[must_use]
    pub fn prefix(&self) -> PlatformPrefix {
        match &self.prefix {
            Some(tokens) => PlatformPrefix::custom(tokens.iter().cloned()),
            None => PlatformPrefix::detect(),
        }
    }
}

/// Remote execution settings
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Host address
    pub host: Option<String>,
    /// SSH port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Username
    pub user: Option<String>,
    /// Environment variable holding the password
    #[serde(default = "default_password_env")]
    pub password_env: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_port(),
            user: None,
            password_env: default_password_env(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_password_env() -> String {
    "RUNHOST_PASSWORD".to_string()
}

impl Config {
    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// Returns error if the text is not valid configuration
    pub fn parse(content: &str) -> eyre::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load from default paths or use defaults
    ///
    /// # Errors
    /// Returns error if a config file exists but cannot be loaded
    pub fn load_default() -> eyre::Result<Self> {
        // Check environment variable
        if let Ok(path) = std::env::var("RUNHOST_CONFIG") {
            return Self::load(Path::new(&path));
        }

        // Try common paths
        let mut paths = vec![
            PathBuf::from("runhost.toml"),
            PathBuf::from("/etc/runhost/runhost.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("runhost/runhost.toml"));
        }

        for path in paths {
            if path.exists() {
                return Self::load(&path);
            }
        }

        Ok(Config::default())
    }
}
