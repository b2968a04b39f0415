// ABOUTME: Configuration types and parsing for hostbased.yml.
// ABOUTME: Handles YAML parsing, defaults, validation, and discovery.

mod target;

pub use target::Target;

use crate::error::{Error, Result};
use crate::helper::{DEFAULT_HELPER_FD, DEFAULT_HELPER_TIMEOUT, DEFAULT_KEYSIGN_PATH, HelperConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "config.yml";
pub const CONFIG_DIR: &str = "hostbased";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Path to the signing helper.
    #[serde(default = "default_keysign")]
    pub keysign: PathBuf,

    #[serde(default = "default_helper_timeout", with = "humantime_serde")]
    pub helper_timeout: Duration,

    /// Descriptor number the helper expects the connection socket on.
    #[serde(default = "default_helper_fd")]
    pub helper_fd: i32,

    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,

    /// Private keys for publickey fallback.
    #[serde(default)]
    pub identity_files: Vec<PathBuf>,
}

fn default_keysign() -> PathBuf {
    PathBuf::from(DEFAULT_KEYSIGN_PATH)
}

fn default_helper_timeout() -> Duration {
    DEFAULT_HELPER_TIMEOUT
}

fn default_helper_fd() -> i32 {
    DEFAULT_HELPER_FD
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(300)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keysign: default_keysign(),
            helper_timeout: default_helper_timeout(),
            helper_fd: default_helper_fd(),
            command_timeout: default_command_timeout(),
            identity_files: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ConfigNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;
        Self::from_yaml(&content)
    }

    /// Load `explicit` if given, else the per-user config file if it exists,
    /// else the defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        match default_config_path() {
            Some(path) if path.exists() => {
                tracing::debug!("loading configuration from {}", path.display());
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.keysign.as_os_str().is_empty() {
            return Err(Error::InvalidConfig("keysign must not be empty".to_string()));
        }
        // 0, 1 and 2 are the helper's stdio.
        if self.helper_fd < 3 {
            return Err(Error::InvalidConfig(format!(
                "helper_fd must be 3 or greater, got {}",
                self.helper_fd
            )));
        }
        if self.helper_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "helper_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn helper_config(&self) -> HelperConfig {
        HelperConfig::new(&self.keysign)
            .socket_fd(self.helper_fd)
            .timeout(self.helper_timeout)
    }
}

/// `$XDG_CONFIG_HOME/hostbased/config.yml`, falling back to `~/.config`.
fn default_config_path() -> Option<PathBuf> {
    let base = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(std::env::var_os("HOME")?).join(".config"),
    };
    Some(base.join(CONFIG_DIR).join(CONFIG_FILENAME))
}
