//! Persisted preferences: the handset the console last connected to.
//!
//! Stored as TOML at `$XDG_CONFIG_HOME/dialphone/preferences.toml`
//! (falling back to `~/.config/dialphone/preferences.toml`), or wherever
//! `--config` points:
//!
//! ```toml
//! last_device_address = "/dev/rfcomm0"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const FILE_NAME: &str = "preferences.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Preferences {
    /// Address of the last handset connected to by hand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_device_address: Option<String>,
}

impl Preferences {
    /// Load preferences, returning the defaults if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .with_context(|| format!("failed to parse preferences at {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => {
                Err(e).with_context(|| format!("failed to read preferences at {}", path.display()))
            }
        }
    }

    /// Write preferences, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        let content = toml::to_string_pretty(self).context("failed to serialize preferences")?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write preferences to {}", path.display()))
    }
}

/// Default preferences location for this platform.
pub fn default_path() -> PathBuf {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")));
    match base {
        Some(base) => base.join("dialphone").join(FILE_NAME),
        None => PathBuf::from(FILE_NAME),
    }
}
