//! Optional settings file.
//!
//! Reads TOML at `~/.config/s3check/config.toml`. Every key is optional and
//! command-line flags win over file values.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Defaults read from the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Settings {
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub profile: Option<String>,
    pub part_size: Option<usize>,
    pub concurrency: Option<usize>,
}

impl Settings {
    /// Loads settings from `path`, or from the default location.
    ///
    /// An explicit path must exist and parse. A missing default file yields
    /// empty settings; an unreadable one is logged and ignored.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read settings file {}", path.display()))?;
            return Self::parse(&content)
                .with_context(|| format!("invalid settings file {}", path.display()));
        }

        let Some(file_path) = default_path() else {
            return Ok(Self::default());
        };
        if !file_path.exists() {
            return Ok(Self::default());
        }

        match std::fs::read_to_string(&file_path)
            .map_err(anyhow::Error::from)
            .and_then(|content| Self::parse(&content).map_err(anyhow::Error::from))
        {
            Ok(settings) => {
                tracing::debug!(path = %file_path.display(), "settings loaded");
                Ok(settings)
            }
            Err(e) => {
                tracing::warn!(
                    path = %file_path.display(),
                    error = %e,
                    "failed to load settings, using defaults"
                );
                Ok(Self::default())
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Default settings file location.
pub fn default_path() -> Option<PathBuf> {
    config_base_dir().map(|dir| dir.join("s3check").join("config.toml"))
}

fn config_base_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(xdg));
        }
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config"))
    }
}
