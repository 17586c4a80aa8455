//! Optional JSON configuration file.
//!
//! Every field may be omitted; command-line flags override file values, which
//! override built-in defaults.

use crate::model::ControllerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, io};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Base URL of the generation service.
    pub api_url: Option<String>,

    #[serde(with = "humantime_serde")]
    pub poll_interval: Option<Duration>,

    #[serde(with = "humantime_serde")]
    pub request_timeout: Option<Duration>,

    #[serde(with = "humantime_serde")]
    pub download_timeout: Option<Duration>,

    pub recent_limit: Option<usize>,

    pub max_poll_failures: Option<u32>,

    pub artifact_extension: Option<String>,

    /// Where downloaded worlds are written.
    pub output_dir: Option<PathBuf>,
}

/// `<config dir>/worldgen/config.json`, if the platform has a config directory.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("worldgen").join("config.json"))
}

impl FileConfig {
    /// Loads configuration from a JSON file at the given path.
    ///
    /// # Errors
    /// Returns an `std::io::Error` if reading from file fails or JSON is invalid.
    pub fn load_from_file(path: &Path) -> Result<Self, io::Error> {
        let buf = fs::read(path)?;
        serde_json::from_slice(&buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Load `explicit` if given, otherwise the default path when it exists.
    /// A missing explicit file is an error; a missing default file is not.
    pub fn load(explicit: Option<&Path>) -> Result<Self, io::Error> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }
        match default_path() {
            Some(path) if path.exists() => {
                tracing::debug!(path = %path.display(), "loading config file");
                Self::load_from_file(&path)
            }
            _ => Ok(Self::default()),
        }
    }

    /// Fill a controller configuration from the file values.
    pub fn apply_to(&self, cfg: &mut ControllerConfig) {
        if let Some(v) = &self.api_url {
            cfg.api_url = v.clone();
        }
        if let Some(v) = self.poll_interval {
            cfg.poll_interval = v;
        }
        if let Some(v) = self.request_timeout {
            cfg.request_timeout = v;
        }
        if let Some(v) = self.download_timeout {
            cfg.download_timeout = v;
        }
        if let Some(v) = self.recent_limit {
            cfg.recent_limit = v;
        }
        if let Some(v) = self.max_poll_failures {
            cfg.max_poll_failures = v;
        }
        if let Some(v) = &self.artifact_extension {
            cfg.artifact_extension = v.clone();
        }
    }
}
