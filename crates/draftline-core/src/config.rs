//! Versioning configuration
//!
//! Loaded once at start-up (typically from a `draftline.toml`) and used to
//! build the immutable `SchemaRegistry` and open the store.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{DraftlineError, Result};
use crate::logging_facility::Profile;
use crate::registry::DEFAULT_BLACKLIST;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersioningConfig {
    /// Attributes never captured in snapshots
    #[serde(default = "default_blacklisted_attributes")]
    pub blacklisted_attributes: Vec<String>,

    /// SQLite database file; in-memory when absent
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub log_profile: Profile,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            blacklisted_attributes: default_blacklisted_attributes(),
            database_path: None,
            log_profile: Profile::default(),
        }
    }
}

fn default_blacklisted_attributes() -> Vec<String> {
    DEFAULT_BLACKLIST.iter().map(|s| s.to_string()).collect()
}

impl VersioningConfig {
    /// Parse configuration from TOML text
    ///
    /// # Errors
    /// Returns `Config` when the text is not valid TOML for this shape.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| DraftlineError::Config {
            message: e.to_string(),
        })
    }

    /// Read and parse a TOML configuration file
    ///
    /// # Errors
    /// Returns `Config` when the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| DraftlineError::Config {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&text)
    }
}
