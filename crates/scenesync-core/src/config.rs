//! Sync configuration

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What to do when a declared name already exists on the remote but was not
/// created by this program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignPolicy {
    /// Report a conflict for the item
    #[default]
    Fail,
    /// Leave the object alone and skip the item with a warning
    Skip,
    /// Claim the object when its kind matches; kind mismatches still conflict
    Adopt,
}

/// Sync configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Policy for objects that exist but are not ours
    pub foreign_policy: ForeignPolicy,
    /// Private-metadata key under which ownership records are stored
    pub ledger_key: String,
    /// Remove live scene items whose source is not declared
    pub prune: bool,
    /// Push declared settings onto pre-existing scene filters we did not create
    pub push_existing_scene_filters: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            foreign_policy: ForeignPolicy::Fail,
            ledger_key: "scenesync".to_string(),
            prune: true,
            push_existing_scene_filters: false,
        }
    }
}

impl SyncConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With foreign object policy
    #[inline]
    #[must_use]
    pub fn with_foreign_policy(mut self, policy: ForeignPolicy) -> Self {
        self.foreign_policy = policy;
        self
    }

    /// With ownership metadata key
    #[inline]
    #[must_use]
    pub fn with_ledger_key(mut self, key: impl Into<String>) -> Self {
        self.ledger_key = key.into();
        self
    }

    /// With item pruning on or off
    #[inline]
    #[must_use]
    pub fn with_prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    /// With settings push onto pre-existing scene filters
    #[inline]
    #[must_use]
    pub fn with_push_existing_scene_filters(mut self, push: bool) -> Self {
        self.push_existing_scene_filters = push;
        self
    }

    /// Parse from TOML; missing keys take their defaults
    ///
    /// # Errors
    /// - [`ConfigError::Parse`] on malformed TOML or unknown enum values
    /// - [`ConfigError::Invalid`] if `ledger_key` is empty
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// See [`SyncConfig::from_toml_str`]; also [`ConfigError::Io`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger_key.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "ledger_key",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
