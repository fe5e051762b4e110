//! Error types for scenesync core
//!
//! Provides the error taxonomy for:
//! - Name and kind conflicts with objects already on the remote
//! - Missing objects during updates
//! - Gateway failures (surfaced as-is, never retried here)
//! - Ownership violations, rejected before any remote call
//! - Aggregated per-item failures of one sync

use crate::gateway::GatewayError;
use scenesync_model::ModelError;

/// Main sync error type
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Name exists with an unexpected kind, or exists but is not owned
    #[error("name conflict on {name}: expected {expected}, found {found}")]
    Conflict {
        name: String,
        expected: String,
        found: String,
    },

    /// Referenced object absent when an update was expected
    #[error("{what} {name} not found")]
    NotFound { what: &'static str, name: String },

    /// Transport or RPC failure
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Attempt to remove a declared item or adopt a foreign filter
    #[error("ownership violation on {name}: {reason}")]
    OwnershipViolation { name: String, reason: String },

    /// Declaration failed validation
    #[error("invalid declaration: {0}")]
    Model(#[from] ModelError),

    /// Ownership ledger failure
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Several independent steps of one sync failed
    #[error("{} error(s) while syncing scene {scene}: {}", .errors.len(), summarize(.errors))]
    Aggregate {
        scene: String,
        errors: Vec<SyncError>,
    },

    /// Some deletions of a garbage collection pass failed
    #[error("{} deletion(s) failed during clean: {}", .errors.len(), summarize(.errors))]
    Clean { errors: Vec<SyncError> },
}

fn summarize(errors: &[SyncError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl SyncError {
    /// Build a conflict error
    pub fn conflict(
        name: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            name: name.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Build an ownership violation
    pub fn ownership(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::OwnershipViolation {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Map a gateway error, turning "not found" into [`SyncError::NotFound`]
    pub(crate) fn from_gateway(err: GatewayError, what: &'static str, name: &str) -> Self {
        if err.is_not_found() {
            Self::NotFound {
                what,
                name: name.to_string(),
            }
        } else {
            Self::Gateway(err)
        }
    }

    /// Check if error is a name/kind conflict
    #[inline]
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Check if error is an ownership violation
    #[inline]
    #[must_use]
    pub fn is_ownership_violation(&self) -> bool {
        matches!(self, Self::OwnershipViolation { .. })
    }

    /// Check if error came from the transport and may succeed on a later call
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Gateway(GatewayError::Transport(_)))
            || matches!(self, Self::Ledger(LedgerError::Gateway(GatewayError::Transport(_))))
    }

    /// Leaf errors, with aggregates expanded
    #[must_use]
    pub fn flatten(&self) -> Vec<&SyncError> {
        match self {
            Self::Aggregate { errors, .. } | Self::Clean { errors } => {
                errors.iter().flat_map(SyncError::flatten).collect()
            }
            other => vec![other],
        }
    }
}

/// Ownership ledger errors
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Remote metadata channel failed
    #[error("metadata request failed: {0}")]
    Gateway(#[from] GatewayError),

    /// Local ledger file could not be read or written
    #[error("ledger file error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored record has an unexpected shape
    #[error("malformed ownership record for {name}: {reason}")]
    Malformed { name: String, reason: String },
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for [`crate::SyncConfig`]
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
