//! Error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::decision::Denial;

/// Errors reading a persisted policy.
///
/// These are never fatal: [`PolicyStore::load`](crate::PolicyStore::load)
/// logs them and falls back to the built-in defaults.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    /// The file exists but could not be read
    #[error("failed to read policy from {path}: {source}")]
    Read {
        /// The file that was being read
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },
    /// The contents are not a valid policy
    #[error("failed to parse policy: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors persisting the policy.
///
/// Returned by mutating store operations after the in-memory change has
/// already been applied; the change is kept.
#[derive(Debug, Error)]
pub enum ConfigSaveError {
    /// The policy could not be serialized
    #[error("failed to serialize policy: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The policy could not be written
    #[error("failed to write policy to {path}: {source}")]
    Write {
        /// The file that was being written
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },
}

/// Errors from the gatekeeper facade.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GateError {
    /// The daily ceiling for this action kind has been reached
    #[error("Rate limit exceeded for {action} ({limit} per day)")]
    RateLimitExceeded {
        /// The action kind that was limited
        action: String,
        /// The daily ceiling that applied
        limit: u32,
    },
    /// The policy denied the action
    #[error("Permission denied: {0}")]
    PermissionDenied(#[from] Denial),
}
