//! Error types for chronicle operations.
//!
//! Each subsystem has its own error enum; [`ChronicleError`] aggregates them
//! for the public write and read paths.

use crate::persist::PersistError;
use crate::vault::VaultError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = ChronicleError> = std::result::Result<T, E>;

/// Errors surfaced to the orchestrator.
///
/// Every mutation that returns one of these has left the document untouched.
#[derive(Debug, Error)]
pub enum ChronicleError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("declared story time {declared} precedes current story time {current}")]
    TemporalOrdering {
        declared: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("invalid event draft: {0}")]
    InvalidDraft(String),

    #[error("vault error: {0}")]
    Vault(#[from] VaultError),

    #[error("persistence error: {0}")]
    Persist(#[from] PersistError),
}

impl ChronicleError {
    pub(crate) fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// True if this error came from the vault rejecting a key or ciphertext.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::Vault(err) if err.is_authentication_failure())
    }
}
