//! # Sync Error Types
//!
//! Error types for the sync engine.
//!
//! ## Error Taxonomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Failure Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Remote        │  │     Invariant           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Remote(...)    │  │  InvariantViolation     │ │
//! │  │  ConfigLoad/Save│  │  (Timeout,      │  │  (base_version ahead    │ │
//! │  │                 │  │   Unavailable,  │  │   of remote — note is   │ │
//! │  │                 │  │   Rejected…)    │  │   quarantined)          │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │    Database     │  │   Resolution    │  │      Internal           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Database(..)   │  │  NoConflict     │  │  ChannelError           │ │
//! │  │                 │  │  ManualContent  │  │  ShuttingDown           │ │
//! │  │                 │  │  Required       │  │  AttemptsExhausted      │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  NOTE: a version conflict is NOT an error. It is an expected outcome   │
//! │  carried by RemoteError::Conflict and routed to the resolver pipeline. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all engine failures.
///
/// ## Design Principles
/// - Each variant includes enough context for debugging
/// - Errors are categorized for different handling strategies
/// - All errors are `Send + Sync` for async compatibility
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// A remote store call failed (includes conflicts, which the
    /// coordinator intercepts before they can surface as errors).
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Local store operation failed.
    #[error("Database error: {0}")]
    Database(String),

    // =========================================================================
    // Invariant Violations
    // =========================================================================
    /// Local base version is ahead of the remote version: local state
    /// references a version the remote never issued. The note is
    /// quarantined and surfaced for manual inspection; never auto-healed.
    #[error(
        "Invariant violation for note {note_id}: base version {base_version} \
         exceeds remote version {remote_version}"
    )]
    InvariantViolation {
        note_id: String,
        base_version: i64,
        remote_version: i64,
    },

    /// Transient failures exhausted the retry budget for a note.
    #[error("Retry attempts exhausted for note {note_id} after {attempts} attempts")]
    AttemptsExhausted { note_id: String, attempts: i64 },

    // =========================================================================
    // Resolution Errors
    // =========================================================================
    /// Manual resolution was requested for a note with no known conflict.
    #[error("No conflict recorded for note {0}")]
    NoConflict(String),

    /// A Manual resolution requires caller-supplied final content.
    #[error("Manual resolution requires final content")]
    ManualContentRequired,

    /// The resolution target note no longer exists locally.
    #[error("Note not found: {0}")]
    NoteNotFound(String),

    /// The supplied resolution payload failed validation.
    #[error("Invalid resolution payload: {0}")]
    InvalidResolution(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Engine is shutting down.
    #[error("Sync engine is shutting down")]
    ShuttingDown,

    /// Internal engine error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<quill_db::DbError> for SyncError {
    fn from(err: quill_db::DbError) -> Self {
        SyncError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if this error is transient and the operation is
    /// eligible for retry on a later cycle.
    ///
    /// ## Transient
    /// - Remote timeouts and 5xx-equivalent unavailability
    ///
    /// ## Not Transient
    /// - Configuration errors
    /// - Invariant violations (quarantined instead)
    /// - Permanent remote rejections
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Remote(remote) if remote.is_transient())
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(SyncError::Remote(RemoteError::Timeout(30)).is_transient());
        assert!(SyncError::Remote(RemoteError::Unavailable("503".into())).is_transient());

        assert!(!SyncError::Remote(RemoteError::Rejected("bad note".into())).is_transient());
        assert!(!SyncError::InvalidConfig("bad config".into()).is_transient());
        assert!(!SyncError::InvariantViolation {
            note_id: "n1".into(),
            base_version: 9,
            remote_version: 3,
        }
        .is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::InvariantViolation {
            note_id: "abc-123".into(),
            base_version: 7,
            remote_version: 5,
        };
        assert!(err.to_string().contains("abc-123"));
        assert!(err.to_string().contains('7'));
    }
}
