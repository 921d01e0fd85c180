//! # Remote Store Contract
//!
//! The authoritative store the engine pushes to. Implementations live behind
//! a trait: the engine only depends on the versioned compare-and-swap
//! semantics, not on any particular wire protocol.
//!
//! ## Optimistic Concurrency
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Remote Version Check (per write)                       │
//! │                                                                         │
//! │   write(server_id, snapshot, base_version)                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │   stored_version == base_version ?                                     │
//! │       │                                                                 │
//! │       ├── YES: commit, version += 1     → RemoteCommit                 │
//! │       │                                                                 │
//! │       └── NO:  reject                   → RemoteError::Conflict        │
//! │                                            { current_version,          │
//! │                                              current snapshot }        │
//! │                                                                         │
//! │   This check IS the concurrency control: no external locking exists,   │
//! │   and the version counter is the only cross-process shared state.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Error Taxonomy
//! Responses distinguish "conflict" (expected, routed to resolution) from
//! "transient" (timeout, 5xx-equivalent; retried with backoff) from
//! "permanent" (structurally invalid, not-found; never retried).

use async_trait::async_trait;
use thiserror::Error;

use quill_core::NoteSnapshot;

// =============================================================================
// Remote Outcomes
// =============================================================================

/// A committed remote write.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCommit {
    /// Remote identifier of the note.
    pub server_id: String,

    /// The version the write was committed at.
    pub version: i64,
}

/// The remote store's current state for a note, as returned by `fetch`.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteNote {
    pub server_id: String,
    pub version: i64,
    pub snapshot: NoteSnapshot,
}

/// Remote store call outcomes that are not plain success.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// Version mismatch. Expected, not a failure: carries everything the
    /// resolution pipeline needs.
    #[error("Version conflict: submitted base does not match current version {current_version}")]
    Conflict {
        current_version: i64,
        current: NoteSnapshot,
    },

    /// The call exceeded its bounded timeout. Transient.
    #[error("Remote call timed out after {0} seconds")]
    Timeout(u64),

    /// The remote store is unreachable or failing (5xx-equivalent). Transient.
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),

    /// The note does not exist remotely. Permanent for updates; an
    /// already-deleted target for deletes.
    #[error("Remote note not found")]
    NotFound,

    /// The remote rejected the note as structurally invalid. Permanent.
    #[error("Remote rejected the note: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Returns true for failures that are expected to heal on their own.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Timeout(_) | RemoteError::Unavailable(_))
    }

    /// Returns true when this outcome is a version conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RemoteError::Conflict { .. })
    }
}

// =============================================================================
// Remote Store Trait
// =============================================================================

/// Versioned CRUD against the authoritative note store.
///
/// The remote store exclusively owns the version counter: every committed
/// write advances it by one, and no other party may mutate it. `write` and
/// `delete` are compare-and-swap operations; `force_write` is the explicit
/// escape hatch used only by conflict resolution.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Creates a note remotely. Assigns a fresh `server_id`; the committed
    /// version is 1.
    async fn create(&self, snapshot: &NoteSnapshot) -> Result<RemoteCommit, RemoteError>;

    /// Writes a note iff `base_version` matches the stored version.
    async fn write(
        &self,
        server_id: &str,
        snapshot: &NoteSnapshot,
        base_version: i64,
    ) -> Result<RemoteCommit, RemoteError>;

    /// Deletes a note iff `base_version` matches the stored version.
    async fn delete(&self, server_id: &str, base_version: i64) -> Result<(), RemoteError>;

    /// Fetches the current remote state of a note, or None if it does not
    /// exist remotely.
    async fn fetch(&self, server_id: &str) -> Result<Option<RemoteNote>, RemoteError>;

    /// Writes a note bypassing the version check. The committed version is
    /// strictly greater than both the stored version and `floor_version`.
    ///
    /// Used only by conflict resolution, which is by definition choosing
    /// the version that wins.
    async fn force_write(
        &self,
        server_id: &str,
        snapshot: &NoteSnapshot,
        floor_version: i64,
    ) -> Result<RemoteCommit, RemoteError>;

    /// Deletes a note bypassing the version check. Deleting a note that
    /// does not exist is not an error.
    async fn force_delete(&self, server_id: &str) -> Result<(), RemoteError>;
}

// =============================================================================
// Bounded Calls
// =============================================================================

/// Wraps a remote call in a bounded timeout. An elapsed timer becomes
/// [`RemoteError::Timeout`] - a transient failure, never a conflict.
pub async fn with_timeout<T, F>(limit: std::time::Duration, call: F) -> Result<T, RemoteError>
where
    F: std::future::Future<Output = Result<T, RemoteError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout(limit.as_secs())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeSet;

    #[test]
    fn test_conflict_is_not_transient() {
        let err = RemoteError::Conflict {
            current_version: 4,
            current: NoteSnapshot {
                title: "t".into(),
                content: "c".into(),
                tags: BTreeSet::new(),
                last_editor: "bob".into(),
                updated_at: Utc::now(),
            },
        };
        assert!(err.is_conflict());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_transient_classification() {
        assert!(RemoteError::Timeout(5).is_transient());
        assert!(RemoteError::Unavailable("connection reset".into()).is_transient());
        assert!(!RemoteError::NotFound.is_transient());
        assert!(!RemoteError::Rejected("too large".into()).is_transient());
    }
}
