//! # Domain Types
//!
//! Core domain types used throughout Quill.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Note       │   │  SyncOperation  │   │ ConflictRecord  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  note_id (FK)   │   │  note_id        │       │
//! │  │  server_id?     │   │  kind           │   │  local/remote   │       │
//! │  │  version        │   │  base_version   │   │  snapshots      │       │
//! │  │  sync_status    │   │  payload        │   │  suggested?     │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   SyncStatus    │   │ OperationKind   │   │ResolutionStrategy│      │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  Synced         │   │  Create         │   │  AutoMerge      │       │
//! │  │  PendingSync    │   │  Update         │   │  KeepLocal      │       │
//! │  │  PendingDelete  │   │  Delete         │   │  KeepRemote     │       │
//! │  │  Conflicted     │   └─────────────────┘   │  Manual         │       │
//! │  └─────────────────┘                         └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Versioning Model
//! The remote store owns the `version` counter: it advances by exactly one on
//! every committed remote write. A local edit never touches `version`; it only
//! records the version the edit was *based on* (`base_version`) so staleness
//! can be detected when the edit is pushed.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

// =============================================================================
// Sync Status
// =============================================================================

/// The synchronization state of a local note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Local copy matches the last known remote version.
    Synced,
    /// Local edits are waiting to be pushed.
    PendingSync,
    /// Local deletion is waiting to be pushed.
    PendingDelete,
    /// A conflict needs human judgment before the note can sync again.
    Conflicted,
}

impl SyncStatus {
    /// Returns true if the note has outbound work queued.
    pub fn is_pending(&self) -> bool {
        matches!(self, SyncStatus::PendingSync | SyncStatus::PendingDelete)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::PendingSync => "pending_sync",
            SyncStatus::PendingDelete => "pending_delete",
            SyncStatus::Conflicted => "conflicted",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "synced" => Ok(SyncStatus::Synced),
            "pending_sync" => Ok(SyncStatus::PendingSync),
            "pending_delete" => Ok(SyncStatus::PendingDelete),
            "conflicted" => Ok(SyncStatus::Conflicted),
            other => Err(CoreError::unknown("sync_status", other)),
        }
    }
}

// =============================================================================
// Attention Reason
// =============================================================================

/// Why a note requires operator attention.
///
/// A note carrying any attention reason is excluded from automatic sync
/// cycles until an operator clears it. Each variant is a distinct, queryable
/// reason code rather than a hidden internal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttentionReason {
    /// Local `base_version` exceeded the remote version: local state diverged
    /// from a version the remote never issued. Never auto-healed.
    Quarantined,
    /// Transient failures exhausted the retry budget.
    RetriesExhausted,
    /// The remote permanently rejected the note (e.g., structurally invalid).
    RemoteRejected,
}

impl AttentionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttentionReason::Quarantined => "quarantined",
            AttentionReason::RetriesExhausted => "retries_exhausted",
            AttentionReason::RemoteRejected => "remote_rejected",
        }
    }
}

impl std::fmt::Display for AttentionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AttentionReason {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quarantined" => Ok(AttentionReason::Quarantined),
            "retries_exhausted" => Ok(AttentionReason::RetriesExhausted),
            "remote_rejected" => Ok(AttentionReason::RemoteRejected),
            other => Err(CoreError::unknown("attention", other)),
        }
    }
}

// =============================================================================
// Note
// =============================================================================

/// A note as stored in the local cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Stable local identifier (UUID v4).
    pub id: String,

    /// Remote identifier. None until the first successful push.
    pub server_id: Option<String>,

    /// Note title.
    pub title: String,

    /// Note body.
    pub content: String,

    /// Tags. A sorted set keeps serialization deterministic.
    pub tags: BTreeSet<String>,

    /// Last remote version this device has seen for the note.
    /// Owned by the remote store; local writes never advance it.
    pub version: i64,

    /// Remote version the local content was based on.
    pub base_version: i64,

    /// Identity of the last writer, for merge heuristics and audit.
    pub last_editor: String,

    /// When the note was last modified (locally or by an applied remote).
    pub updated_at: DateTime<Utc>,

    /// Synchronization state.
    pub sync_status: SyncStatus,

    /// Reason the note needs operator attention, if any.
    pub attention: Option<AttentionReason>,
}

impl Note {
    /// Creates a new locally-authored note that has never been pushed.
    ///
    /// The note starts with no `server_id`, version 0 and `PendingSync`
    /// status, i.e. it is immediately eligible for the next sync cycle.
    pub fn new_local(
        title: impl Into<String>,
        content: impl Into<String>,
        tags: BTreeSet<String>,
        editor: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Note {
            id: Uuid::new_v4().to_string(),
            server_id: None,
            title: title.into(),
            content: content.into(),
            tags,
            version: 0,
            base_version: 0,
            last_editor: editor.into(),
            updated_at: now,
            sync_status: SyncStatus::PendingSync,
            attention: None,
        }
    }

    /// Returns the outbound payload for this note's current local state.
    pub fn snapshot(&self) -> NoteSnapshot {
        NoteSnapshot {
            title: self.title.clone(),
            content: self.content.clone(),
            tags: self.tags.clone(),
            last_editor: self.last_editor.clone(),
            updated_at: self.updated_at,
        }
    }

    /// Applies a snapshot to the local fields (e.g., after keeping remote).
    pub fn apply_snapshot(&mut self, snapshot: &NoteSnapshot) {
        self.title = snapshot.title.clone();
        self.content = snapshot.content.clone();
        self.tags = snapshot.tags.clone();
        self.last_editor = snapshot.last_editor.clone();
        self.updated_at = snapshot.updated_at;
    }

    /// Returns true if the note is excluded from automatic sync cycles.
    pub fn needs_attention(&self) -> bool {
        self.attention.is_some()
    }
}

// =============================================================================
// Note Snapshot
// =============================================================================

/// Point-in-time capture of a note's synchronized fields.
///
/// Used both as the payload of an outbound [`SyncOperation`] and as the
/// local/remote sides of a [`ConflictRecord`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteSnapshot {
    pub title: String,
    pub content: String,
    pub tags: BTreeSet<String>,
    pub last_editor: String,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Sync Operation
// =============================================================================

/// Outbound operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(OperationKind::Create),
            "update" => Ok(OperationKind::Update),
            "delete" => Ok(OperationKind::Delete),
            other => Err(CoreError::unknown("kind", other)),
        }
    }
}

/// A unit of outbound sync work.
///
/// ## Lifecycle
/// Created when a local mutation occurs (offline or speculatively). At most
/// one operation exists per note; later mutations coalesce into it, keeping
/// the earliest `base_version`. Consumed (deleted) when it completes:
/// success, permanent failure, or folded into a conflict record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    /// Operation identifier (UUID v4).
    pub id: String,

    /// The note this operation belongs to.
    pub note_id: String,

    /// What to do remotely.
    pub kind: OperationKind,

    /// Remote version the operation was based on.
    pub base_version: i64,

    /// The note state to push. For deletes this is the last local state,
    /// kept so a delete conflict can surface what would be lost.
    pub payload: NoteSnapshot,

    /// Number of failed attempts so far.
    pub attempt_count: i64,

    /// Last failure message, if any.
    pub last_error: Option<String>,

    /// When the operation was first queued.
    pub created_at: DateTime<Utc>,

    /// When the operation was last attempted.
    pub attempted_at: Option<DateTime<Utc>>,
}

/// Result of folding a new local mutation into an existing queued operation.
///
/// ## Coalescing Rules
/// ```text
/// existing   + incoming  = queued
/// ─────────────────────────────────
/// (none)     + X         = X
/// Create     + Update    = Create   (remote never saw the note)
/// Create     + Delete    = (none)   (net effect is nothing)
/// Update     + Update    = Update   (newer payload, earliest base_version)
/// Update     + Delete    = Delete
/// Delete     + Create    = Update   (delete never committed; treat as edit)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoalesceOutcome {
    /// Queue (or keep) an operation of this kind.
    Queue(OperationKind),
    /// The net effect is nothing; drop the queued operation.
    Drop,
}

/// Folds an incoming mutation kind into an already-queued kind.
pub fn coalesce_kinds(existing: Option<OperationKind>, incoming: OperationKind) -> CoalesceOutcome {
    use CoalesceOutcome::*;
    use OperationKind::*;

    match (existing, incoming) {
        (None, kind) => Queue(kind),
        (Some(Create), Update) => Queue(Create),
        (Some(Create), Delete) => Drop,
        (Some(Create), Create) => Queue(Create),
        (Some(Update), Delete) => Queue(Delete),
        (Some(Update), _) => Queue(Update),
        (Some(Delete), Create) | (Some(Delete), Update) => Queue(Update),
        (Some(Delete), Delete) => Queue(Delete),
    }
}

// =============================================================================
// Conflict Record
// =============================================================================

/// How a conflict is to be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Apply the deterministic merge suggestion.
    AutoMerge,
    /// The local side wins outright.
    KeepLocal,
    /// The remote side wins outright.
    KeepRemote,
    /// A human supplies the final content.
    Manual,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::AutoMerge => "auto_merge",
            ResolutionStrategy::KeepLocal => "keep_local",
            ResolutionStrategy::KeepRemote => "keep_remote",
            ResolutionStrategy::Manual => "manual",
        }
    }
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResolutionStrategy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto_merge" | "auto" => Ok(ResolutionStrategy::AutoMerge),
            "keep_local" | "local" => Ok(ResolutionStrategy::KeepLocal),
            "keep_remote" | "remote" => Ok(ResolutionStrategy::KeepRemote),
            "manual" => Ok(ResolutionStrategy::Manual),
            other => Err(CoreError::unknown("resolution_strategy", other)),
        }
    }
}

/// A detected conflict between a local operation and the remote state.
///
/// ## Ownership
/// Transient: created by the detector, owned by the resolver pipeline, and
/// destroyed once a resolution commits. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// The note in conflict.
    pub note_id: String,

    /// Remote identifier of the note.
    pub server_id: Option<String>,

    /// Kind of the losing operation (Update or Delete).
    pub kind: OperationKind,

    /// `base_version` of the losing operation.
    pub local_version: i64,

    /// Remote version at detection time.
    pub remote_version: i64,

    /// The local state that lost the race.
    pub local: NoteSnapshot,

    /// The remote state that won the race.
    pub remote: NoteSnapshot,

    /// Deterministic merge suggestion, if the heuristic produced one.
    pub suggested: Option<NoteSnapshot>,
}

// =============================================================================
// Unit Tests
// =============================================================================
