//! # Conflict Resolver
//!
//! Turns a conflict into a committed resolution: automatically when the
//! merge heuristic allows it, otherwise by surfacing both snapshots for an
//! explicit human choice.
//!
//! ## Resolution Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Conflict Resolution Flow                          │
//! │                                                                         │
//! │  ConflictRecord (from detector)                                        │
//! │       │                                                                 │
//! │       ├── AUTO PATH (resolve_auto, driven by the coordinator)          │
//! │       │     merge heuristic produced a suggestion?                     │
//! │       │       YES → CAS write based on the conflicting remote version  │
//! │       │             committed → local updated, op consumed, notify     │
//! │       │             lost another race → left pending for next cycle    │
//! │       │       NO  → note marked CONFLICTED, op folded into the record, │
//! │       │             excluded from automatic cycles, notify             │
//! │       │                                                                 │
//! │       └── MANUAL PATH (resolve_manual, operator API)                   │
//! │             strategy: auto_merge | keep_local | keep_remote | manual   │
//! │             performs a FORCE WRITE: bypasses the version check and     │
//! │             commits at a version strictly greater than both            │
//! │             conflicting versions (it is, by definition, choosing the   │
//! │             version that wins)                                         │
//! │                                                                         │
//! │  Every resolution, auto or manual, emits a change notification so     │
//! │  collaborators see the final state.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use quill_core::validation::validate_snapshot;
use quill_core::{
    suggest_merge, ConflictRecord, MergeOutcome, NoteSnapshot, OperationKind, ResolutionStrategy,
    SyncOperation, SyncStatus,
};
use quill_db::Database;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::notify::ChangeNotifier;
use crate::remote::{with_timeout, RemoteError, RemoteStore};

// =============================================================================
// Auto Resolution Outcome
// =============================================================================

/// What the automatic path did with a conflict.
#[derive(Debug, Clone, PartialEq)]
pub enum AutoOutcome {
    /// Merge suggestion committed at this remote version.
    Merged(i64),
    /// No safe merge; the note is now CONFLICTED awaiting manual resolution.
    Manual,
    /// The merge write lost another race; the operation stays pending and
    /// will be re-detected next cycle.
    LostRace,
}

// =============================================================================
// Conflict Resolver
// =============================================================================

/// Resolves conflicts, automatically where safe and manually on demand.
///
/// Conflict records are transient: they live in memory from detection to
/// resolution and are never persisted. After a process restart the record
/// for a CONFLICTED note is rebuilt from the local note and a remote fetch.
pub struct ConflictResolver {
    db: Database,
    remote: Arc<dyn RemoteStore>,
    notifier: ChangeNotifier,
    config: Arc<SyncConfig>,
    /// Unresolved conflicts by note id.
    conflicts: Mutex<HashMap<String, ConflictRecord>>,
}

impl ConflictResolver {
    /// Creates a new resolver.
    pub fn new(
        db: Database,
        remote: Arc<dyn RemoteStore>,
        notifier: ChangeNotifier,
        config: Arc<SyncConfig>,
    ) -> Self {
        ConflictResolver {
            db,
            remote,
            notifier,
            config,
            conflicts: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the unresolved conflict record for a note, if any.
    pub async fn conflict(&self, note_id: &str) -> Option<ConflictRecord> {
        self.conflicts.lock().await.get(note_id).cloned()
    }

    /// Number of unresolved conflict records held in memory.
    pub async fn conflict_count(&self) -> usize {
        self.conflicts.lock().await.len()
    }

    // =========================================================================
    // Automatic Path
    // =========================================================================

    /// Attempts the automatic resolution of a freshly detected conflict.
    ///
    /// Delete conflicts never auto-merge: losing an edit or losing a delete
    /// both require human judgment.
    pub async fn resolve_auto(
        &self,
        op: &SyncOperation,
        server_id: &str,
        current_version: i64,
        current: NoteSnapshot,
    ) -> SyncResult<AutoOutcome> {
        let suggested = if op.kind == OperationKind::Delete {
            None
        } else {
            match suggest_merge(&op.payload, &current) {
                MergeOutcome::Merged(snapshot) => Some(snapshot),
                MergeOutcome::Manual => None,
            }
        };

        let record = ConflictRecord {
            note_id: op.note_id.clone(),
            server_id: Some(server_id.to_string()),
            kind: op.kind,
            local_version: op.base_version,
            remote_version: current_version,
            local: op.payload.clone(),
            remote: current,
            suggested: suggested.clone(),
        };

        match suggested {
            Some(merged) => {
                self.commit_auto_merge(op, server_id, current_version, merged)
                    .await
            }
            None => {
                self.park_for_manual(op, record).await?;
                Ok(AutoOutcome::Manual)
            }
        }
    }

    /// Commits a merge suggestion with a normal CAS write based on the
    /// conflicting remote version. Losing yet another race leaves the
    /// operation pending; the next cycle re-detects against the newer
    /// version.
    async fn commit_auto_merge(
        &self,
        op: &SyncOperation,
        server_id: &str,
        current_version: i64,
        merged: NoteSnapshot,
    ) -> SyncResult<AutoOutcome> {
        let write = with_timeout(
            self.config.remote_timeout(),
            self.remote.write(server_id, &merged, current_version),
        )
        .await;

        match write {
            Ok(commit) => {
                self.apply_committed(&op.note_id, server_id, &merged, commit.version)
                    .await?;
                self.db.operations().delete(&op.id).await?;

                info!(
                    note_id = %op.note_id,
                    version = commit.version,
                    "Auto-merge committed"
                );
                self.notifier
                    .notify(&op.note_id, commit.version, SyncStatus::Synced);

                Ok(AutoOutcome::Merged(commit.version))
            }

            Err(RemoteError::Conflict { current_version, .. }) => {
                warn!(
                    note_id = %op.note_id,
                    current_version,
                    "Auto-merge lost another race, retrying next cycle"
                );
                Ok(AutoOutcome::LostRace)
            }

            Err(other) => Err(SyncError::Remote(other)),
        }
    }

    /// Parks a conflict for manual resolution: the note becomes CONFLICTED,
    /// the operation is folded into the record, and the record is held
    /// until an operator resolves it.
    async fn park_for_manual(&self, op: &SyncOperation, record: ConflictRecord) -> SyncResult<()> {
        let notes = self.db.notes();
        let mut note = notes
            .find_by_id(&op.note_id)
            .await?
            .ok_or_else(|| SyncError::NoteNotFound(op.note_id.clone()))?;

        note.version = record.remote_version;
        note.sync_status = SyncStatus::Conflicted;
        notes.upsert(&note).await?;

        self.db.operations().delete(&op.id).await?;
        self.conflicts
            .lock()
            .await
            .insert(op.note_id.clone(), record);

        info!(note_id = %op.note_id, "Conflict parked for manual resolution");
        self.notifier
            .notify(&op.note_id, note.version, SyncStatus::Conflicted);

        Ok(())
    }

    // =========================================================================
    // Manual Path
    // =========================================================================

    /// Resolves a conflict by explicit operator choice.
    ///
    /// Performs the force-write path: the chosen content is committed at a
    /// version strictly greater than both conflicting versions, the local
    /// note returns to SYNCED at that version, and a change notification is
    /// emitted. Returns the committed version.
    pub async fn resolve_manual(
        &self,
        note_id: &str,
        strategy: ResolutionStrategy,
        final_content: Option<String>,
    ) -> SyncResult<i64> {
        let notes = self.db.notes();
        let note = notes
            .find_by_id(note_id)
            .await?
            .ok_or_else(|| SyncError::NoteNotFound(note_id.to_string()))?;

        let record = self.take_or_rebuild_record(&note).await?;
        let server_id = record
            .server_id
            .clone()
            .ok_or_else(|| SyncError::NoConflict(note_id.to_string()))?;

        // A delete conflict resolved in favor of the delete has no content
        // to write: force the delete through and drop the note locally.
        if record.kind == OperationKind::Delete && strategy == ResolutionStrategy::KeepLocal {
            return self.commit_forced_delete(&note.id, &server_id, &record).await;
        }

        let final_snapshot = self.final_snapshot(&record, strategy, final_content)?;

        validate_snapshot(&final_snapshot)
            .map_err(|e| SyncError::InvalidResolution(e.to_string()))?;

        let floor = record
            .local_version
            .max(record.remote_version)
            .max(note.version);

        let commit = with_timeout(
            self.config.remote_timeout(),
            self.remote.force_write(&server_id, &final_snapshot, floor),
        )
        .await?;

        self.apply_committed(note_id, &server_id, &final_snapshot, commit.version)
            .await?;

        info!(
            note_id = %note_id,
            strategy = %strategy,
            version = commit.version,
            "Manual resolution committed"
        );
        self.notifier
            .notify(note_id, commit.version, SyncStatus::Synced);

        Ok(commit.version)
    }

    /// Picks the final snapshot for the chosen strategy.
    fn final_snapshot(
        &self,
        record: &ConflictRecord,
        strategy: ResolutionStrategy,
        final_content: Option<String>,
    ) -> SyncResult<NoteSnapshot> {
        match strategy {
            ResolutionStrategy::AutoMerge => record.suggested.clone().ok_or_else(|| {
                SyncError::InvalidResolution(
                    "no merge suggestion exists for this conflict".to_string(),
                )
            }),

            ResolutionStrategy::KeepLocal => Ok(record.local.clone()),

            ResolutionStrategy::KeepRemote => Ok(record.remote.clone()),

            ResolutionStrategy::Manual => {
                let content = final_content.ok_or(SyncError::ManualContentRequired)?;
                let mut snapshot = record.local.clone();
                snapshot.content = content;
                snapshot.last_editor = self.config.device.name.clone();
                snapshot.updated_at = Utc::now();
                Ok(snapshot)
            }
        }
    }

    /// Force-deletes the remote note and removes the local copy.
    async fn commit_forced_delete(
        &self,
        note_id: &str,
        server_id: &str,
        record: &ConflictRecord,
    ) -> SyncResult<i64> {
        with_timeout(
            self.config.remote_timeout(),
            self.remote.force_delete(server_id),
        )
        .await?;

        self.db.notes().delete(note_id).await?;
        if let Some(op) = self.db.operations().find_by_note(note_id).await? {
            self.db.operations().delete(&op.id).await?;
        }

        info!(note_id = %note_id, "Delete conflict resolved: delete won");
        self.notifier
            .notify(note_id, record.remote_version, SyncStatus::Synced);

        Ok(record.remote_version)
    }

    /// Writes the committed state back to the local note.
    async fn apply_committed(
        &self,
        note_id: &str,
        server_id: &str,
        snapshot: &NoteSnapshot,
        version: i64,
    ) -> SyncResult<()> {
        let notes = self.db.notes();
        let mut note = notes
            .find_by_id(note_id)
            .await?
            .ok_or_else(|| SyncError::NoteNotFound(note_id.to_string()))?;

        note.apply_snapshot(snapshot);
        note.server_id = Some(server_id.to_string());
        note.version = version;
        note.base_version = version;
        note.sync_status = SyncStatus::Synced;
        note.attention = None;
        notes.upsert(&note).await?;

        if let Some(op) = self.db.operations().find_by_note(note_id).await? {
            self.db.operations().delete(&op.id).await?;
        }

        Ok(())
    }

    /// Takes the in-memory record for a note, or rebuilds it from the local
    /// note plus a remote fetch (e.g., after a process restart).
    async fn take_or_rebuild_record(&self, note: &quill_core::Note) -> SyncResult<ConflictRecord> {
        if let Some(record) = self.conflicts.lock().await.remove(&note.id) {
            return Ok(record);
        }

        if note.sync_status != SyncStatus::Conflicted {
            return Err(SyncError::NoConflict(note.id.clone()));
        }

        let server_id = note
            .server_id
            .clone()
            .ok_or_else(|| SyncError::NoConflict(note.id.clone()))?;

        let remote_note = with_timeout(
            self.config.remote_timeout(),
            self.remote.fetch(&server_id),
        )
        .await?
        .ok_or(SyncError::Remote(RemoteError::NotFound))?;

        let local = note.snapshot();
        let suggested = suggest_merge(&local, &remote_note.snapshot).merged();

        Ok(ConflictRecord {
            note_id: note.id.clone(),
            server_id: Some(server_id),
            kind: OperationKind::Update,
            local_version: note.base_version,
            remote_version: remote_note.version,
            local,
            remote: remote_note.snapshot,
            suggested,
        })
    }
}
