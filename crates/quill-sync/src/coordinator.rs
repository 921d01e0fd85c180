//! # Sync Coordinator
//!
//! Drives one full sync cycle: enumerate pending notes, dispatch their
//! queued operations to the remote store, route conflicts into the
//! resolution pipeline, and record the results locally.
//!
//! ## Cycle Anatomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         One Sync Cycle                                  │
//! │                                                                         │
//! │  1. LOAD     notes WHERE status IN (pending_sync, pending_delete)      │
//! │              AND attention IS NULL                                     │
//! │                                                                         │
//! │  2. GUARD    per-note single-flight: a note already in flight from an  │
//! │              overlapping trigger is skipped, never raced               │
//! │                                                                         │
//! │  3. BACKOFF  operations still inside their retry window are skipped    │
//! │                                                                         │
//! │  4. DISPATCH up to max_concurrent_notes in parallel (semaphore):       │
//! │              CREATE → remote.create                                    │
//! │              UPDATE → remote.write   (compare-and-swap)                │
//! │              DELETE → remote.delete  (compare-and-swap)                │
//! │                                                                         │
//! │  5. SETTLE   success        → record committed version, drop op        │
//! │              CAS rejection  → detector → resolver (auto path)          │
//! │              base > current → quarantine (invariant violation)         │
//! │              transient      → attempt++, exponential backoff,          │
//! │                               escalate after max_attempts              │
//! │              permanent      → drop op, flag for operator attention     │
//! │                                                                         │
//! │  The cycle ends when every eligible operation has been attempted       │
//! │  once. It never blocks waiting for a manual resolution.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordering
//! Operations for a single note are strictly serialized by the single-flight
//! guard. Operations across different notes have no ordering guarantee and
//! run concurrently up to the configured limit.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use quill_core::{AttentionReason, Note, NoteSnapshot, OperationKind, SyncOperation, SyncStatus};
use quill_db::Database;

use crate::config::SyncConfig;
use crate::detector::{classify, Classification};
use crate::error::SyncResult;
use crate::notify::ChangeNotifier;
use crate::remote::{with_timeout, RemoteError, RemoteStore};
use crate::resolver::{AutoOutcome, ConflictResolver};

// =============================================================================
// Cycle Report
// =============================================================================

/// Tally of what one sync cycle did, recorded for the status surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Notes whose operation was dispatched this cycle.
    pub attempted: usize,

    /// Operations committed cleanly (including committed deletes).
    pub synced: usize,

    /// Conflicts resolved by the automatic merge heuristic.
    pub merged: usize,

    /// Conflicts parked for manual resolution.
    pub manual_conflicts: usize,

    /// Transient failures (and lost merge races) left for the next cycle.
    pub transient_failures: usize,

    /// Notes whose retry budget ran out this cycle.
    pub escalated: usize,

    /// Notes quarantined for a base version ahead of the remote.
    pub quarantined: usize,

    /// Operations dropped on a permanent remote rejection.
    pub dropped: usize,

    /// Notes skipped: in flight elsewhere, inside a backoff window, or
    /// missing their queued operation.
    pub skipped: usize,

    /// Workers that failed with an engine error (logged individually).
    pub errors: usize,
}

impl CycleReport {
    fn tally(&mut self, outcome: NoteOutcome) {
        self.attempted += 1;
        match outcome {
            NoteOutcome::Synced => self.synced += 1,
            NoteOutcome::Merged => self.merged += 1,
            NoteOutcome::ManualConflict => self.manual_conflicts += 1,
            NoteOutcome::LostRace | NoteOutcome::Transient => self.transient_failures += 1,
            NoteOutcome::Escalated => self.escalated += 1,
            NoteOutcome::Quarantined => self.quarantined += 1,
            NoteOutcome::Dropped => self.dropped += 1,
        }
    }
}

/// What happened to a single note's operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NoteOutcome {
    Synced,
    Merged,
    ManualConflict,
    LostRace,
    Transient,
    Escalated,
    Quarantined,
    Dropped,
}

// =============================================================================
// Retry Backoff
// =============================================================================

/// Delay before an operation with this many failed attempts may be retried:
/// `base * 2^attempts`, capped.
pub(crate) fn retry_delay(attempt_count: i64, base: Duration, cap: Duration) -> Duration {
    let exponent = attempt_count.clamp(0, 16) as u32;
    base.saturating_mul(1u32 << exponent).min(cap)
}

/// Returns true when the operation is outside its backoff window.
fn retry_due(op: &SyncOperation, now: DateTime<Utc>, config: &SyncConfig) -> bool {
    if op.attempt_count == 0 {
        return true;
    }

    let attempted_at = match op.attempted_at {
        Some(at) => at,
        None => return true,
    };

    let delay = retry_delay(
        op.attempt_count,
        config.retry_base_delay(),
        config.retry_max_delay(),
    );

    attempted_at + ChronoDuration::seconds(delay.as_secs() as i64) <= now
}

// =============================================================================
// Single-Flight Guard
// =============================================================================

/// Membership in the in-flight note set, released on drop so a worker that
/// bails early (or panics) can never wedge its note.
struct FlightGuard {
    in_flight: Arc<StdMutex<HashSet<String>>>,
    note_id: String,
}

impl FlightGuard {
    /// Claims the note, or returns None when another worker holds it.
    fn acquire(in_flight: &Arc<StdMutex<HashSet<String>>>, note_id: &str) -> Option<FlightGuard> {
        let mut held = in_flight.lock().unwrap_or_else(|e| e.into_inner());

        if !held.insert(note_id.to_string()) {
            return None;
        }

        Some(FlightGuard {
            in_flight: in_flight.clone(),
            note_id: note_id.to_string(),
        })
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut held = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&self.note_id);
    }
}

// =============================================================================
// Sync Coordinator
// =============================================================================

/// Orchestrates sync cycles over the local store and the remote store.
///
/// One coordinator exists per engine instance; clones share its guard set
/// and permits. The scheduler runs cycles strictly one at a time; the
/// per-note guard remains as defense in depth against partial-cycle
/// overlap across manual, priority and periodic triggers.
#[derive(Clone)]
pub struct SyncCoordinator {
    db: Database,
    remote: Arc<dyn RemoteStore>,
    resolver: Arc<ConflictResolver>,
    notifier: ChangeNotifier,
    config: Arc<SyncConfig>,

    /// Notes currently being synced by some worker.
    in_flight: Arc<StdMutex<HashSet<String>>>,

    /// Bounded concurrency across notes within a cycle.
    permits: Arc<Semaphore>,
}

impl SyncCoordinator {
    /// Creates a new coordinator.
    pub fn new(
        db: Database,
        remote: Arc<dyn RemoteStore>,
        resolver: Arc<ConflictResolver>,
        notifier: ChangeNotifier,
        config: Arc<SyncConfig>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.engine.max_concurrent_notes));

        SyncCoordinator {
            db,
            remote,
            resolver,
            notifier,
            config,
            in_flight: Arc::new(StdMutex::new(HashSet::new())),
            permits,
        }
    }

    /// Runs one full sync cycle and returns its tally.
    pub async fn run_cycle(&self) -> SyncResult<CycleReport> {
        let mut report = CycleReport::default();

        let pending = self.db.notes().find_pending().await?;
        if pending.is_empty() {
            debug!("No pending notes, sync cycle is a no-op");
            return Ok(report);
        }

        debug!(count = pending.len(), "Sync cycle starting");
        let now = Utc::now();
        let mut workers: JoinSet<SyncResult<NoteOutcome>> = JoinSet::new();

        for note in pending {
            let guard = match FlightGuard::acquire(&self.in_flight, &note.id) {
                Some(guard) => guard,
                None => {
                    debug!(note_id = %note.id, "Note already in flight, skipping");
                    report.skipped += 1;
                    continue;
                }
            };

            // Fetched under the guard: an overlapping cycle that already
            // completed this note leaves no operation behind, and nothing
            // can consume it while the guard is held.
            let op = match self.db.operations().find_by_note(&note.id).await? {
                Some(op) => op,
                None => {
                    debug!(note_id = %note.id, "Pending note has no queued operation, skipping");
                    report.skipped += 1;
                    continue;
                }
            };

            if !retry_due(&op, now, &self.config) {
                debug!(
                    note_id = %note.id,
                    attempts = op.attempt_count,
                    "Operation inside its backoff window, skipping"
                );
                report.skipped += 1;
                continue;
            }

            let permit = match Arc::clone(&self.permits).acquire_owned().await {
                Ok(permit) => permit,
                // The semaphore is never closed while the coordinator lives.
                Err(_) => break,
            };

            let coordinator = self.clone();
            workers.spawn(async move {
                let _guard = guard;
                let _permit = permit;
                coordinator.sync_note(&note, &op).await
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(outcome)) => report.tally(outcome),
                Ok(Err(e)) => {
                    error!(?e, "Note sync failed");
                    report.errors += 1;
                }
                Err(e) => {
                    error!(?e, "Sync worker aborted");
                    report.errors += 1;
                }
            }
        }

        info!(
            attempted = report.attempted,
            synced = report.synced,
            merged = report.merged,
            manual = report.manual_conflicts,
            transient = report.transient_failures,
            skipped = report.skipped,
            "Sync cycle finished"
        );

        Ok(report)
    }

    // =========================================================================
    // Per-Note Dispatch
    // =========================================================================

    /// Pushes one note's queued operation to the remote store.
    async fn sync_note(&self, note: &Note, op: &SyncOperation) -> SyncResult<NoteOutcome> {
        debug!(
            note_id = %note.id,
            kind = %op.kind,
            base_version = op.base_version,
            "Syncing note"
        );

        match op.kind {
            OperationKind::Create => self.push_create(note, op).await,
            OperationKind::Update => self.push_update(note, op).await,
            OperationKind::Delete => self.push_delete(note, op).await,
        }
    }

    async fn push_create(&self, note: &Note, op: &SyncOperation) -> SyncResult<NoteOutcome> {
        let result = with_timeout(
            self.config.remote_timeout(),
            self.remote.create(&op.payload),
        )
        .await;

        match result {
            Ok(commit) => {
                self.db
                    .notes()
                    .apply_remote_commit(&note.id, &commit.server_id, commit.version, SyncStatus::Synced)
                    .await?;
                self.db.operations().delete(&op.id).await?;

                info!(
                    note_id = %note.id,
                    server_id = %commit.server_id,
                    version = commit.version,
                    "Note created remotely"
                );
                self.notifier
                    .notify(&note.id, commit.version, SyncStatus::Synced);

                Ok(NoteOutcome::Synced)
            }

            Err(err) if err.is_transient() => self.record_transient(note, op, &err).await,
            Err(err) => self.record_permanent(note, op, &err).await,
        }
    }

    async fn push_update(&self, note: &Note, op: &SyncOperation) -> SyncResult<NoteOutcome> {
        let server_id = match note.server_id.clone() {
            Some(id) => id,
            None => {
                // An update queued for a note the remote never issued an id
                // for: the local row and its queue are out of step.
                return self.quarantine(note, "update queued without a server id").await;
            }
        };

        let result = with_timeout(
            self.config.remote_timeout(),
            self.remote.write(&server_id, &op.payload, op.base_version),
        )
        .await;

        match result {
            Ok(commit) => {
                self.db
                    .notes()
                    .apply_remote_commit(&note.id, &server_id, commit.version, SyncStatus::Synced)
                    .await?;
                self.db.operations().delete(&op.id).await?;

                info!(note_id = %note.id, version = commit.version, "Note updated remotely");
                self.notifier
                    .notify(&note.id, commit.version, SyncStatus::Synced);

                Ok(NoteOutcome::Synced)
            }

            Err(RemoteError::Conflict {
                current_version,
                current,
            }) => {
                self.handle_conflict(note, op, &server_id, current_version, current)
                    .await
            }

            Err(err) if err.is_transient() => self.record_transient(note, op, &err).await,

            // NotFound: the note vanished remotely while an edit was queued.
            // Surfaced for operator choice, never silently dropped.
            Err(err) => self.record_permanent(note, op, &err).await,
        }
    }

    async fn push_delete(&self, note: &Note, op: &SyncOperation) -> SyncResult<NoteOutcome> {
        let server_id = match note.server_id.clone() {
            Some(id) => id,
            None => {
                return self.quarantine(note, "delete queued without a server id").await;
            }
        };

        let result = with_timeout(
            self.config.remote_timeout(),
            self.remote.delete(&server_id, op.base_version),
        )
        .await;

        match result {
            // Already gone remotely counts as committed.
            Ok(()) | Err(RemoteError::NotFound) => {
                // Removing the note row cascades the queued operation away.
                self.db.notes().delete(&note.id).await?;

                info!(note_id = %note.id, "Note deleted remotely");
                self.notifier
                    .notify(&note.id, op.base_version, SyncStatus::Synced);

                Ok(NoteOutcome::Synced)
            }

            Err(RemoteError::Conflict {
                current_version,
                current,
            }) => {
                self.handle_conflict(note, op, &server_id, current_version, current)
                    .await
            }

            Err(err) if err.is_transient() => self.record_transient(note, op, &err).await,
            Err(err) => self.record_permanent(note, op, &err).await,
        }
    }

    // =========================================================================
    // Outcome Handling
    // =========================================================================

    /// Routes a CAS rejection through the detector into the resolver.
    async fn handle_conflict(
        &self,
        note: &Note,
        op: &SyncOperation,
        server_id: &str,
        current_version: i64,
        current: NoteSnapshot,
    ) -> SyncResult<NoteOutcome> {
        match classify(op.kind, op.base_version, Some(current_version)) {
            Classification::Conflict => {
                let outcome = self
                    .resolver
                    .resolve_auto(op, server_id, current_version, current)
                    .await?;

                Ok(match outcome {
                    AutoOutcome::Merged(version) => {
                        debug!(note_id = %note.id, version, "Conflict auto-merged");
                        NoteOutcome::Merged
                    }
                    AutoOutcome::Manual => NoteOutcome::ManualConflict,
                    AutoOutcome::LostRace => NoteOutcome::LostRace,
                })
            }

            Classification::Diverged => {
                error!(
                    note_id = %note.id,
                    base_version = op.base_version,
                    current_version,
                    "Local base version is ahead of the remote"
                );
                self.quarantine(note, "base version ahead of remote").await
            }

            // The store rejected the write yet the versions agree: an
            // inconsistent response. Retry on a later cycle.
            Classification::Clean | Classification::RemoteMissing => {
                warn!(
                    note_id = %note.id,
                    current_version,
                    "Conflict response with a matching version, treating as transient"
                );
                self.record_transient(note, op, &RemoteError::Unavailable(
                    "conflict response with matching version".into(),
                ))
                .await
            }
        }
    }

    /// Excludes a note from automatic cycles until an operator inspects it.
    /// The queued operation stays put so nothing is lost.
    async fn quarantine(&self, note: &Note, reason: &str) -> SyncResult<NoteOutcome> {
        warn!(note_id = %note.id, reason, "Quarantining note");
        self.db
            .notes()
            .set_attention(&note.id, Some(AttentionReason::Quarantined))
            .await?;

        Ok(NoteOutcome::Quarantined)
    }

    /// Records a transient failure; escalates once the retry budget is gone.
    async fn record_transient(
        &self,
        note: &Note,
        op: &SyncOperation,
        err: &RemoteError,
    ) -> SyncResult<NoteOutcome> {
        let attempts = self
            .db
            .operations()
            .record_attempt(&op.id, &err.to_string())
            .await?;

        if attempts >= self.config.engine.max_attempts {
            warn!(
                note_id = %note.id,
                attempts,
                "Retry budget exhausted, flagging for manual intervention"
            );
            self.db
                .notes()
                .set_attention(&note.id, Some(AttentionReason::RetriesExhausted))
                .await?;

            return Ok(NoteOutcome::Escalated);
        }

        debug!(
            note_id = %note.id,
            attempts,
            error = %err,
            "Transient failure, eligible for retry after backoff"
        );
        Ok(NoteOutcome::Transient)
    }

    /// Drops the operation on a permanent remote rejection and surfaces the
    /// note for operator attention.
    async fn record_permanent(
        &self,
        note: &Note,
        op: &SyncOperation,
        err: &RemoteError,
    ) -> SyncResult<NoteOutcome> {
        warn!(note_id = %note.id, error = %err, "Permanent remote failure, dropping operation");

        self.db.operations().delete(&op.id).await?;
        self.db
            .notes()
            .set_attention(&note.id, Some(AttentionReason::RemoteRejected))
            .await?;
        self.db
            .notes()
            .set_status(&note.id, SyncStatus::Conflicted)
            .await?;

        self.notifier
            .notify(&note.id, note.version, SyncStatus::Conflicted);

        Ok(NoteOutcome::Dropped)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let base = Duration::from_secs(2);
        let cap = Duration::from_secs(300);

        assert_eq!(retry_delay(0, base, cap), Duration::from_secs(2));
        assert_eq!(retry_delay(1, base, cap), Duration::from_secs(4));
        assert_eq!(retry_delay(3, base, cap), Duration::from_secs(16));
        assert_eq!(retry_delay(7, base, cap), Duration::from_secs(256));
        assert_eq!(retry_delay(8, base, cap), cap);
        assert_eq!(retry_delay(1000, base, cap), cap);
    }

    #[test]
    fn test_retry_due_windows() {
        let config = SyncConfig::default();
        let now = Utc::now();

        let mut op = SyncOperation {
            id: "op-1".into(),
            note_id: "n1".into(),
            kind: OperationKind::Update,
            base_version: 1,
            payload: NoteSnapshot {
                title: "t".into(),
                content: "c".into(),
                tags: Default::default(),
                last_editor: "alice".into(),
                updated_at: now,
            },
            attempt_count: 0,
            last_error: None,
            created_at: now,
            attempted_at: None,
        };

        // Never attempted: always due.
        assert!(retry_due(&op, now, &config));

        // One failure moments ago: inside the 2s * 2^1 window.
        op.attempt_count = 1;
        op.attempted_at = Some(now);
        assert!(!retry_due(&op, now, &config));

        // Same failure, long after the window elapsed.
        assert!(retry_due(&op, now + ChronoDuration::seconds(60), &config));
    }

    #[test]
    fn test_flight_guard_is_exclusive_and_released() {
        let in_flight = Arc::new(StdMutex::new(HashSet::new()));

        let guard = FlightGuard::acquire(&in_flight, "n1");
        assert!(guard.is_some());
        assert!(FlightGuard::acquire(&in_flight, "n1").is_none());

        // A different note is unaffected.
        assert!(FlightGuard::acquire(&in_flight, "n2").is_some());

        drop(guard);
        assert!(FlightGuard::acquire(&in_flight, "n1").is_some());
    }

    #[test]
    fn test_report_tally() {
        let mut report = CycleReport::default();
        report.tally(NoteOutcome::Synced);
        report.tally(NoteOutcome::Merged);
        report.tally(NoteOutcome::Transient);
        report.tally(NoteOutcome::LostRace);

        assert_eq!(report.attempted, 4);
        assert_eq!(report.synced, 1);
        assert_eq!(report.merged, 1);
        assert_eq!(report.transient_failures, 2);
    }
}
