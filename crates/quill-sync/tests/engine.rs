//! End-to-end engine scenarios over the in-memory remote store: offline
//! round trips, conflict resolution paths, retry escalation, and the
//! scheduler-driven priority pass.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use quill_core::{AttentionReason, Note, NoteSnapshot, ResolutionStrategy, SyncStatus};
use quill_db::{Database, DbConfig};
use quill_sync::{
    ChangeNotifier, ConflictResolver, ConnectivityProbe, InMemoryRemoteStore, RemoteError,
    RemoteStore, SyncConfig, SyncCoordinator, SyncEngine,
};

// =============================================================================
// Test Rig
// =============================================================================

struct Rig {
    db: Database,
    remote: Arc<InMemoryRemoteStore>,
    coordinator: SyncCoordinator,
    resolver: Arc<ConflictResolver>,
    notifier: ChangeNotifier,
}

async fn rig_with_config(config: SyncConfig) -> Rig {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let remote = Arc::new(InMemoryRemoteStore::new());
    let config = Arc::new(config);
    let notifier = ChangeNotifier::default();

    let resolver = Arc::new(ConflictResolver::new(
        db.clone(),
        remote.clone() as Arc<dyn RemoteStore>,
        notifier.clone(),
        config.clone(),
    ));
    let coordinator = SyncCoordinator::new(
        db.clone(),
        remote.clone() as Arc<dyn RemoteStore>,
        resolver.clone(),
        notifier.clone(),
        config,
    );

    Rig {
        db,
        remote,
        coordinator,
        resolver,
        notifier,
    }
}

async fn rig() -> Rig {
    rig_with_config(SyncConfig::default()).await
}

fn tags(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn snapshot(title: &str, content: &str, tag_values: &[&str], editor: &str) -> NoteSnapshot {
    NoteSnapshot {
        title: title.to_string(),
        content: content.to_string(),
        tags: tags(tag_values),
        last_editor: editor.to_string(),
        updated_at: Utc::now(),
    }
}

/// Stages a fresh local note and pushes it, returning the synced copy.
async fn synced_note(rig: &Rig, title: &str, content: &str, tag_values: &[&str]) -> Note {
    let note = Note::new_local(title, content, tags(tag_values), "alice", Utc::now());
    rig.db.stage_edit(&note).await.unwrap();

    let report = rig.coordinator.run_cycle().await.unwrap();
    assert_eq!(report.synced, 1);

    rig.db.notes().find_by_id(&note.id).await.unwrap().unwrap()
}

// =============================================================================
// Round Trip & Idempotence
// =============================================================================

#[tokio::test]
async fn test_offline_create_round_trip() {
    let rig = rig().await;

    let note = Note::new_local("Trip", "packing list", tags(&["travel"]), "alice", Utc::now());
    rig.db.stage_edit(&note).await.unwrap();

    let stored = rig.db.notes().find_by_id(&note.id).await.unwrap().unwrap();
    assert!(stored.server_id.is_none());
    assert_eq!(stored.sync_status, SyncStatus::PendingSync);

    let report = rig.coordinator.run_cycle().await.unwrap();
    assert_eq!(report.synced, 1);

    let stored = rig.db.notes().find_by_id(&note.id).await.unwrap().unwrap();
    assert!(stored.server_id.is_some());
    assert_eq!(stored.version, 1);
    assert_eq!(stored.base_version, 1);
    assert_eq!(stored.sync_status, SyncStatus::Synced);
    assert_eq!(rig.remote.note_count().await, 1);
}

#[tokio::test]
async fn test_repeat_cycle_performs_no_writes() {
    let rig = rig().await;
    synced_note(&rig, "Idem", "body", &[]).await;

    assert_eq!(rig.remote.write_attempt_count(), 1);

    let report = rig.coordinator.run_cycle().await.unwrap();
    assert_eq!(report.attempted, 0);
    assert_eq!(rig.remote.write_attempt_count(), 1);
}

#[tokio::test]
async fn test_concurrent_cycles_write_once() {
    let rig = rig().await;

    let note = Note::new_local("Single flight", "body", tags(&[]), "alice", Utc::now());
    rig.db.stage_edit(&note).await.unwrap();

    // Periodic, priority and manual triggers overlapping on the same note:
    // exactly one write attempt for its one base version.
    let (a, b, c) = tokio::join!(
        rig.coordinator.run_cycle(),
        rig.coordinator.run_cycle(),
        rig.coordinator.run_cycle(),
    );
    a.unwrap();
    b.unwrap();
    c.unwrap();

    assert_eq!(rig.remote.write_attempt_count(), 1);

    let stored = rig.db.notes().find_by_id(&note.id).await.unwrap().unwrap();
    assert_eq!(stored.sync_status, SyncStatus::Synced);
    assert_eq!(stored.version, 1);
}

#[tokio::test]
async fn test_delete_round_trip() {
    let rig = rig().await;
    let note = synced_note(&rig, "Doomed", "body", &[]).await;

    rig.db.stage_delete(&note.id).await.unwrap();

    let report = rig.coordinator.run_cycle().await.unwrap();
    assert_eq!(report.synced, 1);

    assert!(rig.db.notes().find_by_id(&note.id).await.unwrap().is_none());
    assert_eq!(rig.remote.note_count().await, 0);
}

// =============================================================================
// Conflict Resolution
// =============================================================================

#[tokio::test]
async fn test_auto_merge_unions_tags() {
    let rig = rig().await;
    let mut note = synced_note(&rig, "Shared", "body", &["a", "b"]).await;
    let server_id = note.server_id.clone().unwrap();

    // Another editor commits tags {b, c} on the same content.
    let racing = snapshot("Shared", "body", &["b", "c"], "bob");
    let remote_version = rig.remote.race_write(&server_id, racing).await;
    assert_eq!(remote_version, 2);

    // A local re-edit based on version 1 touches the timestamp only.
    note.updated_at = Utc::now();
    rig.db.stage_edit(&note).await.unwrap();

    let report = rig.coordinator.run_cycle().await.unwrap();
    assert_eq!(report.merged, 1);

    let stored = rig.db.notes().find_by_id(&note.id).await.unwrap().unwrap();
    assert_eq!(stored.tags, tags(&["a", "b", "c"]));
    assert_eq!(stored.version, 3);
    assert_eq!(stored.sync_status, SyncStatus::Synced);

    let remote_snapshot = rig.remote.snapshot_of(&server_id).await.unwrap();
    assert_eq!(remote_snapshot.tags, tags(&["a", "b", "c"]));
}

#[tokio::test]
async fn test_disjoint_edits_park_for_manual() {
    let rig = rig().await;
    let mut note = synced_note(&rig, "Prose", "the cat sat", &[]).await;
    let server_id = note.server_id.clone().unwrap();

    rig.remote
        .race_write(&server_id, snapshot("Prose", "the dog sat", &[], "bob"))
        .await;

    note.content = "the cat slept".into();
    rig.db.stage_edit(&note).await.unwrap();

    let report = rig.coordinator.run_cycle().await.unwrap();
    assert_eq!(report.manual_conflicts, 1);

    let stored = rig.db.notes().find_by_id(&note.id).await.unwrap().unwrap();
    assert_eq!(stored.sync_status, SyncStatus::Conflicted);

    // Both snapshots are surfaced for human choice.
    let record = rig.resolver.conflict(&note.id).await.unwrap();
    assert_eq!(record.local.content, "the cat slept");
    assert_eq!(record.remote.content, "the dog sat");
    assert!(record.suggested.is_none());

    // Conflicted notes are excluded from automatic cycles.
    let report = rig.coordinator.run_cycle().await.unwrap();
    assert_eq!(report.attempted, 0);
}

#[tokio::test]
async fn test_manual_resolution_force_write() {
    let rig = rig().await;
    let mut note = synced_note(&rig, "Prose", "aaa", &[]).await;
    let server_id = note.server_id.clone().unwrap();

    let remote_version = rig
        .remote
        .race_write(&server_id, snapshot("Prose", "bbb", &[], "bob"))
        .await;

    note.content = "ccc".into();
    rig.db.stage_edit(&note).await.unwrap();
    rig.coordinator.run_cycle().await.unwrap();

    let committed = rig
        .resolver
        .resolve_manual(&note.id, ResolutionStrategy::Manual, Some("X".into()))
        .await
        .unwrap();

    // Strictly greater than both conflicting versions, content exactly "X".
    assert!(committed > note.base_version);
    assert!(committed > remote_version);
    assert_eq!(rig.remote.version_of(&server_id).await, Some(committed));
    assert_eq!(rig.remote.snapshot_of(&server_id).await.unwrap().content, "X");

    let stored = rig.db.notes().find_by_id(&note.id).await.unwrap().unwrap();
    assert_eq!(stored.content, "X");
    assert_eq!(stored.version, committed);
    assert_eq!(stored.base_version, committed);
    assert_eq!(stored.sync_status, SyncStatus::Synced);
    assert!(rig.resolver.conflict(&note.id).await.is_none());
}

#[tokio::test]
async fn test_keep_remote_resolution() {
    let rig = rig().await;
    let mut note = synced_note(&rig, "Prose", "mine", &[]).await;
    let server_id = note.server_id.clone().unwrap();

    rig.remote
        .race_write(&server_id, snapshot("Prose", "theirs", &[], "bob"))
        .await;

    note.content = "mine v2".into();
    rig.db.stage_edit(&note).await.unwrap();
    rig.coordinator.run_cycle().await.unwrap();

    rig.resolver
        .resolve_manual(&note.id, ResolutionStrategy::KeepRemote, None)
        .await
        .unwrap();

    let stored = rig.db.notes().find_by_id(&note.id).await.unwrap().unwrap();
    assert_eq!(stored.content, "theirs");
    assert_eq!(stored.sync_status, SyncStatus::Synced);
}

#[tokio::test]
async fn test_delete_conflict_keep_local_forces_delete() {
    let rig = rig().await;
    let note = synced_note(&rig, "Doomed", "body", &[]).await;
    let server_id = note.server_id.clone().unwrap();

    // Someone else edits while the delete is queued: losing either side
    // needs human judgment, so the conflict parks.
    rig.remote
        .race_write(&server_id, snapshot("Doomed", "body v2", &[], "bob"))
        .await;
    rig.db.stage_delete(&note.id).await.unwrap();

    let report = rig.coordinator.run_cycle().await.unwrap();
    assert_eq!(report.manual_conflicts, 1);
    assert_eq!(rig.remote.note_count().await, 1);

    // The operator sides with the delete.
    rig.resolver
        .resolve_manual(&note.id, ResolutionStrategy::KeepLocal, None)
        .await
        .unwrap();

    assert!(rig.db.notes().find_by_id(&note.id).await.unwrap().is_none());
    assert_eq!(rig.remote.note_count().await, 0);
}

// =============================================================================
// Failure Handling
// =============================================================================

#[tokio::test]
async fn test_transient_failures_escalate_after_max_attempts() {
    let mut config = SyncConfig::default();
    config.engine.max_attempts = 2;
    config.engine.retry_base_delay_secs = 0;
    config.engine.retry_max_delay_secs = 0;
    let rig = rig_with_config(config).await;

    let note = Note::new_local("Flaky", "body", tags(&[]), "alice", Utc::now());
    rig.db.stage_edit(&note).await.unwrap();

    rig.remote
        .inject_failures(RemoteError::Timeout(1), 2)
        .await;

    let report = rig.coordinator.run_cycle().await.unwrap();
    assert_eq!(report.transient_failures, 1);

    let stored = rig.db.notes().find_by_id(&note.id).await.unwrap().unwrap();
    assert_eq!(stored.sync_status, SyncStatus::PendingSync);
    assert!(stored.attention.is_none());

    let report = rig.coordinator.run_cycle().await.unwrap();
    assert_eq!(report.escalated, 1);

    let stored = rig.db.notes().find_by_id(&note.id).await.unwrap().unwrap();
    assert_eq!(stored.attention, Some(AttentionReason::RetriesExhausted));

    // Flagged notes are excluded until an operator steps in.
    let report = rig.coordinator.run_cycle().await.unwrap();
    assert_eq!(report.attempted, 0);

    // Operator clears the flag; the queued edit then goes through.
    rig.db.notes().set_attention(&note.id, None).await.unwrap();
    rig.db.operations().reset_attempts(&note.id).await.unwrap();

    let report = rig.coordinator.run_cycle().await.unwrap();
    assert_eq!(report.synced, 1);
}

#[tokio::test]
async fn test_backoff_window_delays_retry() {
    let rig = rig().await;

    let note = Note::new_local("Flaky", "body", tags(&[]), "alice", Utc::now());
    rig.db.stage_edit(&note).await.unwrap();

    rig.remote.inject_failure(RemoteError::Timeout(1)).await;

    let report = rig.coordinator.run_cycle().await.unwrap();
    assert_eq!(report.transient_failures, 1);
    assert_eq!(rig.remote.write_attempt_count(), 1);

    // Immediately re-running skips the operation: it sits inside its
    // 2s * 2^1 backoff window.
    let report = rig.coordinator.run_cycle().await.unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(rig.remote.write_attempt_count(), 1);

    // Rewind the recorded attempt far past the window; the next cycle
    // retries and succeeds.
    sqlx::query("UPDATE sync_operations SET attempted_at = ?1 WHERE note_id = ?2")
        .bind(Utc::now() - chrono::Duration::seconds(60))
        .bind(&note.id)
        .execute(rig.db.pool())
        .await
        .unwrap();

    let report = rig.coordinator.run_cycle().await.unwrap();
    assert_eq!(report.synced, 1);
}

#[tokio::test]
async fn test_diverged_base_version_quarantines() {
    let rig = rig().await;
    let mut note = synced_note(&rig, "Odd", "body", &[]).await;

    // Corrupt the local bookkeeping: a base version the remote never issued.
    note.base_version = 5;
    rig.db.notes().upsert(&note).await.unwrap();
    rig.db.stage_edit(&note).await.unwrap();

    let report = rig.coordinator.run_cycle().await.unwrap();
    assert_eq!(report.quarantined, 1);

    let stored = rig.db.notes().find_by_id(&note.id).await.unwrap().unwrap();
    assert_eq!(stored.attention, Some(AttentionReason::Quarantined));
    // Never auto-healed: the operation stays queued for inspection.
    assert!(rig
        .db
        .operations()
        .find_by_note(&note.id)
        .await
        .unwrap()
        .is_some());

    let report = rig.coordinator.run_cycle().await.unwrap();
    assert_eq!(report.attempted, 0);
}

#[tokio::test]
async fn test_permanent_rejection_drops_operation() {
    let rig = rig().await;

    let note = Note::new_local("Bad", "body", tags(&[]), "alice", Utc::now());
    rig.db.stage_edit(&note).await.unwrap();

    rig.remote
        .inject_failure(RemoteError::Rejected("schema mismatch".into()))
        .await;

    let report = rig.coordinator.run_cycle().await.unwrap();
    assert_eq!(report.dropped, 1);

    let stored = rig.db.notes().find_by_id(&note.id).await.unwrap().unwrap();
    assert_eq!(stored.sync_status, SyncStatus::Conflicted);
    assert_eq!(stored.attention, Some(AttentionReason::RemoteRejected));
    assert!(rig
        .db
        .operations()
        .find_by_note(&note.id)
        .await
        .unwrap()
        .is_none());
}

// =============================================================================
// Notifications
// =============================================================================

#[tokio::test]
async fn test_terminal_states_emit_change_notifications() {
    let rig = rig().await;
    let mut changes = rig.notifier.subscribe();

    let note = Note::new_local("Watched", "body", tags(&[]), "alice", Utc::now());
    rig.db.stage_edit(&note).await.unwrap();
    rig.coordinator.run_cycle().await.unwrap();

    let event = changes.recv().await.unwrap();
    assert_eq!(event.note_id, note.id);
    assert_eq!(event.version, 1);
    assert_eq!(event.sync_status, SyncStatus::Synced);
}

// =============================================================================
// Scheduler-Driven Scenarios (full engine)
// =============================================================================

/// Probe whose result the test flips at will.
struct ScriptedProbe {
    up: AtomicBool,
}

impl ScriptedProbe {
    fn new(up: bool) -> Arc<Self> {
        Arc::new(ScriptedProbe {
            up: AtomicBool::new(up),
        })
    }

    fn set(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectivityProbe for ScriptedProbe {
    async fn check(&self, _endpoint: &str, _timeout: Duration) -> bool {
        self.up.load(Ordering::SeqCst)
    }
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_triggers_priority_pass() {
    // A huge periodic interval proves the pass is reconnect-driven.
    let mut config = SyncConfig::default();
    config.engine.sync_interval_secs = 3600;
    config.network.probe_interval_secs = 1;

    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let remote = Arc::new(InMemoryRemoteStore::new());
    let probe = ScriptedProbe::new(false);

    let mut engine = SyncEngine::with_probe(
        config,
        db.clone(),
        remote.clone() as Arc<dyn RemoteStore>,
        probe.clone(),
    )
    .unwrap();

    // Three notes staged while offline.
    for i in 0..3 {
        let note = Note::new_local(format!("Note {i}"), "body", tags(&[]), "alice", Utc::now());
        db.stage_edit(&note).await.unwrap();
    }

    engine.start().unwrap();
    let handle = engine.handle().unwrap();

    // Offline: probe rounds pass, nothing is pushed.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(remote.write_attempt_count(), 0);

    // Connectivity appears; the priority pass drains the backlog well
    // before the periodic interval could.
    probe.set(true);

    let mut synced = false;
    for _ in 0..30 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        if handle.status().await.unwrap().pending_count == 0 {
            synced = true;
            break;
        }
    }

    assert!(synced, "priority pass never drained the backlog");
    assert_eq!(remote.note_count().await, 3);

    let status = handle.status().await.unwrap();
    assert!(status.is_online);
    assert!(status.last_cycle_at.is_some());

    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_engine_handle_clear_attention() {
    let mut config = SyncConfig::default();
    config.engine.max_attempts = 1;
    config.engine.retry_base_delay_secs = 0;
    config.engine.retry_max_delay_secs = 0;

    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let remote = Arc::new(InMemoryRemoteStore::new());
    let probe = ScriptedProbe::new(false);

    let mut engine = SyncEngine::with_probe(
        config,
        db.clone(),
        remote.clone() as Arc<dyn RemoteStore>,
        probe.clone(),
    )
    .unwrap();

    let note = Note::new_local("Flaky", "body", tags(&[]), "alice", Utc::now());
    db.stage_edit(&note).await.unwrap();

    engine.start().unwrap();
    let handle = engine.handle().unwrap();

    // One injected failure exhausts the single-attempt budget.
    remote.inject_failure(RemoteError::Unavailable("503".into())).await;
    handle.force_sync_now().await.unwrap();

    let mut flagged = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(200)).await;
        if handle.status().await.unwrap().attention_count == 1 {
            flagged = true;
            break;
        }
    }
    assert!(flagged, "note never escalated");

    // The operator releases the note; the next manual pass succeeds.
    handle.clear_attention(&note.id).await.unwrap();
    handle.force_sync_now().await.unwrap();

    let mut synced = false;
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let status = handle.status().await.unwrap();
        if status.pending_count == 0 && status.attention_count == 0 {
            synced = true;
            break;
        }
    }
    assert!(synced, "cleared note never synced");
    assert_eq!(remote.note_count().await, 1);

    engine.shutdown().await;
}
