//! # Sync Scheduler
//!
//! Decides *when* a sync cycle runs. The coordinator decides what a cycle
//! does; this loop only sequences cycles.
//!
//! ## Triggers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Scheduler Event Loop                              │
//! │                                                                         │
//! │   periodic interval ──┐                                                 │
//! │   (default 30s,       │                                                 │
//! │    skipped offline)   │                                                 │
//! │                       ├──► one loop ──► run cycle INLINE ──► drain      │
//! │   NetworkEvent::Online│    (select!)    (single flight by    queued     │
//! │   (priority pass)  ───┤                 construction)        triggers   │
//! │                       │                                        │        │
//! │   force_sync_now() ───┘                                        ▼        │
//! │   (manual, operator)                         at most ONE immediate      │
//! │                                              re-run, then back to       │
//! │                                              waiting                    │
//! │                                                                         │
//! │  All triggers are messages consumed by this single loop; nothing       │
//! │  calls into scheduling internals directly. Because cycles run inline,  │
//! │  at most one cycle is ever in progress, and triggers that arrive       │
//! │  mid-cycle coalesce instead of queueing up indefinitely.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info};

use crate::config::SyncConfig;
use crate::coordinator::{CycleReport, SyncCoordinator};
use crate::error::{SyncError, SyncResult};
use crate::monitor::NetworkEvent;

// =============================================================================
// Triggers
// =============================================================================

/// What caused a sync cycle to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// The fixed-interval timer fired.
    Periodic,
    /// Connectivity transitioned down → up (priority pass).
    Reconnect,
    /// An external caller asked for a sync now.
    Manual,
}

impl SyncTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTrigger::Periodic => "periodic",
            SyncTrigger::Reconnect => "reconnect",
            SyncTrigger::Manual => "manual",
        }
    }
}

impl std::fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the most recent cycle, kept for the status surface.
#[derive(Debug, Clone)]
pub struct CycleSummary {
    /// What triggered the cycle.
    pub trigger: SyncTrigger,

    /// When the cycle finished.
    pub finished_at: DateTime<Utc>,

    /// What the cycle did.
    pub report: CycleReport,
}

// =============================================================================
// Scheduler Handle
// =============================================================================

/// Handle for triggering and stopping a running scheduler.
#[derive(Clone)]
pub struct SyncSchedulerHandle {
    trigger_tx: mpsc::Sender<SyncTrigger>,
    shutdown_tx: mpsc::Sender<()>,
    last_cycle: Arc<RwLock<Option<CycleSummary>>>,
}

impl SyncSchedulerHandle {
    /// Requests an immediate sync cycle, subject to the same single-flight
    /// guarantee as every other trigger.
    pub async fn force_sync_now(&self) -> SyncResult<()> {
        self.trigger_tx
            .send(SyncTrigger::Manual)
            .await
            .map_err(|_| SyncError::ShuttingDown)
    }

    /// The most recent cycle's summary, if any cycle has run.
    pub async fn last_cycle(&self) -> Option<CycleSummary> {
        self.last_cycle.read().await.clone()
    }

    /// When the most recent cycle finished, if any cycle has run.
    pub async fn last_cycle_at(&self) -> Option<DateTime<Utc>> {
        self.last_cycle.read().await.as_ref().map(|s| s.finished_at)
    }

    /// Triggers graceful shutdown. An in-flight cycle finishes first.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

// =============================================================================
// Sync Scheduler
// =============================================================================

/// Single-loop scheduler driving the coordinator.
pub struct SyncScheduler {
    coordinator: SyncCoordinator,
    config: Arc<SyncConfig>,

    /// Connectivity transitions from the network monitor.
    network_rx: mpsc::Receiver<NetworkEvent>,

    /// Manual triggers from handles.
    trigger_rx: mpsc::Receiver<SyncTrigger>,

    shutdown_rx: mpsc::Receiver<()>,

    /// Shared with handles for the status surface.
    last_cycle: Arc<RwLock<Option<CycleSummary>>>,

    /// Last connectivity classification seen on the event channel. Periodic
    /// passes are skipped while offline; manual passes run regardless.
    online: bool,
}

impl SyncScheduler {
    /// Creates a scheduler consuming the given network event channel and
    /// spawns its loop. Returns the control handle.
    pub fn spawn(
        coordinator: SyncCoordinator,
        config: Arc<SyncConfig>,
        network_rx: mpsc::Receiver<NetworkEvent>,
    ) -> SyncSchedulerHandle {
        let (trigger_tx, trigger_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let last_cycle = Arc::new(RwLock::new(None));

        let scheduler = SyncScheduler {
            coordinator,
            config,
            network_rx,
            trigger_rx,
            shutdown_rx,
            last_cycle: last_cycle.clone(),
            online: false,
        };

        tokio::spawn(scheduler.run());

        SyncSchedulerHandle {
            trigger_tx,
            shutdown_tx,
            last_cycle,
        }
    }

    /// Main scheduler loop.
    async fn run(mut self) {
        info!(interval = ?self.config.sync_interval(), "Sync scheduler starting");

        let mut interval = tokio::time::interval(self.config.sync_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The interval's immediate first tick would race the monitor's
        // startup classification; the reconnect event covers startup sync.
        interval.tick().await;

        loop {
            let trigger = tokio::select! {
                _ = interval.tick() => {
                    if !self.online {
                        debug!("Offline, skipping periodic pass");
                        continue;
                    }
                    SyncTrigger::Periodic
                }

                Some(event) = self.network_rx.recv() => match event {
                    NetworkEvent::Online => {
                        info!("Connectivity restored, running priority pass");
                        self.online = true;
                        SyncTrigger::Reconnect
                    }
                    NetworkEvent::Offline => {
                        info!("Connectivity lost, periodic passes paused");
                        self.online = false;
                        continue;
                    }
                },

                Some(trigger) = self.trigger_rx.recv() => trigger,

                _ = self.shutdown_rx.recv() => {
                    info!("Sync scheduler received shutdown");
                    break;
                }
            };

            self.run_cycle(trigger).await;

            // Triggers that arrived mid-cycle coalesce into at most one
            // immediate re-run.
            while let Some(trigger) = self.drain_queued_triggers() {
                self.run_cycle(trigger).await;
            }
        }

        info!("Sync scheduler stopped");
    }

    /// Runs one cycle inline and records its summary.
    async fn run_cycle(&self, trigger: SyncTrigger) {
        debug!(%trigger, "Sync cycle triggered");

        match self.coordinator.run_cycle().await {
            Ok(report) => {
                let summary = CycleSummary {
                    trigger,
                    finished_at: Utc::now(),
                    report,
                };
                *self.last_cycle.write().await = Some(summary);
            }
            Err(e) => {
                error!(?e, %trigger, "Sync cycle failed");
            }
        }
    }

    /// Empties both trigger channels without blocking. Returns the trigger
    /// for a single coalesced re-run, reconnects taking precedence.
    fn drain_queued_triggers(&mut self) -> Option<SyncTrigger> {
        let mut rerun = None;

        while let Ok(event) = self.network_rx.try_recv() {
            match event {
                NetworkEvent::Online => {
                    self.online = true;
                    rerun = Some(SyncTrigger::Reconnect);
                }
                NetworkEvent::Offline => self.online = false,
            }
        }

        while let Ok(trigger) = self.trigger_rx.try_recv() {
            if rerun.is_none() {
                rerun = Some(trigger);
            }
        }

        rerun
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use quill_core::{Note, SyncStatus};
    use quill_db::{Database, DbConfig};

    use crate::memory::InMemoryRemoteStore;
    use crate::notify::ChangeNotifier;
    use crate::resolver::ConflictResolver;

    async fn test_rig() -> (
        SyncCoordinator,
        Arc<InMemoryRemoteStore>,
        Database,
        Arc<SyncConfig>,
    ) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let remote = Arc::new(InMemoryRemoteStore::new());
        let config = Arc::new(SyncConfig::default());
        let notifier = ChangeNotifier::default();
        let resolver = Arc::new(ConflictResolver::new(
            db.clone(),
            remote.clone() as Arc<dyn crate::remote::RemoteStore>,
            notifier.clone(),
            config.clone(),
        ));
        let coordinator = SyncCoordinator::new(
            db.clone(),
            remote.clone() as Arc<dyn crate::remote::RemoteStore>,
            resolver,
            notifier,
            config.clone(),
        );

        (coordinator, remote, db, config)
    }

    async fn wait_until_synced(db: &Database, note_id: &str) {
        for _ in 0..200 {
            if let Some(note) = db.notes().find_by_id(note_id).await.unwrap() {
                if note.sync_status == SyncStatus::Synced {
                    return;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        panic!("note {note_id} never reached Synced");
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_trigger_runs_a_cycle() {
        let (coordinator, _remote, db, config) = test_rig().await;

        let note = Note::new_local("Title", "Body", BTreeSet::new(), "alice", Utc::now());
        db.stage_edit(&note).await.unwrap();

        let (_network_tx, network_rx) = mpsc::channel(4);
        let handle = SyncScheduler::spawn(coordinator, config, network_rx);

        handle.force_sync_now().await.unwrap();
        wait_until_synced(&db, &note.id).await;

        let summary = handle.last_cycle().await.unwrap();
        assert_eq!(summary.trigger, SyncTrigger::Manual);
        assert_eq!(summary.report.synced, 1);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_online_event_runs_priority_pass() {
        let (coordinator, _remote, db, config) = test_rig().await;

        let note = Note::new_local("Title", "Body", BTreeSet::new(), "alice", Utc::now());
        db.stage_edit(&note).await.unwrap();

        let (network_tx, network_rx) = mpsc::channel(4);
        let handle = SyncScheduler::spawn(coordinator, config, network_rx);

        network_tx.send(NetworkEvent::Online).await.unwrap();
        wait_until_synced(&db, &note.id).await;

        let summary = handle.last_cycle().await.unwrap();
        assert_eq!(summary.trigger, SyncTrigger::Reconnect);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_pass_skipped_while_offline() {
        let (coordinator, remote, db, config) = test_rig().await;

        let note = Note::new_local("Title", "Body", BTreeSet::new(), "alice", Utc::now());
        db.stage_edit(&note).await.unwrap();

        let (_network_tx, network_rx) = mpsc::channel(4);
        let handle = SyncScheduler::spawn(coordinator, config, network_rx);

        // Several periodic intervals elapse with no connectivity: the note
        // must stay pending and the remote must see nothing.
        tokio::time::sleep(std::time::Duration::from_secs(120)).await;

        let stored = db.notes().find_by_id(&note.id).await.unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::PendingSync);
        assert_eq!(remote.write_attempt_count(), 0);
        assert!(handle.last_cycle().await.is_none());

        handle.shutdown().await;
    }

    #[test]
    fn test_trigger_display() {
        assert_eq!(SyncTrigger::Periodic.to_string(), "periodic");
        assert_eq!(SyncTrigger::Reconnect.to_string(), "reconnect");
        assert_eq!(SyncTrigger::Manual.to_string(), "manual");
    }
}
