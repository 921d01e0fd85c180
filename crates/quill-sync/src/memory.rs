//! # In-Memory Remote Store
//!
//! A complete in-process implementation of [`RemoteStore`] holding the
//! authoritative version counter with compare-and-swap semantics.
//!
//! This is the reference implementation of the remote contract and the
//! backing store for the engine's integration tests: it counts write
//! attempts (for idempotence and single-flight assertions) and supports
//! scripted failure injection (for retry/backoff and escalation paths).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::debug;

use quill_core::NoteSnapshot;

use crate::remote::{RemoteCommit, RemoteError, RemoteNote, RemoteStore};

// =============================================================================
// Store State
// =============================================================================

#[derive(Debug, Clone)]
struct StoredNote {
    version: i64,
    snapshot: NoteSnapshot,
}

#[derive(Default)]
struct StoreState {
    notes: HashMap<String, StoredNote>,
    /// Outcomes to inject before real processing, oldest first.
    injected_failures: VecDeque<RemoteError>,
    next_id: u64,
}

// =============================================================================
// In-Memory Remote Store
// =============================================================================

/// In-memory [`RemoteStore`] with CAS semantics and test instrumentation.
#[derive(Default)]
pub struct InMemoryRemoteStore {
    state: Mutex<StoreState>,
    /// Total mutating calls (create/write/delete/force variants) attempted.
    write_attempts: AtomicU64,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an error to be returned by the next remote call (FIFO).
    pub async fn inject_failure(&self, error: RemoteError) {
        self.state.lock().await.injected_failures.push_back(error);
    }

    /// Queues `count` copies of an error.
    pub async fn inject_failures(&self, error: RemoteError, count: usize) {
        let mut state = self.state.lock().await;
        for _ in 0..count {
            state.injected_failures.push_back(error.clone());
        }
    }

    /// Number of mutating calls attempted so far (including failed ones).
    pub fn write_attempt_count(&self) -> u64 {
        self.write_attempts.load(Ordering::SeqCst)
    }

    /// Current remote version of a note, if it exists.
    pub async fn version_of(&self, server_id: &str) -> Option<i64> {
        self.state
            .lock()
            .await
            .notes
            .get(server_id)
            .map(|n| n.version)
    }

    /// Current remote snapshot of a note, if it exists.
    pub async fn snapshot_of(&self, server_id: &str) -> Option<NoteSnapshot> {
        self.state
            .lock()
            .await
            .notes
            .get(server_id)
            .map(|n| n.snapshot.clone())
    }

    /// Number of notes stored remotely.
    pub async fn note_count(&self) -> usize {
        self.state.lock().await.notes.len()
    }

    /// Seeds a note directly, simulating another editor's committed write.
    /// Returns the new version.
    pub async fn seed(&self, server_id: &str, snapshot: NoteSnapshot, version: i64) -> i64 {
        let mut state = self.state.lock().await;
        state
            .notes
            .insert(server_id.to_string(), StoredNote { version, snapshot });
        version
    }

    /// Commits a racing write on top of the current version, simulating a
    /// concurrent editor. Returns the new version.
    pub async fn race_write(&self, server_id: &str, snapshot: NoteSnapshot) -> i64 {
        let mut state = self.state.lock().await;
        let entry = state
            .notes
            .get_mut(server_id)
            .expect("race_write target must exist");
        entry.version += 1;
        entry.snapshot = snapshot;
        entry.version
    }

    fn take_injected(state: &mut StoreState) -> Option<RemoteError> {
        state.injected_failures.pop_front()
    }
}

#[async_trait::async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn create(&self, snapshot: &NoteSnapshot) -> Result<RemoteCommit, RemoteError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;

        if let Some(err) = Self::take_injected(&mut state) {
            return Err(err);
        }

        state.next_id += 1;
        let server_id = format!("srv-{}", state.next_id);

        state.notes.insert(
            server_id.clone(),
            StoredNote {
                version: 1,
                snapshot: snapshot.clone(),
            },
        );

        debug!(server_id = %server_id, "Remote create committed");
        Ok(RemoteCommit {
            server_id,
            version: 1,
        })
    }

    async fn write(
        &self,
        server_id: &str,
        snapshot: &NoteSnapshot,
        base_version: i64,
    ) -> Result<RemoteCommit, RemoteError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;

        if let Some(err) = Self::take_injected(&mut state) {
            return Err(err);
        }

        let stored = state.notes.get_mut(server_id).ok_or(RemoteError::NotFound)?;

        if stored.version != base_version {
            return Err(RemoteError::Conflict {
                current_version: stored.version,
                current: stored.snapshot.clone(),
            });
        }

        stored.version += 1;
        stored.snapshot = snapshot.clone();

        debug!(server_id = %server_id, version = stored.version, "Remote write committed");
        Ok(RemoteCommit {
            server_id: server_id.to_string(),
            version: stored.version,
        })
    }

    async fn delete(&self, server_id: &str, base_version: i64) -> Result<(), RemoteError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;

        if let Some(err) = Self::take_injected(&mut state) {
            return Err(err);
        }

        let stored = state.notes.get(server_id).ok_or(RemoteError::NotFound)?;

        if stored.version != base_version {
            return Err(RemoteError::Conflict {
                current_version: stored.version,
                current: stored.snapshot.clone(),
            });
        }

        state.notes.remove(server_id);
        debug!(server_id = %server_id, "Remote delete committed");
        Ok(())
    }

    async fn fetch(&self, server_id: &str) -> Result<Option<RemoteNote>, RemoteError> {
        let mut state = self.state.lock().await;

        if let Some(err) = Self::take_injected(&mut state) {
            return Err(err);
        }

        Ok(state.notes.get(server_id).map(|stored| RemoteNote {
            server_id: server_id.to_string(),
            version: stored.version,
            snapshot: stored.snapshot.clone(),
        }))
    }

    async fn force_write(
        &self,
        server_id: &str,
        snapshot: &NoteSnapshot,
        floor_version: i64,
    ) -> Result<RemoteCommit, RemoteError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;

        if let Some(err) = Self::take_injected(&mut state) {
            return Err(err);
        }

        let stored_version = state.notes.get(server_id).map(|n| n.version).unwrap_or(0);
        let version = stored_version.max(floor_version) + 1;

        state.notes.insert(
            server_id.to_string(),
            StoredNote {
                version,
                snapshot: snapshot.clone(),
            },
        );

        debug!(server_id = %server_id, version, "Remote force write committed");
        Ok(RemoteCommit {
            server_id: server_id.to_string(),
            version,
        })
    }

    async fn force_delete(&self, server_id: &str) -> Result<(), RemoteError> {
        self.write_attempts.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().await;

        if let Some(err) = Self::take_injected(&mut state) {
            return Err(err);
        }

        state.notes.remove(server_id);
        debug!(server_id = %server_id, "Remote force delete committed");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn snapshot(content: &str) -> NoteSnapshot {
        NoteSnapshot {
            title: "t".into(),
            content: content.into(),
            tags: BTreeSet::new(),
            last_editor: "alice".into(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_starts_at_version_one() {
        let store = InMemoryRemoteStore::new();
        let commit = store.create(&snapshot("a")).await.unwrap();

        assert_eq!(commit.version, 1);
        assert_eq!(store.version_of(&commit.server_id).await, Some(1));
    }

    #[tokio::test]
    async fn test_cas_write_accepts_matching_base() {
        let store = InMemoryRemoteStore::new();
        let commit = store.create(&snapshot("a")).await.unwrap();

        let commit2 = store
            .write(&commit.server_id, &snapshot("b"), 1)
            .await
            .unwrap();
        assert_eq!(commit2.version, 2);
    }

    #[tokio::test]
    async fn test_cas_write_rejects_stale_base() {
        let store = InMemoryRemoteStore::new();
        let commit = store.create(&snapshot("a")).await.unwrap();
        store
            .write(&commit.server_id, &snapshot("b"), 1)
            .await
            .unwrap();

        let err = store
            .write(&commit.server_id, &snapshot("c"), 1)
            .await
            .unwrap_err();
        match err {
            RemoteError::Conflict {
                current_version,
                current,
            } => {
                assert_eq!(current_version, 2);
                assert_eq!(current.content, "b");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_force_write_bumps_past_floor() {
        let store = InMemoryRemoteStore::new();
        let commit = store.create(&snapshot("a")).await.unwrap();

        let forced = store
            .force_write(&commit.server_id, &snapshot("final"), 7)
            .await
            .unwrap();
        assert!(forced.version > 7);
        assert!(forced.version > 1);
    }

    #[tokio::test]
    async fn test_injected_failures_drain_in_order() {
        let store = InMemoryRemoteStore::new();
        store.inject_failure(RemoteError::Timeout(5)).await;

        let err = store.create(&snapshot("a")).await.unwrap_err();
        assert!(matches!(err, RemoteError::Timeout(5)));

        // Next call goes through.
        assert!(store.create(&snapshot("a")).await.is_ok());
    }

    #[tokio::test]
    async fn test_write_attempts_counted() {
        let store = InMemoryRemoteStore::new();
        let commit = store.create(&snapshot("a")).await.unwrap();
        let _ = store.write(&commit.server_id, &snapshot("b"), 1).await;
        let _ = store.fetch(&commit.server_id).await;

        // fetch is not a write
        assert_eq!(store.write_attempt_count(), 2);
    }
}
