//! # Sync Operation Repository
//!
//! Manages the outbound operation queue for offline-first synchronization.
//!
//! ## The Single-Operation-Per-Note Queue
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Operation Queue Invariants                             │
//! │                                                                         │
//! │  • At most ONE row per note (UNIQUE(note_id))                          │
//! │  • A new local mutation coalesces into the queued row:                 │
//! │                                                                         │
//! │      existing   + incoming  = queued                                   │
//! │      ─────────────────────────────────                                 │
//! │      (none)     + X         = X                                        │
//! │      Create     + Update    = Create   (remote never saw the note)     │
//! │      Create     + Delete    = (none)   (net effect is nothing)         │
//! │      Update     + Delete    = Delete                                   │
//! │      Delete     + Create    = Update   (delete never committed)        │
//! │                                                                         │
//! │  • The queued row keeps the EARLIEST base_version: staleness must be   │
//! │    judged against the version the first unsynced edit was based on     │
//! │  • Coalescing refreshes the payload and resets the retry budget        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use quill_core::{coalesce_kinds, CoalesceOutcome, Note, OperationKind, SyncOperation};

// =============================================================================
// Row Mapping
// =============================================================================

#[derive(Debug, FromRow)]
struct OperationRow {
    id: String,
    note_id: String,
    kind: String,
    base_version: i64,
    payload: String,
    attempt_count: i64,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    attempted_at: Option<DateTime<Utc>>,
}

impl OperationRow {
    fn into_operation(self) -> DbResult<SyncOperation> {
        let kind = OperationKind::from_str(&self.kind)
            .map_err(|e| DbError::corrupt("sync_operations", self.id.as_str(), e))?;

        let payload = serde_json::from_str(&self.payload)
            .map_err(|e| DbError::corrupt("sync_operations", self.id.as_str(), e))?;

        Ok(SyncOperation {
            id: self.id,
            note_id: self.note_id,
            kind,
            base_version: self.base_version,
            payload,
            attempt_count: self.attempt_count,
            last_error: self.last_error,
            created_at: self.created_at,
            attempted_at: self.attempted_at,
        })
    }
}

const OPERATION_COLUMNS: &str = "id, note_id, kind, base_version, payload, attempt_count, \
     last_error, created_at, attempted_at";

// =============================================================================
// Operation Repository
// =============================================================================

/// Repository for the outbound sync operation queue.
#[derive(Debug, Clone)]
pub struct OperationRepository {
    pool: SqlitePool,
}

impl OperationRepository {
    /// Creates a new OperationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OperationRepository { pool }
    }

    /// Queues a mutation for the note, coalescing into any existing queued
    /// operation. Returns the resulting operation, or None when the net
    /// effect cancelled out (Create followed by Delete).
    pub async fn enqueue(
        &self,
        note: &Note,
        incoming: OperationKind,
    ) -> DbResult<Option<SyncOperation>> {
        let mut conn = self.pool.acquire().await?;
        Self::enqueue_tx(&mut conn, note, incoming).await
    }

    /// Transaction-friendly variant of [`enqueue`](Self::enqueue).
    pub(crate) async fn enqueue_tx(
        conn: &mut SqliteConnection,
        note: &Note,
        incoming: OperationKind,
    ) -> DbResult<Option<SyncOperation>> {
        let existing = Self::find_by_note_tx(conn, &note.id).await?;

        let outcome = coalesce_kinds(existing.as_ref().map(|op| op.kind), incoming);

        let payload = note.snapshot();
        let payload_json = serde_json::to_string(&payload)
            .map_err(|e| DbError::corrupt("sync_operations", note.id.as_str(), e))?;

        match (outcome, existing) {
            (CoalesceOutcome::Drop, Some(op)) => {
                debug!(note_id = %note.id, "Mutation cancelled queued operation");
                sqlx::query("DELETE FROM sync_operations WHERE id = ?1")
                    .bind(&op.id)
                    .execute(&mut *conn)
                    .await?;
                Ok(None)
            }

            (CoalesceOutcome::Drop, None) => Ok(None),

            (CoalesceOutcome::Queue(kind), Some(mut op)) => {
                // Keep the original base_version and created_at; refresh the
                // payload and give the new content a fresh retry budget.
                sqlx::query(
                    r#"
                    UPDATE sync_operations SET
                        kind = ?2,
                        payload = ?3,
                        attempt_count = 0,
                        last_error = NULL,
                        attempted_at = NULL
                    WHERE id = ?1
                    "#,
                )
                .bind(&op.id)
                .bind(kind.as_str())
                .bind(&payload_json)
                .execute(&mut *conn)
                .await?;

                debug!(note_id = %note.id, kind = %kind, "Coalesced queued operation");

                op.kind = kind;
                op.payload = payload;
                op.attempt_count = 0;
                op.last_error = None;
                op.attempted_at = None;
                Ok(Some(op))
            }

            (CoalesceOutcome::Queue(kind), None) => {
                let op = SyncOperation {
                    id: Uuid::new_v4().to_string(),
                    note_id: note.id.clone(),
                    kind,
                    base_version: note.base_version,
                    payload,
                    attempt_count: 0,
                    last_error: None,
                    created_at: Utc::now(),
                    attempted_at: None,
                };

                sqlx::query(
                    r#"
                    INSERT INTO sync_operations (
                        id, note_id, kind, base_version, payload,
                        attempt_count, last_error, created_at, attempted_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    "#,
                )
                .bind(&op.id)
                .bind(&op.note_id)
                .bind(op.kind.as_str())
                .bind(op.base_version)
                .bind(&payload_json)
                .bind(op.attempt_count)
                .bind(&op.last_error)
                .bind(op.created_at)
                .bind(op.attempted_at)
                .execute(&mut *conn)
                .await?;

                debug!(note_id = %note.id, kind = %kind, "Queued operation");
                Ok(Some(op))
            }
        }
    }

    /// All queued operations, oldest first.
    pub async fn find_all_pending(&self) -> DbResult<Vec<SyncOperation>> {
        let rows = sqlx::query_as::<_, OperationRow>(&format!(
            "SELECT {OPERATION_COLUMNS} FROM sync_operations ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OperationRow::into_operation).collect()
    }

    /// The queued operation for a note, if any.
    pub async fn find_by_note(&self, note_id: &str) -> DbResult<Option<SyncOperation>> {
        let mut conn = self.pool.acquire().await?;
        Self::find_by_note_tx(&mut conn, note_id).await
    }

    async fn find_by_note_tx(
        conn: &mut SqliteConnection,
        note_id: &str,
    ) -> DbResult<Option<SyncOperation>> {
        let row = sqlx::query_as::<_, OperationRow>(&format!(
            "SELECT {OPERATION_COLUMNS} FROM sync_operations WHERE note_id = ?1"
        ))
        .bind(note_id)
        .fetch_optional(&mut *conn)
        .await?;

        row.map(OperationRow::into_operation).transpose()
    }

    /// Records a failed attempt. Returns the new attempt count.
    pub async fn record_attempt(&self, id: &str, error: &str) -> DbResult<i64> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE sync_operations SET
                attempt_count = attempt_count + 1,
                last_error = ?2,
                attempted_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let count: i64 =
            sqlx::query_scalar("SELECT attempt_count FROM sync_operations WHERE id = ?1")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Resets a note's retry bookkeeping, giving its queued operation a
    /// fresh budget (used when an operator clears an attention flag).
    pub async fn reset_attempts(&self, note_id: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE sync_operations SET
                attempt_count = 0,
                last_error = NULL,
                attempted_at = NULL
            WHERE note_id = ?1
            "#,
        )
        .bind(note_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Removes a completed operation from the queue.
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM sync_operations WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Counts queued operations.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_operations")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
