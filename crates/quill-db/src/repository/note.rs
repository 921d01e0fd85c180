//! # Note Repository
//!
//! Local store operations for notes.
//!
//! ## Key Operations
//! - Status-indexed queries (drive every sync cycle)
//! - Atomic status transitions (compare-and-set on `sync_status`)
//! - Recording committed remote versions
//!
//! ## Status Transitions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Note Status Lifecycle                              │
//! │                                                                         │
//! │               stage_edit                 push committed                 │
//! │   ┌────────┐ ───────────► ┌─────────────┐ ───────────► ┌────────┐      │
//! │   │ SYNCED │              │PENDING_SYNC │              │ SYNCED │      │
//! │   └────────┘ ◄─────────── └──────┬──────┘              └────────┘      │
//! │                                  │ version conflict,                    │
//! │                                  │ no auto-merge                        │
//! │                                  ▼                                      │
//! │                          ┌─────────────┐   manual resolution           │
//! │                          │ CONFLICTED  │ ───────────────────► SYNCED   │
//! │                          └─────────────┘                                │
//! │                                                                         │
//! │   Transitions are compare-and-set: `UPDATE … WHERE sync_status = from` │
//! │   so two racing writers can never both claim the same transition.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use quill_core::{AttentionReason, Note, OperationKind, SyncStatus};

// =============================================================================
// Row Mapping
// =============================================================================

/// Raw `notes` row as stored in SQLite. Enum and JSON columns are kept as
/// TEXT here and parsed into domain types in [`NoteRow::into_note`].
#[derive(Debug, FromRow)]
struct NoteRow {
    id: String,
    server_id: Option<String>,
    title: String,
    content: String,
    tags: String,
    version: i64,
    base_version: i64,
    last_editor: String,
    updated_at: DateTime<Utc>,
    sync_status: String,
    attention: Option<String>,
}

impl NoteRow {
    fn into_note(self) -> DbResult<Note> {
        let tags: BTreeSet<String> = serde_json::from_str(&self.tags)
            .map_err(|e| DbError::corrupt("notes", self.id.as_str(), e))?;

        let sync_status = SyncStatus::from_str(&self.sync_status)
            .map_err(|e| DbError::corrupt("notes", self.id.as_str(), e))?;

        let attention = self
            .attention
            .as_deref()
            .map(AttentionReason::from_str)
            .transpose()
            .map_err(|e| DbError::corrupt("notes", self.id.as_str(), e))?;

        Ok(Note {
            id: self.id,
            server_id: self.server_id,
            title: self.title,
            content: self.content,
            tags,
            version: self.version,
            base_version: self.base_version,
            last_editor: self.last_editor,
            updated_at: self.updated_at,
            sync_status,
            attention,
        })
    }
}

const NOTE_COLUMNS: &str = "id, server_id, title, content, tags, version, base_version, \
     last_editor, updated_at, sync_status, attention";

// =============================================================================
// Note Repository
// =============================================================================

/// Repository for note database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = NoteRepository::new(pool);
///
/// let pending = repo.find_pending().await?;
/// let note = repo.find_by_id("uuid-here").await?;
/// ```
#[derive(Debug, Clone)]
pub struct NoteRepository {
    pool: SqlitePool,
}

impl NoteRepository {
    /// Creates a new NoteRepository.
    pub fn new(pool: SqlitePool) -> Self {
        NoteRepository { pool }
    }

    /// Inserts or fully updates a note.
    ///
    /// Uses `ON CONFLICT DO UPDATE` rather than `INSERT OR REPLACE`: a
    /// replace would delete and re-insert the row, cascading away any queued
    /// sync operation for the note.
    pub async fn upsert(&self, note: &Note) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::upsert_tx(&mut conn, note).await
    }

    /// Transaction-friendly variant of [`upsert`](Self::upsert).
    pub(crate) async fn upsert_tx(conn: &mut SqliteConnection, note: &Note) -> DbResult<()> {
        let tags = serde_json::to_string(&note.tags)
            .map_err(|e| DbError::corrupt("notes", note.id.as_str(), e))?;

        sqlx::query(
            r#"
            INSERT INTO notes (
                id, server_id, title, content, tags, version, base_version,
                last_editor, updated_at, sync_status, attention
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT (id) DO UPDATE SET
                server_id = excluded.server_id,
                title = excluded.title,
                content = excluded.content,
                tags = excluded.tags,
                version = excluded.version,
                base_version = excluded.base_version,
                last_editor = excluded.last_editor,
                updated_at = excluded.updated_at,
                sync_status = excluded.sync_status,
                attention = excluded.attention
            "#,
        )
        .bind(&note.id)
        .bind(&note.server_id)
        .bind(&note.title)
        .bind(&note.content)
        .bind(tags)
        .bind(note.version)
        .bind(note.base_version)
        .bind(&note.last_editor)
        .bind(note.updated_at)
        .bind(note.sync_status.as_str())
        .bind(note.attention.map(|a| a.as_str()))
        .execute(&mut *conn)
        .await?;

        debug!(note_id = %note.id, status = %note.sync_status, "Upserted note");
        Ok(())
    }

    /// Fetches a note by its local id.
    pub async fn find_by_id(&self, id: &str) -> DbResult<Option<Note>> {
        let row = sqlx::query_as::<_, NoteRow>(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(NoteRow::into_note).transpose()
    }

    /// Fetches a note by its remote id.
    pub async fn find_by_server_id(&self, server_id: &str) -> DbResult<Option<Note>> {
        let row = sqlx::query_as::<_, NoteRow>(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE server_id = ?1"
        ))
        .bind(server_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(NoteRow::into_note).transpose()
    }

    /// Status-indexed query: all notes in the given state.
    pub async fn find_by_status(&self, status: SyncStatus) -> DbResult<Vec<Note>> {
        let rows = sqlx::query_as::<_, NoteRow>(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE sync_status = ?1 ORDER BY updated_at ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(NoteRow::into_note).collect()
    }

    /// All notes with outbound work that are eligible for an automatic
    /// cycle: pending status and no attention flag.
    pub async fn find_pending(&self) -> DbResult<Vec<Note>> {
        let rows = sqlx::query_as::<_, NoteRow>(&format!(
            "SELECT {NOTE_COLUMNS} FROM notes \
             WHERE sync_status IN ('pending_sync', 'pending_delete') \
             AND attention IS NULL \
             ORDER BY updated_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(NoteRow::into_note).collect()
    }

    /// Atomic status transition: succeeds only if the note is currently in
    /// `from`. Returns false when another writer got there first.
    pub async fn transition_status(
        &self,
        id: &str,
        from: SyncStatus,
        to: SyncStatus,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE notes SET sync_status = ?3 WHERE id = ?1 AND sync_status = ?2",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Marks a note as carrying outbound work of the given kind.
    pub async fn mark_pending(&self, id: &str, kind: OperationKind) -> DbResult<()> {
        let status = match kind {
            OperationKind::Delete => SyncStatus::PendingDelete,
            OperationKind::Create | OperationKind::Update => SyncStatus::PendingSync,
        };

        self.set_status(id, status).await
    }

    /// Unconditional status write (resolution paths own the note already).
    pub async fn set_status(&self, id: &str, to: SyncStatus) -> DbResult<()> {
        sqlx::query("UPDATE notes SET sync_status = ?2 WHERE id = ?1")
            .bind(id)
            .bind(to.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Records a committed remote write: the note now tracks the remote
    /// version it was just committed at.
    pub async fn apply_remote_commit(
        &self,
        id: &str,
        server_id: &str,
        version: i64,
        status: SyncStatus,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE notes SET
                server_id = ?2,
                version = ?3,
                base_version = ?3,
                sync_status = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(server_id)
        .bind(version)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        debug!(note_id = %id, version, "Recorded committed remote version");
        Ok(())
    }

    /// Flags or clears operator attention for a note.
    pub async fn set_attention(&self, id: &str, reason: Option<AttentionReason>) -> DbResult<()> {
        sqlx::query("UPDATE notes SET attention = ?2 WHERE id = ?1")
            .bind(id)
            .bind(reason.map(|r| r.as_str()))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Removes a note locally (after a committed remote delete).
    pub async fn delete(&self, id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM notes WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Counts notes in a given status.
    pub async fn count_by_status(&self, status: SyncStatus) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notes WHERE sync_status = ?1")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Counts notes with outbound work queued.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notes WHERE sync_status IN ('pending_sync', 'pending_delete')",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Counts notes flagged for operator attention.
    pub async fn count_needing_attention(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notes WHERE attention IS NOT NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }
}
