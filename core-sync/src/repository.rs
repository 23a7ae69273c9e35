//! # Sync Session Repository
//!
//! Database persistence for sync sessions and their resource links.
//!
//! ## Overview
//!
//! - Creating sessions and attaching job handles
//! - Advancing the version cursor (never backwards)
//! - Recording and querying local-resource / remote-key links
//! - "First duplicate wins" resolution for already-linked keys

use crate::{Result, SyncError, SyncLink, SyncSession};
use async_trait::async_trait;
use bridge_traits::JobHandle;
use sqlx::{FromRow, SqlitePool};
use std::collections::HashMap;

// ============================================================================
// Repository Trait
// ============================================================================

/// Repository trait for sync session persistence
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a new session, returning it with its storage-assigned id
    async fn create(&self, name: &str, url: &str, version: i64) -> Result<SyncSession>;

    /// Find a session by id
    async fn find_by_id(&self, id: i64) -> Result<Option<SyncSession>>;

    /// Attach the sync job handle to a session
    async fn set_job(&self, id: i64, handle: &JobHandle) -> Result<()>;

    /// Attach the undo job handle to a session
    async fn set_undo_job(&self, id: i64, handle: &JobHandle) -> Result<()>;

    /// Persist a new version cursor. The cursor is monotonically
    /// non-decreasing: a value lower than the stored one is ignored.
    async fn advance_version(&self, id: i64, version: i64) -> Result<()>;

    /// Record a batch of (resource id, remote key) links for a session
    async fn insert_links(&self, session_id: i64, links: &[(i64, String)]) -> Result<()>;

    /// All links of one session, in insertion order
    async fn links_for_session(&self, session_id: i64) -> Result<Vec<SyncLink>>;

    /// Resolve already-linked local resources for remote keys, across all
    /// sessions. At most one resource id per key is returned; ties are
    /// broken by lowest link-row id (earliest created).
    async fn existing_links(&self, keys: &[String]) -> Result<HashMap<String, i64>>;

    /// Resolve already-linked remote keys for local resources, across all
    /// sessions. At most one key per resource id, lowest link-row id wins.
    async fn existing_keys_for_resources(&self, ids: &[i64]) -> Result<HashMap<i64, String>>;

    /// Delete one link row
    async fn delete_link(&self, link_id: i64) -> Result<()>;

    /// Delete a session and, by cascade, its links
    async fn delete_session(&self, id: i64) -> Result<()>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of SessionRepository
pub struct SqliteSessionRepository {
    pool: SqlitePool,
}

impl SqliteSessionRepository {
    /// Create a new SQLite session repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a sync session
#[derive(Debug, FromRow)]
struct SessionRow {
    id: i64,
    job_id: Option<String>,
    undo_job_id: Option<String>,
    name: String,
    url: String,
    version: i64,
}

impl From<SessionRow> for SyncSession {
    fn from(row: SessionRow) -> Self {
        SyncSession {
            id: row.id,
            job_id: row.job_id.map(JobHandle),
            undo_job_id: row.undo_job_id.map(JobHandle),
            name: row.name,
            url: row.url,
            version: row.version,
        }
    }
}

/// Database row representation of a sync link
#[derive(Debug, FromRow)]
struct LinkRow {
    id: i64,
    session_id: i64,
    resource_id: i64,
    remote_key: String,
}

impl From<LinkRow> for SyncLink {
    fn from(row: LinkRow) -> Self {
        SyncLink {
            id: row.id,
            session_id: row.session_id,
            resource_id: row.resource_id,
            remote_key: row.remote_key,
        }
    }
}

/// `?, ?, ...` for a dynamically sized `IN` list.
fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[async_trait]
impl SessionRepository for SqliteSessionRepository {
    async fn create(&self, name: &str, url: &str, version: i64) -> Result<SyncSession> {
        let result = sqlx::query(
            r#"
            INSERT INTO sync_sessions (name, url, version)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(url)
        .bind(version)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(SyncSession {
            id: result.last_insert_rowid(),
            job_id: None,
            undo_job_id: None,
            name: name.to_string(),
            url: url.to_string(),
            version,
        })
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<SyncSession>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, job_id, undo_job_id, name, url, version
            FROM sync_sessions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(row.map(SyncSession::from))
    }

    async fn set_job(&self, id: i64, handle: &JobHandle) -> Result<()> {
        let result = sqlx::query("UPDATE sync_sessions SET job_id = ? WHERE id = ?")
            .bind(handle.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(SyncError::SessionNotFound { session_id: id });
        }
        Ok(())
    }

    async fn set_undo_job(&self, id: i64, handle: &JobHandle) -> Result<()> {
        let result = sqlx::query("UPDATE sync_sessions SET undo_job_id = ? WHERE id = ?")
            .bind(handle.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(SyncError::SessionNotFound { session_id: id });
        }
        Ok(())
    }

    async fn advance_version(&self, id: i64, version: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_sessions SET version = ?
            WHERE id = ? AND version <= ?
            "#,
        )
        .bind(version)
        .bind(id)
        .bind(version)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            // Either the session is missing or the stored cursor is already
            // further along; only the former is an error.
            if self.find_by_id(id).await?.is_none() {
                return Err(SyncError::SessionNotFound { session_id: id });
            }
        }
        Ok(())
    }

    async fn insert_links(&self, session_id: i64, links: &[(i64, String)]) -> Result<()> {
        if links.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        for (resource_id, remote_key) in links {
            sqlx::query(
                r#"
                INSERT INTO sync_links (session_id, resource_id, remote_key)
                VALUES (?, ?, ?)
                "#,
            )
            .bind(session_id)
            .bind(resource_id)
            .bind(remote_key)
            .execute(&mut *tx)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;
        Ok(())
    }

    async fn links_for_session(&self, session_id: i64) -> Result<Vec<SyncLink>> {
        let rows = sqlx::query_as::<_, LinkRow>(
            r#"
            SELECT id, session_id, resource_id, remote_key
            FROM sync_links
            WHERE session_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(SyncLink::from).collect())
    }

    async fn existing_links(&self, keys: &[String]) -> Result<HashMap<String, i64>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            r#"
            SELECT id, session_id, resource_id, remote_key
            FROM sync_links
            WHERE id IN (
                SELECT MIN(id) FROM sync_links
                WHERE remote_key IN ({})
                GROUP BY remote_key
            )
            "#,
            placeholders(keys.len())
        );

        let mut query = sqlx::query_as::<_, LinkRow>(&sql);
        for key in keys {
            query = query.bind(key);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| (row.remote_key, row.resource_id))
            .collect())
    }

    async fn existing_keys_for_resources(&self, ids: &[i64]) -> Result<HashMap<i64, String>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            r#"
            SELECT id, session_id, resource_id, remote_key
            FROM sync_links
            WHERE id IN (
                SELECT MIN(id) FROM sync_links
                WHERE resource_id IN ({})
                GROUP BY resource_id
            )
            "#,
            placeholders(ids.len())
        );

        let mut query = sqlx::query_as::<_, LinkRow>(&sql);
        for id in ids {
            query = query.bind(id);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| (row.resource_id, row.remote_key))
            .collect())
    }

    async fn delete_link(&self, link_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM sync_links WHERE id = ?")
            .bind(link_id)
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;
        Ok(())
    }

    async fn delete_session(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM sync_sessions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(SyncError::SessionNotFound { session_id: id });
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
