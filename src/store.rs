//! SQLite persistence for sessions and orchestrator settings.
//!
//! The store is the source of truth for crash recovery: every state
//! transition is written before the orchestrator acts on it, and the
//! `paused` flag lives here so a restart cannot forget an engaged brake.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::warn;

use crate::models::{Session, SessionState};

/// Settings key for the durable pause flag.
pub const SETTING_PAUSED: &str = "paused";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    issue_number INTEGER NOT NULL,
    issue_title TEXT NOT NULL,
    repo TEXT NOT NULL,
    state TEXT NOT NULL,
    pr_number INTEGER,
    pr_url TEXT,
    merge_attempts INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_repo_state ON sessions(repo, state);
CREATE INDEX IF NOT EXISTS idx_sessions_issue_repo ON sessions(issue_number, repo);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open session database at {}", path.display()))?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .context("failed to initialize schema")?;
        // A fresh database starts paused: automation only runs once a human
        // has explicitly resumed it.
        self.conn
            .execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, 'true', ?2)
                 ON CONFLICT(key) DO NOTHING",
                params![SETTING_PAUSED, now()],
            )
            .context("failed to seed pause flag")?;
        Ok(())
    }

    /// Insert a session or refresh the state of an existing one. Issue
    /// metadata and the retry counter are left untouched on conflict, and
    /// terminal rows are immutable here just as in `update_session_state`.
    pub fn upsert_session(
        &self,
        id: &str,
        issue_number: i64,
        issue_title: &str,
        repo: &str,
        state: &SessionState,
    ) -> Result<Session> {
        if let Some(current) = self.get_session(id)? {
            if current.state.is_terminal() {
                warn!(
                    session = id,
                    current = %current.state,
                    requested = %state,
                    "refusing state change on terminal session"
                );
                return Ok(current);
            }
        }
        let ts = now();
        self.conn
            .execute(
                "INSERT INTO sessions (id, issue_number, issue_title, repo, state, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(id) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at",
                params![id, issue_number, issue_title, repo, state.as_str(), ts],
            )
            .context("failed to upsert session")?;
        self.get_session(id)?
            .context("session missing immediately after upsert")
    }

    pub fn get_session(&self, id: &str) -> Result<Option<Session>> {
        self.conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![id],
                row_to_session,
            )
            .optional()
            .context("failed to query session")
    }

    /// Most recent session for an issue, any state. Used to decide whether
    /// an issue is already handled and whether a session can be resumed.
    pub fn get_session_by_issue(&self, issue_number: i64, repo: &str) -> Result<Option<Session>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE issue_number = ?1 AND repo = ?2
                     ORDER BY created_at DESC LIMIT 1"
                ),
                params![issue_number, repo],
                row_to_session,
            )
            .optional()
            .context("failed to query session by issue")
    }

    /// All non-terminal sessions for a repo, oldest first.
    pub fn list_active_sessions(&self, repo: &str) -> Result<Vec<Session>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions
             WHERE repo = ?1 AND state NOT IN ('MERGED', 'FAILED')
             ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map(params![repo], row_to_session)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("failed to list active sessions")
    }

    pub fn list_recent_sessions(&self, limit: usize) -> Result<Vec<Session>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY created_at DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], row_to_session)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("failed to list recent sessions")
    }

    /// Persist a state change. Terminal sessions are immutable: a write
    /// against one is refused and the stored row returned unchanged.
    pub fn update_session_state(&self, id: &str, state: &SessionState) -> Result<Session> {
        let current = self
            .get_session(id)?
            .with_context(|| format!("session {id} not found for state update"))?;
        if current.state.is_terminal() {
            warn!(
                session = id,
                current = %current.state,
                requested = %state,
                "refusing state change on terminal session"
            );
            return Ok(current);
        }
        self.conn
            .execute(
                "UPDATE sessions SET state = ?1, updated_at = ?2 WHERE id = ?3",
                params![state.as_str(), now(), id],
            )
            .context("failed to update session state")?;
        self.get_session(id)?
            .context("session missing immediately after state update")
    }

    /// Link a PR to a session. Returns `true` only the first time this PR
    /// number is attached, so callers can gate one-shot notifications.
    pub fn update_session_pr(&self, id: &str, pr_number: i64, pr_url: &str) -> Result<bool> {
        let current = self
            .get_session(id)?
            .with_context(|| format!("session {id} not found for PR update"))?;
        if current.pr_number == Some(pr_number) {
            return Ok(false);
        }
        self.conn
            .execute(
                "UPDATE sessions SET pr_number = ?1, pr_url = ?2, updated_at = ?3 WHERE id = ?4",
                params![pr_number, pr_url, now(), id],
            )
            .context("failed to link pull request")?;
        Ok(true)
    }

    /// Bump the durable finalize-failure counter and return the new value.
    pub fn increment_merge_attempts(&self, id: &str) -> Result<i64> {
        self.conn
            .execute(
                "UPDATE sessions SET merge_attempts = merge_attempts + 1, updated_at = ?1 WHERE id = ?2",
                params![now(), id],
            )
            .context("failed to increment merge attempts")?;
        self.conn
            .query_row(
                "SELECT merge_attempts FROM sessions WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .with_context(|| format!("session {id} not found for attempt count"))
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("failed to read setting")
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now()],
            )
            .context("failed to write setting")?;
        Ok(())
    }

    /// Remove a transient flag. Missing keys are fine.
    pub fn delete_setting(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM settings WHERE key = ?1", params![key])
            .context("failed to delete setting")?;
        Ok(())
    }

    pub fn is_paused(&self) -> Result<bool> {
        Ok(self
            .get_setting(SETTING_PAUSED)?
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false))
    }

    pub fn set_paused(&self, paused: bool) -> Result<()> {
        self.set_setting(SETTING_PAUSED, if paused { "true" } else { "false" })
    }
}

const SESSION_COLUMNS: &str =
    "id, issue_number, issue_title, repo, state, pr_number, pr_url, merge_attempts, created_at, updated_at";

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    let state: String = row.get(4)?;
    Ok(Session {
        id: row.get(0)?,
        issue_number: row.get(1)?,
        issue_title: row.get(2)?,
        repo: row.get(3)?,
        state: SessionState::parse(&state),
        pr_number: row.get(5)?,
        pr_url: row.get(6)?,
        merge_attempts: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn now() -> String {
    Utc::now().to_rfc3339()
}
