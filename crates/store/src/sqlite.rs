//! SQLite session store.
//!
//! Uses a single SQLite database file with three tables:
//! - `sessions`: one row per conversation with its escalation state
//! - `turns`: the append-only transcript, `UNIQUE(session_id, seq)`
//! - `tickets`: escalation tickets; a partial unique index allows at most
//!   one unresolved ticket per session

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use supportline_core::decision::EscalationReason;
use supportline_core::error::StoreError;
use supportline_core::session::{
    EscalationStatus, Resolution, Session, SessionId, SessionOverview, Speaker, Summary, Ticket,
    TicketId, TicketStatus, Turn,
};
use supportline_core::store::{Escalation, SessionStore};
use tracing::{debug, info};

/// A durable session store backed by SQLite.
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Open (or create) the database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // Every connection to an in-memory database sees its own empty database
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite session store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id          TEXT PRIMARY KEY NOT NULL,
                escalation  TEXT NOT NULL DEFAULT 'none',
                ticket_id   INTEGER,
                summary     TEXT,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("sessions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS turns (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id  TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                seq         INTEGER NOT NULL,
                speaker     TEXT NOT NULL,
                text        TEXT NOT NULL,
                resolution  TEXT,
                timestamp   TEXT NOT NULL,
                UNIQUE(session_id, seq)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("turns table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tickets (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id  TEXT NOT NULL,
                status      TEXT NOT NULL,
                reason      TEXT NOT NULL,
                summary     TEXT,
                created_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("tickets table: {e}")))?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_tickets_unresolved \
             ON tickets(session_id) WHERE status != 'resolved'",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("unresolved ticket index: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_created_at ON sessions(created_at)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("created_at index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    async fn touch(&self, id: &SessionId, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query("UPDATE sessions SET updated_at = ? WHERE id = ?")
            .bind(at.to_rfc3339())
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        Ok(())
    }
}

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::QueryFailed(format!("{name} column: {e}")))
}

fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_enum<T: FromStr<Err = String>>(s: &str) -> Result<T, StoreError> {
    s.parse().map_err(StoreError::QueryFailed)
}

fn row_to_turn(row: &SqliteRow) -> Result<Turn, StoreError> {
    let seq: i64 = column(row, "seq")?;
    let speaker: String = column(row, "speaker")?;
    let resolution: Option<String> = column(row, "resolution")?;
    let timestamp: String = column(row, "timestamp")?;

    Ok(Turn {
        seq: seq as u64,
        speaker: parse_enum(&speaker)?,
        text: column(row, "text")?,
        timestamp: parse_time(&timestamp),
        resolution: resolution
            .as_deref()
            .map(parse_enum::<Resolution>)
            .transpose()?,
    })
}

fn row_to_ticket(row: &SqliteRow) -> Result<Ticket, StoreError> {
    let id: i64 = column(row, "id")?;
    let session_id: String = column(row, "session_id")?;
    let status: String = column(row, "status")?;
    let reason: String = column(row, "reason")?;
    let created_at: String = column(row, "created_at")?;

    Ok(Ticket {
        id: TicketId(id as u64),
        session_id: SessionId(session_id),
        status: parse_enum(&status)?,
        reason: parse_enum(&reason)?,
        summary: column(row, "summary")?,
        created_at: parse_time(&created_at),
    })
}

/// Session row without its transcript.
fn row_to_session(row: &SqliteRow) -> Result<Session, StoreError> {
    let id: String = column(row, "id")?;
    let escalation: String = column(row, "escalation")?;
    let ticket_id: Option<i64> = column(row, "ticket_id")?;
    let summary_json: Option<String> = column(row, "summary")?;
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;

    let summary = summary_json
        .map(|json| serde_json::from_str::<Summary>(&json))
        .transpose()
        .map_err(|e| StoreError::QueryFailed(format!("summary column: {e}")))?;

    Ok(Session {
        id: SessionId(id),
        turns: Vec::new(),
        escalation: parse_enum(&escalation)?,
        ticket_id: ticket_id.map(|t| TicketId(t as u64)),
        summary,
        created_at: parse_time(&created_at),
        updated_at: parse_time(&updated_at),
    })
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create(&self) -> Result<Session, StoreError> {
        let session = Session::new();
        sqlx::query(
            "INSERT INTO sessions (id, escalation, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(session.id.as_str())
        .bind(EscalationStatus::None.as_str())
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Failed to create session: {e}")))?;

        debug!(session_id = %session.id, "Session created");
        Ok(session)
    }

    async fn get(&self, id: &SessionId) -> Result<Session, StoreError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let mut session = row_to_session(&row)?;

        let rows = sqlx::query("SELECT * FROM turns WHERE session_id = ? ORDER BY seq ASC")
            .bind(id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        session.turns = rows.iter().map(row_to_turn).collect::<Result<_, _>>()?;

        Ok(session)
    }

    async fn append_turn(
        &self,
        id: &SessionId,
        speaker: Speaker,
        text: &str,
        resolution: Option<Resolution>,
    ) -> Result<Turn, StoreError> {
        let timestamp = Utc::now();

        // Sequence assignment and insert happen in one statement; no row
        // comes back when the session does not exist.
        let row = sqlx::query(
            r#"
            INSERT INTO turns (session_id, seq, speaker, text, resolution, timestamp)
            SELECT s.id,
                   (SELECT COALESCE(MAX(t.seq), 0) + 1 FROM turns t WHERE t.session_id = s.id),
                   ?, ?, ?, ?
            FROM sessions s WHERE s.id = ?
            RETURNING seq
            "#,
        )
        .bind(speaker.as_str())
        .bind(text)
        .bind(resolution.map(|r| r.as_str()))
        .bind(timestamp.to_rfc3339())
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Failed to append turn: {e}")))?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let seq: i64 = column(&row, "seq")?;
        self.touch(id, timestamp).await?;

        Ok(Turn {
            seq: seq as u64,
            speaker,
            text: text.to_string(),
            timestamp,
            resolution,
        })
    }

    async fn set_escalation(
        &self,
        id: &SessionId,
        reason: EscalationReason,
        summary: Option<String>,
    ) -> Result<Escalation, StoreError> {
        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        // Write first so the transaction holds the write lock before reading.
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO tickets (session_id, status, reason, summary, created_at)
            SELECT id, ?, ?, ?, ? FROM sessions WHERE id = ?
            "#,
        )
        .bind(TicketStatus::Open.as_str())
        .bind(reason.as_str())
        .bind(summary.as_deref())
        .bind(now.to_rfc3339())
        .bind(id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("Failed to create ticket: {e}")))?;
        let created = inserted.rows_affected() == 1;

        let row = sqlx::query(
            "SELECT * FROM tickets WHERE session_id = ? AND status != 'resolved'",
        )
        .bind(id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let ticket = row_to_ticket(&row)?;

        if created {
            sqlx::query(
                "UPDATE sessions SET escalation = ?, ticket_id = ?, updated_at = ? WHERE id = ?",
            )
            .bind(EscalationStatus::Escalated.as_str())
            .bind(ticket.id.0 as i64)
            .bind(now.to_rfc3339())
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to mark escalation: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;

        Ok(Escalation { ticket, created })
    }

    async fn set_summary(&self, id: &SessionId, summary: &Summary) -> Result<(), StoreError> {
        let json = serde_json::to_string(summary)
            .map_err(|e| StoreError::Storage(format!("Failed to encode summary: {e}")))?;
        let result = sqlx::query("UPDATE sessions SET summary = ? WHERE id = ?")
            .bind(json)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn get_ticket(&self, id: TicketId) -> Result<Ticket, StoreError> {
        let row = sqlx::query("SELECT * FROM tickets WHERE id = ?")
            .bind(id.0 as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?
            .ok_or(StoreError::TicketNotFound(id.0))?;
        row_to_ticket(&row)
    }

    async fn update_ticket_status(
        &self,
        id: TicketId,
        status: TicketStatus,
    ) -> Result<Ticket, StoreError> {
        let row = sqlx::query("UPDATE tickets SET status = ? WHERE id = ? RETURNING *")
            .bind(status.as_str())
            .bind(id.0 as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to update ticket: {e}")))?
            .ok_or(StoreError::TicketNotFound(id.0))?;
        row_to_ticket(&row)
    }

    async fn list_sessions(&self) -> Result<Vec<SessionOverview>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT s.*, (SELECT COUNT(*) FROM turns t WHERE t.session_id = s.id) AS turn_count
            FROM sessions s
            ORDER BY s.created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let session = row_to_session(row)?;
                let turn_count: i64 = column(row, "turn_count")?;
                let mut overview = session.overview();
                overview.turn_count = turn_count as usize;
                Ok(overview)
            })
            .collect()
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM sessions")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        let n: i64 = column(&row, "n")?;
        Ok(n as usize)
    }
}
