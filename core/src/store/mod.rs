//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The service calls store methods; it never executes SQL directly.

use crate::{
    error::{EngineError, EngineResult},
    event::EventLogEntry,
    types::{Money, ReclamationId},
};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use std::str::FromStr;

mod reclamation;
mod settlement;

pub struct ReclamationStore {
    conn: Connection,
}

impl ReclamationStore {
    pub fn open(path: &str) -> EngineResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only matters for real files; :memory: ignores it.
        if let Err(e) = conn.execute_batch("PRAGMA journal_mode=WAL;") {
            log::debug!("journal_mode=WAL not applied to {path}: {e}");
        }
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> EngineResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> EngineResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_reclamations.sql"))?;
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> EngineResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (reclamation_id, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.reclamation_id,
                entry.event_type,
                entry.payload,
                entry.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn events_for(&self, reclamation_id: ReclamationId) -> EngineResult<Vec<EventLogEntry>> {
        self.query_events(
            "SELECT id, reclamation_id, event_type, payload, created_at
             FROM event_log WHERE reclamation_id = ?1
             ORDER BY id ASC",
            params![reclamation_id],
        )
    }

    pub fn all_events(&self) -> EngineResult<Vec<EventLogEntry>> {
        self.query_events(
            "SELECT id, reclamation_id, event_type, payload, created_at
             FROM event_log ORDER BY id ASC",
            [],
        )
    }

    fn query_events(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> EngineResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let entries = stmt
            .query_map(params, |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    reclamation_id: row.get(1)?,
                    event_type: row.get(2)?,
                    payload: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

// ── Column helpers ─────────────────────────────────────────────────

fn parse_money(column: &str, text: &str) -> EngineResult<Money> {
    Decimal::from_str(text).map_err(|e| {
        EngineError::Other(anyhow::anyhow!("column {column} holds invalid decimal '{text}': {e}"))
    })
}

fn parse_column<T>(text: &str) -> EngineResult<T>
where
    T: FromStr<Err = EngineError>,
{
    text.parse()
}
