//! SQLite persistence layer.
//!
//! RULE: Only store.rs talks to the database.
//! The engine calls store methods; nothing else executes SQL.

use crate::{
    error::{SimError, SimResult},
    event::EventLogEntry,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

/// One stored save: the raw save-file bytes plus slot metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveSlot {
    pub slot_id:    String,
    pub run_id:     String,
    pub label:      String,
    pub frame:      u32,
    pub created_at: DateTime<Utc>,
    pub data:       Vec<u8>,
}

type SlotRow = (String, String, String, i64, String, Vec<u8>);

fn slot_from_row(row: SlotRow) -> SimResult<SaveSlot> {
    let (slot_id, run_id, label, frame, created_at, data) = row;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| SimError::corrupt("created_at", e.to_string()))?
        .with_timezone(&Utc);
    let frame = u32::try_from(frame).map_err(|_| SimError::corrupt("frame", format!("{frame}")))?;
    Ok(SaveSlot { slot_id, run_id, label, frame, created_at, data })
}

pub struct SaveStore {
    conn: Connection,
}

impl SaveStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &str) -> SimResult<Self> {
        let conn = Connection::open(path)?;
        // WAL only matters for real files; in-memory databases ignore it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SimResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SimResult<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, seed: u64, version: &str) -> SimResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO run (run_id, seed, version, started_at) VALUES (?1, ?2, ?3, ?4)",
            params![run_id, seed as i64, version, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (run_id, frame, event_type, payload) VALUES (?1, ?2, ?3, ?4)",
            params![entry.run_id, entry.frame, entry.event_type, entry.payload],
        )?;
        Ok(())
    }

    /// Appends a frame's events in one transaction.
    pub fn append_events(&mut self, entries: &[EventLogEntry]) -> SimResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO event_log (run_id, frame, event_type, payload) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for entry in entries {
                stmt.execute(params![entry.run_id, entry.frame, entry.event_type, entry.payload])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn events_for_frame(&self, run_id: &str, frame: u32) -> SimResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_id, frame, event_type, payload
             FROM event_log WHERE run_id = ?1 AND frame = ?2
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![run_id, frame], |row| {
                Ok(EventLogEntry {
                    id:         Some(row.get(0)?),
                    run_id:     row.get(1)?,
                    frame:      row.get(2)?,
                    event_type: row.get(3)?,
                    payload:    row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Every payload of a run in log order.
    pub fn payloads(&self, run_id: &str) -> SimResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT payload FROM event_log WHERE run_id = ?1 ORDER BY id ASC")?;
        let payloads = stmt
            .query_map(params![run_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(payloads)
    }

    pub fn event_count(&self, run_id: &str, event_type: &str) -> SimResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE run_id = ?1 AND event_type = ?2",
            params![run_id, event_type],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ── Save slots ─────────────────────────────────────────────

    /// Stores a save and returns its new slot id.
    pub fn save_slot(&self, run_id: &str, label: &str, frame: u32, data: &[u8]) -> SimResult<String> {
        let slot_id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO save_slot (slot_id, run_id, label, frame, created_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![slot_id, run_id, label, frame, Utc::now().to_rfc3339(), data],
        )?;
        Ok(slot_id)
    }

    pub fn load_slot(&self, slot_id: &str) -> SimResult<Option<SaveSlot>> {
        let row: Option<SlotRow> = self
            .conn
            .query_row(
                "SELECT slot_id, run_id, label, frame, created_at, data FROM save_slot WHERE slot_id = ?1",
                params![slot_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?)),
            )
            .optional()?;
        row.map(slot_from_row).transpose()
    }

    pub fn latest_slot(&self, run_id: &str) -> SimResult<Option<SaveSlot>> {
        let row: Option<SlotRow> = self
            .conn
            .query_row(
                "SELECT slot_id, run_id, label, frame, created_at, data FROM save_slot
                 WHERE run_id = ?1 ORDER BY frame DESC, rowid DESC LIMIT 1",
                params![run_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?)),
            )
            .optional()?;
        row.map(slot_from_row).transpose()
    }

    /// (slot id, label, frame) for every save of a run, oldest first.
    pub fn list_slots(&self, run_id: &str) -> SimResult<Vec<(String, String, u32)>> {
        let mut stmt = self.conn.prepare(
            "SELECT slot_id, label, frame FROM save_slot WHERE run_id = ?1 ORDER BY frame ASC, rowid ASC",
        )?;
        let slots = stmt
            .query_map(params![run_id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(slots)
    }
}
