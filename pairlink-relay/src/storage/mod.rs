//! SQLite storage backend for the relay.
//!
//! One row per pairing slot. The relay never sees plaintext: the stored
//! message is the client's base64 sealed box, kept verbatim.

use crate::error::RelayError;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Thread-safe relay storage.
#[derive(Clone)]
pub struct RelayStorage {
    conn: Arc<Mutex<Connection>>,
}

impl RelayStorage {
    pub fn open(path: &Path) -> Result<Self, anyhow::Error> {
        let conn = Connection::open(path)?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.initialize_schema()?;
        Ok(storage)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self, anyhow::Error> {
        let conn = Connection::open_in_memory()?;

        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.initialize_schema()?;
        Ok(storage)
    }

    fn initialize_schema(&self) -> Result<(), anyhow::Error> {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("{}", e))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS exchange_slots (
                key_id TEXT PRIMARY KEY,
                encrypted_message TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_exchange_slots_expires
                ON exchange_slots(expires_at);",
        )?;
        Ok(())
    }

    pub fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, RelayError> {
        self.conn
            .lock()
            .map_err(|e| RelayError::Internal(format!("Lock error: {}", e)))
    }

    /// Store `encrypted_message` in an empty (or expired) slot. Returns
    /// `false` if the slot still holds an unread message.
    pub fn put_slot(
        &self,
        key_id: &str,
        encrypted_message: &str,
        now: i64,
        expires_at: i64,
    ) -> Result<bool, RelayError> {
        let conn = self.conn()?;

        conn.execute(
            "DELETE FROM exchange_slots WHERE key_id = ?1 AND expires_at <= ?2",
            rusqlite::params![key_id, now],
        )?;

        let inserted = conn.execute(
            "INSERT OR IGNORE INTO exchange_slots (key_id, encrypted_message, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![key_id, encrypted_message, now, expires_at],
        )?;

        Ok(inserted == 1)
    }

    /// Read and remove the message in a live slot.
    pub fn take_slot(&self, key_id: &str, now: i64) -> Result<Option<String>, RelayError> {
        let conn = self.conn()?;

        let message: Option<String> = conn
            .query_row(
                "SELECT encrypted_message FROM exchange_slots
                 WHERE key_id = ?1 AND expires_at > ?2",
                rusqlite::params![key_id, now],
                |row| row.get(0),
            )
            .optional()?;

        if message.is_some() {
            conn.execute("DELETE FROM exchange_slots WHERE key_id = ?1", [key_id])?;
        }

        Ok(message)
    }

    /// Delete every expired slot. Returns how many were removed.
    pub fn prune_expired(&self, now: i64) -> Result<usize, RelayError> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM exchange_slots WHERE expires_at <= ?1", [now])?;
        Ok(removed)
    }

    pub fn slot_count(&self) -> Result<usize, RelayError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM exchange_slots", [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }
}
