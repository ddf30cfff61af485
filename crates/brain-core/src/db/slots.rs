//! Keyed payload slots

use rusqlite::{params, OptionalExtension};

use super::Database;
use crate::error::Result;

impl Database {
    /// Read the payload stored under `key`
    pub fn read_slot(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let payload = conn
            .query_row(
                "SELECT payload FROM brain_slots WHERE slot_key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }

    /// Insert or replace the payload under `key`
    pub fn write_slot(&self, key: &str, payload: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO brain_slots (slot_key, payload, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(slot_key) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
            params![key, payload],
        )?;
        Ok(())
    }

    /// Delete the slot; returns whether a row existed
    pub fn remove_slot(&self, key: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM brain_slots WHERE slot_key = ?", params![key])?;
        Ok(deleted > 0)
    }
}
