//! Upload outbox access for the sync client.
//!
//! Local writes that must reach the server are queued in the `ps_crud`
//! table as `(id, tx_id, data)` rows. The sync client reads them in id
//! order, uploads them and deletes what the server acknowledged. A
//! database without the table has nothing pending.

use crate::connection::EngineConnection;
use crate::error::EngineResult;
use rusqlite::OptionalExtension;
use sqlbridge_codec::wire::CrudEntry;

/// Name of the outbox table.
pub const CRUD_TABLE: &str = "ps_crud";

impl EngineConnection {
    fn has_crud_table(&self) -> EngineResult<bool> {
        let found = self
            .sqlite()
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [CRUD_TABLE],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Returns up to `limit` outbox entries, oldest first.
    pub fn get_crud_batch(&self, limit: i64) -> EngineResult<Vec<CrudEntry>> {
        if !self.has_crud_table()? {
            return Ok(Vec::new());
        }

        let mut stmt = self
            .sqlite()
            .prepare_cached("SELECT id, tx_id, data FROM ps_crud ORDER BY id LIMIT ?1")?;
        let entries = stmt
            .query_map([limit], |row| {
                Ok(CrudEntry {
                    id: row.get(0)?,
                    tx_id: row.get(1)?,
                    data: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Deletes every outbox entry with an id up to and including `crud_id`.
    ///
    /// Returns the number of entries removed.
    pub fn remove_crud(&mut self, crud_id: i64) -> EngineResult<usize> {
        if !self.has_crud_table()? {
            return Ok(0);
        }
        let removed = self
            .sqlite()
            .execute("DELETE FROM ps_crud WHERE id <= ?1", [crud_id])?;
        tracing::debug!(db = self.name(), crud_id, removed, "outbox entries removed");
        Ok(removed)
    }

    /// Returns true if the outbox holds at least one entry.
    pub fn has_pending_crud(&self) -> EngineResult<bool> {
        if !self.has_crud_table()? {
            return Ok(false);
        }
        let pending = self
            .sqlite()
            .query_row("SELECT EXISTS (SELECT 1 FROM ps_crud)", [], |row| row.get(0))?;
        Ok(pending)
    }

    /// Returns the last write checkpoint reported by the sync extension.
    ///
    /// `None` when the extension is not loaded or has no checkpoint yet.
    pub fn get_write_checkpoint(&self) -> Option<String> {
        match self
            .sqlite()
            .query_row("SELECT powersync_last_synced_at()", [], |row| {
                row.get::<_, Option<String>>(0)
            }) {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                tracing::debug!(db = self.name(), error = %e, "no write checkpoint");
                None
            }
        }
    }
}
