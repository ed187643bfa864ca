//! Durable event outbox.
//!
//! The commit gate: events are staged as rows inside the same transaction as
//! the activity mutation that produced them. If that transaction rolls back,
//! the event never existed; once it commits, the event survives a process
//! crash and will be picked up by the dispatcher's poll loop. Rows are
//! deleted only after every handler invocation for the event has finished.

use chrono::Utc;
use rusqlite::{params, Connection};

use super::events::ActivityEvent;

/// An event read back from the outbox, with its row id for deletion.
#[derive(Debug, Clone)]
pub struct StagedEvent {
    pub id: i64,
    pub event: ActivityEvent,
}

/// Outbox store for a database connection or transaction.
pub struct OutboxStore<'a> {
    conn: &'a Connection,
}

impl<'a> OutboxStore<'a> {
    /// Create a new outbox store with the given connection.
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Stage an event. Call inside the transaction that performs the
    /// originating activity write so the two commit or roll back together.
    pub fn stage(&self, event: &ActivityEvent) -> rusqlite::Result<()> {
        let payload = serde_json::to_string(event)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

        self.conn.execute(
            "INSERT INTO outbox_events (payload, staged_at) VALUES (?1, ?2)",
            params![payload, Utc::now().to_rfc3339()],
        )?;

        Ok(())
    }

    /// Fetch up to `limit` pending events in staging order.
    pub fn pending(&self, limit: usize) -> rusqlite::Result<Vec<StagedEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, payload FROM outbox_events ORDER BY id ASC LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            let id: i64 = row.get(0)?;
            let payload: String = row.get(1)?;
            let event: ActivityEvent = serde_json::from_str(&payload).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    1,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
            Ok(StagedEvent { id, event })
        })?;

        rows.collect()
    }

    /// Delete a consumed event by row id.
    pub fn delete(&self, id: i64) -> rusqlite::Result<()> {
        self.conn
            .execute("DELETE FROM outbox_events WHERE id = ?1", params![id])?;
        Ok(())
    }

    /// Count pending events.
    pub fn count(&self) -> rusqlite::Result<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM outbox_events", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
