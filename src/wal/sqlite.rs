//! SQLite-based transaction log backend.
//!
//! Events live in a `transactions` table whose auto-incrementing primary key
//! is the sequence. The database assigns sequences at insert time, which
//! gives the same ordering guarantee as the file backend.

use std::path::Path;

use rusqlite::{params, Connection};

use super::backend::LogBackend;
use super::event::{Event, EventKind, Sequence};
use super::{LogError, Result};

const TABLE: &str = "transactions";

/// Relational transaction log over a SQLite database file.
pub struct SqliteLog {
    conn: Connection,
    last_sequence: Sequence,
}

impl SqliteLog {
    /// Open the log database at `path`, creating the `transactions` table if
    /// it does not exist yet.
    ///
    /// Fails if the database cannot be opened or the schema cannot be
    /// verified; the service must not start on a broken log.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory log. Test helper; nothing persists across drop.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "FULL")?;

        let mut log = SqliteLog {
            conn,
            last_sequence: Sequence::new(),
        };

        if !log.table_exists()? {
            log.create_table()?;
        }
        log.last_sequence = log.max_sequence()?;

        Ok(log)
    }

    fn table_exists(&self) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [TABLE],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn create_table(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE transactions (
                sequence   INTEGER PRIMARY KEY AUTOINCREMENT,
                event_type INTEGER NOT NULL,
                key        TEXT NOT NULL,
                value      TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn max_sequence(&self) -> Result<Sequence> {
        let max: Option<i64> =
            self.conn
                .query_row("SELECT MAX(sequence) FROM transactions", [], |row| {
                    row.get(0)
                })?;
        Ok(Sequence(max.unwrap_or(0) as u64))
    }
}

impl LogBackend for SqliteLog {
    fn append(&mut self, kind: EventKind, key: &str, value: &str) -> Result<Sequence> {
        self.conn.execute(
            "INSERT INTO transactions (event_type, key, value) VALUES (?1, ?2, ?3)",
            params![kind.code(), key, value],
        )?;

        let sequence = Sequence(self.conn.last_insert_rowid() as u64);
        self.last_sequence = sequence;
        Ok(sequence)
    }

    fn scan(&mut self, visit: &mut dyn FnMut(Event) -> bool) -> Result<()> {
        let mut stmt = self.conn.prepare(
            "SELECT sequence, event_type, key, value FROM transactions ORDER BY sequence",
        )?;
        let mut rows = stmt.query([])?;

        while let Some(row) = rows.next()? {
            let sequence: i64 = row.get(0)?;
            let code: i64 = row.get(1)?;
            let kind = EventKind::from_code(code)
                .ok_or_else(|| LogError::Corrupt(format!("unknown event type {}", code)))?;

            let event = Event {
                sequence: Sequence(sequence as u64),
                kind,
                key: row.get(2)?,
                value: row.get(3)?,
            };

            if !visit(event) {
                break;
            }
        }

        Ok(())
    }

    fn last_sequence(&self) -> Sequence {
        self.last_sequence
    }

    fn close(&mut self) -> Result<()> {
        // The connection itself is released when the backend is dropped.
        Ok(())
    }
}
