//! Write-ahead transaction log.
//!
//! Every store mutation is recorded as an [`Event`] in a durable, strictly
//! ordered log. The log is append-only and is replayed at startup to
//! reconstruct store state (see [`crate::replay`]). Two interchangeable
//! backends satisfy the same [`LogBackend`] contract:
//!
//! - [`FileLog`]: an append-only file of length-prefixed binary records
//! - [`SqliteLog`]: a relational `transactions` table
//!
//! The [`TransactionLogger`] wraps one backend and turns synchronous write
//! submissions into asynchronous persistence through a single background
//! persister task, which is what guarantees the ordering invariant.

pub mod backend;
pub mod event;
pub mod file;
pub mod logger;
pub mod sqlite;

// Re-export commonly used types
pub use backend::LogBackend;
pub use event::{Event, EventKind, Mutation, Sequence};
pub use file::FileLog;
pub use logger::TransactionLogger;
pub use sqlite::SqliteLog;

use thiserror::Error;

/// Errors that can occur in the transaction log.
#[derive(Error, Debug)]
pub enum LogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt log record: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("logger is already running")]
    AlreadyRunning,

    #[error("logger is closed")]
    Closed,
}

/// Result type for transaction log operations.
pub type Result<T> = std::result::Result<T, LogError>;
