// Line-oriented TCP network module

pub mod connection;
pub mod protocol;
pub mod server;

// Re-export commonly used types
pub use connection::Connection;
pub use protocol::{Command, ProtocolError, ProtocolHandler, Response};
pub use server::Server;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("command line is not valid UTF-8")]
    InvalidUtf8,

    #[error("command line too long")]
    LineTooLong,

    #[error("connection closed mid-command")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, NetworkError>;

// Default listen port
pub const DEFAULT_PORT: u16 = 7171;

// Longest accepted command line, in bytes
pub const MAX_LINE_LENGTH: usize = 64 * 1024;
