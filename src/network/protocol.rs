// Command parsing and execution for the line protocol

use std::sync::Arc;

use thiserror::Error;

use crate::store::{KeyValueStore, StoreError};
use crate::wal::TransactionLogger;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty command")]
    Empty,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("wrong number of arguments for {0}")]
    WrongArity(&'static str),

    #[error("invalid key")]
    InvalidKey,
}

/// One client request, parsed from a single line.
///
/// ```text
/// PUT <key> <value>   store a value (value runs to end of line)
/// GET <key>           fetch a value
/// DEL <key>           delete a key
/// ALL                 list every entry
/// QUIT                end the session
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Put { key: String, value: String },
    Get { key: String },
    Delete { key: String },
    GetAll,
    Quit,
}

impl Command {
    /// Parse a single command line (without the trailing newline).
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.splitn(3, ' ');
        let verb = parts
            .next()
            .filter(|verb| !verb.is_empty())
            .ok_or(ProtocolError::Empty)?;

        match verb.to_ascii_uppercase().as_str() {
            "PUT" => {
                let key = parts.next().ok_or(ProtocolError::WrongArity("PUT"))?;
                let value = parts.next().ok_or(ProtocolError::WrongArity("PUT"))?;
                validate_key(key)?;
                Ok(Command::Put {
                    key: key.to_string(),
                    value: value.to_string(),
                })
            }
            "GET" => {
                let key = parts.next().ok_or(ProtocolError::WrongArity("GET"))?;
                if parts.next().is_some() {
                    return Err(ProtocolError::WrongArity("GET"));
                }
                validate_key(key)?;
                Ok(Command::Get {
                    key: key.to_string(),
                })
            }
            "DEL" => {
                let key = parts.next().ok_or(ProtocolError::WrongArity("DEL"))?;
                if parts.next().is_some() {
                    return Err(ProtocolError::WrongArity("DEL"));
                }
                validate_key(key)?;
                Ok(Command::Delete {
                    key: key.to_string(),
                })
            }
            "ALL" => {
                if parts.next().is_some() {
                    return Err(ProtocolError::WrongArity("ALL"));
                }
                Ok(Command::GetAll)
            }
            "QUIT" => Ok(Command::Quit),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

fn validate_key(key: &str) -> Result<(), ProtocolError> {
    if key.is_empty() || key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ProtocolError::InvalidKey);
    }
    Ok(())
}

/// Server reply to one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok,
    Value(String),
    Listing(Vec<(String, String)>),
    NotFound(String),
    Error(String),
    Bye,
}

impl Response {
    /// Encode the response as protocol text, newline-terminated.
    pub fn encode(&self) -> String {
        match self {
            Response::Ok => "OK\n".to_string(),
            Response::Value(value) => format!("VALUE {}\n", value),
            Response::Listing(entries) => {
                let mut out = format!("COUNT {}\n", entries.len());
                for (key, value) in entries {
                    out.push_str(&format!("ENTRY {} {}\n", key, value));
                }
                out
            }
            Response::NotFound(key) => format!("NOT_FOUND {}\n", key),
            Response::Error(message) => format!("ERR {}\n", message),
            Response::Bye => "BYE\n".to_string(),
        }
    }
}

/// Executes parsed commands against the store and the transaction logger.
pub struct ProtocolHandler {
    store: Arc<KeyValueStore>,
    logger: Arc<TransactionLogger>,
}

impl ProtocolHandler {
    pub fn new(store: Arc<KeyValueStore>, logger: Arc<TransactionLogger>) -> Self {
        Self { store, logger }
    }

    /// Execute one command and produce its response.
    ///
    /// Mutations hit the in-memory store first and are logged afterwards; a
    /// log submission failure is reported to the client, but the store
    /// mutation stands (a persist failure later surfaces on the logger's
    /// error feed, not here).
    pub async fn handle(&self, command: Command) -> Response {
        match command {
            Command::Put { key, value } => {
                self.store.put(&key, &value);
                if let Err(err) = self.logger.write_put(&key, &value).await {
                    return Response::Error(err.to_string());
                }
                Response::Ok
            }
            Command::Get { key } => match self.store.get(&key) {
                Ok(value) => Response::Value(value),
                Err(StoreError::KeyNotFound(key)) => Response::NotFound(key),
            },
            Command::Delete { key } => match self.store.delete(&key) {
                Ok(()) => {
                    if let Err(err) = self.logger.write_delete(&key).await {
                        return Response::Error(err.to_string());
                    }
                    Response::Ok
                }
                // Nothing was deleted, so nothing is logged; the log never
                // records a delete replay would reject.
                Err(StoreError::KeyNotFound(key)) => Response::NotFound(key),
            },
            Command::GetAll => {
                let mut entries: Vec<(String, String)> =
                    self.store.get_all().into_iter().collect();
                entries.sort();
                Response::Listing(entries)
            }
            Command::Quit => Response::Bye,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_put() {
        assert_eq!(
            Command::parse("PUT alpha hello world"),
            Ok(Command::Put {
                key: "alpha".to_string(),
                value: "hello world".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            Command::parse("get alpha"),
            Ok(Command::Get {
                key: "alpha".to_string()
            })
        );
    }

    #[test]
    fn test_parse_rejects_missing_arguments() {
        assert_eq!(Command::parse("PUT alpha"), Err(ProtocolError::WrongArity("PUT")));
        assert_eq!(Command::parse("GET"), Err(ProtocolError::WrongArity("GET")));
        assert_eq!(
            Command::parse("GET a b"),
            Err(ProtocolError::WrongArity("GET"))
        );
    }

    #[test]
    fn test_parse_rejects_unknown_and_empty() {
        assert_eq!(Command::parse(""), Err(ProtocolError::Empty));
        assert_eq!(
            Command::parse("FETCH alpha"),
            Err(ProtocolError::UnknownCommand("FETCH".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_bad_keys() {
        assert_eq!(Command::parse("GET \t"), Err(ProtocolError::InvalidKey));
        assert_eq!(Command::parse("DEL \x07bell"), Err(ProtocolError::InvalidKey));
    }

    #[test]
    fn test_response_encoding() {
        assert_eq!(Response::Ok.encode(), "OK\n");
        assert_eq!(Response::Value("x".to_string()).encode(), "VALUE x\n");
        assert_eq!(Response::NotFound("k".to_string()).encode(), "NOT_FOUND k\n");
        assert_eq!(
            Response::Listing(vec![("a".to_string(), "1".to_string())]).encode(),
            "COUNT 1\nENTRY a 1\n"
        );
    }

    async fn test_handler(temp_dir: &TempDir) -> ProtocolHandler {
        let store = Arc::new(KeyValueStore::new());
        let logger = Arc::new(
            TransactionLogger::with_file(&temp_dir.path().join("tx.log")).unwrap(),
        );
        logger.run().unwrap();
        ProtocolHandler::new(store, logger)
    }

    #[tokio::test]
    async fn test_handle_put_get_delete() {
        let temp_dir = TempDir::new().unwrap();
        let handler = test_handler(&temp_dir).await;

        let put = Command::parse("PUT alpha one").unwrap();
        assert_eq!(handler.handle(put).await, Response::Ok);

        let get = Command::parse("GET alpha").unwrap();
        assert_eq!(
            handler.handle(get).await,
            Response::Value("one".to_string())
        );

        let del = Command::parse("DEL alpha").unwrap();
        assert_eq!(handler.handle(del).await, Response::Ok);

        let get = Command::parse("GET alpha").unwrap();
        assert_eq!(
            handler.handle(get).await,
            Response::NotFound("alpha".to_string())
        );
    }

    #[tokio::test]
    async fn test_handle_delete_missing_key_is_not_logged() {
        let temp_dir = TempDir::new().unwrap();
        let handler = test_handler(&temp_dir).await;

        let del = Command::parse("DEL ghost").unwrap();
        assert_eq!(
            handler.handle(del).await,
            Response::NotFound("ghost".to_string())
        );

        handler.logger.close().await.unwrap();
        let (mut events, _) = {
            // Reopen the log to inspect what was persisted.
            let logger =
                TransactionLogger::with_file(&temp_dir.path().join("tx.log")).unwrap();
            logger.read_events()
        };
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_handle_get_all_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let handler = test_handler(&temp_dir).await;

        handler.handle(Command::parse("PUT b 2").unwrap()).await;
        handler.handle(Command::parse("PUT a 1").unwrap()).await;

        assert_eq!(
            handler.handle(Command::GetAll).await,
            Response::Listing(vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "2".to_string()),
            ])
        );
    }
}
