// Per-connection line framing and dispatch

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::protocol::{Command, ProtocolHandler, Response};
use super::{NetworkError, Result, MAX_LINE_LENGTH};
use crate::store::KeyValueStore;
use crate::wal::TransactionLogger;

pub struct Connection {
    stream: TcpStream,
    read_buffer: BytesMut,
    handler: ProtocolHandler,
}

impl Connection {
    pub fn new(
        stream: TcpStream,
        store: Arc<KeyValueStore>,
        logger: Arc<TransactionLogger>,
    ) -> Self {
        Self {
            stream,
            read_buffer: BytesMut::with_capacity(8192),
            handler: ProtocolHandler::new(store, logger),
        }
    }

    pub async fn run(&mut self) -> Result<()> {
        loop {
            // Process complete lines already buffered
            while let Some(line) = self.try_read_line()? {
                let response = match Command::parse(&line) {
                    Ok(Command::Quit) => {
                        self.send(&Response::Bye).await?;
                        return Ok(());
                    }
                    Ok(command) => self.handler.handle(command).await,
                    Err(err) => Response::Error(err.to_string()),
                };
                self.send(&response).await?;
            }

            let n = self.stream.read_buf(&mut self.read_buffer).await?;
            if n == 0 {
                if self.read_buffer.is_empty() {
                    return Ok(());
                }
                return Err(NetworkError::ConnectionClosed);
            }
        }
    }

    fn try_read_line(&mut self) -> Result<Option<String>> {
        if let Some(pos) = self.read_buffer.iter().position(|&b| b == b'\n') {
            let line = self.read_buffer.split_to(pos + 1);
            let text = std::str::from_utf8(&line[..pos])
                .map_err(|_| NetworkError::InvalidUtf8)?
                .to_string();
            return Ok(Some(text));
        }

        if self.read_buffer.len() > MAX_LINE_LENGTH {
            return Err(NetworkError::LineTooLong);
        }

        Ok(None)
    }

    async fn send(&mut self, response: &Response) -> Result<()> {
        self.stream.write_all(response.encode().as_bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }
}
