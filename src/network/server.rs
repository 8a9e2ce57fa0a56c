// TCP server for the line protocol

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use super::{connection::Connection, Result, DEFAULT_PORT};
use crate::store::KeyValueStore;
use crate::wal::TransactionLogger;

pub struct Server {
    store: Arc<KeyValueStore>,
    logger: Arc<TransactionLogger>,
    max_connections: usize,
}

impl Server {
    pub fn new(
        store: Arc<KeyValueStore>,
        logger: Arc<TransactionLogger>,
        max_connections: usize,
    ) -> Self {
        Self {
            store,
            logger,
            max_connections,
        }
    }

    pub async fn run(&self, addr: Option<SocketAddr>) -> Result<()> {
        let addr = addr.unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)));
        let listener = TcpListener::bind(addr).await?;

        log::info!("kvlog listening on {}", listener.local_addr()?);

        // Connection limiter
        let connection_semaphore = Arc::new(Semaphore::new(self.max_connections));

        loop {
            let (stream, peer_addr) = listener.accept().await?;

            // Clone what we need for the spawned task
            let store = self.store.clone();
            let logger = self.logger.clone();
            let semaphore = connection_semaphore.clone();

            // Spawn a task to handle this connection
            tokio::spawn(async move {
                // Acquire connection permit
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        log::error!("failed to acquire connection permit");
                        return;
                    }
                };

                log::debug!("new connection from {}", peer_addr);

                if let Err(e) = handle_connection(stream, store, logger).await {
                    log::warn!("connection error from {}: {}", peer_addr, e);
                }

                log::debug!("connection closed from {}", peer_addr);
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    store: Arc<KeyValueStore>,
    logger: Arc<TransactionLogger>,
) -> Result<()> {
    let mut connection = Connection::new(stream, store, logger);
    connection.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_server(temp_dir: &TempDir) -> Server {
        let store = Arc::new(KeyValueStore::new());
        let logger = Arc::new(
            TransactionLogger::with_file(&temp_dir.path().join("tx.log")).unwrap(),
        );
        logger.run().unwrap();
        Server::new(store, logger, 10)
    }

    #[tokio::test]
    async fn test_server_startup() {
        let temp_dir = TempDir::new().unwrap();
        let server = setup_test_server(&temp_dir);
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));

        // Start server in background
        let server_task = tokio::spawn(async move { server.run(Some(addr)).await });

        // Give server time to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        // Server should be running
        assert!(!server_task.is_finished());

        // Clean shutdown
        server_task.abort();
    }

    #[tokio::test]
    async fn test_connection_limit() {
        let temp_dir = TempDir::new().unwrap();
        let server = setup_test_server(&temp_dir);

        // This test just verifies the server can be created with connection limits
        assert_eq!(server.max_connections, 10);
    }
}
