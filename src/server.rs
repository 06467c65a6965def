//! TCP server for line echo connections.
//!
//! Accepts incoming connections and hands each to its own worker task.
//! Concurrency is bounded by a semaphore: once every permit is taken the
//! accept loop stops accepting and new connections wait in the backlog.

use crate::config::Config;
use crate::listener::{self, Listener};
use crate::worker::{self, WorkerError, WorkerLimits};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Server instance
pub struct Server {
    config: Config,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        let permits = config.max_connections.min(Semaphore::MAX_PERMITS);
        let connection_limit = Arc::new(Semaphore::new(permits));

        Server {
            config,
            connection_limit,
        }
    }

    /// Bind the configured address and serve until Ctrl-C.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = listener::bind_and_listen(&self.config.listen, self.config.backlog)?;

        self.serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Accept connections on `listener` until `shutdown` completes.
    pub async fn serve<F>(
        &self,
        listener: Listener,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()>,
    {
        info!(
            address = %listener.local_addr(),
            backlog = listener.backlog(),
            max_connections = self.config.max_connections,
            "Server listening"
        );

        let limits = WorkerLimits {
            max_line_length: self.config.max_line_length,
            idle_timeout: self.config.idle_timeout,
        };

        tokio::pin!(shutdown);

        loop {
            // Wait for a connection slot
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = self.connection_limit.clone().acquire_owned() => permit?,
            };

            let accepted = tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    info!(peer = %peer, "Client connected");

                    tokio::spawn(async move {
                        match worker::handle_connection(stream, peer, limits).await {
                            Ok(lines) => info!(peer = %peer, lines, "Client disconnected"),
                            Err(WorkerError::Io(e)) => {
                                debug!(peer = %peer, error = %e, "Connection error")
                            }
                            Err(e) => warn!(peer = %peer, error = %e, "Connection closed"),
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }

        info!("Shutdown signal received, no longer accepting connections");
        Ok(())
    }

    /// Number of connection slots currently free.
    pub fn available_slots(&self) -> usize {
        self.connection_limit.available_permits()
    }
}
