//! Listener and connection admission.
//!
//! [`Server::run`] accepts inbound connections and spawns one task per
//! admitted connection. It runs until the `shutdown` future completes, then
//! signals every live connection and waits for all of them to finish.
//!
//! ## Admission
//!
//! ```text
//!   accept() ──> admission permit? ──yes──> spawn ConnectionHandler
//!                     │
//!                     └── timed out ──> close socket, no bytes sent
//! ```

use crate::codec::PayloadCodec;
use crate::commands::CommandHandler;
use crate::config::{Config, ConfigError};
use crate::connection::{handle_connection, BufferPool, ConnectionHandler, ConnectionLimits};
use crate::shutdown::Shutdown;
use crate::stats::ServerStats;
use crate::storage::StorageEngine;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::time::{self, Duration};
use tracing::{error, info, warn};

/// Errors that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be bound
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Accepting kept failing after backing off
    #[error("accept failed: {0}")]
    Accept(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// The key-value server.
///
/// Owns the storage engine and statistics for the life of the process.
pub struct Server {
    config: Config,
    storage: Arc<StorageEngine>,
    stats: Arc<ServerStats>,
}

impl Server {
    /// Creates a server with an empty store.
    pub fn new(config: Config) -> Result<Self, ServerError> {
        config.validate()?;

        Ok(Self {
            config,
            storage: Arc::new(StorageEngine::new()),
            stats: Arc::new(ServerStats::new()),
        })
    }

    /// Returns the shared storage engine.
    pub fn storage(&self) -> Arc<StorageEngine> {
        Arc::clone(&self.storage)
    }

    /// Returns the shared server statistics.
    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.stats)
    }

    /// Binds the listening socket.
    ///
    /// This is the only fatal error path; callers should abort on failure.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = self.config.bind_address();
        TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })
    }

    /// Runs the server until `shutdown` completes.
    ///
    /// On return every connection task has finished and released its
    /// socket, buffer and admission slot.
    pub async fn run(self, listener: TcpListener, shutdown: impl Future) -> Result<(), ServerError> {
        let (notify_shutdown, _) = broadcast::channel(1);
        let (shutdown_complete_tx, mut shutdown_complete_rx) = mpsc::channel(1);

        let codec: Arc<dyn PayloadCodec> = Arc::from(self.config.codec.build());
        let stats = Arc::clone(&self.stats);

        let mut server = Listener {
            listener,
            command_handler: CommandHandler::new(Arc::clone(&self.storage))
                .with_codec(codec)
                .with_sink(stats.clone()),
            pool: Arc::new(BufferPool::new(
                self.config.buffer_size,
                self.config.max_connections,
            )),
            limit_connections: Arc::new(Semaphore::new(self.config.max_connections)),
            admission_timeout: self.config.admission_timeout,
            limits: ConnectionLimits {
                max_command_size: self.config.max_command_size,
                cycle_timeout: self.config.cycle_timeout,
            },
            stats: Arc::clone(&stats),
            notify_shutdown,
            shutdown_complete_tx,
        };

        if let Ok(addr) = server.listener.local_addr() {
            info!(
                addr = %addr,
                max_connections = self.config.max_connections,
                codec = %self.config.codec,
                "Listening"
            );
        }

        let result = tokio::select! {
            res = server.run() => {
                if let Err(ref err) = res {
                    error!(cause = %err, "Failed to accept");
                }
                res
            }
            _ = shutdown => {
                info!("Shutdown signal received, stopping server...");
                Ok(())
            }
        };

        let Listener {
            shutdown_complete_tx,
            notify_shutdown,
            ..
        } = server;

        // Every subscribed `Shutdown` sees the dropped sender as the signal
        drop(notify_shutdown);
        drop(shutdown_complete_tx);

        // Completes once the last connection task drops its sender
        let _ = shutdown_complete_rx.recv().await;

        info!(stats = %stats, "Server shutdown complete");
        result
    }
}

/// Accept-loop state, built inside [`Server::run`].
struct Listener {
    listener: TcpListener,

    /// Cloned into each connection
    command_handler: CommandHandler,

    /// Read buffers shared by all connections
    pool: Arc<BufferPool>,

    /// Admission limiter; one permit per live connection
    limit_connections: Arc<Semaphore>,

    /// Bounded wait for an admission permit
    admission_timeout: Duration,

    limits: ConnectionLimits,

    stats: Arc<ServerStats>,

    /// Broadcasts the shutdown signal to live connections
    notify_shutdown: broadcast::Sender<()>,

    /// Each connection holds a clone; `recv` returns `None` once all drop
    shutdown_complete_tx: mpsc::Sender<()>,
}

impl Listener {
    /// Accepts connections until accepting fails for good.
    async fn run(&mut self) -> Result<(), ServerError> {
        info!("Accepting inbound connections");

        loop {
            let (socket, addr) = self.accept().await?;

            let permit = match time::timeout(
                self.admission_timeout,
                Arc::clone(&self.limit_connections).acquire_owned(),
            )
            .await
            {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Ok(()),
                Err(_) => {
                    warn!(client = %addr, "No connection slot available, closing connection");
                    self.stats.connection_rejected();
                    drop(socket);
                    continue;
                }
            };

            let handler = ConnectionHandler::new(
                socket,
                addr,
                self.command_handler.clone(),
                self.pool.acquire(),
                self.limits,
                Arc::clone(&self.stats),
                Shutdown::new(self.notify_shutdown.subscribe()),
            )
            .with_admission(permit, self.shutdown_complete_tx.clone());

            // Spawn a task to handle this connection
            tokio::spawn(handle_connection(handler));
        }
    }

    /// Accepts one connection, backing off on errors.
    ///
    /// Waits 1, 2, 4, ... 64 seconds between attempts before giving up.
    async fn accept(&mut self) -> Result<(TcpStream, SocketAddr), ServerError> {
        let mut backoff = 1;

        loop {
            match self.listener.accept().await {
                Ok(accepted) => return Ok(accepted),
                Err(err) => {
                    if backoff > 64 {
                        return Err(err.into());
                    }
                    error!(error = %err, backoff_secs = backoff, "Failed to accept connection");
                }
            }

            time::sleep(Duration::from_secs(backoff)).await;
            backoff *= 2;
        }
    }
}
