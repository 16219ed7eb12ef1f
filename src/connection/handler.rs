//! Connection Handler Module
//!
//! This module handles individual client connections to LineKV.
//! Each client gets its own handler task that runs in a loop,
//! reading commands and sending replies.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client admitted by the listener
//!        │
//!        ▼
//! 2. ConnectionHandler spawned (buffer taken from the pool)
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop               │
//!    │                              │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Acquire cycle gate      │ │  (bounded wait, skip on timeout)
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read bytes from socket  │ │  Reading
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Tokenize + execute      │ │  Dispatching
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Send reply              │ │  Responding
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │         [Loop back]          │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Client disconnects / error / shutdown      Closing
//!        │
//!        ▼
//! 5. Stream shut down, buffer and admission slot released
//! ```
//!
//! ## Buffer Management
//!
//! Incoming bytes accumulate in a pooled `BytesMut`. Its length is the
//! cursor: a partial command stays buffered and the next read appends to
//! it. Once a command is dispatched the buffer is cleared, so any bytes
//! after the command in the same read are dropped.

use crate::commands::CommandHandler;
use crate::connection::pool::PooledBuffer;
use crate::protocol::{Command, Parsed};
use crate::shutdown::Shutdown;
use crate::stats::ServerStats;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::time;
use tracing::{debug, info, trace, warn};

/// Minimum free space kept in the read buffer before each read
const MIN_READ_SPACE: usize = 1024;

/// Limits applied to a single connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    /// Largest command allowed to accumulate in the buffer
    pub max_command_size: usize,
    /// Bounded wait for the per-connection cycle gate
    pub cycle_timeout: Duration,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_command_size: 4096,
            cycle_timeout: Duration::from_millis(500),
        }
    }
}

/// Handles a single client connection.
///
/// Owns the stream and read buffer exclusively. Everything it holds is
/// released when it is dropped, whichever way the connection ended.
pub struct ConnectionHandler<S> {
    /// The stream for this connection
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Pooled buffer for incoming data
    buffer: PooledBuffer,

    /// Allows one read/dispatch/respond cycle at a time
    gate: Arc<Semaphore>,

    /// The command handler (shared storage behind it)
    command_handler: CommandHandler,

    limits: ConnectionLimits,

    /// Server statistics (shared)
    stats: Arc<ServerStats>,

    /// Shutdown notification from the listener
    shutdown: Shutdown,

    /// Admission slot, returned to the listener on drop
    _admission: Option<OwnedSemaphorePermit>,

    /// Dropped with the handler so the listener knows this task finished
    _shutdown_complete: Option<mpsc::Sender<()>>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The byte stream for this connection
    /// * `addr` - The client's socket address
    /// * `command_handler` - The command handler for executing commands
    /// * `buffer` - Read buffer borrowed from the pool
    /// * `limits` - Per-connection limits
    /// * `stats` - Shared server statistics
    /// * `shutdown` - Shutdown listener
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        buffer: PooledBuffer,
        limits: ConnectionLimits,
        stats: Arc<ServerStats>,
        shutdown: Shutdown,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer,
            gate: Arc::new(Semaphore::new(1)),
            command_handler,
            limits,
            stats,
            shutdown,
            _admission: None,
            _shutdown_complete: None,
        }
    }

    /// Ties the admission permit and shutdown-completion sender to this
    /// handler's lifetime.
    pub fn with_admission(
        mut self,
        permit: OwnedSemaphorePermit,
        shutdown_complete: mpsc::Sender<()>,
    ) -> Self {
        self._admission = Some(permit);
        self._shutdown_complete = Some(shutdown_complete);
        self
    }

    /// Runs the main connection loop.
    ///
    /// Reads commands from the client, executes them, and sends back
    /// replies until the client disconnects, an error occurs, or the
    /// server shuts down. The stream is shut down before returning.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    info!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::Cancelled => {
                    info!(client = %self.addr, "Connection cancelled by shutdown")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        // A reply cut off by shutdown is discarded, not flushed
        let closed = match result {
            Err(ConnectionError::Cancelled) => self.stream.get_mut().shutdown().await,
            _ => self.stream.shutdown().await,
        };
        if let Err(e) = closed {
            debug!(client = %self.addr, error = %e, "Socket shutdown failed");
        }
        trace!(client = %self.addr, "Socket closed");

        result
    }

    /// The gate-read-dispatch-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        while !self.shutdown.is_shutdown() {
            let gate = Arc::clone(&self.gate);
            let _cycle = tokio::select! {
                res = time::timeout(self.limits.cycle_timeout, gate.acquire_owned()) => match res {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_)) => return Err(ConnectionError::Cancelled),
                    Err(_) => {
                        warn!(client = %self.addr, "Cycle gate timeout, skipping read");
                        continue;
                    }
                },
                _ = self.shutdown.recv() => return Ok(()),
            };

            let n = tokio::select! {
                res = read_chunk(self.stream.get_mut(), &mut self.buffer) => res?,
                _ = self.shutdown.recv() => return Ok(()),
            };

            if n == 0 {
                // Connection closed by client
                if self.buffer.is_empty() {
                    return Err(ConnectionError::ClientDisconnected);
                } else {
                    // Partial command in buffer
                    return Err(ConnectionError::UnexpectedEof);
                }
            }

            self.stats.bytes_read(n);
            trace!(client = %self.addr, bytes = n, buffered = self.buffer.len(), "Read data");

            if self.buffer.len() > self.limits.max_command_size {
                return Err(ConnectionError::BufferFull {
                    size: self.buffer.len(),
                    max: self.limits.max_command_size,
                });
            }

            let command = match Command::parse(&self.buffer) {
                Parsed::Complete(command) => command,
                Parsed::Incomplete => {
                    trace!(
                        client = %self.addr,
                        buffered = self.buffer.len(),
                        "Incomplete command, need more data"
                    );
                    continue;
                }
                Parsed::Blank => {
                    // Terminator of a line that was already answered
                    self.buffer.clear();
                    continue;
                }
            };

            self.buffer.clear();
            debug!(client = %self.addr, command = command.name(), "Parsed command");

            let reply = self.command_handler.execute(command);
            self.stats.command_processed();
            if reply.is_error() {
                self.stats.command_rejected();
            }

            let bytes = reply.to_bytes();
            tokio::select! {
                res = write_reply(&mut self.stream, &bytes) => res?,
                _ = self.shutdown.recv() => return Err(ConnectionError::Cancelled),
            }
            self.stats.bytes_written(bytes.len());
            trace!(
                client = %self.addr,
                bytes = bytes.len(),
                "Sent reply"
            );
        }

        Ok(())
    }
}

/// Writes a reply in full and flushes it.
async fn write_reply<W>(stream: &mut W, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    stream.write_all(bytes).await?;
    stream.flush().await
}
impl<S> Drop for ConnectionHandler<S> {
    fn drop(&mut self) {
        self.stats.connection_closed();
    }
}

/// Reads more data from the stream into the buffer, after the cursor.
async fn read_chunk<R>(stream: &mut R, buffer: &mut BytesMut) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    if buffer.capacity() - buffer.len() < MIN_READ_SPACE {
        buffer.reserve(MIN_READ_SPACE);
    }

    stream.read_buf(buffer).await
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial command)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffered command exceeded the size limit
    #[error("command too large: {size} bytes (max: {max})")]
    BufferFull { size: usize, max: usize },

    /// Shutdown arrived while a reply was pending, or the cycle gate closed
    #[error("Connection cancelled")]
    Cancelled,
}

/// Handles a client connection.
///
/// Runs the handler to completion; expected disconnects are not reported.
pub async fn handle_connection<S>(handler: ConnectionHandler<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let addr = handler.addr;
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::pool::BufferPool;
    use crate::storage::StorageEngine;
    use bytes::Bytes;
    use std::sync::atomic::Ordering;
    use tokio::sync::broadcast;
    use tokio_test::io::Builder;

    struct Harness {
        storage: Arc<StorageEngine>,
        stats: Arc<ServerStats>,
        pool: Arc<BufferPool>,
        notify: broadcast::Sender<()>,
    }

    impl Harness {
        fn new() -> Self {
            let (notify, _) = broadcast::channel(1);
            Self {
                storage: Arc::new(StorageEngine::new()),
                stats: Arc::new(ServerStats::new()),
                pool: Arc::new(BufferPool::new(8192, 4)),
                notify,
            }
        }

        fn handler<S>(&self, stream: S, limits: ConnectionLimits) -> ConnectionHandler<S>
        where
            S: AsyncRead + AsyncWrite + Unpin,
        {
            ConnectionHandler::new(
                stream,
                "127.0.0.1:50000".parse().unwrap(),
                CommandHandler::new(Arc::clone(&self.storage)),
                self.pool.acquire(),
                limits,
                Arc::clone(&self.stats),
                Shutdown::new(self.notify.subscribe()),
            )
        }
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let harness = Harness::new();
        let mock = Builder::new()
            .read(b"SET user:1 data")
            .write(b"OK\r\n")
            .read(b"GET user:1")
            .write(b"data")
            .read(b"DELETE user:1")
            .write(b"OK\r\n")
            .read(b"GET user:1")
            .write(b"(nil)\r\n")
            .build();

        let result = harness.handler(mock, ConnectionLimits::default()).run().await;
        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));

        let stats = harness.storage.statistics();
        assert_eq!((stats.sets, stats.gets, stats.deletes), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_fragmented_command() {
        let harness = Harness::new();
        let mock = Builder::new()
            .read(b"SE")
            .read(b"T user:1 data")
            .write(b"OK\r\n")
            .build();

        let _ = harness.handler(mock, ConnectionLimits::default()).run().await;

        assert_eq!(harness.storage.get("user:1"), Some(Bytes::from("data")));
        assert_eq!(harness.stats.commands_processed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_unknown_command_keeps_connection_open() {
        let harness = Harness::new();
        let mock = Builder::new()
            .read(b"PING server")
            .write(b"-ERR Unknown command\r\n")
            .read(b"    ")
            .write(b"-ERR Unknown command\r\n")
            .read(b"GET\r\n")
            .write(b"-ERR Unknown command\r\n")
            .read(b"get missing")
            .write(b"(nil)\r\n")
            .build();

        let result = harness.handler(mock, ConnectionLimits::default()).run().await;
        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
        assert_eq!(harness.stats.commands_rejected.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_line_terminated_commands() {
        let harness = Harness::new();
        let mock = Builder::new()
            .read(b"SET k v\r\n")
            .write(b"OK\r\n")
            .read(b"GET k\n")
            .write(b"v")
            .build();

        let _ = harness.handler(mock, ConnectionLimits::default()).run().await;
    }

    #[tokio::test]
    async fn test_late_line_terminator_gets_no_reply() {
        let harness = Harness::new();
        let (mut client, server) = tokio::io::duplex(64);
        let task = tokio::spawn(harness.handler(server, ConnectionLimits::default()).run());

        client.write_all(b"GET k").await.unwrap();
        time::sleep(Duration::from_millis(50)).await;
        client.write_all(b"\r\n").await.unwrap();
        time::sleep(Duration::from_millis(50)).await;
        client.shutdown().await.unwrap();

        let mut replies = Vec::new();
        time::timeout(Duration::from_secs(1), client.read_to_end(&mut replies))
            .await
            .expect("handler did not close")
            .unwrap();
        assert_eq!(replies, b"(nil)\r\n");

        let result = task.await.unwrap();
        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
        assert_eq!(harness.stats.commands_processed.load(Ordering::Relaxed), 1);
        assert_eq!(harness.stats.commands_rejected.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_line_split_between_cr_and_lf() {
        let harness = Harness::new();
        harness.storage.set("k", Bytes::from("v"));
        let mock = Builder::new()
            .read(b"GET k\r")
            .read(b"\n")
            .write(b"v")
            .build();

        let result = harness.handler(mock, ConnectionLimits::default()).run().await;
        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
        assert_eq!(harness.stats.commands_rejected.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_oversized_command_closes_connection() {
        let harness = Harness::new();
        let limits = ConnectionLimits {
            max_command_size: 16,
            ..ConnectionLimits::default()
        };
        let mock = Builder::new()
            .read(b"SET key")
            .read(b"xxxxxxxxxxxxxxxxxxxxxxxx")
            .build();

        let result = harness.handler(mock, limits).run().await;
        assert!(matches!(
            result,
            Err(ConnectionError::BufferFull { max: 16, .. })
        ));
        assert!(harness.storage.is_empty());
    }

    #[tokio::test]
    async fn test_partial_command_at_eof() {
        let harness = Harness::new();
        let mock = Builder::new().read(b"GET").build();

        let result = harness.handler(mock, ConnectionLimits::default()).run().await;
        assert!(matches!(result, Err(ConnectionError::UnexpectedEof)));
    }

    #[tokio::test]
    async fn test_trailing_bytes_after_command_dropped() {
        let harness = Harness::new();
        let mock = Builder::new()
            .read(b"SET a 1 SET b 2")
            .write(b"OK\r\n")
            .build();

        let _ = harness.handler(mock, ConnectionLimits::default()).run().await;
        assert_eq!(harness.storage.get("a"), Some(Bytes::from("1")));
        assert_eq!(harness.storage.get("b"), None);
    }

    #[tokio::test]
    async fn test_resources_released_on_close() {
        let harness = Harness::new();
        let mock = Builder::new().read(b"SET k v").write(b"OK\r\n").build();

        let handler = harness.handler(mock, ConnectionLimits::default());
        assert_eq!(harness.stats.active_connections.load(Ordering::Relaxed), 1);
        assert_eq!(harness.pool.available(), 0);

        handle_connection(handler).await;

        assert_eq!(harness.stats.active_connections.load(Ordering::Relaxed), 0);
        assert_eq!(harness.pool.available(), 1);
    }

    #[tokio::test]
    async fn test_gate_timeout_skips_cycle() {
        let harness = Harness::new();
        let limits = ConnectionLimits {
            cycle_timeout: Duration::from_millis(20),
            ..ConnectionLimits::default()
        };
        let mock = Builder::new().read(b"GET k").write(b"(nil)\r\n").build();

        let handler = harness.handler(mock, limits);
        let held = Arc::clone(&handler.gate).acquire_owned().await.unwrap();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(100)).await;
            drop(held);
        });

        let result = handler.run().await;
        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
        assert_eq!(harness.stats.commands_processed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_blocked_reply() {
        let harness = Harness::new();
        harness.storage.set("big", Bytes::from(vec![b'x'; 4000]));
        let (mut client, server) = tokio::io::duplex(64);
        let task = tokio::spawn(harness.handler(server, ConnectionLimits::default()).run());

        // The client never reads, so the reply cannot drain
        client.write_all(b"GET big").await.unwrap();
        time::sleep(Duration::from_millis(50)).await;
        harness.notify.send(()).unwrap();

        let result = time::timeout(Duration::from_secs(1), task)
            .await
            .expect("handler did not stop")
            .unwrap();
        assert!(matches!(result, Err(ConnectionError::Cancelled)));
        assert_eq!(harness.stats.active_connections.load(Ordering::Relaxed), 0);
        assert_eq!(harness.pool.available(), 1);
        drop(client);
    }

    #[tokio::test]
    async fn test_shutdown_closes_idle_connection() {
        let harness = Harness::new();
        let (client, server) = tokio::io::duplex(64);

        let handler = harness.handler(server, ConnectionLimits::default());
        let task = tokio::spawn(handler.run());

        time::sleep(Duration::from_millis(50)).await;
        harness.notify.send(()).unwrap();

        let result = time::timeout(Duration::from_secs(1), task)
            .await
            .expect("handler did not stop")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(harness.stats.active_connections.load(Ordering::Relaxed), 0);
        assert_eq!(harness.pool.available(), 1);
        drop(client);
    }
}
