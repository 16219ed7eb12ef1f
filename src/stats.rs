//! Server Statistics
//!
//! Connection and operation counters shared by the listener and every
//! connection task, plus the [`OperationSink`] trait the command handler
//! reports into.

use crate::protocol::CommandKind;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::trace;

/// Receives a record of every dispatched operation.
///
/// Implementations must not fail or block; the protocol never waits on
/// the sink.
pub trait OperationSink: Send + Sync {
    /// Records one completed operation and how long it took.
    fn record_operation(&self, kind: CommandKind, elapsed: Duration);
}

/// A sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl OperationSink for NoopSink {
    fn record_operation(&self, _kind: CommandKind, _elapsed: Duration) {}
}

/// Count and cumulative latency for one operation kind.
#[derive(Debug, Default)]
pub struct OperationStats {
    pub count: AtomicU64,
    pub total_micros: AtomicU64,
}

impl OperationStats {
    fn record(&self, elapsed: Duration) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Average latency in microseconds, or 0 when nothing was recorded.
    pub fn average_micros(&self) -> u64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            0
        } else {
            self.total_micros.load(Ordering::Relaxed) / count
        }
    }
}

/// Statistics for the whole server
#[derive(Debug, Default)]
pub struct ServerStats {
    /// Total number of connections admitted
    pub connections_accepted: AtomicU64,
    /// Connections closed because no admission slot freed up in time
    pub connections_rejected: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Commands answered with the error reply
    pub commands_rejected: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,

    /// Per-kind operation timings
    pub get_ops: OperationStats,
    pub set_ops: OperationStats,
    pub delete_ops: OperationStats,
}

impl ServerStats {
    /// Creates zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts an admitted connection as accepted and active.
    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Marks one active connection as gone.
    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Counts a connection closed without admission.
    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a dispatched command.
    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a command answered with the error reply.
    pub fn command_rejected(&self) {
        self.commands_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds to the bytes read from clients.
    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Adds to the bytes written to clients.
    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

impl OperationSink for ServerStats {
    fn record_operation(&self, kind: CommandKind, elapsed: Duration) {
        match kind {
            CommandKind::Get => self.get_ops.record(elapsed),
            CommandKind::Set => self.set_ops.record(elapsed),
            CommandKind::Delete => self.delete_ops.record(elapsed),
            CommandKind::Invalid => {}
        }
        trace!(operation = kind.as_str(), elapsed_us = elapsed.as_micros() as u64, "Operation recorded");
    }
}

impl fmt::Display for ServerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "accepted={} rejected={} active={} commands={} errors={} read={}B written={}B \
             get={} ({}us avg) set={} ({}us avg) delete={} ({}us avg)",
            self.connections_accepted.load(Ordering::Relaxed),
            self.connections_rejected.load(Ordering::Relaxed),
            self.active_connections.load(Ordering::Relaxed),
            self.commands_processed.load(Ordering::Relaxed),
            self.commands_rejected.load(Ordering::Relaxed),
            self.bytes_read.load(Ordering::Relaxed),
            self.bytes_written.load(Ordering::Relaxed),
            self.get_ops.count.load(Ordering::Relaxed),
            self.get_ops.average_micros(),
            self.set_ops.count.load(Ordering::Relaxed),
            self.set_ops.average_micros(),
            self.delete_ops.count.load(Ordering::Relaxed),
            self.delete_ops.average_micros(),
        )
    }
}
