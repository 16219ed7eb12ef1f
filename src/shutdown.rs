//! Shutdown signalling for connection tasks.

use tokio::sync::broadcast;

/// Listens for the server shutdown signal.
///
/// The listener owns the `broadcast::Sender`; every connection task holds a
/// `Shutdown` built from a subscribed receiver. A sent value or a dropped
/// sender both count as the signal.
#[derive(Debug)]
pub struct Shutdown {
    /// `true` once the signal has been received
    shutdown: bool,

    /// Receiving half of the broadcast channel
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Creates a `Shutdown` backed by the given receiver.
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    /// Returns `true` if the shutdown signal has been received.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Waits for the shutdown signal.
    ///
    /// Cancel safe: dropping the future before it completes loses nothing.
    pub async fn recv(&mut self) {
        if self.shutdown {
            return;
        }

        // Only one value is ever sent, so lagging is impossible
        let _ = self.notify.recv().await;

        self.shutdown = true;
    }
}
