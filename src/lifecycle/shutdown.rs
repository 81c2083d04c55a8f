//! Shutdown coordination for the proxy.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{broadcast, watch};

/// Coordinator for graceful shutdown and connection draining.
///
/// Shutdown is a two-phase handshake with the serve loop: [`Shutdown::trigger`]
/// broadcasts the stop signal, the loop stops accepting and drains its
/// in-flight connections, then reports back through [`Shutdown::mark_drained`],
/// which unblocks [`Shutdown::wait_drained`] callers. Receivers created before
/// the trigger are guaranteed to observe it.
pub struct Shutdown {
    trigger_tx: broadcast::Sender<()>,
    triggered: AtomicBool,
    drained_tx: watch::Sender<bool>,
    drained_rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (trigger_tx, _) = broadcast::channel(1);
        let (drained_tx, drained_rx) = watch::channel(false);

        Self {
            trigger_tx,
            triggered: AtomicBool::new(false),
            drained_tx,
            drained_rx,
        }
    }

    /// Subscribe to the stop signal. The serve loop must subscribe before it
    /// is observable as serving, or a racing trigger could go unheard.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.trigger_tx.subscribe()
    }

    /// Start a serve cycle: the drain is pending again until the loop exits.
    pub fn begin(&self) {
        self.triggered.store(false, Ordering::SeqCst);
        self.drained_tx.send_replace(false);
    }

    /// Broadcast the stop signal. Only the first trigger of a cycle sends;
    /// triggering with no subscribers is a no-op rather than an error.
    pub fn trigger(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            let _ = self.trigger_tx.send(());
        }
    }

    /// Whether shutdown has been requested for the current cycle.
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Report that the serve loop has exited and every tracked connection
    /// has finished.
    pub fn mark_drained(&self) {
        self.drained_tx.send_replace(true);
    }

    /// Wait until the serve loop reports its connections drained. Returns
    /// immediately when the drain has already completed.
    pub async fn wait_drained(&self) {
        let mut drained = self.drained_rx.clone();
        let _ = drained.wait_for(|done| *done).await;
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
