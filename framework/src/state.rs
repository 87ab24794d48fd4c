use crossbeam::channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cloneable trigger for graceful shutdown of a running server.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    accepting: Arc<AtomicBool>,
    wake_tx: Sender<()>,
}

impl ShutdownHandle {
    /// Clears the `accepting` flag. Returns `true` only for the call that
    /// actually flipped it.
    pub fn stop(&self) -> bool {
        let flipped = self.accepting.swap(false, Ordering::SeqCst);
        if flipped {
            // Wakes the accept loop out of its back-off; a full or closed
            // channel means nobody is waiting.
            let _ = self.wake_tx.try_send(());
        }
        flipped
    }

    pub fn is_stopped(&self) -> bool {
        !self.accepting.load(Ordering::SeqCst)
    }
}

/// The dispatcher's `accepting` flag plus the wake-up side of its back-off.
#[derive(Debug)]
pub(crate) struct RunningState {
    handle: ShutdownHandle,
    wake_rx: Receiver<()>,
}

impl RunningState {
    pub(crate) fn new() -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            handle: ShutdownHandle {
                accepting: Arc::new(AtomicBool::new(true)),
                wake_tx,
            },
            wake_rx,
        }
    }

    pub(crate) fn handle(&self) -> ShutdownHandle {
        self.handle.clone()
    }

    pub(crate) fn is_accepting(&self) -> bool {
        !self.handle.is_stopped()
    }

    /// Sleeps for `interval` or until a stop is requested, whichever is
    /// first.
    pub(crate) fn back_off(&self, interval: Duration) {
        let _ = self.wake_rx.recv_timeout(interval);
    }
}
