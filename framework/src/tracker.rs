use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Inner {
    clients: Mutex<HashMap<u64, SocketAddr>>,
    idle: Condvar,
    next_id: AtomicU64,
}

/// The set of client connections whose handlers are still running.
#[derive(Debug, Clone, Default)]
pub struct ClientTracker {
    inner: Arc<Inner>,
}

impl ClientTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a client; it stays in the set until the guard is dropped.
    pub fn register(&self, peer: SocketAddr) -> ClientGuard {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.clients.lock().insert(id, peer);

        ClientGuard {
            id,
            peer,
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn peers(&self) -> Vec<SocketAddr> {
        self.inner.clients.lock().values().copied().collect()
    }

    /// Blocks until every registered client has finished. Returns at once
    /// when the set is already empty.
    pub fn wait_idle(&self) {
        let mut clients = self.inner.clients.lock();
        while !clients.is_empty() {
            self.inner.idle.wait(&mut clients);
        }
    }
}

/// Membership of one client in a [`ClientTracker`]. Removal happens on drop,
/// including during unwinding.
#[derive(Debug)]
pub struct ClientGuard {
    id: u64,
    peer: SocketAddr,
    inner: Arc<Inner>,
}

impl ClientGuard {
    pub const fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        let mut clients = self.inner.clients.lock();
        clients.remove(&self.id);
        if clients.is_empty() {
            self.inner.idle.notify_all();
        }
    }
}
