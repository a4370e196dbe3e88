//! Relay statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the event loop and readable from anywhere.
#[derive(Debug, Default)]
pub struct ProxyStats {
    /// Clients accepted into a slot.
    pub connections_accepted: AtomicU64,
    /// Clients closed on accept because the table was full.
    pub connections_rejected: AtomicU64,
    /// Clients currently holding a slot.
    pub connections_active: AtomicU64,
    /// Slots freed (EOF, client error, or backend teardown).
    pub connections_closed: AtomicU64,
    /// Request/reply exchanges completed.
    pub requests_relayed: AtomicU64,
    /// Exchanges abandoned because the backend did not reply in time.
    pub reply_timeouts: AtomicU64,
    /// Client-local failures, timeouts included.
    pub client_errors: AtomicU64,
    /// Backend-fatal failures.
    pub backend_failures: AtomicU64,
    /// Successful backend reconnects.
    pub backend_reconnects: AtomicU64,
    /// Bytes forwarded to the backend.
    pub bytes_to_backend: AtomicU64,
    /// Bytes relayed back to clients.
    pub bytes_from_backend: AtomicU64,
    /// Late reply bytes dropped before forwarding a new request.
    pub stale_bytes_discarded: AtomicU64,
}

impl ProxyStats {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn slot_opened(&self) {
        Self::incr(&self.connections_accepted);
        Self::incr(&self.connections_active);
    }

    pub(crate) fn slots_closed(&self, n: usize) {
        self.connections_active.fetch_sub(n as u64, Ordering::Relaxed);
        Self::add(&self.connections_closed, n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_accounting() {
        let stats = ProxyStats::default();
        stats.slot_opened();
        stats.slot_opened();
        stats.slots_closed(2);

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 2);
        assert_eq!(stats.connections_active.load(Ordering::Relaxed), 0);
        assert_eq!(stats.connections_closed.load(Ordering::Relaxed), 2);
    }
}
