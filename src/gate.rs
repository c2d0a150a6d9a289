use crate::metrics::gauges;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Admits at most one active client when a limit is configured.
///
/// The gate tracks a bare count rather than connection identities: the relay
/// serves a single logical client, and the guard returned from
/// [`SessionGate::admit`] releases the slot exactly once when dropped.
pub struct SessionGate {
    active: AtomicUsize,
    limit: usize,
}

impl SessionGate {
    /// Create a gate with the given limit (0 = unlimited, >0 = one client).
    #[must_use]
    pub fn new(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            active: AtomicUsize::new(0),
            limit,
        })
    }

    /// Try to admit a client.
    ///
    /// Returns a guard holding the session slot, or `None` when another
    /// session is already active and a limit is configured.
    #[must_use]
    pub fn admit(self: &Arc<Self>) -> Option<SessionGuard> {
        let count = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        if self.limit > 0 && count > 1 {
            self.release();
            return None;
        }
        gauges::inc_sessions_active();
        Some(SessionGuard {
            gate: Arc::clone(self),
        })
    }

    /// Number of currently admitted sessions.
    #[must_use]
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    // Floored at zero so a stray release can never underflow the counter.
    fn release(&self) {
        let _ = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_sub(1))
            });
    }
}

/// Holds an admitted session slot; dropping it releases the slot.
pub struct SessionGuard {
    gate: Arc<SessionGate>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        debug!("session slot released");
        self.gate.release();
        gauges::dec_sessions_active();
    }
}
