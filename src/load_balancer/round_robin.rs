//! Round-robin selection over an endpoint snapshot.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::load_balancer::endpoint::Endpoint;

/// Round-robin selector.
///
/// Holds the cursor shared by every stream. The cursor is only meaningful
/// relative to the slice it is applied to: it is reduced modulo the slice
/// length on every call, so a snapshot that grows or shrinks between calls
/// never produces an out-of-range index.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the endpoint at the cursor and advance the cursor by one.
    ///
    /// The read and the advance happen in a single compare-and-swap, so two
    /// concurrent callers never observe the same cursor value.
    pub fn next_endpoint(&self, endpoints: &[Endpoint]) -> Option<Endpoint> {
        let len = endpoints.len();
        if len == 0 {
            return None;
        }

        let previous = self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cursor| {
                Some((cursor % len + 1) % len)
            })
            .unwrap_or_else(|current| current);

        Some(endpoints[previous % len].clone())
    }

    /// Current cursor value.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }
}
