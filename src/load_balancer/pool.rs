//! Endpoint pool management.
//!
//! # Responsibilities
//! - Hold the latest published endpoint snapshot
//! - Replace the snapshot wholesale on successful discovery
//! - Keep the last known-good snapshot when discovery comes back empty

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::load_balancer::endpoint::Endpoint;

/// Outcome of publishing a discovery result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The snapshot was replaced with different contents.
    Updated,
    /// The discovered set matched the current snapshot.
    Unchanged,
    /// The discovered set was empty; the previous snapshot stays in force.
    KeptStale,
}

/// Shared, immutable-snapshot view of the backend pool.
///
/// Readers get an `Arc` to the current `Vec` without locking; writers swap in
/// a new `Vec`. A snapshot is never mutated after it is published.
#[derive(Debug)]
pub struct EndpointPool {
    snapshot: ArcSwap<Vec<Endpoint>>,
}

impl EndpointPool {
    /// Create an empty pool. Selection returns nothing until the first publish.
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Create a pool seeded with a fixed set of endpoints.
    pub fn with_endpoints(endpoints: Vec<Endpoint>) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(endpoints),
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<Vec<Endpoint>> {
        self.snapshot.load_full()
    }

    /// Run `f` against the current snapshot without cloning the `Arc`.
    pub fn with_snapshot<R>(&self, f: impl FnOnce(&[Endpoint]) -> R) -> R {
        let guard = self.snapshot.load();
        f(guard.as_slice())
    }

    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }

    /// Publish a freshly discovered endpoint set.
    ///
    /// An empty set never replaces a populated snapshot: a stale backend is
    /// preferred over routing nothing.
    pub fn publish(&self, endpoints: Vec<Endpoint>) -> PublishOutcome {
        if endpoints.is_empty() {
            return PublishOutcome::KeptStale;
        }

        if self.snapshot.load().as_slice() == endpoints.as_slice() {
            return PublishOutcome::Unchanged;
        }

        self.snapshot.store(Arc::new(endpoints));
        PublishOutcome::Updated
    }
}

impl Default for EndpointPool {
    fn default() -> Self {
        Self::new()
    }
}
