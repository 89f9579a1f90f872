//! Endpoint picker: the pool snapshot combined with the round-robin cursor.

use std::sync::Arc;

use crate::load_balancer::{endpoint::Endpoint, pool::EndpointPool, round_robin::RoundRobin};

/// Selects the next backend for a request.
///
/// Constructed once at startup and shared by every stream handler. Selection
/// loads the current snapshot and advances the cursor without suspending, so
/// it is a single step with respect to other streams.
#[derive(Debug)]
pub struct EndpointPicker {
    pool: Arc<EndpointPool>,
    balancer: RoundRobin,
}

impl EndpointPicker {
    pub fn new(pool: Arc<EndpointPool>) -> Self {
        Self {
            pool,
            balancer: RoundRobin::new(),
        }
    }

    /// Convenience constructor over a fixed endpoint list.
    pub fn with_endpoints(endpoints: Vec<Endpoint>) -> Self {
        Self::new(Arc::new(EndpointPool::with_endpoints(endpoints)))
    }

    /// Next endpoint, or `None` when nothing has been discovered yet.
    pub fn next(&self) -> Option<Endpoint> {
        let picked = self.pool.with_snapshot(|endpoints| self.balancer.next_endpoint(endpoints));
        match &picked {
            Some(endpoint) => tracing::trace!(endpoint = %endpoint, "Endpoint selected"),
            None => tracing::debug!("No endpoints available for selection"),
        }
        picked
    }

    pub fn pool(&self) -> &Arc<EndpointPool> {
        &self.pool
    }
}
