//! Periodic endpoint refresh.
//!
//! # Responsibilities
//! - Query the endpoint source on a fixed interval
//! - Publish non-empty results to the shared pool
//! - Keep the previous snapshot on failure or empty results

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant};

use crate::discovery::EndpointSource;
use crate::load_balancer::{EndpointPool, PublishOutcome};

/// Result of a single refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new endpoint list was published.
    Updated(usize),
    /// Discovery returned the same list that is already published.
    Unchanged(usize),
    /// Discovery returned nothing; the previous snapshot stays.
    EmptyKeptStale,
    /// Discovery failed; the previous snapshot stays.
    FailedKeptStale,
}

pub struct DiscoveryTask {
    source: Arc<dyn EndpointSource>,
    pool: Arc<EndpointPool>,
    interval: Duration,
}

impl DiscoveryTask {
    pub fn new(source: Arc<dyn EndpointSource>, pool: Arc<EndpointPool>, interval: Duration) -> Self {
        Self {
            source,
            pool,
            interval,
        }
    }

    /// Run one discovery pass against the source.
    pub async fn refresh_once(&self) -> RefreshOutcome {
        let discovered = match self.source.discover().await {
            Ok(endpoints) => endpoints,
            Err(e) => {
                tracing::warn!(
                    source = %self.source.describe(),
                    error = %e,
                    current = self.pool.len(),
                    "Endpoint discovery failed, keeping previous endpoints"
                );
                return RefreshOutcome::FailedKeptStale;
            }
        };

        let count = discovered.len();
        match self.pool.publish(discovered) {
            PublishOutcome::Updated => {
                let snapshot = self.pool.snapshot();
                tracing::info!(count, endpoints = ?snapshot, "Endpoint set updated");
                RefreshOutcome::Updated(count)
            }
            PublishOutcome::Unchanged => {
                tracing::trace!(endpoints = count, "Endpoint set unchanged");
                RefreshOutcome::Unchanged(count)
            }
            PublishOutcome::KeptStale => {
                tracing::warn!(
                    source = %self.source.describe(),
                    current = self.pool.len(),
                    "Discovery returned no endpoints, keeping previous endpoints"
                );
                RefreshOutcome::EmptyKeptStale
            }
        }
    }

    /// Refresh until `shutdown` resolves. The first tick fires one interval
    /// after start because startup already ran an initial pass.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            source = %self.source.describe(),
            "Discovery refresher starting"
        );

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh_once().await;
                }
                _ = &mut shutdown => {
                    tracing::info!("Discovery refresher received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
