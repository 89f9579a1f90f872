//! Backend discovery subsystem.
//!
//! # Data Flow
//! ```text
//! Cluster mode (kubernetes.rs):
//!     API location: api_server → in-cluster env → kubeconfig (kubeconfig.rs)
//!     Periodic timer (refresher.rs)
//!     → GET /api/v1/pods?labelSelector=app=<pool>
//!     → keep Running pods with a pod IP
//!     → one endpoint per matching container port
//!     → pool.publish(new snapshot)
//!
//! Local mode (static_list.rs):
//!     configured list → pool.publish once at startup
//! ```
//!
//! # Design Decisions
//! - Discovery never runs on the request path; streams only read snapshots
//! - The API client is async so a slow API server stalls nothing but the refresher
//! - Failures and empty results keep the previous snapshot (stale over nothing)

pub mod kubeconfig;
pub mod kubernetes;
pub mod refresher;
pub mod static_list;

use async_trait::async_trait;
use thiserror::Error;

use crate::load_balancer::Endpoint;

pub use kubernetes::{ApiAccess, Credentials, KubernetesSource};
pub use refresher::{DiscoveryTask, RefreshOutcome};
pub use static_list::StaticSource;

/// Errors raised while discovering endpoints. Never surfaced to callers.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// No API URL is configured, the in-cluster environment is missing and no kubeconfig exists.
    #[error("Kubernetes API location unknown: {0}")]
    Environment(String),

    /// The kubeconfig could not be read or its current context is unusable.
    #[error("invalid kubeconfig {path}: {reason}")]
    Kubeconfig { path: String, reason: String },

    /// The API URL could not be built.
    #[error("invalid Kubernetes API URL: {0}")]
    Url(#[from] url::ParseError),

    /// The HTTP client could not be constructed.
    #[error("failed to build Kubernetes API client: {0}")]
    Client(String),

    /// Reading the service account token failed.
    #[error("failed to read credentials from {path}: {source}")]
    Credentials {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The request failed at the transport level or the body did not decode.
    #[error("Kubernetes API request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("Kubernetes API returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// A source of backend endpoints.
#[async_trait]
pub trait EndpointSource: Send + Sync {
    /// Discover the current endpoint list. An empty list is a valid answer.
    async fn discover(&self) -> Result<Vec<Endpoint>, DiscoveryError>;

    /// Short description used in logs.
    fn describe(&self) -> String;
}
