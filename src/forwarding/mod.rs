//! Body forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! Stream processor (body phase, target already chosen)
//!     → Forwarder::forward(target, body)
//!     → POST http://<target>/v1/completions (Content-Type: application/json)
//!     → BackendReply { status, body }   relayed verbatim, any status
//!     → ForwardError                    transport failure, becomes a 500
//! ```
//!
//! # Design Decisions
//! - One attempt per body; no retries
//! - Backend statuses are never interpreted, 4xx/5xx included
//! - The request future is owned by the stream task, so dropping the task
//!   aborts the call and releases its connection

pub mod client;

use async_trait::async_trait;
use thiserror::Error;

use crate::load_balancer::Endpoint;

pub use client::HttpForwarder;

/// Status and raw body returned by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendReply {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Transport-level failure contacting a backend.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid backend URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Sends a request body to a chosen backend.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, target: &Endpoint, body: Vec<u8>) -> Result<BackendReply, ForwardError>;
}
