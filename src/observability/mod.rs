//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!     → ext_proc_stream spans (stream id, :path, x-request-id)
//!     → grpc spans from the tonic server
//!
//! logging.rs:
//!     EnvFilter → fmt layer (pretty or JSON) → stdout
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Stream id flows through every event of a stream via its span
//! - No metrics endpoint; the picker exposes a single listening port

pub mod logging;
