//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! discovery refresher
//!     → pool.rs (publish new snapshot, keep stale on empty)
//!
//! header-phase message
//!     → picker.rs (load current snapshot)
//!     → round_robin.rs (pick at cursor, advance cursor)
//!     → endpoint.rs (host:port written into the routing header)
//! ```
//!
//! # Design Decisions
//! - Snapshots are immutable; discovery swaps a whole `Vec` in via `ArcSwap`
//! - The cursor is shared by all streams and advanced with one CAS
//! - Selection never awaits, so it cannot interleave with another stream

pub mod endpoint;
pub mod picker;
pub mod pool;
pub mod round_robin;

pub use endpoint::{Endpoint, EndpointParseError};
pub use picker::EndpointPicker;
pub use pool::{EndpointPool, PublishOutcome};
pub use round_robin::RoundRobin;
