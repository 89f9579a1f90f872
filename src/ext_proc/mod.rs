//! Envoy ext_proc v3 subsystem.
//!
//! # Data Flow
//! ```text
//! Envoy opens Process() stream (one per HTTP request)
//!     → service.rs spawns a task with its own span and stream id
//!     → processor.rs reads messages, state.rs classifies and transitions
//!         request headers → picker.next() → header mutation (x-inference-target)
//!                                         → or immediate 503 when no backend
//!         request body    → forwarding::Forwarder → immediate backend reply
//!                                                 → or immediate 500
//!         other phases    → empty acknowledgement
//!     → response.rs builds each ProcessingResponse
//! ```
//!
//! # Design Decisions
//! - One tokio task per stream; streams share only the picker
//! - Every failure converges to an immediate response, never a gRPC error

pub mod processor;
pub mod response;
pub mod server;
pub mod service;
pub mod state;

pub use processor::{StreamEnd, StreamProcessor};
pub use response::ResponseFactory;
pub use server::PickerServer;
pub use service::PickerService;
pub use state::{Action, Phase, StreamState};
