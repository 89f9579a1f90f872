//! Envoy ext_proc endpoint picker library.

pub mod config;
pub mod discovery;
pub mod ext_proc;
pub mod forwarding;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;

pub use config::schema::PickerConfig;
pub use ext_proc::PickerService;
pub use lifecycle::{Picker, Shutdown};
