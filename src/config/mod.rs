//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize, defaults for missing fields)
//!     → loader.rs (LOCAL_MODE / LOCAL_ENDPOINTS overrides)
//!     → validation.rs (semantic checks)
//!     → PickerConfig (validated, immutable)
//!     → handed to startup, which builds every subsystem from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the endpoint set changes at runtime
//! - All fields have defaults so the picker runs with no file at all
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    DiscoveryConfig, DiscoveryMode, ForwardingConfig, ListenerConfig, LogFormat,
    ObservabilityConfig, PickerConfig, RoutingConfig,
};
pub use validation::ValidationError;
