//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the picker.
//! All types derive `Deserialize` for loading from config files.

use serde::Deserialize;

/// Root configuration for the endpoint picker.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PickerConfig {
    /// gRPC listener configuration.
    pub listener: ListenerConfig,

    /// Backend discovery settings.
    pub discovery: DiscoveryConfig,

    /// Body forwarding settings.
    pub forwarding: ForwardingConfig,

    /// Routing header settings.
    pub routing: RoutingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address for the ext_proc gRPC service (e.g., "0.0.0.0:9002").
    pub bind_address: String,

    /// Maximum concurrent HTTP/2 streams per proxy connection (backpressure).
    pub max_concurrent_streams: u32,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9002".to_string(),
            max_concurrent_streams: 1024,
        }
    }
}

/// Where backend endpoints come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    /// List pods from the Kubernetes API.
    #[default]
    Cluster,
    /// Use `local_endpoints` as-is; no external calls.
    Local,
}

/// Backend discovery configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Discovery mode.
    pub mode: DiscoveryMode,

    /// Label selector identifying the pool's pods.
    pub label_selector: String,

    /// Restrict the pod listing to one namespace (all namespaces when unset).
    pub namespace: Option<String>,

    /// Container port name accepted as a serving port.
    pub port_name: String,

    /// Container port number accepted as a serving port.
    pub service_port: u16,

    /// Interval between discovery refreshes in seconds.
    pub refresh_interval_secs: u64,

    /// Timeout for a single Kubernetes API call in seconds.
    pub request_timeout_secs: u64,

    /// Explicit API server URL (e.g., a `kubectl proxy` at http://127.0.0.1:8001).
    /// When unset, the in-cluster service environment is used.
    pub api_server: Option<String>,

    /// Service account token file; read on every refresh when present.
    pub token_path: String,

    /// Cluster CA bundle used for https API servers.
    pub ca_cert_path: String,

    /// Static endpoints used in local mode.
    pub local_endpoints: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            mode: DiscoveryMode::Cluster,
            label_selector: "app=vllm-mistral".to_string(),
            namespace: None,
            port_name: "http".to_string(),
            service_port: 8000,
            refresh_interval_secs: 5,
            request_timeout_secs: 10,
            api_server: None,
            token_path: "/var/run/secrets/kubernetes.io/serviceaccount/token".to_string(),
            ca_cert_path: "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt".to_string(),
            local_endpoints: vec!["localhost:8000".to_string()],
        }
    }
}

/// Forwarding configuration for body-phase messages.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForwardingConfig {
    /// Backend path receiving forwarded bodies.
    pub completions_path: String,

    /// Total request timeout in seconds. Unset means the transport default.
    pub timeout_secs: Option<u64>,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            completions_path: "/v1/completions".to_string(),
            timeout_secs: None,
        }
    }
}

/// Routing header configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Header carrying the selected `host:port` back to the proxy.
    pub target_header: String,

    /// Ask the proxy to recompute its route after the header mutation.
    pub clear_route_cache: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            target_header: "x-inference-target".to_string(),
            clear_route_cache: false,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}
