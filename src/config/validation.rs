//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, addresses parse)
//! - Check local endpoints parse as `host:port` (local mode only)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PickerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{DiscoveryMode, PickerConfig};
use crate::load_balancer::Endpoint;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("listener.max_concurrent_streams must be greater than 0")]
    ZeroStreams,

    #[error("discovery.refresh_interval_secs must be greater than 0")]
    ZeroRefreshInterval,

    #[error("discovery.request_timeout_secs must be greater than 0")]
    ZeroRequestTimeout,

    #[error("discovery.label_selector must not be empty")]
    EmptySelector,

    #[error("discovery.api_server '{0}' is not a valid URL")]
    ApiServer(String),

    #[error("discovery.local_endpoints must not be empty in local mode")]
    NoLocalEndpoints,

    #[error("discovery.local_endpoints: {0}")]
    LocalEndpoint(String),

    #[error("forwarding.completions_path '{0}' must start with '/'")]
    CompletionsPath(String),

    #[error("forwarding.timeout_secs must be greater than 0 when set")]
    ZeroForwardTimeout,

    #[error("routing.target_header '{0}' must be a non-empty lower-case header name")]
    TargetHeader(String),
}

/// Validate a fully loaded configuration, collecting every error.
pub fn validate_config(config: &PickerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if config.listener.max_concurrent_streams == 0 {
        errors.push(ValidationError::ZeroStreams);
    }

    let discovery = &config.discovery;
    if discovery.refresh_interval_secs == 0 {
        errors.push(ValidationError::ZeroRefreshInterval);
    }
    if discovery.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }
    if discovery.label_selector.trim().is_empty() {
        errors.push(ValidationError::EmptySelector);
    }
    if let Some(api_server) = &discovery.api_server {
        if url::Url::parse(api_server).is_err() {
            errors.push(ValidationError::ApiServer(api_server.clone()));
        }
    }

    // the local list is ignored in cluster mode
    if discovery.mode == DiscoveryMode::Local {
        for raw in &discovery.local_endpoints {
            if let Err(e) = raw.parse::<Endpoint>() {
                errors.push(ValidationError::LocalEndpoint(e.to_string()));
            }
        }
        if discovery.local_endpoints.is_empty() {
            errors.push(ValidationError::NoLocalEndpoints);
        }
    }

    if !config.forwarding.completions_path.starts_with('/') {
        errors.push(ValidationError::CompletionsPath(
            config.forwarding.completions_path.clone(),
        ));
    }
    if config.forwarding.timeout_secs == Some(0) {
        errors.push(ValidationError::ZeroForwardTimeout);
    }

    let header = &config.routing.target_header;
    let header_ok = !header.is_empty()
        && header
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if !header_ok {
        errors.push(ValidationError::TargetHeader(header.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
