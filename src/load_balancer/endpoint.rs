//! Backend endpoint abstraction.
//!
//! # Responsibilities
//! - Represent a single model-serving backend as `host:port`
//! - Parse endpoints from configuration and discovery results
//! - Render the canonical string used in the routing header and backend URLs

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use thiserror::Error;

/// Errors produced when parsing an endpoint string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointParseError {
    #[error("endpoint '{0}' is missing a ':port' suffix")]
    MissingPort(String),

    #[error("endpoint '{0}' has an empty host")]
    EmptyHost(String),

    #[error("endpoint '{input}' has an invalid port '{port}'")]
    InvalidPort { input: String, port: String },
}

/// A single backend address.
///
/// Immutable once built. Two endpoints are equal when their rendered
/// `host:port` strings are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint from a host (name, IPv4 or bare IPv6) and a port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base URL for plain-HTTP calls to this endpoint, e.g. `http://10.0.0.7:8000`.
    pub fn base_url(&self) -> String {
        format!("http://{}", self)
    }

    fn is_ipv6(&self) -> bool {
        matches!(self.host.parse::<IpAddr>(), Ok(IpAddr::V6(_)))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ipv6() {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = EndpointParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let (host, port) = input
            .rsplit_once(':')
            .ok_or_else(|| EndpointParseError::MissingPort(input.to_string()))?;

        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(EndpointParseError::EmptyHost(input.to_string()));
        }

        let port = port.parse::<u16>().map_err(|_| EndpointParseError::InvalidPort {
            input: input.to_string(),
            port: port.to_string(),
        })?;

        Ok(Self::new(host, port))
    }
}
