//! Fixed endpoint list for local mode.

use async_trait::async_trait;

use crate::discovery::{DiscoveryError, EndpointSource};
use crate::load_balancer::{Endpoint, EndpointParseError};

/// Returns the same operator-supplied endpoints on every call.
#[derive(Debug, Clone)]
pub struct StaticSource {
    endpoints: Vec<Endpoint>,
}

impl StaticSource {
    pub fn new(endpoints: Vec<Endpoint>) -> Self {
        Self { endpoints }
    }

    /// Build from raw `host:port` strings (as found in configuration).
    pub fn from_strings<S: AsRef<str>>(raw: &[S]) -> Result<Self, EndpointParseError> {
        let endpoints = raw
            .iter()
            .map(|s| s.as_ref().parse())
            .collect::<Result<Vec<Endpoint>, _>>()?;
        Ok(Self::new(endpoints))
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }
}

#[async_trait]
impl EndpointSource for StaticSource {
    async fn discover(&self) -> Result<Vec<Endpoint>, DiscoveryError> {
        Ok(self.endpoints.clone())
    }

    fn describe(&self) -> String {
        format!("static list ({} endpoints)", self.endpoints.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_source_returns_configured_list() {
        let source = StaticSource::from_strings(&["localhost:8000", "localhost:8001"]).unwrap();
        let found = source.discover().await.unwrap();

        assert_eq!(found, vec![Endpoint::new("localhost", 8000), Endpoint::new("localhost", 8001)]);
        assert_eq!(source.describe(), "static list (2 endpoints)");
    }

    #[test]
    fn test_static_source_rejects_bad_entry() {
        assert!(StaticSource::from_strings(&["localhost"]).is_err());
    }
}
