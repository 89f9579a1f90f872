//! HTTP forwarder built on `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;

use crate::config::ForwardingConfig;
use crate::forwarding::{BackendReply, ForwardError, Forwarder};
use crate::load_balancer::Endpoint;

pub struct HttpForwarder {
    client: reqwest::Client,
    completions_path: String,
}

impl HttpForwarder {
    pub fn new(config: &ForwardingConfig) -> Result<Self, ForwardError> {
        // no idle pooling: each forward owns its connection for the stream's lifetime
        let mut builder = reqwest::Client::builder().pool_max_idle_per_host(0);
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            client: builder.build()?,
            completions_path: config.completions_path.clone(),
        })
    }

    /// Full URL a body for `target` is posted to.
    pub fn url_for(&self, target: &Endpoint) -> String {
        format!("{}{}", target.base_url(), self.completions_path)
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, target: &Endpoint, body: Vec<u8>) -> Result<BackendReply, ForwardError> {
        let url = self.url_for(target);
        let parsed = reqwest::Url::parse(&url).map_err(|e| ForwardError::InvalidUrl {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        tracing::debug!(url = %parsed, bytes = body.len(), "Forwarding body to backend");

        let response = self
            .client
            .post(parsed)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        tracing::debug!(%target, status, bytes = body.len(), "Backend replied");

        Ok(BackendReply { status, body })
    }
}
