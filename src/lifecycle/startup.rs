//! Startup orchestration.
//!
//! # Responsibilities
//! - Build every subsystem from a validated configuration
//! - Run the initial discovery pass before traffic is accepted
//! - Start the background refresher and the gRPC server
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)
//! - An empty initial discovery is not fatal; streams get 503 until endpoints appear

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::{ConfigError, DiscoveryMode, PickerConfig};
use crate::discovery::{DiscoveryError, DiscoveryTask, KubernetesSource, StaticSource};
use crate::ext_proc::{PickerServer, PickerService, ResponseFactory, StreamProcessor};
use crate::forwarding::{ForwardError, Forwarder, HttpForwarder};
use crate::lifecycle::Shutdown;
use crate::load_balancer::{EndpointParseError, EndpointPicker, EndpointPool};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid local endpoint: {0}")]
    Endpoint(#[from] EndpointParseError),

    #[error("failed to set up discovery: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("failed to build forwarding client: {0}")]
    Forwarder(#[from] ForwardError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("gRPC server error: {0}")]
    Serve(#[from] tonic::transport::Error),
}

/// A fully wired picker, ready to bind and serve.
pub struct Picker {
    config: PickerConfig,
    picker: Arc<EndpointPicker>,
    refresher: Option<DiscoveryTask>,
    service: PickerService,
}

impl Picker {
    /// Wire subsystems and run the initial discovery pass.
    pub async fn build(config: PickerConfig) -> Result<Self, StartupError> {
        let forwarder: Arc<dyn Forwarder> = Arc::new(HttpForwarder::new(&config.forwarding)?);
        Self::build_with_forwarder(config, forwarder).await
    }

    /// Same as [`Picker::build`] with a caller-supplied forwarder.
    pub async fn build_with_forwarder(
        config: PickerConfig,
        forwarder: Arc<dyn Forwarder>,
    ) -> Result<Self, StartupError> {
        let pool = Arc::new(EndpointPool::new());

        let refresher = match config.discovery.mode {
            DiscoveryMode::Local => {
                let source = StaticSource::from_strings(&config.discovery.local_endpoints)?;
                pool.publish(source.endpoints().to_vec());
                tracing::info!(endpoints = ?source.endpoints(), "Local mode, using static endpoints");
                None
            }
            DiscoveryMode::Cluster => {
                let source = Arc::new(KubernetesSource::from_config(&config.discovery)?);
                tracing::info!(
                    url = %source.pods_url(),
                    interval_secs = config.discovery.refresh_interval_secs,
                    "Cluster mode, discovering pods"
                );
                let task = DiscoveryTask::new(
                    source,
                    pool.clone(),
                    Duration::from_secs(config.discovery.refresh_interval_secs),
                );
                let outcome = task.refresh_once().await;
                tracing::info!(?outcome, endpoints = pool.len(), "Initial discovery complete");
                Some(task)
            }
        };

        let picker = Arc::new(EndpointPicker::new(pool));
        let processor = Arc::new(StreamProcessor::new(
            picker.clone(),
            forwarder,
            ResponseFactory::new(&config.routing),
        ));

        Ok(Self {
            config,
            picker,
            refresher,
            service: PickerService::new(processor),
        })
    }

    pub fn picker(&self) -> &Arc<EndpointPicker> {
        &self.picker
    }

    pub fn config(&self) -> &PickerConfig {
        &self.config
    }

    /// Bind the configured listening address.
    pub async fn bind(&self) -> Result<TcpListener, StartupError> {
        let address = &self.config.listener.bind_address;
        TcpListener::bind(address)
            .await
            .map_err(|source| StartupError::Bind {
                address: address.clone(),
                source,
            })
    }

    /// Start the refresher and serve until `shutdown` fires.
    pub async fn serve(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), StartupError> {
        let refresher = self
            .refresher
            .map(|task| tokio::spawn(task.run(shutdown.signalled())));

        let server = PickerServer::new(self.service, &self.config.listener);
        let served = server.run(listener, shutdown.signalled()).await;

        // the server may have failed on its own; make sure the refresher stops too
        if !shutdown.is_triggered() {
            tracing::warn!("gRPC server stopped without a shutdown signal");
            shutdown.trigger();
        }
        if let Some(handle) = refresher {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Discovery refresher task failed");
            }
        }

        served?;
        tracing::info!("Shutdown complete");
        Ok(())
    }
}
