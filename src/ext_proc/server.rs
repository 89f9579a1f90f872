//! gRPC server hosting the picker service.
//!
//! # Responsibilities
//! - Register the ext_proc service on a tonic server
//! - Apply per-connection stream limits
//! - Serve until the shutdown signal, then drain in-flight streams

use std::future::Future;

use envoy_types::pb::envoy::service::ext_proc::v3::external_processor_server::ExternalProcessorServer;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

use crate::config::ListenerConfig;
use crate::ext_proc::service::PickerService;

pub struct PickerServer {
    service: PickerService,
    max_concurrent_streams: u32,
}

impl PickerServer {
    pub fn new(service: PickerService, config: &ListenerConfig) -> Self {
        Self {
            service,
            max_concurrent_streams: config.max_concurrent_streams,
        }
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), tonic::transport::Error>
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "ext_proc server starting");
        }

        Server::builder()
            .trace_fn(|request| {
                tracing::info_span!("grpc", path = %request.uri().path())
            })
            .max_concurrent_streams(Some(self.max_concurrent_streams))
            .add_service(ExternalProcessorServer::new(self.service))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
            .await?;

        tracing::info!("ext_proc server stopped");
        Ok(())
    }
}
