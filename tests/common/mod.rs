//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use endpoint_picker::config::{DiscoveryMode, PickerConfig};
use endpoint_picker::{Picker, Shutdown};
use envoy_types::pb::envoy::service::ext_proc::v3::external_processor_client::ExternalProcessorClient;
use envoy_types::pb::envoy::service::ext_proc::v3::processing_request::Request;
use envoy_types::pb::envoy::service::ext_proc::v3::processing_response::Response;
use envoy_types::pb::envoy::service::ext_proc::v3::{
    HttpBody, HttpHeaders, ProcessingRequest, ProcessingResponse,
};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tonic::transport::Channel;

/// A picker serving on an ephemeral port.
pub struct RunningPicker {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<()>,
}

impl RunningPicker {
    pub async fn client(&self) -> ExternalProcessorClient<Channel> {
        let channel = Channel::from_shared(format!("http://{}", self.addr))
            .unwrap()
            .connect()
            .await
            .unwrap();
        ExternalProcessorClient::new(channel)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .unwrap()
            .unwrap();
    }
}

/// Config for local mode with the given endpoints, bound to an ephemeral port.
pub fn local_config(endpoints: &[String]) -> PickerConfig {
    let mut config = PickerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.discovery.mode = DiscoveryMode::Local;
    config.discovery.local_endpoints = endpoints.to_vec();
    config
}

/// Config for cluster mode against a stand-in API server.
pub fn cluster_config(api_server: String) -> PickerConfig {
    let mut config = PickerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.discovery.api_server = Some(api_server);
    config.discovery.token_path = "/nonexistent/picker/token".to_string();
    config
}

pub async fn start_picker(config: PickerConfig) -> RunningPicker {
    let picker = Picker::build(config).await.unwrap();
    let listener = picker.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();

    let serve_shutdown = shutdown.clone();
    let handle = tokio::spawn(async move {
        picker.serve(listener, serve_shutdown).await.unwrap();
    });

    RunningPicker {
        addr,
        shutdown,
        handle,
    }
}

/// Run one ext_proc stream with the given messages and collect every response.
pub async fn exchange(
    client: &mut ExternalProcessorClient<Channel>,
    messages: Vec<ProcessingRequest>,
) -> Vec<ProcessingResponse> {
    let mut inbound = client
        .process(tokio_stream::iter(messages))
        .await
        .unwrap()
        .into_inner();

    let mut responses = Vec::new();
    while let Some(response) = inbound.message().await.unwrap() {
        responses.push(response);
    }
    responses
}

pub fn headers_request(end_of_stream: bool) -> ProcessingRequest {
    ProcessingRequest {
        request: Some(Request::RequestHeaders(HttpHeaders {
            end_of_stream,
            ..Default::default()
        })),
        ..Default::default()
    }
}

pub fn body_request(body: &[u8]) -> ProcessingRequest {
    ProcessingRequest {
        request: Some(Request::RequestBody(HttpBody {
            body: body.to_vec().into(),
            end_of_stream: true,
            ..Default::default()
        })),
        ..Default::default()
    }
}

/// Value of the target header in a header-mutation response.
pub fn routed_target(response: &ProcessingResponse) -> Option<String> {
    match &response.response {
        Some(Response::RequestHeaders(headers)) => headers
            .response
            .as_ref()?
            .header_mutation
            .as_ref()?
            .set_headers
            .iter()
            .filter_map(|option| option.header.as_ref())
            .find(|header| header.key == "x-inference-target")
            .map(|header| header.value.clone()),
        _ => None,
    }
}

/// Status and body of an immediate response.
pub fn immediate(response: &ProcessingResponse) -> Option<(i32, Vec<u8>)> {
    match &response.response {
        Some(Response::ImmediateResponse(immediate)) => Some((
            immediate.status.as_ref().map(|s| s.code).unwrap_or_default(),
            immediate.body.to_vec(),
        )),
        _ => None,
    }
}

/// A port with nothing listening on it.
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Backend that accepts one connection and never answers.
pub struct SilentBackend {
    pub addr: SocketAddr,
    /// Fires once the request connection is accepted.
    pub accepted: oneshot::Receiver<()>,
    /// Fires once the peer closes that connection.
    pub closed: oneshot::Receiver<()>,
}

pub async fn start_silent_backend() -> SilentBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (accepted_tx, accepted) = oneshot::channel();
    let (closed_tx, closed) = oneshot::channel();

    tokio::spawn(async move {
        if let Ok((mut socket, _)) = listener.accept().await {
            let _ = accepted_tx.send(());
            let mut buf = [0u8; 1024];
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
            let _ = closed_tx.send(());
        }
    });

    SilentBackend {
        addr,
        accepted,
        closed,
    }
}
