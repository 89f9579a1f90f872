//! Stream processor: drives one ext_proc stream from first message to close.
//!
//! # Responsibilities
//! - Classify inbound messages and run them through the state machine
//! - Perform the forward call the state machine asks for
//! - Convert every outcome into a well-formed response
//! - Stop promptly when the proxy goes away
//!
//! # Design Decisions
//! - Errors never become gRPC statuses; the proxy always gets an HTTP answer
//! - Suspension points are the next inbound message and the forward call,
//!   and both race against the outbound channel closing
//! - Selection happens inside `StreamState::advance`, which never awaits

use std::sync::Arc;

use envoy_types::pb::envoy::service::ext_proc::v3::{ProcessingRequest, ProcessingResponse};
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};
use tonic::Status;

use crate::ext_proc::response::ResponseFactory;
use crate::ext_proc::state::{Action, Phase, StreamState};
use crate::forwarding::Forwarder;
use crate::load_balancer::{Endpoint, EndpointPicker};

/// Sender half handed to the gRPC layer.
pub type Outbound = mpsc::Sender<Result<ProcessingResponse, Status>>;

/// How a stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// An immediate response was sent.
    Completed,
    /// The proxy finished sending without needing an immediate response.
    InboundClosed,
    /// The proxy reset the stream or stopped reading responses.
    Cancelled,
}

pub struct StreamProcessor {
    picker: Arc<EndpointPicker>,
    forwarder: Arc<dyn Forwarder>,
    responses: ResponseFactory,
}

impl StreamProcessor {
    pub fn new(
        picker: Arc<EndpointPicker>,
        forwarder: Arc<dyn Forwarder>,
        responses: ResponseFactory,
    ) -> Self {
        Self {
            picker,
            forwarder,
            responses,
        }
    }

    pub fn picker(&self) -> &Arc<EndpointPicker> {
        &self.picker
    }

    /// Process one stream until it terminates, the proxy closes it, or the
    /// outbound side is dropped.
    pub async fn run<S>(&self, mut inbound: S, outbound: Outbound) -> StreamEnd
    where
        S: Stream<Item = Result<ProcessingRequest, Status>> + Unpin,
    {
        let mut state = StreamState::default();

        loop {
            let message = tokio::select! {
                message = inbound.next() => message,
                _ = outbound.closed() => {
                    tracing::debug!("Proxy stopped reading, abandoning stream");
                    return StreamEnd::Cancelled;
                }
            };

            let message = match message {
                Some(Ok(message)) => message,
                Some(Err(status)) => {
                    tracing::debug!(code = ?status.code(), message = %status.message(), "Inbound stream error");
                    return StreamEnd::Cancelled;
                }
                None => {
                    tracing::debug!(state = ?state, "Inbound stream closed");
                    return StreamEnd::InboundClosed;
                }
            };

            let phase = Phase::from(message);
            if let Phase::RequestHeaders {
                path, request_id, ..
            } = &phase
            {
                let span = tracing::Span::current();
                if let Some(path) = path {
                    span.record("path", path.as_str());
                }
                if let Some(request_id) = request_id {
                    span.record("request_id", request_id.as_str());
                }
            }

            let response = match state.advance(phase, &self.picker) {
                Action::Ignore => continue,
                Action::RouteTo(target) => {
                    tracing::debug!(%target, "Routing by header");
                    self.responses.route_to(&target)
                }
                Action::NoBackend => {
                    tracing::warn!("No backend available, replying 503");
                    self.responses.service_unavailable()
                }
                Action::Ack(kind) => {
                    tracing::trace!(?kind, "Acknowledging phase");
                    self.responses.ack(kind)
                }
                Action::Forward { target, body } => tokio::select! {
                    response = self.forward(&target, body) => response,
                    _ = outbound.closed() => {
                        tracing::info!(%target, "Proxy closed stream during forward, abandoning call");
                        return StreamEnd::Cancelled;
                    }
                },
            };

            if outbound.send(Ok(response)).await.is_err() {
                tracing::debug!("Outbound channel closed before response was sent");
                return StreamEnd::Cancelled;
            }

            if state.is_terminal() {
                return StreamEnd::Completed;
            }
        }
    }

    async fn forward(&self, target: &Endpoint, body: Vec<u8>) -> ProcessingResponse {
        match self.forwarder.forward(target, body).await {
            Ok(reply) => {
                tracing::info!(%target, status = reply.status, "Relayed backend reply");
                self.responses.forwarded(reply)
            }
            Err(e) => {
                tracing::warn!(%target, error = %e, "Forwarding failed, replying 500");
                self.responses.forwarding_failed(&e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoutingConfig;
    use crate::forwarding::{BackendReply, ForwardError};
    use async_trait::async_trait;
    use envoy_types::pb::envoy::service::ext_proc::v3::processing_request::Request;
    use envoy_types::pb::envoy::service::ext_proc::v3::processing_response::Response;
    use envoy_types::pb::envoy::service::ext_proc::v3::{HttpBody, HttpHeaders};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Records calls and replies with a fixed outcome.
    struct RecordingForwarder {
        calls: Mutex<Vec<(Endpoint, Vec<u8>)>>,
        fail: bool,
    }

    impl RecordingForwarder {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        fn calls(&self) -> Vec<(Endpoint, Vec<u8>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Forwarder for RecordingForwarder {
        async fn forward(&self, target: &Endpoint, body: Vec<u8>) -> Result<BackendReply, ForwardError> {
            self.calls.lock().unwrap().push((target.clone(), body));
            if self.fail {
                Err(ForwardError::InvalidUrl {
                    url: target.base_url(),
                    reason: "connection refused".to_string(),
                })
            } else {
                Ok(BackendReply {
                    status: 200,
                    body: br#"{"ok":true}"#.to_vec(),
                })
            }
        }
    }

    /// Never completes; flags when its future is dropped.
    struct HangingForwarder {
        started: Arc<Notify>,
        dropped: Arc<AtomicBool>,
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Forwarder for HangingForwarder {
        async fn forward(&self, _target: &Endpoint, _body: Vec<u8>) -> Result<BackendReply, ForwardError> {
            let _flag = DropFlag(self.dropped.clone());
            self.started.notify_one();
            std::future::pending().await
        }
    }

    fn processor(names: &[&str], forwarder: Arc<dyn Forwarder>) -> StreamProcessor {
        let picker = EndpointPicker::with_endpoints(names.iter().map(|n| n.parse().unwrap()).collect());
        StreamProcessor::new(
            Arc::new(picker),
            forwarder,
            ResponseFactory::new(&RoutingConfig::default()),
        )
    }

    fn headers_msg(end_of_stream: bool) -> Result<ProcessingRequest, Status> {
        Ok(ProcessingRequest {
            request: Some(Request::RequestHeaders(HttpHeaders {
                end_of_stream,
                ..Default::default()
            })),
            ..Default::default()
        })
    }

    fn body_msg(body: &[u8]) -> Result<ProcessingRequest, Status> {
        Ok(ProcessingRequest {
            request: Some(Request::RequestBody(HttpBody {
                body: body.to_vec().into(),
                end_of_stream: true,
                ..Default::default()
            })),
            ..Default::default()
        })
    }

    async fn run_stream(
        processor: &StreamProcessor,
        messages: Vec<Result<ProcessingRequest, Status>>,
    ) -> (StreamEnd, Vec<ProcessingResponse>) {
        let (tx, mut rx) = mpsc::channel(16);
        let end = processor.run(tokio_stream::iter(messages), tx).await;

        let mut responses = Vec::new();
        while let Some(response) = rx.recv().await {
            responses.push(response.unwrap());
        }
        (end, responses)
    }

    fn routed_target(response: &ProcessingResponse) -> String {
        match &response.response {
            Some(Response::RequestHeaders(headers)) => headers
                .response
                .as_ref()
                .and_then(|common| common.header_mutation.as_ref())
                .and_then(|mutation| mutation.set_headers.first())
                .and_then(|option| option.header.as_ref())
                .map(|header| header.value.clone())
                .unwrap_or_default(),
            other => panic!("expected header mutation, got {:?}", other),
        }
    }

    fn immediate(response: &ProcessingResponse) -> (i32, Vec<u8>) {
        match &response.response {
            Some(Response::ImmediateResponse(immediate)) => (
                immediate.status.as_ref().map(|s| s.code).unwrap_or_default(),
                immediate.body.to_vec(),
            ),
            other => panic!("expected immediate response, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_header_only_requests_rotate() {
        let forwarder = RecordingForwarder::ok();
        let processor = processor(&["a:8000", "b:8000", "c:8000"], forwarder.clone());

        let mut targets = Vec::new();
        for _ in 0..4 {
            let (end, responses) = run_stream(&processor, vec![headers_msg(true)]).await;
            assert_eq!(end, StreamEnd::InboundClosed);
            assert_eq!(responses.len(), 1);
            targets.push(routed_target(&responses[0]));
        }

        assert_eq!(targets, ["a:8000", "b:8000", "c:8000", "a:8000"]);
        assert!(forwarder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_pool_replies_503() {
        let forwarder = RecordingForwarder::ok();
        let processor = processor(&[], forwarder.clone());

        for _ in 0..3 {
            let (end, responses) =
                run_stream(&processor, vec![headers_msg(false), body_msg(b"{}")]).await;
            assert_eq!(end, StreamEnd::Completed);
            assert_eq!(responses.len(), 1);
            let (status, body) = immediate(&responses[0]);
            assert_eq!(status, 503);
            assert_eq!(body, br#"{"error": "Service Unavailable"}"#);
        }
        assert!(forwarder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_body_is_forwarded_to_header_phase_target() {
        let forwarder = RecordingForwarder::ok();
        let processor = processor(&["a:8000", "b:8000"], forwarder.clone());

        let (end, responses) =
            run_stream(&processor, vec![headers_msg(false), body_msg(br#"{"prompt":"x"}"#)]).await;

        assert_eq!(end, StreamEnd::Completed);
        assert_eq!(responses.len(), 2);
        assert_eq!(routed_target(&responses[0]), "a:8000");
        assert_eq!(immediate(&responses[1]), (200, br#"{"ok":true}"#.to_vec()));
        assert_eq!(
            forwarder.calls(),
            vec![("a:8000".parse().unwrap(), br#"{"prompt":"x"}"#.to_vec())]
        );
    }

    #[tokio::test]
    async fn test_forward_failure_does_not_disturb_rotation() {
        let forwarder = RecordingForwarder::failing();
        let processor = processor(&["a:8000", "b:8000"], forwarder.clone());

        let (_, responses) = run_stream(&processor, vec![headers_msg(false), body_msg(b"{}")]).await;
        let (status, body) = immediate(&responses[1]);
        assert_eq!(status, 500);
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("connection refused"));

        let (_, responses) = run_stream(&processor, vec![headers_msg(true)]).await;
        assert_eq!(routed_target(&responses[0]), "b:8000");
    }

    #[tokio::test]
    async fn test_inbound_error_ends_stream_quietly() {
        let processor = processor(&["a:8000"], RecordingForwarder::ok());

        let (end, responses) = run_stream(
            &processor,
            vec![headers_msg(false), Err(Status::cancelled("client went away"))],
        )
        .await;

        assert_eq!(end, StreamEnd::Cancelled);
        assert_eq!(responses.len(), 1);
    }

    #[tokio::test]
    async fn test_proxy_close_abandons_forward() {
        let started = Arc::new(Notify::new());
        let dropped = Arc::new(AtomicBool::new(false));
        let forwarder = Arc::new(HangingForwarder {
            started: started.clone(),
            dropped: dropped.clone(),
        });
        let processor = Arc::new(processor(&["a:8000"], forwarder));

        let (tx, mut rx) = mpsc::channel(16);
        let messages = vec![headers_msg(false), body_msg(b"{}")];
        let handle = {
            let processor = processor.clone();
            tokio::spawn(async move { processor.run(tokio_stream::iter(messages), tx).await })
        };

        assert!(rx.recv().await.is_some());
        started.notified().await;
        drop(rx);

        let end = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(end, StreamEnd::Cancelled);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_concurrent_streams_share_cursor_fairly() {
        let processor = Arc::new(processor(&["a:1", "b:1", "c:1", "d:1"], RecordingForwarder::ok()));
        let counts = Arc::new(Mutex::new(std::collections::HashMap::<String, usize>::new()));
        let finished = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..40 {
            let processor = processor.clone();
            let counts = counts.clone();
            let finished = finished.clone();
            handles.push(tokio::spawn(async move {
                let (_, responses) = run_stream(&processor, vec![headers_msg(true)]).await;
                *counts.lock().unwrap().entry(routed_target(&responses[0])).or_default() += 1;
                finished.fetch_add(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(finished.load(Ordering::SeqCst), 40);
        let counts = counts.lock().unwrap();
        assert_eq!(counts.len(), 4);
        assert!(counts.values().all(|&n| n == 10));
    }
}
