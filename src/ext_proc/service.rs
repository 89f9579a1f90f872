//! `ExternalProcessor` gRPC service implementation.

use std::sync::Arc;

use envoy_types::pb::envoy::service::ext_proc::v3::external_processor_server::ExternalProcessor;
use envoy_types::pb::envoy::service::ext_proc::v3::{ProcessingRequest, ProcessingResponse};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::Instrument;
use uuid::Uuid;

use crate::ext_proc::processor::StreamProcessor;

/// Responses buffered per stream. A stream emits at most a handful.
const OUTBOUND_BUFFER: usize = 4;

/// Hands each inbound stream to its own task running a `StreamProcessor`.
#[derive(Clone)]
pub struct PickerService {
    processor: Arc<StreamProcessor>,
}

impl PickerService {
    pub fn new(processor: Arc<StreamProcessor>) -> Self {
        Self { processor }
    }
}

#[tonic::async_trait]
impl ExternalProcessor for PickerService {
    type ProcessStream = ReceiverStream<Result<ProcessingResponse, Status>>;

    async fn process(
        &self,
        request: Request<Streaming<ProcessingRequest>>,
    ) -> Result<Response<Self::ProcessStream>, Status> {
        let inbound = request.into_inner();
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);

        let stream_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "ext_proc_stream",
            %stream_id,
            path = tracing::field::Empty,
            request_id = tracing::field::Empty,
        );

        let processor = self.processor.clone();
        tokio::spawn(
            async move {
                let end = processor.run(inbound, tx).await;
                tracing::debug!(?end, "Stream finished");
            }
            .instrument(span),
        );

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
