//! Construction of outbound `ProcessingResponse` messages.

use envoy_types::pb::envoy::config::core::v3::{HeaderValue, HeaderValueOption};
use envoy_types::pb::envoy::r#type::v3::HttpStatus;
use envoy_types::pb::envoy::service::ext_proc::v3::processing_response::Response;
use envoy_types::pb::envoy::service::ext_proc::v3::{
    BodyResponse, CommonResponse, HeaderMutation, HeadersResponse, ImmediateResponse,
    ProcessingResponse, TrailersResponse,
};

use crate::config::RoutingConfig;
use crate::ext_proc::state::AckKind;
use crate::forwarding::BackendReply;
use crate::load_balancer::Endpoint;

const JSON: &str = "application/json";
const SERVICE_UNAVAILABLE: u16 = 503;
const INTERNAL_SERVER_ERROR: u16 = 500;

/// Builds every response shape the picker emits.
#[derive(Debug, Clone)]
pub struct ResponseFactory {
    target_header: String,
    clear_route_cache: bool,
}

impl ResponseFactory {
    pub fn new(config: &RoutingConfig) -> Self {
        Self {
            target_header: config.target_header.clone(),
            clear_route_cache: config.clear_route_cache,
        }
    }

    pub fn target_header(&self) -> &str {
        &self.target_header
    }

    /// Header mutation naming the chosen backend. Non-terminal.
    pub fn route_to(&self, target: &Endpoint) -> ProcessingResponse {
        let common = CommonResponse {
            header_mutation: Some(HeaderMutation {
                set_headers: vec![header(&self.target_header, &target.to_string())],
                ..Default::default()
            }),
            clear_route_cache: self.clear_route_cache,
            ..Default::default()
        };

        wrap(Response::RequestHeaders(HeadersResponse {
            response: Some(common),
            ..Default::default()
        }))
    }

    /// Immediate 503 for an empty endpoint set.
    pub fn service_unavailable(&self) -> ProcessingResponse {
        immediate(
            SERVICE_UNAVAILABLE,
            vec![header("content-type", JSON), header("connection", "close")],
            error_body("Service Unavailable"),
        )
    }

    /// Immediate response relaying a backend reply verbatim.
    pub fn forwarded(&self, reply: BackendReply) -> ProcessingResponse {
        immediate(reply.status, vec![header("content-type", JSON)], reply.body)
    }

    /// Immediate 500 carrying a forwarding failure.
    pub fn forwarding_failed(&self, message: &str) -> ProcessingResponse {
        immediate(
            INTERNAL_SERVER_ERROR,
            vec![header("content-type", JSON)],
            error_body(message),
        )
    }

    /// Empty response of the given kind; the proxy continues unchanged.
    pub fn ack(&self, kind: AckKind) -> ProcessingResponse {
        let response = match kind {
            AckKind::RequestHeaders => Response::RequestHeaders(HeadersResponse::default()),
            AckKind::RequestBody => Response::RequestBody(BodyResponse::default()),
            AckKind::RequestTrailers => Response::RequestTrailers(TrailersResponse::default()),
            AckKind::ResponseHeaders => Response::ResponseHeaders(HeadersResponse::default()),
            AckKind::ResponseBody => Response::ResponseBody(BodyResponse::default()),
            AckKind::ResponseTrailers => Response::ResponseTrailers(TrailersResponse::default()),
        };
        wrap(response)
    }
}

/// `{"error": "<message>"}` with the message JSON-escaped.
pub fn error_body(message: &str) -> Vec<u8> {
    let escaped = serde_json::Value::String(message.to_string());
    format!("{{\"error\": {}}}", escaped).into_bytes()
}

fn header(key: &str, value: &str) -> HeaderValueOption {
    HeaderValueOption {
        header: Some(HeaderValue {
            key: key.to_string(),
            value: value.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn immediate(status: u16, headers: Vec<HeaderValueOption>, body: Vec<u8>) -> ProcessingResponse {
    wrap(Response::ImmediateResponse(ImmediateResponse {
        status: Some(HttpStatus {
            code: i32::from(status),
        }),
        headers: Some(HeaderMutation {
            set_headers: headers,
            ..Default::default()
        }),
        body: body.into(),
        ..Default::default()
    }))
}

fn wrap(response: Response) -> ProcessingResponse {
    ProcessingResponse {
        response: Some(response),
        ..Default::default()
    }
}
