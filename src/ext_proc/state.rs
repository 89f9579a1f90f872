//! Per-stream protocol state machine.
//!
//! # States
//! ```text
//! AwaitingHeaders ──headers, no backend──────────────▶ Terminal (503)
//! AwaitingHeaders ──headers──────────────────────────▶ AwaitingBody { target }
//! AwaitingHeaders ──headers + end_of_stream──────────▶ RoutedByHeader { target }
//! AwaitingHeaders ──body (no headers sent)───────────▶ select now, then as AwaitingBody
//! AwaitingBody    ──body chunk───────────────────────▶ AwaitingBody (buffered)
//! AwaitingBody    ──body + end_of_stream─────────────▶ Terminal (forward)
//! ```
//!
//! # Design Decisions
//! - The target is chosen exactly once per stream and never re-selected
//! - Transitions are pure apart from the selection itself; the processor
//!   performs all I/O the returned `Action` asks for
//! - Phases we do not act on are acknowledged so the proxy never stalls

use envoy_types::pb::envoy::config::core::v3::HeaderMap;
use envoy_types::pb::envoy::service::ext_proc::v3::processing_request::Request;
use envoy_types::pb::envoy::service::ext_proc::v3::ProcessingRequest;

use crate::load_balancer::{Endpoint, EndpointPicker};

/// Inbound message, classified by the phase it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    RequestHeaders {
        path: Option<String>,
        request_id: Option<String>,
        end_of_stream: bool,
    },
    RequestBody {
        body: Vec<u8>,
        end_of_stream: bool,
    },
    RequestTrailers,
    ResponseHeaders,
    ResponseBody,
    ResponseTrailers,
    /// A message with no request set.
    Empty,
}

impl From<ProcessingRequest> for Phase {
    fn from(message: ProcessingRequest) -> Self {
        match message.request {
            Some(Request::RequestHeaders(headers)) => Phase::RequestHeaders {
                path: headers.headers.as_ref().and_then(|map| header_value(map, ":path")),
                request_id: headers
                    .headers
                    .as_ref()
                    .and_then(|map| header_value(map, "x-request-id")),
                end_of_stream: headers.end_of_stream,
            },
            Some(Request::RequestBody(body)) => Phase::RequestBody {
                body: body.body.to_vec(),
                end_of_stream: body.end_of_stream,
            },
            Some(Request::RequestTrailers(_)) => Phase::RequestTrailers,
            Some(Request::ResponseHeaders(_)) => Phase::ResponseHeaders,
            Some(Request::ResponseBody(_)) => Phase::ResponseBody,
            Some(Request::ResponseTrailers(_)) => Phase::ResponseTrailers,
            None => Phase::Empty,
        }
    }
}

/// Look up a header by lower-case name. Envoy fills either `value` or
/// `raw_value` depending on its version.
pub fn header_value(map: &HeaderMap, name: &str) -> Option<String> {
    map.headers
        .iter()
        .find(|header| header.key.eq_ignore_ascii_case(name))
        .map(|header| {
            if header.value.is_empty() {
                String::from_utf8_lossy(&header.raw_value).into_owned()
            } else {
                header.value.clone()
            }
        })
}

/// Which empty acknowledgement to send back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    RequestHeaders,
    RequestBody,
    RequestTrailers,
    ResponseHeaders,
    ResponseBody,
    ResponseTrailers,
}

/// What the processor must do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Reply with a header mutation naming the target.
    RouteTo(Endpoint),
    /// Reply with an immediate 503.
    NoBackend,
    /// Forward the body and reply with the outcome as an immediate response.
    Forward { target: Endpoint, body: Vec<u8> },
    /// Reply with an empty response of the given kind.
    Ack(AckKind),
    /// Send nothing.
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StreamState {
    #[default]
    AwaitingHeaders,
    /// Routed; the headers message said no body follows.
    RoutedByHeader { target: Endpoint },
    /// Routed; body chunks accumulate until `end_of_stream`.
    AwaitingBody { target: Endpoint, buffered: Vec<u8> },
    Terminal,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamState::Terminal)
    }

    /// Target chosen for this stream, if any.
    pub fn target(&self) -> Option<&Endpoint> {
        match self {
            StreamState::RoutedByHeader { target } | StreamState::AwaitingBody { target, .. } => {
                Some(target)
            }
            _ => None,
        }
    }

    /// Apply one inbound phase and return the action to perform.
    pub fn advance(&mut self, phase: Phase, picker: &EndpointPicker) -> Action {
        let current = std::mem::replace(self, StreamState::Terminal);

        let (next, action) = match (current, phase) {
            (StreamState::Terminal, _) => (StreamState::Terminal, Action::Ignore),

            (state, Phase::Empty) => (state, Action::Ignore),

            (StreamState::AwaitingHeaders, Phase::RequestHeaders { end_of_stream, .. }) => {
                match picker.next() {
                    None => (StreamState::Terminal, Action::NoBackend),
                    Some(target) if end_of_stream => (
                        StreamState::RoutedByHeader {
                            target: target.clone(),
                        },
                        Action::RouteTo(target),
                    ),
                    Some(target) => (
                        StreamState::AwaitingBody {
                            target: target.clone(),
                            buffered: Vec::new(),
                        },
                        Action::RouteTo(target),
                    ),
                }
            }

            (StreamState::AwaitingHeaders, Phase::RequestBody { body, end_of_stream }) => {
                match picker.next() {
                    None => (StreamState::Terminal, Action::NoBackend),
                    Some(target) => Self::accept_body(target, Vec::new(), body, end_of_stream),
                }
            }

            (
                StreamState::AwaitingBody { target, buffered },
                Phase::RequestBody { body, end_of_stream },
            ) => Self::accept_body(target, buffered, body, end_of_stream),

            (StreamState::RoutedByHeader { target }, Phase::RequestBody { body, end_of_stream }) => {
                Self::accept_body(target, Vec::new(), body, end_of_stream)
            }

            // repeated headers after routing: acknowledge, keep the target
            (state, Phase::RequestHeaders { .. }) => (state, Action::Ack(AckKind::RequestHeaders)),

            (state, Phase::RequestTrailers) => (state, Action::Ack(AckKind::RequestTrailers)),
            (state, Phase::ResponseHeaders) => (state, Action::Ack(AckKind::ResponseHeaders)),
            (state, Phase::ResponseBody) => (state, Action::Ack(AckKind::ResponseBody)),
            (state, Phase::ResponseTrailers) => (state, Action::Ack(AckKind::ResponseTrailers)),
        };

        *self = next;
        action
    }

    fn accept_body(
        target: Endpoint,
        mut buffered: Vec<u8>,
        chunk: Vec<u8>,
        end_of_stream: bool,
    ) -> (StreamState, Action) {
        buffered.extend_from_slice(&chunk);
        if end_of_stream {
            (
                StreamState::Terminal,
                Action::Forward {
                    target,
                    body: buffered,
                },
            )
        } else {
            (
                StreamState::AwaitingBody { target, buffered },
                Action::Ack(AckKind::RequestBody),
            )
        }
    }
}
