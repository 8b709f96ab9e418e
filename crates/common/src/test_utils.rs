//! In-memory doubles for tests.

use crate::{
    errors::{ErrorReporter, display_chain},
    rpc::{ErrorPayload, Id, RpcConnector, TransportError, TransportErrorKind},
};
use alloy_json_rpc::{RequestPacket, Response, ResponsePacket, ResponsePayload, SerializedRequest};
use alloy_rpc_client::ClientBuilder;
use alloy_transport::{TransportFut, TransportResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::{
    collections::HashMap,
    error::Error,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll},
};
use tower::Service;
use url::Url;

/// A request as seen by a [MockTransport].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedRequest {
    pub id: Id,
    pub method: String,
    pub params: Value,
}

impl RecordedRequest {
    fn new(request: &SerializedRequest) -> Self {
        let params = request
            .params()
            .and_then(|params| serde_json::from_str(params.get()).ok())
            .unwrap_or_default();
        Self { id: request.id().clone(), method: request.method().to_string(), params }
    }
}

type Handler = Arc<dyn Fn(&RecordedRequest) -> TransportResult<Value> + Send + Sync>;

/// [RpcConnector] answering from per-method handlers and recording every call.
///
/// Methods without a handler fail with `-32601 method not found`.
#[derive(Clone, Default)]
pub struct MockTransport {
    handlers: HashMap<String, Handler>,
    calls: Arc<Mutex<Vec<(Url, RecordedRequest)>>>,
    connections: Arc<AtomicUsize>,
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("methods", &self.handlers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl MockTransport {
    pub fn with_handler(
        mut self,
        method: &str,
        handler: impl Fn(&RecordedRequest) -> TransportResult<Value> + Send + Sync + 'static,
    ) -> Self {
        self.handlers.insert(method.to_string(), Arc::new(handler));
        self
    }

    pub fn with_result(self, method: &str, result: Value) -> Self {
        self.with_handler(method, move |_| Ok(result.clone()))
    }

    pub fn with_error(self, method: &str, code: i64, message: &str) -> Self {
        let payload = ErrorPayload { code, message: message.to_string().into(), data: None };
        self.with_handler(method, move |_| Err(TransportError::ErrorResp(payload.clone())))
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<(Url, RecordedRequest)> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|(_, req)| req.method == method).count()
    }

    /// Number of clients opened through this connector.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    fn answer(&self, url: &Url, request: &SerializedRequest) -> TransportResult<Response> {
        let recorded = RecordedRequest::new(request);
        self.calls.lock().push((url.clone(), recorded.clone()));
        let result = match self.handlers.get(&recorded.method) {
            Some(handler) => handler(&recorded)?,
            None => {
                return Err(TransportError::ErrorResp(ErrorPayload {
                    code: -32601,
                    message: format!("method {} not found", recorded.method).into(),
                    data: None,
                }));
            }
        };
        let payload = serde_json::value::to_raw_value(&result).map_err(TransportError::ser_err)?;
        Ok(Response { id: recorded.id, payload: ResponsePayload::Success(payload) })
    }
}

impl RpcConnector for MockTransport {
    fn connect(&self, url: &Url) -> alloy_rpc_client::RpcClient {
        self.connections.fetch_add(1, Ordering::SeqCst);
        let connection = MockConnection { transport: self.clone(), url: url.clone() };
        ClientBuilder::default().transport(connection, true)
    }
}

/// A [MockTransport] bound to one endpoint.
#[derive(Clone, Debug)]
struct MockConnection {
    transport: MockTransport,
    url: Url,
}

impl Service<RequestPacket> for MockConnection {
    type Response = ResponsePacket;
    type Error = TransportError;
    type Future = TransportFut<'static>;

    fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, packet: RequestPacket) -> Self::Future {
        let this = self.clone();
        Box::pin(async move {
            match packet {
                RequestPacket::Single(request) => {
                    this.transport.answer(&this.url, &request).map(ResponsePacket::Single)
                }
                RequestPacket::Batch(_) => {
                    Err(TransportErrorKind::custom_str("batch requests are not supported"))
                }
            }
        })
    }
}

/// [ErrorReporter] that keeps reported errors as one-line strings.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn reports(&self) -> Vec<String> {
        self.reports.lock().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, error: &(dyn Error + 'static)) {
        self.reports.lock().push(display_chain(error));
    }
}
