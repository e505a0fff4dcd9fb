use std::fmt;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use simhttp_codec::llsd::Llsd;
use simhttp_codec::xmlrpc::{XmlRpcRequest, XmlRpcResponse};

use crate::error::HandlerError;
use crate::fields::{FieldMap, ResponseDescriptor};
use crate::request::{HttpRequest, HttpResponse};

pub type HandlerResult<T> = std::result::Result<T, HandlerError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HandlerKind {
    Stream,
    /// Stream handlers keyed by bare path, tried after generic HTTP handlers.
    StreamHttp,
    GenericHttp,
    XmlRpc,
    Llsd,
    Poll,
}

impl HandlerKind {
    pub const ALL: [HandlerKind; 6] = [
        HandlerKind::Stream,
        HandlerKind::StreamHttp,
        HandlerKind::GenericHttp,
        HandlerKind::XmlRpc,
        HandlerKind::Llsd,
        HandlerKind::Poll,
    ];

    /// Path-keyed tables reject a second registration under the same key;
    /// method-keyed tables overwrite.
    pub fn rejects_collisions(self) -> bool {
        !matches!(self, HandlerKind::XmlRpc | HandlerKind::Llsd)
    }
}

/// Registry key for stream handlers.
pub fn handler_key(http_method: &str, path: &str) -> String {
    format!("{http_method}:{path}")
}

/// A handler that consumes the raw request body and produces the response
/// bytes itself.
pub trait StreamHandler: Send + Sync {
    fn http_method(&self) -> &str;

    fn path(&self) -> &str;

    fn content_type(&self) -> &str {
        "text/plain"
    }

    fn handle(
        &self,
        path: &str,
        body: &mut dyn Read,
        request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> HandlerResult<Vec<u8>>;
}

type GenericHttpFn = dyn Fn(&FieldMap) -> HandlerResult<FieldMap> + Send + Sync;

#[derive(Clone)]
pub struct GenericHttpHandler(Arc<GenericHttpFn>);

impl GenericHttpHandler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&FieldMap) -> HandlerResult<FieldMap> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Convenience for handlers that build a typed descriptor.
    pub fn from_descriptor<F>(f: F) -> Self
    where
        F: Fn(&FieldMap) -> HandlerResult<ResponseDescriptor> + Send + Sync + 'static,
    {
        Self::new(move |fields| f(fields).map(ResponseDescriptor::into_fields))
    }

    pub fn call(&self, fields: &FieldMap) -> HandlerResult<FieldMap> {
        (self.0)(fields)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

type XmlRpcFn = dyn Fn(&XmlRpcRequest, SocketAddr) -> HandlerResult<XmlRpcResponse> + Send + Sync;

#[derive(Clone)]
pub struct XmlRpcHandler {
    keep_alive: bool,
    callback: Arc<XmlRpcFn>,
}

impl XmlRpcHandler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&XmlRpcRequest, SocketAddr) -> HandlerResult<XmlRpcResponse> + Send + Sync + 'static,
    {
        Self {
            keep_alive: true,
            callback: Arc::new(f),
        }
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    pub fn call(&self, request: &XmlRpcRequest, remote: SocketAddr) -> HandlerResult<XmlRpcResponse> {
        (self.callback)(request, remote)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.callback, &other.callback)
    }
}

/// Returning `Ok(None)` tells the dispatcher this path is not served and a
/// plain 404 should be sent.
type LlsdFn = dyn Fn(&str, &Llsd, SocketAddr) -> HandlerResult<Option<Llsd>> + Send + Sync;

#[derive(Clone)]
pub struct LlsdHandler(Arc<LlsdFn>);

impl LlsdHandler {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str, &Llsd, SocketAddr) -> HandlerResult<Option<Llsd>> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn call(&self, path: &str, request: &Llsd, remote: SocketAddr) -> HandlerResult<Option<Llsd>> {
        (self.0)(path, request, remote)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Identity passed to every poll callback.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PollIdentity {
    pub request_id: u64,
    /// Caller-supplied token given at registration time.
    pub session: String,
}

/// The "wait for next event, else time out" contract of an event queue.
///
/// Every callback must be non-blocking.
pub trait PollService: Send + Sync {
    fn has_events(&self, identity: &PollIdentity) -> HandlerResult<bool>;

    fn get_events(&self, identity: &PollIdentity, request: &HttpRequest) -> HandlerResult<FieldMap>;

    fn no_events(&self, _identity: &PollIdentity, _timed_out: bool) -> HandlerResult<FieldMap> {
        Ok(ResponseDescriptor::new(502, "Upstream error: ")
            .with_content_type("text/plain")
            .with_keep_alive(false)
            .into_fields())
    }

    /// Called once when the request arrives, before it is queued.
    fn on_request(&self, _identity: &PollIdentity, _fields: &FieldMap) {}
}

#[derive(Clone)]
pub struct PollHandler {
    service: Arc<dyn PollService>,
    session: String,
    timeout: Option<Duration>,
}

impl PollHandler {
    pub fn new(service: Arc<dyn PollService>, session: impl Into<String>) -> Self {
        Self {
            service,
            session: session.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn service(&self) -> &Arc<dyn PollService> {
        &self.service
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    /// Handler-specific timeout, falling back to the server default.
    pub fn timeout_or(&self, default: Duration) -> Duration {
        self.timeout.unwrap_or(default)
    }
}

#[derive(Clone)]
pub enum RegisteredHandler {
    Stream(Arc<dyn StreamHandler>),
    StreamHttp(Arc<dyn StreamHandler>),
    GenericHttp(GenericHttpHandler),
    XmlRpc(XmlRpcHandler),
    Llsd(LlsdHandler),
    Poll(PollHandler),
}

impl RegisteredHandler {
    pub fn kind(&self) -> HandlerKind {
        match self {
            RegisteredHandler::Stream(_) => HandlerKind::Stream,
            RegisteredHandler::StreamHttp(_) => HandlerKind::StreamHttp,
            RegisteredHandler::GenericHttp(_) => HandlerKind::GenericHttp,
            RegisteredHandler::XmlRpc(_) => HandlerKind::XmlRpc,
            RegisteredHandler::Llsd(_) => HandlerKind::Llsd,
            RegisteredHandler::Poll(_) => HandlerKind::Poll,
        }
    }

    /// Identity comparison: true only for the very same registered callback.
    pub fn same_as(&self, other: &RegisteredHandler) -> bool {
        match (self, other) {
            (RegisteredHandler::Stream(a), RegisteredHandler::Stream(b))
            | (RegisteredHandler::StreamHttp(a), RegisteredHandler::StreamHttp(b)) => Arc::ptr_eq(a, b),
            (RegisteredHandler::GenericHttp(a), RegisteredHandler::GenericHttp(b)) => a.ptr_eq(b),
            (RegisteredHandler::XmlRpc(a), RegisteredHandler::XmlRpc(b)) => a.ptr_eq(b),
            (RegisteredHandler::Llsd(a), RegisteredHandler::Llsd(b)) => a.ptr_eq(b),
            (RegisteredHandler::Poll(a), RegisteredHandler::Poll(b)) => {
                Arc::ptr_eq(&a.service, &b.service) && a.session == b.session
            }
            _ => false,
        }
    }
}

impl fmt::Debug for RegisteredHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisteredHandler::Stream(h) => f
                .debug_struct("Stream")
                .field("method", &h.http_method())
                .field("path", &h.path())
                .finish(),
            RegisteredHandler::StreamHttp(h) => f
                .debug_struct("StreamHttp")
                .field("path", &h.path())
                .finish(),
            RegisteredHandler::XmlRpc(h) => f
                .debug_struct("XmlRpc")
                .field("keep_alive", &h.keep_alive())
                .finish(),
            RegisteredHandler::Poll(h) => f
                .debug_struct("Poll")
                .field("session", &h.session())
                .finish(),
            other => write!(f, "{:?}", other.kind()),
        }
    }
}
