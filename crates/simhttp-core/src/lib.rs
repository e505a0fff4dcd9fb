pub mod config;
pub mod error;
pub mod fields;
pub mod handler;
pub mod queue;
pub mod registry;
pub mod request;
pub mod session;

use std::sync::Arc;

pub use config::{ServerConfig, TlsConfig};
pub use error::{HandlerError, HttpError, Result};
pub use fields::{FieldMap, FieldValue, ResponseDescriptor};
pub use handler::{
    GenericHttpHandler, HandlerKind, HandlerResult, LlsdHandler, PollHandler, PollIdentity,
    PollService, RegisteredHandler, StreamHandler, XmlRpcHandler,
};
pub use queue::WorkQueue;
pub use registry::HandlerRegistry;
pub use request::{HttpRequest, HttpResponse};
pub use session::{PollOutcome, PollServiceHttpRequest, PollSessionManager};

/// Collects configuration and handlers before a server is started.
///
/// ## Registration
/// Handlers added here land in the same registry the running server reads,
/// so anything registered up front is live from the first accepted request.
/// A registration that collides with an existing path is logged and dropped.
pub struct ServerBuilder {
    pub registry: Arc<HandlerRegistry>,
    pub config: ServerConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(HandlerRegistry::new()),
            config: ServerConfig::default(),
        }
    }

    /// Overrides the default server configuration.
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.config.secure = secure;
        self
    }

    pub fn stream(self, handler: Arc<dyn StreamHandler>) -> Self {
        if !self.registry.add_stream_handler(handler) {
            tracing::warn!("Duplicate stream handler ignored");
        }
        self
    }

    /// Registers `handler` under its bare path as a fallback for generic HTTP.
    pub fn stream_http(self, handler: Arc<dyn StreamHandler>) -> Self {
        let path = handler.path().to_string();
        if !self.registry.add_stream_http_handler(handler) {
            tracing::warn!("Duplicate stream HTTP handler for {} ignored", path);
        }
        self
    }

    pub fn http(self, path: &str, handler: GenericHttpHandler) -> Self {
        if !self.registry.add_http_handler(path, handler) {
            tracing::warn!("Duplicate HTTP handler for {} ignored", path);
        }
        self
    }

    pub fn xmlrpc(self, method: &str, handler: XmlRpcHandler) -> Self {
        self.registry.add_xmlrpc_handler(method, handler);
        self
    }

    pub fn llsd(self, path: &str, handler: LlsdHandler) -> Self {
        self.registry.add_llsd_handler(path, handler);
        self
    }

    pub fn poll(self, path: &str, handler: PollHandler) -> Self {
        if !self.registry.add_poll_handler(path, handler) {
            tracing::warn!("Duplicate poll handler for {} ignored", path);
        }
        self
    }
}
