//! Region simulator HTTP server: handler registry, request dispatch and
//! long-poll servicing over a single listener.

pub use simhttp_codec as codec;
pub use simhttp_transport as transport;

pub use simhttp_codec::{Llsd, XmlRpcRequest, XmlRpcResponse, XmlRpcValue};
pub use simhttp_core::{
    GenericHttpHandler, HandlerError, HandlerRegistry, HttpError, HttpRequest, HttpResponse,
    LlsdHandler, PollHandler, PollIdentity, PollService, ResponseDescriptor, ServerBuilder,
    ServerConfig, StreamHandler, XmlRpcHandler,
};
pub use simhttp_transport::{HttpServer, RequestDispatcher};
