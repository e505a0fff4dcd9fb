use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use simhttp_codec::llsd::{self, is_llsd_media_type, Llsd, LlsdFormat, LLSD_XML};
use simhttp_codec::xmlrpc::{XmlRpcRequest, XmlRpcResponse, XmlRpcValue, INTERNAL_ERROR};
use simhttp_codec::ErrorPages;
use simhttp_core::fields::{render_fields, request_fields, FieldValue};
use simhttp_core::handler::{handler_key, StreamHandler};
use simhttp_core::{
    HandlerKind, HandlerRegistry, HttpRequest, HttpResponse, RegisteredHandler, Result,
    ServerConfig,
};
use tokio::sync::oneshot;

use crate::poll::PollWorkerPool;

/// How the dispatcher answered a request.
pub enum Dispatched {
    /// The response is ready to be written.
    Immediate(HttpResponse),
    /// A long poll; the response arrives on the receiver once a poll worker
    /// completes it.
    Deferred(oneshot::Receiver<HttpResponse>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Generic,
    XmlRpc,
    Llsd,
}

struct Handled {
    response: HttpResponse,
    /// The kind of handler that served the request, if any did.
    served_by: Option<HandlerKind>,
}

impl Handled {
    fn by(kind: HandlerKind, response: HttpResponse) -> Self {
        Self {
            response,
            served_by: Some(kind),
        }
    }

    fn unhandled(response: HttpResponse) -> Self {
        Self {
            response,
            served_by: None,
        }
    }
}

/// Routes each parsed request to the handler family that serves it.
///
/// ## Priority
/// 1. A poll handler on the query-less path takes the request off the
///    connection and into the poll pool.
/// 2. A stream handler keyed on `VERB:url`.
/// 3. Otherwise the content type picks generic HTTP, LLSD or XML-RPC.
///    Generic requests nobody serves fall back to path-keyed stream
///    handlers before the 404 page.
pub struct RequestDispatcher {
    registry: Arc<HandlerRegistry>,
    pool: Arc<PollWorkerPool>,
    pages: ErrorPages,
    slow_request: Duration,
    default_host: String,
}

impl RequestDispatcher {
    pub fn new(registry: Arc<HandlerRegistry>, pool: Arc<PollWorkerPool>, config: &ServerConfig) -> Self {
        Self {
            registry,
            pool,
            pages: ErrorPages::new(config.error_page_dir.clone()),
            slow_request: config.slow_request_threshold(),
            default_host: format!("{}:{}", config.hostname, config.port),
        }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<PollWorkerPool> {
        &self.pool
    }

    pub async fn dispatch(&self, request: HttpRequest) -> Dispatched {
        if let Some(handler) = self.registry.poll_handler(request.path()) {
            let (poll, receiver) = self.pool.sessions().open(handler, request);
            tracing::trace!("Queued poll {} for session {}", poll.request_id(), poll.identity().session);
            self.pool.enqueue(poll).await;
            return Dispatched::Deferred(receiver);
        }
        Dispatched::Immediate(self.handle(&request))
    }

    /// Serves a request that is not a long poll. Never fails: errors become
    /// the 500 page.
    pub fn handle(&self, request: &HttpRequest) -> HttpResponse {
        let started = Instant::now();
        let handled = match self.route(request) {
            Ok(handled) => handled,
            Err(e) => {
                tracing::error!(
                    "Handling {} {} from {} failed: {}",
                    request.method,
                    request.raw_url,
                    request.remote_addr,
                    e
                );
                Handled::unhandled(self.server_error())
            }
        };

        let elapsed = started.elapsed();
        if elapsed > self.slow_request && handled.served_by.is_some() {
            tracing::info!(
                "Slow handling of {} {} from {} took {}ms",
                request.method,
                request.raw_url,
                request.remote_addr,
                elapsed.as_millis()
            );
        } else {
            tracing::trace!(
                "Handling {} {} from {} took {}ms",
                request.method,
                request.raw_url,
                request.remote_addr,
                elapsed.as_millis()
            );
        }
        handled.response
    }

    fn route(&self, request: &HttpRequest) -> Result<Handled> {
        let key = handler_key(&request.method, &request.raw_url);
        if let Some(RegisteredHandler::Stream(handler)) =
            self.registry.resolve_prefix(HandlerKind::Stream, &key)
        {
            let response = stream_response(handler.as_ref(), &request.raw_url, request)?;
            return Ok(Handled::by(HandlerKind::Stream, response));
        }

        match self.classify(request) {
            Route::Generic => self.handle_generic(request),
            Route::XmlRpc => Ok(self.handle_xmlrpc(request)),
            Route::Llsd => Ok(self.handle_llsd(request)),
        }
    }

    fn classify(&self, request: &HttpRequest) -> Route {
        let media_type = request.media_type();
        match media_type.as_deref() {
            None | Some("text/html") => Route::Generic,
            Some(media_type) if is_llsd_media_type(media_type) => Route::Llsd,
            Some(_) => {
                let path = request.path();
                if self.registry.has_path_handler(HandlerKind::Llsd, path) {
                    Route::Llsd
                } else if self.registry.xmlrpc_handler(path).is_some() {
                    Route::XmlRpc
                } else if self.registry.has_path_handler(HandlerKind::GenericHttp, path) {
                    Route::Generic
                } else {
                    // XML-RPC login is the historical default.
                    Route::XmlRpc
                }
            }
        }
    }

    fn handle_generic(&self, request: &HttpRequest) -> Result<Handled> {
        if request.method.eq_ignore_ascii_case("OPTIONS") {
            return Ok(Handled::unhandled(HttpResponse::ok()));
        }

        let mut fields = request_fields(request);
        if !fields.contains_key("method") {
            if let Some(method) = form_method(request) {
                fields.insert("method".into(), FieldValue::Str(method));
            }
        }

        let method = fields.get("method").and_then(FieldValue::as_str);
        let handler = match method {
            Some(method) => self
                .registry
                .resolve_prefix(HandlerKind::GenericHttp, method)
                .or_else(|| self.registry.resolve_prefix(HandlerKind::GenericHttp, &request.raw_url)),
            None => self.registry.resolve_prefix(HandlerKind::GenericHttp, request.path()),
        };

        if let Some(RegisteredHandler::GenericHttp(handler)) = handler {
            let reply = handler.call(&fields)?;
            let response = render_fields(&reply)?;
            return Ok(Handled::by(HandlerKind::GenericHttp, response));
        }

        // Path-keyed stream handlers are the last stop before the 404 page.
        let (stream, path) = match method {
            Some(method) => (
                self.registry
                    .stream_http_handler(method)
                    .or_else(|| self.registry.stream_http_handler(&request.raw_url)),
                request.raw_url.as_str(),
            ),
            None => (self.registry.stream_http_handler(request.path()), request.path()),
        };
        match stream {
            Some(handler) => {
                let response = stream_response(handler.as_ref(), path, request)?;
                Ok(Handled::by(HandlerKind::StreamHttp, response))
            }
            None => Ok(Handled::unhandled(self.not_found(request))),
        }
    }

    fn handle_xmlrpc(&self, request: &HttpRequest) -> Handled {
        let body = request.body_text().replace("<base64></base64>", "");
        let call = match XmlRpcRequest::parse(&body) {
            Ok(call) => call,
            Err(e) => {
                tracing::warn!(
                    "Got XML-RPC request with invalid XML from {}, sending blank response: {}",
                    request.remote_addr,
                    e
                );
                return Handled::unhandled(HttpResponse::ok());
            }
        };

        let Some(method_name) = call.method_name.clone() else {
            tracing::error!(
                "Handler not found for http request {} {}",
                request.method,
                request.raw_url
            );
            let mut response = HttpResponse::new(404)
                .with_content_type("text/plain")
                .with_body("Not found")
                .with_keep_alive(false);
            response.status_description = Some("Not Found".into());
            response.protocol_version = Some("HTTP/1.0".into());
            return Handled::unhandled(response);
        };

        let (reply, keep_alive, served_by) = match self.registry.xmlrpc_handler(&method_name) {
            Some(handler) => {
                let mut call = call;
                call.params.push(XmlRpcValue::String(request.remote_addr.to_string()));
                call.params.push(XmlRpcValue::String(self.request_url(request)));
                call.params.push(XmlRpcValue::String(
                    request.header("x-forwarded-for").unwrap_or("").to_string(),
                ));
                let reply = match handler.call(&call, request.remote_addr) {
                    Ok(reply) => reply,
                    Err(e) => {
                        let message = format!(
                            "Requested method [{}] from {} threw exception: {}",
                            method_name,
                            request.remote_addr.ip(),
                            e
                        );
                        tracing::error!("{}", message);
                        XmlRpcResponse::fault(INTERNAL_ERROR, message)
                    }
                };
                (reply, handler.keep_alive(), Some(HandlerKind::XmlRpc))
            }
            None => (XmlRpcResponse::method_not_found(&method_name), false, None),
        };

        let response = HttpResponse::ok()
            .with_content_type("text/xml")
            .with_body(reply.to_xml())
            .with_keep_alive(keep_alive);
        Handled {
            response,
            served_by,
        }
    }

    fn handle_llsd(&self, request: &HttpRequest) -> Handled {
        let body = request.body_text();
        let legacy_login =
            body.contains("passwd") && body.contains("mac") && body.contains("viewer_digest");

        let value = if body.is_empty() {
            Some(Llsd::map([("request", Llsd::from("get"))]))
        } else {
            match llsd::deserialize(body.as_bytes()) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!("Undecodable LLSD request from {}: {}", request.remote_addr, e);
                    None
                }
            }
        };

        let handler = if legacy_login {
            self.registry.llsd_handler("/")
        } else {
            self.registry.llsd_handler(request.path())
        };

        let (payload, status, served_by) = match (value, handler) {
            (Some(value), Some(handler)) => {
                match handler.call(&request.raw_url, &value, request.remote_addr) {
                    Ok(Some(reply)) => (reply, 200, Some(HandlerKind::Llsd)),
                    Ok(None) => {
                        let mut response = HttpResponse::new(404)
                            .with_content_type("text/plain")
                            .with_body("Not found");
                        response.status_description = Some("Not Found".into());
                        response.protocol_version = Some("HTTP/1.0".into());
                        return Handled::by(HandlerKind::Llsd, response);
                    }
                    Err(e) => {
                        tracing::error!(
                            "LLSD handler for {} from {} failed: {}",
                            request.raw_url,
                            request.remote_addr,
                            e
                        );
                        let payload = Llsd::map([
                            ("reason", Llsd::from("LLSDRequest")),
                            ("message", Llsd::from(e.message())),
                        ]);
                        (payload, 500, Some(HandlerKind::Llsd))
                    }
                }
            }
            _ => (no_llsd_handler(), 200, None),
        };

        let (content_type, format) = llsd_response_format(request);
        let response = HttpResponse::new(status)
            .with_content_type(content_type)
            .with_body(llsd::serialize(&payload, format))
            .with_keep_alive(true);
        Handled {
            response,
            served_by,
        }
    }

    fn request_url(&self, request: &HttpRequest) -> String {
        let scheme = if request.secure { "https" } else { "http" };
        format!("{}://{}{}", scheme, self.host_of(request), request.raw_url)
    }

    fn host_of<'a>(&'a self, request: &'a HttpRequest) -> &'a str {
        match request.host() {
            "" => &self.default_host,
            host => host,
        }
    }

    fn not_found(&self, request: &HttpRequest) -> HttpResponse {
        HttpResponse::new(404)
            .with_content_type("text/html")
            .with_body(self.pages.not_found(self.host_of(request)))
    }

    fn server_error(&self) -> HttpResponse {
        HttpResponse::new(500)
            .with_content_type("text/html")
            .with_body(self.pages.server_error())
    }
}

/// Runs a stream handler over the buffered body; `path` is what the handler
/// sees as the request path.
fn stream_response(handler: &dyn StreamHandler, path: &str, request: &HttpRequest) -> Result<HttpResponse> {
    let mut response = HttpResponse::ok().with_content_type(handler.content_type());
    let mut body: &[u8] = &request.body;
    let bytes = handler.handle(path, &mut body, request, &mut response)?;
    response.body = Bytes::from(bytes);
    Ok(response)
}

fn no_llsd_handler() -> Llsd {
    Llsd::map([
        ("reason", Llsd::from("LLSDRequest")),
        ("message", Llsd::from("No handler registered for LLSD Requests")),
        ("login", Llsd::from("false")),
    ])
}

/// Picks the LLSD encoding from `Accept`, then `Content-Type`, echoing the
/// matching media type back.
fn llsd_response_format(request: &HttpRequest) -> (String, LlsdFormat) {
    let candidates = request.accept_types().into_iter().chain(request.media_type());
    for media_type in candidates {
        if let Some(format) = LlsdFormat::from_media_type(&media_type) {
            return (media_type, format);
        }
    }
    (LLSD_XML.to_string(), LlsdFormat::Xml)
}

/// `method` carried in a form-encoded body.
fn form_method(request: &HttpRequest) -> Option<String> {
    if request.media_type().as_deref() != Some("application/x-www-form-urlencoded") {
        return None;
    }
    url::form_urlencoded::parse(&request.body)
        .find(|(name, _)| name == "method")
        .map(|(_, value)| value.into_owned())
}
