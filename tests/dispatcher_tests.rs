//! # Dispatcher Tests
//!
//! Drives `RequestDispatcher` with in-memory requests and checks which
//! handler family serves each one and what goes back on the wire.

use std::io::Read;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use simhttp_codec::llsd::{self, Llsd, LLSD_JSON, LLSD_XML};
use simhttp_codec::xmlrpc::{XmlRpcRequest, XmlRpcResponse, XmlRpcValue, METHOD_NOT_FOUND};
use simhttp_core::fields::FieldMap;
use simhttp_core::handler::HandlerResult;
use simhttp_core::{
    FieldValue, GenericHttpHandler, HandlerRegistry, HttpRequest, HttpResponse, LlsdHandler,
    PollHandler, PollIdentity, PollService, ResponseDescriptor, ServerConfig, StreamHandler,
    XmlRpcHandler,
};
use simhttp_transport::{Dispatched, PollWorkerPool, RequestDispatcher};

fn peer() -> SocketAddr {
    "10.0.0.7:51000".parse().unwrap()
}

fn dispatcher(registry: &Arc<HandlerRegistry>) -> RequestDispatcher {
    let config = ServerConfig::default();
    let pool = Arc::new(PollWorkerPool::new(&config));
    RequestDispatcher::new(registry.clone(), pool, &config)
}

fn get(url: &str) -> HttpRequest {
    HttpRequest::new("GET", url, peer())
}

fn body(response: &HttpResponse) -> String {
    String::from_utf8_lossy(&response.body).into_owned()
}

/// A generic handler on a path answers with its descriptor.
#[test]
fn test_generic_handler_hello_world() {
    let t = Instant::now();

    let registry = Arc::new(HandlerRegistry::new());
    registry.add_http_handler(
        "/helloworld",
        GenericHttpHandler::from_descriptor(|_| {
            Ok(ResponseDescriptor::new(200, "hi").with_content_type("text/plain"))
        }),
    );
    let dispatcher = dispatcher(&registry);

    let response = dispatcher.handle(&get("/helloworld"));
    assert_eq!(response.status, 200);
    assert_eq!(body(&response), "hi");
    assert_eq!(response.content_type(), Some("text/plain"));
    assert!(response.keep_alive);

    let overhead = t.elapsed();
    println!("test_generic_handler_hello_world: Testing Overhead = {:?}", overhead);
}

/// Generic handlers see the request flattened into fields.
#[test]
fn test_generic_handler_receives_request_fields() {
    let registry = Arc::new(HandlerRegistry::new());
    registry.add_http_handler(
        "/echo",
        GenericHttpHandler::from_descriptor(|fields: &FieldMap| {
            let name = fields.get("name").and_then(FieldValue::as_str).unwrap_or("");
            let verb = fields.get("http-method").and_then(FieldValue::as_str).unwrap_or("");
            let uri = fields.get("uri").and_then(FieldValue::as_str).unwrap_or("");
            Ok(ResponseDescriptor::new(200, format!("{verb} {uri} {name}")))
        }),
    );
    let dispatcher = dispatcher(&registry);

    let response = dispatcher.handle(&get("/echo/deeper?name=Ruth"));
    assert_eq!(body(&response), "GET /echo/deeper?name=Ruth Ruth");
    // No content type given: text/html is assumed.
    assert_eq!(response.content_type(), Some("text/html"));
}

/// Unknown paths get the HTML 404 page naming the host.
#[test]
fn test_unknown_path_gets_not_found_page() {
    let registry = Arc::new(HandlerRegistry::new());
    let dispatcher = dispatcher(&registry);

    let request = get("/nowhere").with_header("Host", "sim.example.org:9000");
    let response = dispatcher.handle(&request);
    assert_eq!(response.status, 404);
    assert_eq!(response.content_type(), Some("text/html"));
    assert!(body(&response).contains("-loginpage http://sim.example.org:9000/?method=login"));

    // Without a Host header the configured host stands in.
    let response = dispatcher.handle(&get("/nowhere"));
    assert!(body(&response).contains("http://127.0.0.1:9000/"));
}

/// The `method` field selects a handler registered under a method name.
#[test]
fn test_generic_method_field_routing() {
    let registry = Arc::new(HandlerRegistry::new());
    registry.add_http_handler(
        "login",
        GenericHttpHandler::from_descriptor(|_| Ok(ResponseDescriptor::new(200, "login page"))),
    );
    registry.add_http_handler(
        "/app",
        GenericHttpHandler::from_descriptor(|_| Ok(ResponseDescriptor::new(200, "app"))),
    );
    let dispatcher = dispatcher(&registry);

    let response = dispatcher.handle(&get("/?method=login"));
    assert_eq!(body(&response), "login page");

    let form = HttpRequest::new("POST", "/app", peer())
        .with_header("Content-Type", "application/x-www-form-urlencoded")
        .with_body("firstname=Ruth&method=login");
    let response = dispatcher.handle(&form);
    assert_eq!(body(&response), "login page");

    let response = dispatcher.handle(&get("/?method=logout"));
    assert_eq!(response.status, 404);
}

/// An unknown `method` falls back to the raw URL, which resolves by prefix
/// like any path.
#[test]
fn test_method_field_on_prefixed_path() {
    let registry = Arc::new(HandlerRegistry::new());
    registry.add_http_handler(
        "/app",
        GenericHttpHandler::from_descriptor(|_| Ok(ResponseDescriptor::new(200, "app"))),
    );
    let dispatcher = dispatcher(&registry);

    let response = dispatcher.handle(&get("/app/x"));
    assert_eq!(response.status, 200);
    assert_eq!(body(&response), "app");

    let response = dispatcher.handle(&get("/app/x?method=foo"));
    assert_eq!(response.status, 200);
    assert_eq!(body(&response), "app");

    let response = dispatcher.handle(&get("/apx?method=foo"));
    assert_eq!(response.status, 404);
}

/// Binary content types carry base64 text that is decoded on the way out.
#[test]
fn test_binary_body_is_decoded() {
    let png = vec![0x89u8, b'P', b'N', b'G', 0, 255];
    let encoded = base64::engine::general_purpose::STANDARD.encode(&png);

    let registry = Arc::new(HandlerRegistry::new());
    registry.add_http_handler(
        "/map.png",
        GenericHttpHandler::from_descriptor(move |_| {
            Ok(ResponseDescriptor::new(200, encoded.clone()).with_content_type("image/png"))
        }),
    );
    let dispatcher = dispatcher(&registry);

    let response = dispatcher.handle(&get("/map.png"));
    assert_eq!(response.body.as_ref(), png.as_slice());
    assert_eq!(response.content_type(), Some("image/png"));
}

/// A 301 descriptor sets the Location header.
#[test]
fn test_redirect_sets_location() {
    let registry = Arc::new(HandlerRegistry::new());
    registry.add_http_handler(
        "/old",
        GenericHttpHandler::from_descriptor(|_| {
            Ok(ResponseDescriptor::new(301, "").with_redirect("http://grid.example.org/new"))
        }),
    );
    let dispatcher = dispatcher(&registry);

    let response = dispatcher.handle(&get("/old"));
    assert_eq!(response.status, 301);
    assert_eq!(response.header("Location"), Some("http://grid.example.org/new"));
}

/// A failing generic handler produces the 500 page and nothing escapes.
#[test]
fn test_generic_handler_failure_is_server_error() {
    let registry = Arc::new(HandlerRegistry::new());
    registry.add_http_handler(
        "/broken",
        GenericHttpHandler::new(|_| Err("database unavailable".into())),
    );
    registry.add_http_handler(
        "/incomplete",
        GenericHttpHandler::new(|_| Ok(FieldMap::new())),
    );
    let dispatcher = dispatcher(&registry);

    for path in ["/broken", "/incomplete"] {
        let response = dispatcher.handle(&get(path));
        assert_eq!(response.status, 500, "{path}");
        assert!(body(&response).contains("500 Internal Server Error"));
    }
}

/// OPTIONS is answered without consulting handlers.
#[test]
fn test_options_is_ok() {
    let registry = Arc::new(HandlerRegistry::new());
    let dispatcher = dispatcher(&registry);

    let response = dispatcher.handle(&HttpRequest::new("OPTIONS", "/anything", peer()));
    assert_eq!(response.status, 200);
    assert!(response.body.is_empty());
}

struct Upload {
    seen: AtomicUsize,
}

impl StreamHandler for Upload {
    fn http_method(&self) -> &str {
        "POST"
    }

    fn path(&self) -> &str {
        "/upload"
    }

    fn content_type(&self) -> &str {
        "application/octet-stream"
    }

    fn handle(
        &self,
        path: &str,
        body: &mut dyn Read,
        _request: &HttpRequest,
        response: &mut HttpResponse,
    ) -> HandlerResult<Vec<u8>> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        let mut data = Vec::new();
        body.read_to_end(&mut data).map_err(|e| e.to_string())?;
        response.status = 201;
        Ok(format!("{} bytes for {}", data.len(), path).into_bytes())
    }
}

/// Stream handlers win over content-type routing and see the raw URL.
#[test]
fn test_stream_handler_takes_priority() {
    let registry = Arc::new(HandlerRegistry::new());
    let upload = Arc::new(Upload {
        seen: AtomicUsize::new(0),
    });
    registry.add_stream_handler(upload.clone());
    registry.add_xmlrpc_handler(
        "/upload",
        XmlRpcHandler::new(|_, _| Ok(XmlRpcResponse::Success(XmlRpcValue::Nil))),
    );
    let dispatcher = dispatcher(&registry);

    let request = HttpRequest::new("POST", "/upload?asset=1", peer())
        .with_header("Content-Type", "text/xml")
        .with_body(vec![7u8; 12]);
    let response = dispatcher.handle(&request);
    assert_eq!(response.status, 201);
    assert_eq!(body(&response), "12 bytes for /upload?asset=1");
    assert_eq!(response.content_type(), Some("application/octet-stream"));
    assert_eq!(upload.seen.load(Ordering::SeqCst), 1);

    // A different verb does not match the stream key.
    let response = dispatcher.handle(&get("/upload"));
    assert_eq!(response.status, 404);
}

/// Records the path it was handed; serves any verb.
struct Inventory {
    path: &'static str,
    paths: parking_lot::Mutex<Vec<String>>,
}

impl Inventory {
    fn at(path: &'static str) -> Arc<Self> {
        Arc::new(Self {
            path,
            paths: parking_lot::Mutex::new(Vec::new()),
        })
    }
}

impl StreamHandler for Inventory {
    fn http_method(&self) -> &str {
        "GET"
    }

    fn path(&self) -> &str {
        self.path
    }

    fn handle(
        &self,
        path: &str,
        body: &mut dyn Read,
        _request: &HttpRequest,
        _response: &mut HttpResponse,
    ) -> HandlerResult<Vec<u8>> {
        self.paths.lock().push(path.to_string());
        let mut data = Vec::new();
        body.read_to_end(&mut data).map_err(|e| e.to_string())?;
        Ok(format!("inventory {} ({} bytes)", path, data.len()).into_bytes())
    }
}

/// Path-keyed stream handlers answer generic requests no generic handler
/// serves, by path or by `method` name, before the 404 page.
#[test]
fn test_stream_http_fallback() {
    let registry = Arc::new(HandlerRegistry::new());
    let by_path = Inventory::at("/inventory");
    let by_method = Inventory::at("fetch_inventory");
    assert!(registry.add_stream_http_handler(by_path.clone()));
    assert!(registry.add_stream_http_handler(by_method.clone()));
    registry.add_http_handler(
        "/inventory/trash",
        GenericHttpHandler::from_descriptor(|_| Ok(ResponseDescriptor::new(200, "generic trash"))),
    );
    let dispatcher = dispatcher(&registry);

    // Path branch: the handler sees the query-less path, whatever the verb.
    let response = dispatcher.handle(&get("/inventory/items?folder=3"));
    assert_eq!(response.status, 200);
    assert_eq!(body(&response), "inventory /inventory/items (0 bytes)");
    assert_eq!(response.content_type(), Some("text/plain"));

    let post = HttpRequest::new("POST", "/inventory", peer()).with_body("abc");
    let response = dispatcher.handle(&post);
    assert_eq!(body(&response), "inventory /inventory (3 bytes)");

    // Method branch: the handler sees the raw URL.
    let response = dispatcher.handle(&get("/?method=fetch_inventory"));
    assert_eq!(response.status, 200);
    assert_eq!(body(&response), "inventory /?method=fetch_inventory (0 bytes)");

    // A generic handler still comes first.
    let response = dispatcher.handle(&get("/inventory/trash"));
    assert_eq!(body(&response), "generic trash");

    let response = dispatcher.handle(&get("/?method=unknown"));
    assert_eq!(response.status, 404);

    assert_eq!(
        *by_path.paths.lock(),
        vec!["/inventory/items".to_string(), "/inventory".to_string()]
    );
    assert_eq!(*by_method.paths.lock(), vec!["/?method=fetch_inventory".to_string()]);
}

fn xmlrpc_post(call: &XmlRpcRequest) -> HttpRequest {
    HttpRequest::new("POST", "/", peer())
        .with_header("Content-Type", "text/xml")
        .with_header("Host", "sim.example.org:9000")
        .with_header("X-Forwarded-For", "203.0.113.9")
        .with_body(call.to_xml())
}

/// XML-RPC handlers get the caller's address, URL and forwarded-for header
/// appended to their parameters.
#[test]
fn test_xmlrpc_success_appends_request_params() {
    let t = Instant::now();

    let registry = Arc::new(HandlerRegistry::new());
    registry.add_xmlrpc_handler(
        "login_to_simulator",
        XmlRpcHandler::new(|call: &XmlRpcRequest, _remote| {
            let params: Vec<XmlRpcValue> = call.params.clone();
            Ok(XmlRpcResponse::Success(XmlRpcValue::Array(params)))
        }),
    );
    let dispatcher = dispatcher(&registry);

    let call = XmlRpcRequest::new("login_to_simulator").with_param("Ruth");
    let response = dispatcher.handle(&xmlrpc_post(&call));
    assert_eq!(response.status, 200);
    assert_eq!(response.content_type(), Some("text/xml"));
    assert!(response.keep_alive);

    let XmlRpcResponse::Success(XmlRpcValue::Array(params)) =
        XmlRpcResponse::parse(&body(&response)).unwrap()
    else {
        panic!("expected an array reply");
    };
    let params: Vec<&str> = params.iter().filter_map(XmlRpcValue::as_str).collect();
    assert_eq!(
        params,
        vec!["Ruth", "10.0.0.7:51000", "http://sim.example.org:9000/", "203.0.113.9"]
    );

    let overhead = t.elapsed();
    println!("test_xmlrpc_success_appends_request_params: Testing Overhead = {:?}", overhead);
}

/// An unknown method is a -32601 fault on a closing connection.
#[test]
fn test_xmlrpc_unknown_method_fault() {
    let registry = Arc::new(HandlerRegistry::new());
    let dispatcher = dispatcher(&registry);

    let response = dispatcher.handle(&xmlrpc_post(&XmlRpcRequest::new("no_such_call")));
    assert_eq!(response.status, 200);
    assert!(!response.keep_alive);
    let reply = XmlRpcResponse::parse(&body(&response)).unwrap();
    assert_eq!(reply.fault_code(), Some(METHOD_NOT_FOUND));
    assert_eq!(
        reply,
        XmlRpcResponse::fault(METHOD_NOT_FOUND, "Requested method [no_such_call] not found")
    );
}

/// A handler error becomes a -32603 fault naming the method and caller.
#[test]
fn test_xmlrpc_handler_error_fault() {
    let registry = Arc::new(HandlerRegistry::new());
    registry.add_xmlrpc_handler("grid_info", XmlRpcHandler::new(|_, _| Err("no grid".into())));
    let dispatcher = dispatcher(&registry);

    let response = dispatcher.handle(&xmlrpc_post(&XmlRpcRequest::new("grid_info")));
    let XmlRpcResponse::Fault { code, message } = XmlRpcResponse::parse(&body(&response)).unwrap()
    else {
        panic!("expected a fault");
    };
    assert_eq!(code, -32603);
    assert_eq!(message, "Requested method [grid_info] from 10.0.0.7 threw exception: no grid");
}

/// Malformed XML gets an empty 200; a call without a method gets a 404.
#[test]
fn test_xmlrpc_malformed_and_methodless() {
    let registry = Arc::new(HandlerRegistry::new());
    let dispatcher = dispatcher(&registry);

    let garbage = HttpRequest::new("POST", "/", peer())
        .with_header("Content-Type", "text/xml")
        .with_body("<methodCall><methodName>broken");
    let response = dispatcher.handle(&garbage);
    assert_eq!(response.status, 200);
    assert!(response.body.is_empty());

    let methodless = HttpRequest::new("POST", "/", peer())
        .with_header("Content-Type", "text/xml")
        .with_body("<methodCall><params></params></methodCall>");
    let response = dispatcher.handle(&methodless);
    assert_eq!(response.status, 404);
    assert_eq!(response.protocol(), "HTTP/1.0");
    assert_eq!(body(&response), "Not found");
    assert!(!response.keep_alive);
}

fn seed_caps() -> LlsdHandler {
    LlsdHandler::new(|path, request: &Llsd, _remote| {
        let asked = request.as_array().map(|a| a.len() as i32).unwrap_or(-1);
        Ok(Some(Llsd::map([
            ("path", Llsd::from(path)),
            ("asked", Llsd::from(asked)),
        ])))
    })
}

/// LLSD replies follow the Accept header and echo the media type.
#[test]
fn test_llsd_json_round_trip() {
    let t = Instant::now();

    let registry = Arc::new(HandlerRegistry::new());
    registry.add_llsd_handler("/CAPS/seed", seed_caps());
    let dispatcher = dispatcher(&registry);

    let request = HttpRequest::new("POST", "/CAPS/seed/abc", peer())
        .with_header("Content-Type", "application/llsd+xml")
        .with_header("Accept", "application/llsd+json")
        .with_body(llsd::to_xml(&Llsd::from(vec![Llsd::from("EventQueueGet"), Llsd::from("FetchInventory2")])));
    let response = dispatcher.handle(&request);

    assert_eq!(response.status, 200);
    assert_eq!(response.content_type(), Some(LLSD_JSON));
    let reply = llsd::from_json(&body(&response)).unwrap();
    assert_eq!(reply.get("path").and_then(Llsd::as_str), Some("/CAPS/seed/abc"));
    assert_eq!(reply.get("asked").and_then(Llsd::as_integer), Some(2));

    let overhead = t.elapsed();
    println!("test_llsd_json_round_trip: Testing Overhead = {:?}", overhead);
}

/// An empty LLSD body is treated as a `get` request.
#[test]
fn test_llsd_empty_body_is_get() {
    let registry = Arc::new(HandlerRegistry::new());
    registry.add_llsd_handler(
        "/status",
        LlsdHandler::new(|_, request: &Llsd, _| Ok(Some(request.clone()))),
    );
    let dispatcher = dispatcher(&registry);

    let request = HttpRequest::new("POST", "/status", peer()).with_header("Content-Type", LLSD_XML);
    let response = dispatcher.handle(&request);
    assert_eq!(response.content_type(), Some(LLSD_XML));
    let reply = llsd::from_xml(&body(&response)).unwrap();
    assert_eq!(reply.get("request").and_then(Llsd::as_str), Some("get"));
}

/// Legacy login bodies go to the root LLSD handler whatever the path.
#[test]
fn test_llsd_legacy_login_goes_to_root() {
    let registry = Arc::new(HandlerRegistry::new());
    registry.add_llsd_handler(
        "/",
        LlsdHandler::new(|_, _, _| Ok(Some(Llsd::map([("login", Llsd::from("true"))])))),
    );
    let dispatcher = dispatcher(&registry);

    let login = Llsd::map([
        ("first", Llsd::from("Ruth")),
        ("passwd", Llsd::from("$1$abc")),
        ("mac", Llsd::from("00:11:22")),
        ("viewer_digest", Llsd::from("digest")),
    ]);
    let request = HttpRequest::new("POST", "/get_login", peer())
        .with_header("Content-Type", LLSD_XML)
        .with_body(llsd::to_xml(&login));
    let response = dispatcher.handle(&request);
    let reply = llsd::from_xml(&body(&response)).unwrap();
    assert_eq!(reply.get("login").and_then(Llsd::as_str), Some("true"));
}

/// Without a handler the caller gets the standard refusal map.
#[test]
fn test_llsd_without_handler() {
    let registry = Arc::new(HandlerRegistry::new());
    let dispatcher = dispatcher(&registry);

    let request = HttpRequest::new("POST", "/unclaimed", peer())
        .with_header("Content-Type", "application/llsd+xml; charset=utf-8")
        .with_body("<llsd><undef /></llsd>");
    let response = dispatcher.handle(&request);
    assert_eq!(response.status, 200);
    let reply = llsd::from_xml(&body(&response)).unwrap();
    assert_eq!(reply.get("reason").and_then(Llsd::as_str), Some("LLSDRequest"));
    assert_eq!(
        reply.get("message").and_then(Llsd::as_str),
        Some("No handler registered for LLSD Requests")
    );
    assert_eq!(reply.get("login").and_then(Llsd::as_str), Some("false"));
}

/// `None` from an LLSD handler is a plain 404; an error is a 500 map.
#[test]
fn test_llsd_none_and_error() {
    let registry = Arc::new(HandlerRegistry::new());
    registry.add_llsd_handler("/gone", LlsdHandler::new(|_, _, _| Ok(None)));
    registry.add_llsd_handler("/fails", LlsdHandler::new(|_, _, _| Err("bad seed".into())));
    let dispatcher = dispatcher(&registry);

    let request = HttpRequest::new("POST", "/gone", peer()).with_header("Content-Type", LLSD_XML);
    let response = dispatcher.handle(&request);
    assert_eq!(response.status, 404);
    assert_eq!(response.protocol(), "HTTP/1.0");
    assert_eq!(body(&response), "Not found");

    let request = HttpRequest::new("POST", "/fails", peer()).with_header("Content-Type", LLSD_XML);
    let response = dispatcher.handle(&request);
    assert_eq!(response.status, 500);
    let reply = llsd::from_xml(&body(&response)).unwrap();
    assert_eq!(reply.get("message").and_then(Llsd::as_str), Some("bad seed"));
}

/// Non-LLSD content types still reach an LLSD handler registered on the path.
#[test]
fn test_content_type_fallback_prefers_llsd_path() {
    let registry = Arc::new(HandlerRegistry::new());
    registry.add_llsd_handler("/CAPS/seed", seed_caps());
    registry.add_http_handler(
        "/CAPS",
        GenericHttpHandler::from_descriptor(|_| Ok(ResponseDescriptor::new(200, "generic"))),
    );
    let dispatcher = dispatcher(&registry);

    let request = HttpRequest::new("POST", "/CAPS/seed/1", peer())
        .with_header("Content-Type", "application/xml")
        .with_body("<llsd><array /></llsd>");
    let response = dispatcher.handle(&request);
    assert_eq!(response.content_type(), Some("application/xml"));
    let reply = llsd::from_xml(&body(&response)).unwrap();
    assert_eq!(reply.get("asked").and_then(Llsd::as_integer), Some(0));

    let request = HttpRequest::new("POST", "/CAPS/other", peer())
        .with_header("Content-Type", "application/octet-stream");
    let response = dispatcher.handle(&request);
    assert_eq!(body(&response), "generic");
}

struct Ready;

impl PollService for Ready {
    fn has_events(&self, _identity: &PollIdentity) -> HandlerResult<bool> {
        Ok(true)
    }

    fn get_events(&self, identity: &PollIdentity, _request: &HttpRequest) -> HandlerResult<FieldMap> {
        Ok(ResponseDescriptor::new(200, format!("events for {}", identity.session))
            .with_content_type("text/plain")
            .into_fields())
    }
}

/// Poll paths are deferred to the pool; everything else, including paths
/// nested under a poll path, is immediate.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_poll_path_is_deferred() {
    let registry = Arc::new(HandlerRegistry::new());
    registry.add_poll_handler("/CAPS/EQG/9", PollHandler::new(Arc::new(Ready), "agent-9"));
    let dispatcher = dispatcher(&registry);
    dispatcher.pool().start();

    let Dispatched::Deferred(receiver) = dispatcher.dispatch(get("/CAPS/EQG/9?ack=1")).await else {
        panic!("poll path answered immediately");
    };
    let response = tokio::time::timeout(Duration::from_secs(5), receiver)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(body(&response), "events for agent-9");

    let Dispatched::Immediate(response) = dispatcher.dispatch(get("/elsewhere")).await else {
        panic!("plain path was deferred");
    };
    assert_eq!(response.status, 404);

    let Dispatched::Immediate(response) = dispatcher.dispatch(get("/CAPS/EQG/9/other")).await else {
        panic!("nested path was deferred");
    };
    assert_eq!(response.status, 404);

    dispatcher.pool().stop().await;
}
