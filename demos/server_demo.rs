use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use simhttp::codec::llsd;
use simhttp::{
    GenericHttpHandler, HttpServer, Llsd, LlsdHandler, PollHandler, PollIdentity, PollService,
    ResponseDescriptor, ServerBuilder, ServerConfig, XmlRpcHandler, XmlRpcResponse, XmlRpcValue,
};
use simhttp_core::fields::FieldMap;
use simhttp_core::handler::HandlerResult;
use simhttp_core::HttpRequest;

/// A toy event queue: `POST /say?text=...` pushes, `/CAPS/EQG` long-polls.
#[derive(Default)]
struct EventQueue {
    events: Mutex<VecDeque<String>>,
}

impl PollService for EventQueue {
    fn has_events(&self, _identity: &PollIdentity) -> HandlerResult<bool> {
        Ok(!self.events.lock().is_empty())
    }

    fn get_events(&self, _identity: &PollIdentity, _request: &HttpRequest) -> HandlerResult<FieldMap> {
        let events: Vec<Llsd> = self.events.lock().drain(..).map(Llsd::from).collect();
        let body = llsd::to_xml(&Llsd::map([("events", Llsd::from(events))]));
        Ok(ResponseDescriptor::new(200, body)
            .with_content_type(llsd::LLSD_XML)
            .into_fields())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = match std::env::args().nth(1) {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig {
            listen_address: "127.0.0.1".into(),
            port: 8080,
            ..ServerConfig::default()
        },
    };

    let queue = Arc::new(EventQueue::default());
    let pusher = queue.clone();

    let builder = ServerBuilder::new()
        .with_config(config)
        .http(
            "/helloworld",
            GenericHttpHandler::from_descriptor(|_| {
                Ok(ResponseDescriptor::new(200, "hi").with_content_type("text/plain"))
            }),
        )
        .http(
            "/say",
            GenericHttpHandler::from_descriptor(move |fields| {
                let text = fields.get("text").and_then(|v| v.as_str()).unwrap_or("");
                pusher.events.lock().push_back(text.to_string());
                Ok(ResponseDescriptor::new(200, "queued").with_content_type("text/plain"))
            }),
        )
        .xmlrpc(
            "ping",
            XmlRpcHandler::new(|_, remote| Ok(XmlRpcResponse::Success(XmlRpcValue::from(remote.to_string().as_str())))),
        )
        .llsd(
            "/CAPS/seed",
            LlsdHandler::new(|path, _, _| Ok(Some(Llsd::map([("seed", Llsd::from(path))])))),
        )
        .poll("/CAPS/EQG", PollHandler::new(queue, "demo"));

    let server = HttpServer::from_builder(builder);
    let addr = server.start().await?;
    tracing::info!("Demo server at {} (listening on {})", server.server_uri(), addr);

    tokio::signal::ctrl_c().await?;
    server.stop().await;
    Ok(())
}
