use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::{Buf, BytesMut};
use simhttp_core::{HttpRequest, HttpResponse};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::dispatcher::{Dispatched, RequestDispatcher};

const MAX_HEADERS: usize = 64;
const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Per-listener settings shared by every connection task.
pub struct ConnectionSettings {
    pub dispatcher: Arc<RequestDispatcher>,
    pub keepalive_timeout: Duration,
    pub max_body_bytes: usize,
    pub secure: bool,
}

struct Head {
    method: String,
    raw_url: String,
    version: u8,
    headers: Vec<(String, String)>,
    len: usize,
}

enum Incoming {
    Request(HttpRequest),
    Reject(HttpResponse),
    Closed,
}

/// Serves requests on one connection until either side closes it.
pub async fn serve_connection<S>(mut stream: S, peer: SocketAddr, settings: Arc<ConnectionSettings>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = BytesMut::with_capacity(8 * 1024);
    loop {
        let incoming = match read_request(&mut stream, &mut buf, peer, &settings).await {
            Ok(incoming) => incoming,
            Err(e) => {
                tracing::debug!("Read from {} failed: {}", peer, e);
                return;
            }
        };

        let (response, keep_alive) = match incoming {
            Incoming::Closed => return,
            Incoming::Reject(response) => (response, false),
            Incoming::Request(request) => {
                let client_keep_alive = request.wants_keep_alive();
                let response = match settings.dispatcher.dispatch(request).await {
                    Dispatched::Immediate(response) => response,
                    Dispatched::Deferred(receiver) => match receiver.await {
                        Ok(response) => response,
                        Err(_) => {
                            tracing::warn!("Poll for {} was dropped without a response", peer);
                            HttpResponse::new(503).with_keep_alive(false)
                        }
                    },
                };
                let keep_alive = client_keep_alive && response.keep_alive;
                (response, keep_alive)
            }
        };

        let response = response.with_keep_alive(keep_alive);
        let date = httpdate::fmt_http_date(SystemTime::now());
        if let Err(e) = write_response(&mut stream, &response, &date).await {
            tracing::debug!("Write to {} failed, client probably went away: {}", peer, e);
            return;
        }
        if !keep_alive {
            let _ = stream.shutdown().await;
            return;
        }
    }
}

async fn write_response<S>(stream: &mut S, response: &HttpResponse, date: &str) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&response.encode(Some(date))).await?;
    stream.flush().await
}

async fn read_request<S>(
    stream: &mut S,
    buf: &mut BytesMut,
    peer: SocketAddr,
    settings: &ConnectionSettings,
) -> std::io::Result<Incoming>
where
    S: AsyncRead + Unpin,
{
    let head = match tokio::time::timeout(settings.keepalive_timeout, read_head(stream, buf)).await {
        Ok(Ok(Some(head))) => head,
        Ok(Ok(None)) => return Ok(Incoming::Closed),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::InvalidData => {
            tracing::debug!("Malformed request from {}: {}", peer, e);
            return Ok(Incoming::Reject(plain(400, "Bad Request")));
        }
        Ok(Err(e)) => return Err(e),
        Err(_) => {
            tracing::trace!("Idle connection from {} timed out", peer);
            return Ok(Incoming::Closed);
        }
    };

    let header = |name: &str| {
        head.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    };

    if header("transfer-encoding").is_some_and(|v| v.to_ascii_lowercase().contains("chunked")) {
        return Ok(Incoming::Reject(plain(411, "Length Required")));
    }
    let content_length = match header("content-length").map(|v| v.trim().parse::<usize>()) {
        None => 0,
        Some(Ok(len)) => len,
        Some(Err(_)) => return Ok(Incoming::Reject(plain(400, "Bad Request"))),
    };
    if content_length > settings.max_body_bytes {
        return Ok(Incoming::Reject(plain(413, "Payload Too Large")));
    }

    let frame_len = head.len + content_length;
    while buf.len() < frame_len {
        if stream.read_buf(buf).await? == 0 {
            return Ok(Incoming::Closed);
        }
    }
    let mut frame = buf.split_to(frame_len);
    frame.advance(head.len);

    let mut request = HttpRequest::new(head.method, head.raw_url, peer).with_body(frame.freeze());
    request.version = head.version;
    request.headers = head.headers;
    request.secure = settings.secure;
    Ok(Incoming::Request(request))
}

/// Reads until a full request head is buffered. `None` means the peer closed
/// the connection between requests.
async fn read_head<S>(stream: &mut S, buf: &mut BytesMut) -> std::io::Result<Option<Head>>
where
    S: AsyncRead + Unpin,
{
    loop {
        if !buf.is_empty() {
            if let Some(head) = parse_head(buf)? {
                return Ok(Some(head));
            }
            if buf.len() > MAX_HEAD_BYTES {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "request head too large",
                ));
            }
        }
        if stream.read_buf(buf).await? == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed mid-request",
            ));
        }
    }
}

fn parse_head(buf: &[u8]) -> std::io::Result<Option<Head>> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut headers);
    let len = match parsed.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(e) => return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
    };

    let method = parsed.method.unwrap_or_default().to_string();
    let raw_url = parsed.path.unwrap_or("/").to_string();
    let version = parsed.version.unwrap_or(1);
    let headers = parsed
        .headers
        .iter()
        .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
        .collect();
    Ok(Some(Head {
        method,
        raw_url,
        version,
        headers,
        len,
    }))
}

fn plain(status: u16, body: &'static str) -> HttpResponse {
    HttpResponse::new(status)
        .with_content_type("text/plain")
        .with_body(body)
        .with_keep_alive(false)
}
