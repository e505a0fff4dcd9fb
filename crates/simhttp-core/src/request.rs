use std::net::SocketAddr;

use bytes::Bytes;

/// A fully read inbound HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    /// Request target exactly as sent, query string included.
    pub raw_url: String,
    /// Minor HTTP version (`1` for HTTP/1.1).
    pub version: u8,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub remote_addr: SocketAddr,
    pub secure: bool,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, raw_url: impl Into<String>, remote_addr: SocketAddr) -> Self {
        Self {
            method: method.into(),
            raw_url: raw_url.into(),
            version: 1,
            headers: Vec::new(),
            body: Bytes::new(),
            remote_addr,
            secure: false,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// The request path with any query string removed.
    pub fn path(&self) -> &str {
        match self.raw_url.find('?') {
            Some(idx) => &self.raw_url[..idx],
            None => &self.raw_url,
        }
    }

    pub fn query_string(&self) -> Option<&str> {
        self.raw_url.find('?').map(|idx| &self.raw_url[idx + 1..])
    }

    /// Decoded query parameters in the order they were sent.
    pub fn query(&self) -> Vec<(String, String)> {
        match self.query_string() {
            Some(qs) => url::form_urlencoded::parse(qs.as_bytes())
                .into_owned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Case-insensitive header lookup; the first occurrence wins.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type").filter(|v| !v.trim().is_empty())
    }

    /// Content type without parameters, lowercased.
    pub fn media_type(&self) -> Option<String> {
        self.content_type().map(strip_params)
    }

    /// `Accept` values in the order the client listed them, parameters removed.
    pub fn accept_types(&self) -> Vec<String> {
        self.headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("accept"))
            .flat_map(|(_, v)| v.split(','))
            .map(strip_params)
            .filter(|v| !v.is_empty())
            .collect()
    }

    pub fn host(&self) -> &str {
        self.header("host").unwrap_or("")
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Whether the client allows the connection to stay open after this request.
    pub fn wants_keep_alive(&self) -> bool {
        match self.header("connection") {
            Some(v) if v.to_ascii_lowercase().contains("close") => false,
            Some(v) if v.to_ascii_lowercase().contains("keep-alive") => true,
            _ => self.version >= 1,
        }
    }
}

fn strip_params(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// An outbound response, serialised by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_description: Option<String>,
    pub protocol_version: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub keep_alive: bool,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            status_description: None,
            protocol_version: None,
            headers: Vec::new(),
            body: Bytes::new(),
            keep_alive: true,
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.set_header("Content-Type", content_type);
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Replaces any existing header of the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn reason(&self) -> &str {
        match &self.status_description {
            Some(text) => text,
            None => reason_phrase(self.status),
        }
    }

    pub fn protocol(&self) -> &str {
        self.protocol_version.as_deref().unwrap_or("HTTP/1.1")
    }

    /// Serialises status line, headers and body. `Content-Length` and
    /// `Connection` are always derived from the response itself.
    pub fn encode(&self, date: Option<&str>) -> Vec<u8> {
        let mut head = format!("{} {} {}\r\n", self.protocol(), self.status, self.reason());
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("connection") {
                continue;
            }
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        if let Some(date) = date {
            head.push_str("Date: ");
            head.push_str(date);
            head.push_str("\r\n");
        }
        head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        head.push_str(if self.keep_alive {
            "Connection: keep-alive\r\n\r\n"
        } else {
            "Connection: close\r\n\r\n"
        });

        let mut out = head.into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        411 => "Length Required",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
