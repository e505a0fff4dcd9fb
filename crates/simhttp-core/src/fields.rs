//! Field maps exchanged with generic HTTP and poll handlers.
//!
//! Handlers receive the request flattened into named fields and answer with a
//! descriptor map using the well-known response keys below.

use std::collections::BTreeMap;

use base64::Engine;
use bytes::Bytes;

use crate::error::{HttpError, Result};
use crate::request::{HttpRequest, HttpResponse};

pub const RESPONSE_CODE: &str = "int_response_code";
pub const RESPONSE_BODY: &str = "str_response_string";
pub const CONTENT_TYPE: &str = "content_type";
pub const REDIRECT_LOCATION: &str = "str_redirect_location";
pub const KEEP_ALIVE: &str = "keepalive";
pub const ALLOW_ORIGIN: &str = "access_control_allow_origin";
pub const PROTOCOL_VERSION: &str = "http_protocol_version";
pub const STATUS_TEXT: &str = "error_status_text";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            FieldValue::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

pub type FieldMap = BTreeMap<String, FieldValue>;

/// Flattens a request into the field map handed to generic and poll handlers.
///
/// Synthesized keys (`body`, `uri`, `content-type`, `http-method`, `headers`,
/// `querystringkeys`, `requestvars`) take precedence over query parameters
/// with the same name.
pub fn request_fields(request: &HttpRequest) -> FieldMap {
    let mut fields = FieldMap::new();
    fields.insert("body".into(), request.body_text().into());
    fields.insert("uri".into(), request.raw_url.clone().into());
    fields.insert(
        "content-type".into(),
        request.content_type().unwrap_or("").into(),
    );
    fields.insert("http-method".into(), request.method.clone().into());

    let query = request.query();
    let mut keys = Vec::with_capacity(query.len());
    let mut vars = BTreeMap::new();
    for (name, value) in query {
        keys.push(name.clone());
        vars.insert(name.clone(), value.clone());
        fields.entry(name).or_insert(FieldValue::Str(value));
    }

    let headers = request
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    fields.insert("headers".into(), FieldValue::Map(headers));
    fields.insert("querystringkeys".into(), FieldValue::List(keys));
    fields.insert("requestvars".into(), FieldValue::Map(vars));
    fields
}

/// Typed view of a handler's response map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseDescriptor {
    pub status: u16,
    pub body: String,
    pub content_type: Option<String>,
    pub redirect_location: Option<String>,
    pub keep_alive: Option<bool>,
    pub allow_origin: Option<String>,
    pub protocol_version: Option<String>,
    pub status_text: Option<String>,
}

impl ResponseDescriptor {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            content_type: None,
            redirect_location: None,
            keep_alive: None,
            allow_origin: None,
            protocol_version: None,
            status_text: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = Some(keep_alive);
        self
    }

    pub fn with_redirect(mut self, location: impl Into<String>) -> Self {
        self.redirect_location = Some(location.into());
        self
    }

    pub fn into_fields(self) -> FieldMap {
        let mut map = FieldMap::new();
        map.insert(RESPONSE_CODE.into(), FieldValue::Int(self.status as i64));
        map.insert(RESPONSE_BODY.into(), FieldValue::Str(self.body));
        if let Some(v) = self.content_type {
            map.insert(CONTENT_TYPE.into(), FieldValue::Str(v));
        }
        if let Some(v) = self.redirect_location {
            map.insert(REDIRECT_LOCATION.into(), FieldValue::Str(v));
        }
        if let Some(v) = self.keep_alive {
            map.insert(KEEP_ALIVE.into(), FieldValue::Bool(v));
        }
        if let Some(v) = self.allow_origin {
            map.insert(ALLOW_ORIGIN.into(), FieldValue::Str(v));
        }
        if let Some(v) = self.protocol_version {
            map.insert(PROTOCOL_VERSION.into(), FieldValue::Str(v));
        }
        if let Some(v) = self.status_text {
            map.insert(STATUS_TEXT.into(), FieldValue::Str(v));
        }
        map
    }

    pub fn from_fields(map: &FieldMap) -> Result<Self> {
        let status = match map.get(RESPONSE_CODE) {
            None => return Err(HttpError::MissingResponseField(RESPONSE_CODE)),
            Some(v) => v
                .as_int()
                .and_then(|i| u16::try_from(i).ok())
                .ok_or(HttpError::InvalidField {
                    field: RESPONSE_CODE,
                    expected: "status code integer",
                })?,
        };
        let body = match map.get(RESPONSE_BODY) {
            None => return Err(HttpError::MissingResponseField(RESPONSE_BODY)),
            Some(v) => v.as_str().ok_or(HttpError::InvalidField {
                field: RESPONSE_BODY,
                expected: "string",
            })?,
        };

        let opt_str = |key: &'static str| -> Result<Option<String>> {
            match map.get(key) {
                None => Ok(None),
                Some(v) => v.as_str().map(|s| Some(s.to_string())).ok_or(HttpError::InvalidField {
                    field: key,
                    expected: "string",
                }),
            }
        };
        let keep_alive = match map.get(KEEP_ALIVE) {
            None => None,
            Some(v) => Some(v.as_bool().ok_or(HttpError::InvalidField {
                field: KEEP_ALIVE,
                expected: "bool",
            })?),
        };

        Ok(Self {
            status,
            body: body.to_string(),
            content_type: opt_str(CONTENT_TYPE)?,
            redirect_location: opt_str(REDIRECT_LOCATION)?,
            keep_alive,
            allow_origin: opt_str(ALLOW_ORIGIN)?,
            protocol_version: opt_str(PROTOCOL_VERSION)?,
            status_text: opt_str(STATUS_TEXT)?,
        })
    }

    /// Builds the wire response. Binary content types carry their body as
    /// base64 text and are decoded here.
    pub fn render(&self) -> Result<HttpResponse> {
        let content_type = match self.content_type.as_deref() {
            Some(ct) if !ct.is_empty() => ct.to_string(),
            _ => "text/html".to_string(),
        };

        let body = if is_binary_content_type(&content_type) {
            base64::engine::general_purpose::STANDARD
                .decode(self.body.trim())
                .map_err(|e| HttpError::Codec(format!("binary body is not valid base64: {e}")))?
        } else {
            self.body.clone().into_bytes()
        };

        let mut response = HttpResponse::new(self.status).with_body(Bytes::from(body));
        response.set_header("Content-Type", content_type);
        response.status_description = self.status_text.clone();
        response.protocol_version = self.protocol_version.clone();
        if let Some(keep_alive) = self.keep_alive {
            response.keep_alive = keep_alive;
        }
        if let Some(origin) = &self.allow_origin {
            response.set_header("Access-Control-Allow-Origin", origin.clone());
        }
        if self.status == 301 {
            if let Some(location) = &self.redirect_location {
                response.set_header("Location", location.clone());
            }
        }
        Ok(response)
    }
}

pub fn is_binary_content_type(content_type: &str) -> bool {
    content_type.contains("image")
        || content_type.contains("x-shockwave-flash")
        || content_type.contains("application/x-oar")
        || content_type.contains("application/vnd.ll.mesh")
}

/// Validates a handler's map and renders it in one step.
pub fn render_fields(map: &FieldMap) -> Result<HttpResponse> {
    ResponseDescriptor::from_fields(map)?.render()
}
