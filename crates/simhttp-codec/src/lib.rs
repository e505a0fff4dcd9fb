pub mod llsd;
pub mod templates;
pub mod xmlrpc;
mod xml;

pub use llsd::{Llsd, LlsdFormat};
pub use templates::ErrorPages;
pub use xmlrpc::{XmlRpcRequest, XmlRpcResponse, XmlRpcValue};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed xml: {0}")]
    Xml(String),
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unexpected element <{found}>, expected {expected}")]
    UnexpectedElement { found: String, expected: &'static str },
    #[error("invalid {kind} value `{value}`")]
    InvalidValue { kind: &'static str, value: String },
    #[error("document is empty")]
    Empty,
}

impl From<quick_xml::Error> for CodecError {
    fn from(e: quick_xml::Error) -> Self {
        CodecError::Xml(e.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for CodecError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        CodecError::Xml(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
