#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("failed to listen on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("tls setup failed: {0}")]
    Tls(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("response descriptor is missing required field `{0}`")]
    MissingResponseField(&'static str),
    #[error("response field `{field}` has the wrong type, expected {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
    #[error("codec error: {0}")]
    Codec(String),
    #[error("handler failed: {0}")]
    Handler(#[from] HandlerError),
}

pub type Result<T> = std::result::Result<T, HttpError>;

/// Error returned by externally registered handlers.
///
/// Handlers are owned by scene and module code; the dispatcher converts this
/// into the protocol's own fault representation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

#[cfg(test)]
mod tests {
    use super::{HandlerError, HttpError};

    #[test]
    fn handler_error_displays_its_message() {
        let err = HandlerError::from("no grid");
        assert_eq!(err.to_string(), "no grid");
        assert!(std::error::Error::source(&err).is_none());

        let wrapped = HttpError::from(err);
        assert_eq!(wrapped.to_string(), "handler failed: no grid");
        assert!(std::error::Error::source(&wrapped).is_some());
    }
}
