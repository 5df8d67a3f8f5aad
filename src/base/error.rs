use http::Method;
use thiserror::Error;

/// Everything a dispatched request can fail with.
///
/// Usage errors (bad method, bad URL, body on a bodyless verb) are caught
/// before the transport is ever invoked. Failures reported by the transport
/// itself pass through untouched as [`DispatchError::Transport`].
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid HTTP method: {0:?}")]
    InvalidMethod(String),

    #[error("invalid URL")]
    InvalidUrl(#[from] url::ParseError),

    #[error("cannot send a body with a {0} request")]
    BodyNotAllowed(Method),

    #[error("failed to encode JSON body")]
    JsonEncode(#[source] serde_json::Error),

    #[error("form length computation failed: {0}")]
    FormLength(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("transport finished without producing a response")]
    MissingResponse,

    #[error("response stream failed")]
    ResponseStream(#[source] std::io::Error),

    #[error("response body is not valid UTF-8")]
    InvalidUtf8,

    #[error("failed to decode JSON response")]
    JsonDecode(#[source] serde_json::Error),
}

/// Opaque failure reported by a transport.
///
/// The dispatch layer does not inspect or retry these; retry and timeout
/// policy live on the other side of the transport boundary.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}
