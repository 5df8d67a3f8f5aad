//! Buffered HTTP response snapshot.

use bytes::Bytes;
use http::StatusCode;

use crate::base::error::DispatchError;
use crate::http::headers::HeaderMap;

/// A fully-buffered response.
///
/// Built exactly once per request, after the transport's stream has
/// drained, and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    url: String,
}

impl Response {
    pub(crate) fn new(status: StatusCode, headers: HeaderMap, body: Bytes, url: String) -> Self {
        Self {
            status,
            headers,
            body,
            url,
        }
    }

    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get a reference to the headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Effective URL after any redirects the transport followed.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The buffered body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Body as UTF-8 text.
    pub fn text(&self) -> Result<&str, DispatchError> {
        std::str::from_utf8(&self.body).map_err(|_| DispatchError::InvalidUtf8)
    }

    /// Body deserialized as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, DispatchError> {
        serde_json::from_slice(&self.body).map_err(DispatchError::JsonDecode)
    }
}
