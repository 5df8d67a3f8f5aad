//! Per-request options.

use std::time::Duration;

use crate::http::body::BodySource;
use crate::http::form::FormPayload;
use crate::http::headers::HeaderMap;
use crate::http::transport::{CacheMode, CachePredicate};

/// Options for a single request.
///
/// At most one of `body`, `json`, and `form` is meaningful; `form` takes
/// precedence, then `json`. Everything past the body fields is handed to
/// the transport untouched.
///
/// # Example
/// ```ignore
/// use dispatchnet::RequestOptions;
///
/// let options = RequestOptions::new()
///     .json(serde_json::json!({"name": "value"}))
///     .header("x-request-id", "abc123")
///     .qs("page", "2");
/// ```
#[derive(Default)]
pub struct RequestOptions {
    pub(crate) body: Option<BodySource>,
    pub(crate) json: Option<serde_json::Value>,
    pub(crate) form: Option<Box<dyn FormPayload>>,
    pub(crate) headers: HeaderMap,
    pub(crate) qs: Vec<(String, String)>,
    pub(crate) allow_redirect_headers: Option<Vec<String>>,
    pub(crate) follow_redirects: Option<bool>,
    pub(crate) max_redirects: Option<usize>,
    pub(crate) gzip: Option<bool>,
    pub(crate) cache: Option<CacheMode>,
    pub(crate) agent: bool,
    pub(crate) timeout: Option<Duration>,
    pub(crate) socket_timeout: Option<Duration>,
    pub(crate) retry: bool,
    pub(crate) retry_delay: Option<Duration>,
    pub(crate) max_retries: Option<usize>,
    pub(crate) is_match: Option<CachePredicate>,
    pub(crate) is_expired: Option<CachePredicate>,
    pub(crate) can_cache: Option<CachePredicate>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a raw body: bytes, text, or a byte stream.
    pub fn body(mut self, body: impl Into<BodySource>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set a JSON body. Derives `content-type: application/json` unless
    /// the caller supplies their own content-type header.
    pub fn json(mut self, json: serde_json::Value) -> Self {
        self.json = Some(json);
        self
    }

    /// Set a multipart form body. Takes precedence over `body` and `json`.
    pub fn form(mut self, form: impl FormPayload) -> Self {
        self.form = Some(Box::new(form));
        self
    }

    /// Set a header, replacing any previous value under that name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Replace the whole header set.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Append a query-string pair to the target URL.
    pub fn qs(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.qs.push((key.into(), value.into()));
        self
    }

    /// Headers allowed to survive a cross-origin redirect.
    pub fn allow_redirect_headers(mut self, names: Vec<String>) -> Self {
        self.allow_redirect_headers = Some(names);
        self
    }

    /// Whether the transport follows redirects. Defaults to true.
    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = Some(follow);
        self
    }

    pub fn max_redirects(mut self, limit: usize) -> Self {
        self.max_redirects = Some(limit);
        self
    }

    /// Whether the transport negotiates gzip. Defaults to true.
    pub fn gzip(mut self, gzip: bool) -> Self {
        self.gzip = Some(gzip);
        self
    }

    pub fn cache(mut self, mode: CacheMode) -> Self {
        self.cache = Some(mode);
        self
    }

    /// Reuse the transport's connection agent.
    pub fn agent(mut self, reuse: bool) -> Self {
        self.agent = reuse;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = Some(timeout);
        self
    }

    pub fn retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn max_retries(mut self, limit: usize) -> Self {
        self.max_retries = Some(limit);
        self
    }

    pub fn is_match(mut self, predicate: CachePredicate) -> Self {
        self.is_match = Some(predicate);
        self
    }

    pub fn is_expired(mut self, predicate: CachePredicate) -> Self {
        self.is_expired = Some(predicate);
        self
    }

    pub fn can_cache(mut self, predicate: CachePredicate) -> Self {
        self.can_cache = Some(predicate);
        self
    }

    /// Whether any body input was supplied.
    pub(crate) fn has_body(&self) -> bool {
        self.body.is_some() || self.json.is_some() || self.form.is_some()
    }
}
