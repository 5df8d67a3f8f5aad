//! The transport contract.
//!
//! The dispatch layer performs no socket I/O of its own. A [`Transport`]
//! receives a fully-resolved request description, hands back a sink for
//! the request body, and later completes with a streaming response.
//! Redirect traversal, gzip decoding, caching, and retry scheduling all
//! live behind this boundary and are steered only through
//! [`TransportConfig`].

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::BoxStream;
use http::{Method, StatusCode};
use tokio::sync::{mpsc, oneshot};
use url::Url;

use crate::base::error::TransportError;
use crate::http::headers::HeaderMap;

/// Streamed response payload. Errors travel in-band as `Err` items, so a
/// failure mid-stream can never go unobserved by the reader.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Completion side of a transport invocation. Dropping the sender without
/// sending marks the invocation as having produced no response at all.
pub type ResponseHandle = oneshot::Receiver<Result<TransportResponse, TransportError>>;

/// A pluggable request executor.
pub trait Transport: Send + Sync {
    /// Issue a request. Returns the sink the request body will be written
    /// into and a handle that completes once the response starts
    /// streaming. The sink exists before any body byte is produced.
    fn invoke(
        &self,
        method: Method,
        url: Url,
        config: TransportConfig,
    ) -> (RequestSink, ResponseHandle);
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn invoke(
        &self,
        method: Method,
        url: Url,
        config: TransportConfig,
    ) -> (RequestSink, ResponseHandle) {
        (**self).invoke(method, url, config)
    }
}

/// Writable end of the request body channel.
///
/// Dropping the sink signals end of input; there is no separate close
/// call.
pub struct RequestSink {
    tx: mpsc::Sender<Bytes>,
}

impl RequestSink {
    /// Create a sink with a bounded channel. The receiver is the
    /// transport's read side; channel capacity is the flow-control window.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Write one chunk, waiting for channel capacity. Fails with
    /// `BrokenPipe` once the transport has stopped reading.
    pub async fn send(&self, chunk: Bytes) -> io::Result<()> {
        self.tx.send(chunk).await.map_err(|_| {
            io::Error::new(
                io::ErrorKind::BrokenPipe,
                "transport closed the request body",
            )
        })
    }
}

/// Streaming response produced by a transport.
pub struct TransportResponse {
    pub status_code: StatusCode,
    pub headers: HeaderMap,
    pub body: ByteStream,
    /// Effective URL after any redirects the transport followed.
    pub url: String,
}

/// Cache backend selector, passed through to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    Memory,
    File,
}

/// Snapshot of a cached exchange handed to the cache predicates.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub status_code: StatusCode,
    pub headers: HeaderMap,
    pub url: String,
}

/// Caller-supplied cache policy hook, evaluated by the transport.
pub type CachePredicate = Arc<dyn Fn(&CacheEntry) -> bool + Send + Sync>;

/// Everything a transport needs beyond method and URL.
///
/// Filled in from the request options; the dispatch layer interprets none
/// of it beyond the two defaults noted below.
pub struct TransportConfig {
    pub headers: HeaderMap,
    /// Headers allowed to survive a cross-origin redirect.
    pub allow_redirect_headers: Option<Vec<String>>,
    /// True unless explicitly disabled.
    pub follow_redirects: bool,
    pub max_redirects: Option<usize>,
    /// True unless explicitly disabled.
    pub gzip: bool,
    pub cache: Option<CacheMode>,
    /// Reuse the transport's connection agent.
    pub agent: bool,
    pub timeout: Option<Duration>,
    pub socket_timeout: Option<Duration>,
    pub retry: bool,
    pub retry_delay: Option<Duration>,
    pub max_retries: Option<usize>,
    pub is_match: Option<CachePredicate>,
    pub is_expired: Option<CachePredicate>,
    pub can_cache: Option<CachePredicate>,
}
