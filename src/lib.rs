//! # dispatchnet
//!
//! A request normalization and dispatch layer for pluggable HTTP
//! transports.
//!
//! `dispatchnet` sits in front of a lower-level transport and takes care
//! of the part every HTTP client repeats: turning loosely-typed request
//! options into a uniform body-with-headers, merging derived headers
//! under the caller's own, and buffering the transport's streamed
//! response into a single in-memory value.
//!
//! ## Features
//!
//! - **Body normalization**: raw bytes, text, JSON, multipart forms, and
//!   arbitrary byte streams reduced to three uniform shapes
//! - **Non-destructive header merging**: derived headers never overwrite
//!   caller-supplied ones, compared case-insensitively
//! - **Verb legality**: GET/DELETE/HEAD refuse a body before the
//!   transport is ever invoked
//! - **Buffered responses**: streaming transport output collected into
//!   one immutable snapshot
//! - **Injected transports**: redirects, gzip, caching, and retries live
//!   behind a narrow trait, swappable in tests
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dispatchnet::{Dispatcher, RequestOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let dispatcher = Dispatcher::new(transport);
//!     let response = dispatcher
//!         .put("http://example.com/upload", RequestOptions::new().body("hi"))
//!         .await
//!         .unwrap();
//!     println!("Status: {}", response.status());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error types
//! - [`http`] - Body normalization, headers, the transport contract, and
//!   request dispatch

pub mod base;
pub mod http;

pub use base::error::{DispatchError, TransportError};
pub use http::{
    BodySource, ByteStream, Dispatcher, FormPayload, HeaderMap, MultipartForm, Part,
    RequestOptions, RequestSink, Response, Transport, TransportConfig, TransportResponse,
};
