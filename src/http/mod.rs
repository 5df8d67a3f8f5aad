pub mod body;
pub mod dispatch;
pub mod form;
pub mod headers;
pub mod options;
pub mod response;
pub mod transport;

// Re-exports for convenience
pub use body::{BodySource, NormalizedBody};
pub use dispatch::Dispatcher;
pub use form::{FormPayload, LengthReport, MultipartForm, Part};
pub use headers::HeaderMap;
pub use options::RequestOptions;
pub use response::Response;
pub use transport::{
    ByteStream, CacheEntry, CacheMode, CachePredicate, RequestSink, ResponseHandle, Transport,
    TransportConfig, TransportResponse,
};
