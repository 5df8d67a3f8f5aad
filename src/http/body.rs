//! Request body normalization.
//!
//! Every request payload is reduced to one of three shapes with a common
//! contract: the headers the body contributes are resolved first
//! (possibly asynchronously), then the body is written into the
//! transport's sink exactly once.

use std::io;

use bytes::Bytes;
use futures::StreamExt;

use crate::base::error::DispatchError;
use crate::http::form::{FormPayload, LengthReport};
use crate::http::headers::HeaderMap;
use crate::http::transport::{ByteStream, RequestSink};

/// Raw body input accepted by the request options.
///
/// The closed set of variants makes an unrecognized body shape
/// unrepresentable; anything convertible to bytes, text, or a byte
/// stream is a valid body.
pub enum BodySource {
    /// A fixed byte payload.
    Bytes(Bytes),
    /// A UTF-8 text payload.
    Text(String),
    /// A readable stream of unknown length.
    Stream(ByteStream),
}

impl From<String> for BodySource {
    fn from(s: String) -> Self {
        BodySource::Text(s)
    }
}

impl From<&str> for BodySource {
    fn from(s: &str) -> Self {
        BodySource::Text(s.to_owned())
    }
}

impl From<Vec<u8>> for BodySource {
    fn from(v: Vec<u8>) -> Self {
        BodySource::Bytes(Bytes::from(v))
    }
}

impl From<Bytes> for BodySource {
    fn from(b: Bytes) -> Self {
        BodySource::Bytes(b)
    }
}

impl From<ByteStream> for BodySource {
    fn from(s: ByteStream) -> Self {
        BodySource::Stream(s)
    }
}

/// Uniform representation of a request payload.
pub enum NormalizedBody {
    /// Fixed bytes plus any headers derived while normalizing (e.g. the
    /// content-type recorded for a JSON payload).
    Buffer { bytes: Bytes, extra: HeaderMap },
    /// A multipart form, encoded lazily.
    Form(Box<dyn FormPayload>),
    /// An arbitrary byte stream; no content-length is ever inferred.
    Stream(ByteStream),
}

impl NormalizedBody {
    /// Build the body for a duplex request from the three body options.
    ///
    /// `form` wins over `json`, which wins over `body`. An absent body
    /// becomes an empty buffer, so the request still carries
    /// `content-length: 0` rather than omitting the header.
    pub(crate) fn select(
        form: Option<Box<dyn FormPayload>>,
        json: Option<serde_json::Value>,
        body: Option<BodySource>,
    ) -> Result<NormalizedBody, DispatchError> {
        if let Some(form) = form {
            return Ok(NormalizedBody::Form(form));
        }

        if let Some(json) = json {
            let text = serde_json::to_string(&json).map_err(DispatchError::JsonEncode)?;
            let mut extra = HeaderMap::new();
            extra.set("content-type", "application/json");
            return Ok(NormalizedBody::Buffer {
                bytes: Bytes::from(text),
                extra,
            });
        }

        Ok(match body {
            None => NormalizedBody::Buffer {
                bytes: Bytes::new(),
                extra: HeaderMap::new(),
            },
            Some(BodySource::Bytes(bytes)) => NormalizedBody::Buffer {
                bytes,
                extra: HeaderMap::new(),
            },
            Some(BodySource::Text(text)) => NormalizedBody::Buffer {
                bytes: Bytes::from(text),
                extra: HeaderMap::new(),
            },
            Some(BodySource::Stream(stream)) => NormalizedBody::Stream(stream),
        })
    }

    /// Resolve the headers this body contributes.
    ///
    /// Settles exactly once per body, even when a form's length callback
    /// fires repeatedly; all failures surface through the result.
    pub async fn resolve_headers(&self) -> Result<HeaderMap, DispatchError> {
        match self {
            NormalizedBody::Buffer { bytes, extra } => {
                let mut headers = extra.clone();
                headers.set("content-length", bytes.len().to_string());
                Ok(headers)
            }
            NormalizedBody::Form(form) => {
                let (report, outcome) = LengthReport::new();
                form.compute_length(report);
                let length = outcome.await.map_err(|_| {
                    DispatchError::FormLength("length computation was abandoned".into())
                })??;

                let mut headers = form.header_block();
                headers.set("content-length", length.to_string());
                Ok(headers)
            }
            NormalizedBody::Stream(_) => Ok(HeaderMap::new()),
        }
    }

    /// Drain the body into the transport's request sink.
    ///
    /// Only called after [`resolve_headers`](Self::resolve_headers)
    /// succeeded; the sink is dropped on return, which ends the body.
    pub async fn write_to(self, sink: RequestSink) -> io::Result<()> {
        match self {
            NormalizedBody::Buffer { bytes, .. } => {
                if !bytes.is_empty() {
                    sink.send(bytes).await?;
                }
                Ok(())
            }
            NormalizedBody::Form(form) => form.write_to(sink).await,
            NormalizedBody::Stream(mut stream) => {
                while let Some(chunk) = stream.next().await {
                    sink.send(chunk?).await?;
                }
                Ok(())
            }
        }
    }
}
