//! Multipart form payloads.
//!
//! Provides RFC 2046 multipart/form-data encoding for file uploads, plus
//! the [`FormPayload`] contract the dispatch layer consumes, so an
//! alternative encoder can be plugged in without touching dispatch.

use std::borrow::Cow;
use std::io;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::oneshot;

use crate::base::error::DispatchError;
use crate::http::headers::HeaderMap;
use crate::http::transport::RequestSink;

/// Contract between the dispatch layer and a multipart form encoder.
pub trait FormPayload: Send + 'static {
    /// Headers describing the encoded form (the boundary content-type).
    fn header_block(&self) -> HeaderMap;

    /// Compute the total encoded length, delivering the outcome through
    /// `report`. Implementations are allowed to fire the report more than
    /// once; only the first outcome counts.
    fn compute_length(&self, report: LengthReport);

    /// Stream the encoded form into the request sink. Backpressure comes
    /// from the sink itself; end of input is signalled by dropping it.
    fn write_to(self: Box<Self>, sink: RequestSink) -> BoxFuture<'static, io::Result<()>>;
}

/// Single-settlement channel for form length computation.
///
/// The first `resolve` or `fail` wins; any later call finds the slot
/// empty and is dropped.
#[derive(Clone)]
pub struct LengthReport {
    slot: Arc<Mutex<Option<oneshot::Sender<Result<u64, DispatchError>>>>>,
}

impl LengthReport {
    pub(crate) fn new() -> (Self, oneshot::Receiver<Result<u64, DispatchError>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    fn settle(&self, outcome: Result<u64, DispatchError>) {
        let Some(tx) = self.slot.lock().ok().and_then(|mut slot| slot.take()) else {
            return;
        };
        let _ = tx.send(outcome);
    }

    /// Deliver the computed length.
    pub fn resolve(&self, length: u64) {
        self.settle(Ok(length));
    }

    /// Deliver a failure. Plain-string reasons are wrapped into a proper
    /// error value rather than escaping as raw strings.
    pub fn fail(&self, reason: impl ToString) {
        self.settle(Err(DispatchError::FormLength(reason.to_string())));
    }
}

/// A multipart/form-data payload.
///
/// # Example
/// ```ignore
/// use dispatchnet::{MultipartForm, Part};
///
/// let form = MultipartForm::new()
///     .text("username", "user123")
///     .part("file", Part::bytes(b"file content".as_slice()).file_name("doc.txt"));
/// ```
pub struct MultipartForm {
    boundary: String,
    parts: Vec<(Cow<'static, str>, Part)>,
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartForm {
    /// Create a new empty form.
    pub fn new() -> Self {
        Self {
            boundary: generate_boundary(),
            parts: Vec::new(),
        }
    }

    /// Get the boundary string.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Add a text field.
    pub fn text<N, V>(self, name: N, value: V) -> Self
    where
        N: Into<Cow<'static, str>>,
        V: Into<Cow<'static, str>>,
    {
        self.part(name, Part::text(value))
    }

    /// Add a custom part.
    pub fn part<N>(mut self, name: N, part: Part) -> Self
    where
        N: Into<Cow<'static, str>>,
    {
        self.parts.push((name.into(), part));
        self
    }
}

impl FormPayload for MultipartForm {
    fn header_block(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.set(
            "content-type",
            format!("multipart/form-data; boundary={}", self.boundary),
        );
        headers
    }

    fn compute_length(&self, report: LengthReport) {
        if self.parts.is_empty() {
            report.resolve(0);
            return;
        }

        let mut total = 0u64;
        for (name, part) in &self.parts {
            total += part_header(&self.boundary, name, part).len() as u64;
            match part.content.len() {
                Some(len) => total += len,
                None => {
                    report.fail(format!("length of part {name:?} is unknown"));
                    return;
                }
            }
            // trailing \r\n after each part body
            total += 2;
        }
        total += closing_boundary(&self.boundary).len() as u64;

        report.resolve(total);
    }

    fn write_to(self: Box<Self>, sink: RequestSink) -> BoxFuture<'static, io::Result<()>> {
        Box::pin(async move {
            let MultipartForm { boundary, parts } = *self;
            if parts.is_empty() {
                return Ok(());
            }

            for (name, part) in parts {
                let header = part_header(&boundary, &name, &part);
                sink.send(Bytes::from(header)).await?;

                match part.content {
                    PartContent::Bytes(data) => {
                        if !data.is_empty() {
                            sink.send(data).await?;
                        }
                    }
                    PartContent::Reader { mut reader, .. } => {
                        let mut buf = [0u8; 8192];
                        loop {
                            let n = reader.read(&mut buf).await?;
                            if n == 0 {
                                break;
                            }
                            sink.send(Bytes::copy_from_slice(&buf[..n])).await?;
                        }
                    }
                }

                sink.send(Bytes::from_static(b"\r\n")).await?;
            }

            sink.send(Bytes::from(closing_boundary(&boundary))).await?;
            Ok(())
        })
    }
}

/// One field of a multipart form.
pub struct Part {
    content: PartContent,
    content_type: Option<String>,
    file_name: Option<Cow<'static, str>>,
}

enum PartContent {
    Bytes(Bytes),
    Reader {
        reader: Box<dyn AsyncRead + Send + Unpin>,
        length: Option<u64>,
    },
}

impl PartContent {
    fn len(&self) -> Option<u64> {
        match self {
            PartContent::Bytes(data) => Some(data.len() as u64),
            PartContent::Reader { length, .. } => *length,
        }
    }
}

impl Part {
    /// Create a text part.
    pub fn text<V>(value: V) -> Self
    where
        V: Into<Cow<'static, str>>,
    {
        Self {
            content: PartContent::Bytes(Bytes::from(value.into().into_owned())),
            content_type: Some("text/plain; charset=utf-8".to_string()),
            file_name: None,
        }
    }

    /// Create a part from bytes.
    pub fn bytes<B>(data: B) -> Self
    where
        B: Into<Bytes>,
    {
        Self {
            content: PartContent::Bytes(data.into()),
            content_type: None,
            file_name: None,
        }
    }

    /// Create a part fed from an async reader.
    ///
    /// Without a declared length the form's total length cannot be
    /// computed and dispatching the form will fail.
    pub fn reader<R>(reader: R, length: Option<u64>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            content: PartContent::Reader {
                reader: Box::new(reader),
                length,
            },
            content_type: None,
            file_name: None,
        }
    }

    /// Set the content type.
    pub fn content_type(mut self, mime: impl Into<String>) -> Self {
        self.content_type = Some(mime.into());
        self
    }

    /// Set the file name.
    pub fn file_name<S>(mut self, name: S) -> Self
    where
        S: Into<Cow<'static, str>>,
    {
        self.file_name = Some(name.into());
        self
    }
}

/// Opening boundary plus the part's header block, through the blank line.
fn part_header(boundary: &str, name: &str, part: &Part) -> String {
    let mut block = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"",
        escape_quotes(name)
    );
    if let Some(filename) = &part.file_name {
        block.push_str("; filename=\"");
        block.push_str(&escape_quotes(filename));
        block.push('"');
    }
    if let Some(mime) = &part.content_type {
        block.push_str("\r\nContent-Type: ");
        block.push_str(mime);
    }
    block.push_str("\r\n\r\n");
    block
}

fn closing_boundary(boundary: &str) -> String {
    format!("--{boundary}--\r\n")
}

/// Escape quotes, backslashes, and line breaks in a field name.
fn escape_quotes(s: &str) -> Cow<'_, str> {
    if s.contains(['"', '\\', '\r', '\n']) {
        Cow::Owned(
            s.replace('\\', "\\\\")
                .replace('"', "\\\"")
                .replace('\r', "\\r")
                .replace('\n', "\\n"),
        )
    } else {
        Cow::Borrowed(s)
    }
}

/// Generate a boundary unique enough for concurrent requests.
fn generate_boundary() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();

    format!("----dispatchnet-{:016x}{:08x}", nanos, std::process::id())
}
