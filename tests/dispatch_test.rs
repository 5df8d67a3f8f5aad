use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use dispatchnet::http::{CacheEntry, CacheMode};
use dispatchnet::{
    BodySource, ByteStream, DispatchError, Dispatcher, HeaderMap, MultipartForm, Part,
    RequestOptions, RequestSink, Transport, TransportConfig, TransportError, TransportResponse,
};
use dispatchnet::http::transport::ResponseHandle;
use futures::StreamExt;
use http::{Method, StatusCode};
use url::Url;

type Outcome = Option<Result<TransportResponse, TransportError>>;

/// What the transport saw for one invocation.
#[derive(Clone)]
struct Invocation {
    method: Method,
    url: String,
    headers: HeaderMap,
    follow_redirects: bool,
    gzip: bool,
    cache: Option<CacheMode>,
    agent: bool,
    retry: bool,
    timeout: Option<Duration>,
    max_retries: Option<usize>,
    has_match_predicate: bool,
}

/// Scripted transport: records each invocation, drains the request body,
/// then answers with whatever the responder produces. A `None` outcome
/// drops the completion channel without answering.
struct MockTransport {
    seen: Mutex<Vec<Invocation>>,
    bodies: Arc<Mutex<Vec<Vec<u8>>>>,
    responder: Arc<dyn Fn(&[u8]) -> Outcome + Send + Sync>,
}

impl MockTransport {
    fn respond_with(responder: impl Fn(&[u8]) -> Outcome + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            bodies: Arc::new(Mutex::new(Vec::new())),
            responder: Arc::new(responder),
        })
    }

    /// Respond 200 with the given chunks, regardless of the request.
    fn ok_with(chunks: &'static [&'static [u8]]) -> Arc<Self> {
        Self::respond_with(move |_| {
            let body: ByteStream =
                futures::stream::iter(chunks.iter().map(|chunk| Ok(Bytes::from_static(chunk))))
                    .boxed();
            let mut headers = HeaderMap::new();
            headers.set("x-served-by", "mock");
            Some(Ok(TransportResponse {
                status_code: StatusCode::OK,
                headers,
                body,
                url: "http://upstream.test/final".to_string(),
            }))
        })
    }

    fn vanishing() -> Arc<Self> {
        Self::respond_with(|_| None)
    }

    fn invocations(&self) -> Vec<Invocation> {
        self.seen.lock().unwrap().clone()
    }

    fn last_invocation(&self) -> Invocation {
        self.invocations()
            .last()
            .expect("transport was never invoked")
            .clone()
    }

    fn request_bodies(&self) -> Vec<Vec<u8>> {
        self.bodies.lock().unwrap().clone()
    }
}

impl Transport for MockTransport {
    fn invoke(
        &self,
        method: Method,
        url: Url,
        config: TransportConfig,
    ) -> (RequestSink, ResponseHandle) {
        let (sink, mut body_rx) = RequestSink::channel(8);
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();

        self.seen.lock().unwrap().push(Invocation {
            method,
            url: url.to_string(),
            headers: config.headers.clone(),
            follow_redirects: config.follow_redirects,
            gzip: config.gzip,
            cache: config.cache,
            agent: config.agent,
            retry: config.retry,
            timeout: config.timeout,
            max_retries: config.max_retries,
            has_match_predicate: config.is_match.is_some(),
        });

        let bodies = self.bodies.clone();
        let responder = self.responder.clone();
        tokio::spawn(async move {
            let mut body = Vec::new();
            while let Some(chunk) = body_rx.recv().await {
                body.extend_from_slice(&chunk);
            }
            bodies.lock().unwrap().push(body.clone());
            match responder(&body) {
                Some(outcome) => {
                    let _ = done_tx.send(outcome);
                }
                None => drop(done_tx),
            }
        });

        (sink, done_rx)
    }
}

#[tokio::test]
async fn test_get_with_body_fails_before_dispatch() {
    let transport = MockTransport::ok_with(&[b"ignored"]);
    let dispatcher = Dispatcher::new(transport.clone());

    let err = dispatcher
        .request("GET", "http://x.test/", RequestOptions::new().body("hi"))
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::BodyNotAllowed(_)));
    assert!(transport.invocations().is_empty());
}

#[tokio::test]
async fn test_delete_with_json_fails_before_dispatch() {
    let transport = MockTransport::ok_with(&[]);
    let dispatcher = Dispatcher::new(transport.clone());

    let err = dispatcher
        .request(
            "DELETE",
            "http://x.test/",
            RequestOptions::new().json(serde_json::json!({"a": 1})),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::BodyNotAllowed(_)));
    assert!(transport.invocations().is_empty());
}

#[tokio::test]
async fn test_head_with_form_fails_before_dispatch() {
    let transport = MockTransport::ok_with(&[]);
    let dispatcher = Dispatcher::new(transport.clone());

    let form = MultipartForm::new().text("field", "value");
    let err = dispatcher
        .head("http://x.test/", RequestOptions::new().form(form))
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::BodyNotAllowed(_)));
    assert!(transport.invocations().is_empty());
}

#[tokio::test]
async fn test_bodyless_verb_without_body_dispatches() {
    let transport = MockTransport::ok_with(&[b"ok"]);
    let dispatcher = Dispatcher::new(transport.clone());

    let response = dispatcher
        .get("http://x.test/", RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(transport.invocations().len(), 1);
    // No body task ran; the transport saw an empty body channel.
    assert_eq!(&transport.request_bodies()[0][..], b"");
    assert!(transport.last_invocation().headers.get("content-length").is_none());
}

#[tokio::test]
async fn test_duplex_without_body_sends_content_length_zero() {
    let transport = MockTransport::ok_with(&[]);
    let dispatcher = Dispatcher::new(transport.clone());

    dispatcher
        .put("http://x.test/", RequestOptions::new())
        .await
        .unwrap();

    let seen = transport.last_invocation();
    assert_eq!(seen.headers.get("content-length"), Some("0"));
    assert_eq!(&transport.request_bodies()[0][..], b"");
}

#[tokio::test]
async fn test_json_body_bytes_and_content_type() {
    let transport = MockTransport::ok_with(&[]);
    let dispatcher = Dispatcher::new(transport.clone());

    dispatcher
        .post(
            "http://x.test/",
            RequestOptions::new().json(serde_json::json!({"a": 1})),
        )
        .await
        .unwrap();

    let seen = transport.last_invocation();
    assert_eq!(seen.headers.get("content-type"), Some("application/json"));
    assert_eq!(seen.headers.get("content-length"), Some("7"));
    assert_eq!(&transport.request_bodies()[0][..], b"{\"a\":1}");
}

#[tokio::test]
async fn test_caller_headers_win_over_derived() {
    let transport = MockTransport::ok_with(&[]);
    let dispatcher = Dispatcher::new(transport.clone());

    dispatcher
        .post(
            "http://x.test/",
            RequestOptions::new()
                .json(serde_json::json!({"a": 1}))
                .header("Content-Type", "text/plain"),
        )
        .await
        .unwrap();

    let seen = transport.last_invocation();
    assert_eq!(seen.headers.get("content-type"), Some("text/plain"));
    assert_eq!(seen.headers.get_all("content-type").count(), 1);
    // Headers the caller did not set still come from the body.
    assert_eq!(seen.headers.get("content-length"), Some("7"));
}

#[tokio::test]
async fn test_qs_is_encoded_into_target_url() {
    let transport = MockTransport::ok_with(&[]);
    let dispatcher = Dispatcher::new(transport.clone());

    dispatcher
        .get("http://x.test/", RequestOptions::new().qs("a", "1 2"))
        .await
        .unwrap();

    assert_eq!(transport.last_invocation().url, "http://x.test/?a=1+2");
}

#[tokio::test]
async fn test_qs_appends_to_existing_query() {
    let transport = MockTransport::ok_with(&[]);
    let dispatcher = Dispatcher::new(transport.clone());

    dispatcher
        .get("http://x.test/?b=2", RequestOptions::new().qs("a", "1"))
        .await
        .unwrap();

    assert_eq!(transport.last_invocation().url, "http://x.test/?b=2&a=1");
}

#[tokio::test]
async fn test_put_body_roundtrip() {
    let transport = MockTransport::ok_with(&[b"wor", b"ld"]);
    let dispatcher = Dispatcher::new(transport.clone());

    let response = dispatcher
        .put("http://x.test/up", RequestOptions::new().body("hi"))
        .await
        .unwrap();

    let seen = transport.last_invocation();
    assert_eq!(seen.method, Method::PUT);
    assert_eq!(seen.headers.get("content-length"), Some("2"));
    assert_eq!(&transport.request_bodies()[0][..], b"hi");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(&response.body()[..], b"world");
    assert_eq!(response.url(), "http://upstream.test/final");
    assert_eq!(response.headers().get("x-served-by"), Some("mock"));
}

#[tokio::test]
async fn test_stream_body_never_gains_content_length() {
    let transport = MockTransport::ok_with(&[]);
    let dispatcher = Dispatcher::new(transport.clone());

    let stream: ByteStream = futures::stream::iter(vec![
        Ok(Bytes::from_static(b"alpha")),
        Ok(Bytes::from_static(b"beta")),
    ])
    .boxed();

    dispatcher
        .post(
            "http://x.test/",
            RequestOptions::new().body(BodySource::Stream(stream)),
        )
        .await
        .unwrap();

    let seen = transport.last_invocation();
    assert!(seen.headers.get("content-length").is_none());
    assert_eq!(&transport.request_bodies()[0][..], b"alphabeta");
}

#[tokio::test]
async fn test_form_dispatch_declares_exact_length() {
    let transport = MockTransport::ok_with(&[]);
    let dispatcher = Dispatcher::new(transport.clone());

    let form = MultipartForm::new().text("field", "value").part(
        "file",
        Part::bytes(b"data".as_slice()).file_name("d.bin"),
    );

    dispatcher
        .post("http://x.test/", RequestOptions::new().form(form))
        .await
        .unwrap();

    let seen = transport.last_invocation();
    let declared: usize = seen
        .headers
        .get("content-length")
        .unwrap()
        .parse()
        .unwrap();
    let body = transport.request_bodies()[0].clone();
    assert_eq!(declared, body.len());
    assert!(seen
        .headers
        .get("content-type")
        .unwrap()
        .starts_with("multipart/form-data; boundary="));

    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("name=\"field\""));
    assert!(text.contains("filename=\"d.bin\""));
}

#[tokio::test]
async fn test_form_length_failure_rejects_before_dispatch() {
    let transport = MockTransport::ok_with(&[]);
    let dispatcher = Dispatcher::new(transport.clone());

    let data: &[u8] = b"endless";
    let form = MultipartForm::new().part("file", Part::reader(data, None));

    let err = dispatcher
        .post("http://x.test/", RequestOptions::new().form(form))
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::FormLength(_)));
    assert!(transport.invocations().is_empty());
}

#[tokio::test]
async fn test_transport_error_passes_through() {
    let transport =
        MockTransport::respond_with(|_| Some(Err(TransportError::new("socket exploded"))));
    let dispatcher = Dispatcher::new(transport.clone());

    let err = dispatcher
        .get("http://x.test/", RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Transport(_)));
    assert_eq!(err.to_string(), "socket exploded");
}

#[tokio::test]
async fn test_vanishing_transport_is_missing_response() {
    let transport = MockTransport::vanishing();
    let dispatcher = Dispatcher::new(transport.clone());

    let err = dispatcher
        .get("http://x.test/", RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::MissingResponse));
}

#[tokio::test]
async fn test_response_stream_error_rejects() {
    let transport = MockTransport::respond_with(|_| {
        let body: ByteStream = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"par")),
            Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated")),
        ])
        .boxed();
        Some(Ok(TransportResponse {
            status_code: StatusCode::OK,
            headers: HeaderMap::new(),
            body,
            url: "http://x.test/".to_string(),
        }))
    });
    let dispatcher = Dispatcher::new(transport.clone());

    let err = dispatcher
        .get("http://x.test/", RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::ResponseStream(_)));
}

#[tokio::test]
async fn test_transport_defaults() {
    let transport = MockTransport::ok_with(&[]);
    let dispatcher = Dispatcher::new(transport.clone());

    dispatcher
        .get("http://x.test/", RequestOptions::new())
        .await
        .unwrap();

    let seen = transport.last_invocation();
    assert!(seen.follow_redirects);
    assert!(seen.gzip);
    assert!(!seen.agent);
    assert!(!seen.retry);
    assert!(seen.cache.is_none());
}

#[tokio::test]
async fn test_transport_knobs_pass_through() {
    let transport = MockTransport::ok_with(&[]);
    let dispatcher = Dispatcher::new(transport.clone());

    dispatcher
        .get(
            "http://x.test/",
            RequestOptions::new()
                .follow_redirects(false)
                .gzip(false)
                .cache(CacheMode::Memory)
                .agent(true)
                .retry(true)
                .max_retries(2)
                .timeout(Duration::from_secs(5))
                .is_match(Arc::new(|entry: &CacheEntry| entry.status_code == StatusCode::OK)),
        )
        .await
        .unwrap();

    let seen = transport.last_invocation();
    assert!(!seen.follow_redirects);
    assert!(!seen.gzip);
    assert_eq!(seen.cache, Some(CacheMode::Memory));
    assert!(seen.agent);
    assert!(seen.retry);
    assert_eq!(seen.max_retries, Some(2));
    assert_eq!(seen.timeout, Some(Duration::from_secs(5)));
    assert!(seen.has_match_predicate);
}

#[tokio::test]
async fn test_invalid_method_rejected() {
    let transport = MockTransport::ok_with(&[]);
    let dispatcher = Dispatcher::new(transport.clone());

    let err = dispatcher
        .request("ba d", "http://x.test/", RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::InvalidMethod(_)));
    assert!(transport.invocations().is_empty());
}

#[tokio::test]
async fn test_invalid_url_rejected() {
    let transport = MockTransport::ok_with(&[]);
    let dispatcher = Dispatcher::new(transport.clone());

    let err = dispatcher
        .request("GET", "not a url", RequestOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::InvalidUrl(_)));
    assert!(transport.invocations().is_empty());
}

#[tokio::test]
async fn test_extension_verb_carries_body() {
    let transport = MockTransport::ok_with(&[]);
    let dispatcher = Dispatcher::new(transport.clone());

    dispatcher
        .request(
            "propfind",
            "http://x.test/",
            RequestOptions::new().body("x"),
        )
        .await
        .unwrap();

    let seen = transport.last_invocation();
    assert_eq!(seen.method.as_str(), "PROPFIND");
    assert_eq!(seen.headers.get("content-length"), Some("1"));
    assert_eq!(&transport.request_bodies()[0][..], b"x");
}
