//! Request dispatch.
//!
//! Normalizes the request body, resolves the headers it contributes,
//! merges them under the caller's own headers, and hands the result to
//! the injected transport. The streamed response is buffered into a
//! single [`Response`].

use bytes::BytesMut;
use futures::StreamExt;
use http::Method;
use url::Url;

use crate::base::error::DispatchError;
use crate::http::body::NormalizedBody;
use crate::http::headers::HeaderMap;
use crate::http::options::RequestOptions;
use crate::http::response::Response;
use crate::http::transport::{ResponseHandle, Transport, TransportConfig};

/// Entry point for issuing requests through a transport.
///
/// The transport is injected at construction; nothing in the dispatch
/// path reaches for process-wide state, so tests substitute their own.
pub struct Dispatcher<T: Transport> {
    transport: T,
}

/// Internal state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Prepare,
    ResolveHeaders,
    Dispatch,
    Drain,
    Done,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Issue a request and buffer the response.
    ///
    /// `method` may be any HTTP token and is upper-cased before use.
    /// `GET`, `DELETE`, and `HEAD` refuse a body; every other method
    /// carries one, defaulting to an empty buffer.
    pub async fn request(
        &self,
        method: &str,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response, DispatchError> {
        let method = parse_method(method)?;
        let url = Url::parse(url)?;

        let mut job = DispatchJob {
            transport: &self.transport,
            state: State::Prepare,
            method,
            url,
            options: Some(options),
            headers: HeaderMap::new(),
            body: None,
            knobs: None,
            completion: None,
            response: None,
        };
        job.do_loop().await?;
        job.response.ok_or(DispatchError::MissingResponse)
    }

    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<Response, DispatchError> {
        self.request("GET", url, options).await
    }

    pub async fn post(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response, DispatchError> {
        self.request("POST", url, options).await
    }

    pub async fn put(&self, url: &str, options: RequestOptions) -> Result<Response, DispatchError> {
        self.request("PUT", url, options).await
    }

    pub async fn delete(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response, DispatchError> {
        self.request("DELETE", url, options).await
    }

    pub async fn head(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response, DispatchError> {
        self.request("HEAD", url, options).await
    }

    pub async fn patch(
        &self,
        url: &str,
        options: RequestOptions,
    ) -> Result<Response, DispatchError> {
        self.request("PATCH", url, options).await
    }
}

/// One in-flight request walking the dispatch states.
struct DispatchJob<'a, T: Transport> {
    transport: &'a T,
    state: State,
    method: Method,
    url: Url,
    options: Option<RequestOptions>,
    headers: HeaderMap,
    body: Option<NormalizedBody>,
    /// Transport knobs left over once the body fields are consumed.
    knobs: Option<RequestOptions>,
    completion: Option<ResponseHandle>,
    response: Option<Response>,
}

impl<T: Transport> DispatchJob<'_, T> {
    async fn do_loop(&mut self) -> Result<(), DispatchError> {
        loop {
            match self.state {
                State::Prepare => {
                    let mut options = self.options.take().unwrap_or_default();

                    if !options.qs.is_empty() {
                        let mut pairs = self.url.query_pairs_mut();
                        for (key, value) in &options.qs {
                            pairs.append_pair(key, value);
                        }
                    }

                    self.headers = std::mem::take(&mut options.headers);

                    if is_bodyless(&self.method) {
                        if options.has_body() {
                            return Err(DispatchError::BodyNotAllowed(self.method.clone()));
                        }
                        self.knobs = Some(options);
                        self.state = State::Dispatch;
                    } else {
                        let form = options.form.take();
                        let json = options.json.take();
                        let body = options.body.take();
                        self.body = Some(NormalizedBody::select(form, json, body)?);
                        self.knobs = Some(options);
                        self.state = State::ResolveHeaders;
                    }
                }
                State::ResolveHeaders => {
                    if let Some(body) = self.body.as_ref() {
                        let derived = body.resolve_headers().await?;
                        self.headers.merge_missing(&derived);
                    }
                    self.state = State::Dispatch;
                }
                State::Dispatch => {
                    let knobs = self.knobs.take().unwrap_or_default();
                    let config = TransportConfig {
                        headers: std::mem::take(&mut self.headers),
                        allow_redirect_headers: knobs.allow_redirect_headers,
                        follow_redirects: knobs.follow_redirects.unwrap_or(true),
                        max_redirects: knobs.max_redirects,
                        gzip: knobs.gzip.unwrap_or(true),
                        cache: knobs.cache,
                        agent: knobs.agent,
                        timeout: knobs.timeout,
                        socket_timeout: knobs.socket_timeout,
                        retry: knobs.retry,
                        retry_delay: knobs.retry_delay,
                        max_retries: knobs.max_retries,
                        is_match: knobs.is_match,
                        is_expired: knobs.is_expired,
                        can_cache: knobs.can_cache,
                    };

                    tracing::debug!(method = %self.method, url = %self.url, "dispatching request");
                    let (sink, completion) =
                        self.transport
                            .invoke(self.method.clone(), self.url.clone(), config);

                    // The sink exists now; the body writer runs alongside
                    // the wait for the response.
                    if let Some(body) = self.body.take() {
                        tokio::spawn(async move {
                            if let Err(error) = body.write_to(sink).await {
                                tracing::debug!(error = %error, "request body write aborted");
                            }
                        });
                    }

                    self.completion = Some(completion);
                    self.state = State::Drain;
                }
                State::Drain => {
                    let Some(completion) = self.completion.take() else {
                        return Err(DispatchError::MissingResponse);
                    };

                    let raw = match completion.await {
                        Ok(Ok(raw)) => raw,
                        Ok(Err(error)) => return Err(error.into()),
                        Err(_) => return Err(DispatchError::MissingResponse),
                    };

                    let mut body = raw.body;
                    let mut buffered = BytesMut::new();
                    while let Some(chunk) = body.next().await {
                        let chunk = chunk.map_err(DispatchError::ResponseStream)?;
                        buffered.extend_from_slice(&chunk);
                    }

                    self.response = Some(Response::new(
                        raw.status_code,
                        raw.headers,
                        buffered.freeze(),
                        raw.url,
                    ));
                    self.state = State::Done;
                }
                State::Done => return Ok(()),
            }
        }
    }
}

/// Verbs that refuse a request body.
fn is_bodyless(method: &Method) -> bool {
    *method == Method::GET || *method == Method::DELETE || *method == Method::HEAD
}

fn parse_method(method: &str) -> Result<Method, DispatchError> {
    let upper = method.to_ascii_uppercase();
    Method::from_bytes(upper.as_bytes()).map_err(|_| DispatchError::InvalidMethod(method.to_owned()))
}
