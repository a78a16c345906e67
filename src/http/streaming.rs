//! HTTP-integration streaming responses.
//!
//! A streamed response starts with a JSON prelude (status, headers, cookies),
//! followed by eight NUL bytes, followed by the body. The host uses the
//! prelude to build the HTTP response it returns to the caller.

use crate::error::InvocationError;
use crate::http::response::{ByteStream, Response, ResponseBody};
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use http::header::{HeaderName, SET_COOKIE};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

/// Content type announcing a prelude-framed body.
pub const STREAMING_CONTENT_TYPE: &str = "application/vnd.awslambda.http-integration-response";

/// Separates the prelude from the body.
pub const PRELUDE_DELIMITER: [u8; 8] = [0; 8];

const BODY_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct Prelude {
    status_code: u16,
    headers: BTreeMap<String, Vec<String>>,
    cookies: Vec<String>,
}

#[derive(Serialize)]
struct PreludeDocument<'a> {
    #[serde(rename = "statusCode")]
    status_code: u16,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    headers: BTreeMap<&'a str, String>,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    cookies: &'a [String],
}

impl Prelude {
    fn new() -> Self {
        Self {
            status_code: 200,
            ..Default::default()
        }
    }

    fn add_header(&mut self, name: &str, value: &str) {
        let Some(name) = normalize(name) else {
            return;
        };
        if name == SET_COOKIE {
            self.cookies.push(value.to_string());
        } else {
            self.headers
                .entry(name.as_str().to_string())
                .or_default()
                .push(value.to_string());
        }
    }

    fn remove_header(&mut self, name: &str) {
        let Some(name) = normalize(name) else {
            return;
        };
        if name == SET_COOKIE {
            self.cookies.clear();
        } else {
            self.headers.remove(name.as_str());
        }
    }

    /// Prelude JSON followed by the delimiter.
    fn encode(&self) -> Bytes {
        let document = PreludeDocument {
            status_code: self.status_code,
            headers: self
                .headers
                .iter()
                .map(|(name, values)| (name.as_str(), values.join(",")))
                .collect(),
            cookies: &self.cookies,
        };
        // A map of strings to strings always serializes.
        let mut out = serde_json::to_vec(&document).unwrap_or_default();
        out.extend_from_slice(&PRELUDE_DELIMITER);
        Bytes::from(out)
    }
}

/// Header names are case-insensitive; the prelude carries them lowercased.
fn normalize(name: &str) -> Option<HeaderName> {
    match HeaderName::from_bytes(name.as_bytes()) {
        Ok(name) => Some(name),
        Err(_) => {
            warn!(header = name, "dropping invalid header name from streaming prelude");
            None
        }
    }
}

/// A streamed HTTP response with status, headers, and cookies.
///
/// `Set-Cookie` headers are moved into `cookies`. Repeated headers are joined
/// with `,`. Header names are sent lowercased.
pub struct StreamingResponse {
    prelude: Prelude,
    body: ByteStream,
}

impl StreamingResponse {
    /// A `200` response streaming `body`.
    pub fn new<S, E>(body: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<InvocationError> + 'static,
    {
        Self {
            prelude: Prelude::new(),
            body: Response::stream(body).into_stream(),
        }
    }

    /// A response with a fixed body.
    pub fn from_bytes(body: impl Into<Bytes>) -> Self {
        Self {
            prelude: Prelude::new(),
            body: Response::bytes(body).into_stream(),
        }
    }

    pub fn status(mut self, status_code: u16) -> Self {
        self.prelude.status_code = status_code;
        self
    }

    /// Append a header value.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.prelude.add_header(name, value);
        self
    }

    pub fn cookie(mut self, cookie: impl Into<String>) -> Self {
        self.prelude.cookies.push(cookie.into());
        self
    }

    /// Frame as a [`Response`]: prelude, delimiter, then the body.
    pub fn encode(self) -> Response {
        let prelude = self.prelude.encode();
        let body = stream::once(async move { Ok(prelude) }).chain(self.body);
        Response {
            body: ResponseBody::Stream(Box::pin(body)),
            content_type: Some(STREAMING_CONTENT_TYPE.to_string()),
        }
    }
}

/// The body receiver has gone away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("response stream closed")]
pub struct StreamClosed;

/// Push-style writer for a streamed response.
///
/// Headers may be changed until the status is written. The status is written
/// by the first `write_header` call or implicitly by the first `write`;
/// further `write_header` calls are ignored. Dropping the writer ends the
/// body. If it is dropped before anything was written, the prelude carries
/// status `200` and the headers set so far.
pub struct ResponseWriter {
    prelude: Prelude,
    header_tx: Option<oneshot::Sender<Bytes>>,
    body_tx: mpsc::Sender<Result<Bytes, InvocationError>>,
}

impl ResponseWriter {
    /// Create a writer and the [`Response`] it feeds.
    pub fn channel() -> (Self, Response) {
        let (header_tx, header_rx) = oneshot::channel::<Bytes>();
        let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);

        let prelude = stream::once(async move {
            Ok(header_rx.await.unwrap_or_else(|_| Prelude::new().encode()))
        });
        let body = stream::unfold(body_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        let writer = Self {
            prelude: Prelude::new(),
            header_tx: Some(header_tx),
            body_tx,
        };
        let response = Response {
            body: ResponseBody::Stream(Box::pin(prelude.chain(body))),
            content_type: Some(STREAMING_CONTENT_TYPE.to_string()),
        };
        (writer, response)
    }

    /// Append a header value. Ignored once the status has been written.
    pub fn add_header(&mut self, name: &str, value: &str) {
        if self.header_tx.is_some() {
            self.prelude.add_header(name, value);
        }
    }

    /// Replace all values of a header. Ignored once the status has been written.
    pub fn set_header(&mut self, name: &str, value: &str) {
        if self.header_tx.is_some() {
            self.prelude.remove_header(name);
            self.prelude.add_header(name, value);
        }
    }

    /// Send the prelude. Only the first call has any effect.
    pub fn write_header(&mut self, status_code: u16) {
        if let Some(tx) = self.header_tx.take() {
            self.prelude.status_code = status_code;
            // The response was dropped; writes will report it.
            let _ = tx.send(self.prelude.encode());
        }
    }

    /// Whether the prelude has been sent.
    pub fn header_written(&self) -> bool {
        self.header_tx.is_none()
    }

    /// Write a body chunk, sending a `200` prelude first if needed.
    pub async fn write(&mut self, chunk: impl Into<Bytes>) -> Result<(), StreamClosed> {
        self.write_header(200);
        self.body_tx
            .send(Ok(chunk.into()))
            .await
            .map_err(|_| StreamClosed)
    }

    /// Abort the body. The host receives `err` through trailers.
    pub async fn fail(mut self, err: impl Into<InvocationError>) {
        self.write_header(200);
        let _ = self.body_tx.send(Err(err.into())).await;
    }
}

impl Drop for ResponseWriter {
    fn drop(&mut self) {
        self.write_header(200);
    }
}
