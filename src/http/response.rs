//! Handler response type sent to the Runtime API.

use crate::error::{InvocationError, INVALID_CONTENT_TYPE};
use bytes::Bytes;
use http::HeaderValue;
use futures::stream::{self, Stream, StreamExt};
use std::pin::Pin;

/// Content type of JSON-encoded handler results.
pub const CONTENT_TYPE_JSON: &str = "application/json";
/// Content type used when a response does not name one.
pub const CONTENT_TYPE_BYTES: &str = "application/octet-stream";

/// A response body produced incrementally.
///
/// An `Err` item aborts the body; the host learns about it through HTTP
/// trailers. Dropping the stream closes it.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, InvocationError>> + Send>>;

/// Response body.
pub enum ResponseBody {
    /// Fully buffered bytes.
    Buffered(Bytes),
    /// A stream forwarded as it is produced.
    Stream(ByteStream),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseBody::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            ResponseBody::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// The uniform result of every handler.
#[derive(Debug)]
pub struct Response {
    pub body: ResponseBody,
    /// `None` posts as `application/octet-stream`.
    pub content_type: Option<String>,
}

impl Response {
    /// A buffered response without a content type.
    pub fn bytes(body: impl Into<Bytes>) -> Self {
        Self {
            body: ResponseBody::Buffered(body.into()),
            content_type: None,
        }
    }

    /// An already-encoded JSON document.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::bytes(body).content_type(CONTENT_TYPE_JSON)
    }

    /// A streamed response. Stream errors convert into [`InvocationError`].
    pub fn stream<S, E>(body: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<InvocationError> + 'static,
    {
        Self {
            body: ResponseBody::Stream(Box::pin(body.map(|item| item.map_err(Into::into)))),
            content_type: None,
        }
    }

    /// Set the content type.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// The content type the Runtime API client will post.
    pub fn effective_content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or(CONTENT_TYPE_BYTES)
    }

    /// The content type as a header value, or the invoke error to report
    /// when it cannot be sent as one.
    pub fn content_type_header(&self) -> Result<HeaderValue, InvocationError> {
        let content_type = self.effective_content_type();
        HeaderValue::from_str(content_type).map_err(|_| {
            InvocationError::new(
                INVALID_CONTENT_TYPE,
                format!("content type {content_type:?} is not a valid header value"),
            )
        })
    }

    /// Turn the body into a stream regardless of how it was built.
    pub fn into_stream(self) -> ByteStream {
        match self.body {
            ResponseBody::Buffered(bytes) => Box::pin(stream::once(async move { Ok(bytes) })),
            ResponseBody::Stream(stream) => stream,
        }
    }

    /// Collect the body. Intended for tests and local tooling.
    pub async fn collect(self) -> Result<Bytes, InvocationError> {
        match self.body {
            ResponseBody::Buffered(bytes) => Ok(bytes),
            ResponseBody::Stream(mut stream) => {
                let mut out = Vec::new();
                while let Some(chunk) = stream.next().await {
                    out.extend_from_slice(&chunk?);
                }
                Ok(Bytes::from(out))
            }
        }
    }
}
