//! Request body posted to the Runtime API.
//!
//! Buffered responses go out with a known length. Streamed responses go out
//! chunked; an error in the middle of the stream ends the body with error
//! trailers instead of failing the request.

use crate::error::InvocationError;
use crate::http::response::{ByteStream, Response, ResponseBody};
use base64::Engine;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue};
use hyper::body::{Body, Frame, SizeHint};
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::warn;

/// Trailer carrying the error type of a failed stream.
pub const ERROR_TYPE_TRAILER: &str = "Lambda-Runtime-Function-Error-Type";
/// Trailer carrying the base64-encoded error document of a failed stream.
pub const ERROR_BODY_TRAILER: &str = "Lambda-Runtime-Function-Error-Body";

const FALLBACK_ERROR_TYPE: &str = "Runtime.StreamError";

pub(crate) enum OutgoingBody {
    Full(Option<Bytes>),
    Stream(ByteStream),
    Done,
}

impl OutgoingBody {
    pub(crate) fn empty() -> Self {
        OutgoingBody::Done
    }

    pub(crate) fn full(bytes: impl Into<Bytes>) -> Self {
        OutgoingBody::Full(Some(bytes.into()))
    }

    pub(crate) fn is_streaming(&self) -> bool {
        matches!(self, OutgoingBody::Stream(_))
    }
}

impl From<Response> for OutgoingBody {
    fn from(response: Response) -> Self {
        match response.body {
            ResponseBody::Buffered(bytes) => OutgoingBody::full(bytes),
            ResponseBody::Stream(stream) => OutgoingBody::Stream(stream),
        }
    }
}

impl Body for OutgoingBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        let this = self.get_mut();
        loop {
            match this {
                OutgoingBody::Full(bytes) => {
                    let frame = bytes.take().map(|b| Ok(Frame::data(b)));
                    *this = OutgoingBody::Done;
                    return Poll::Ready(frame);
                }
                OutgoingBody::Stream(stream) => match stream.as_mut().poll_next(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Some(Ok(chunk))) if chunk.is_empty() => continue,
                    Poll::Ready(Some(Ok(chunk))) => {
                        return Poll::Ready(Some(Ok(Frame::data(chunk))))
                    }
                    Poll::Ready(Some(Err(err))) => {
                        warn!(
                            error_type = %err.error_type,
                            "response stream failed: {}",
                            err.message
                        );
                        // Dropping the stream releases whatever feeds it.
                        *this = OutgoingBody::Done;
                        return Poll::Ready(Some(Ok(Frame::trailers(error_trailers(&err)))));
                    }
                    Poll::Ready(None) => {
                        *this = OutgoingBody::Done;
                        return Poll::Ready(None);
                    }
                },
                OutgoingBody::Done => return Poll::Ready(None),
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        matches!(self, OutgoingBody::Done)
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            OutgoingBody::Full(Some(bytes)) => SizeHint::with_exact(bytes.len() as u64),
            OutgoingBody::Full(None) | OutgoingBody::Done => SizeHint::with_exact(0),
            OutgoingBody::Stream(_) => SizeHint::default(),
        }
    }
}

/// Trailers describing a mid-stream failure.
pub(crate) fn error_trailers(err: &InvocationError) -> HeaderMap {
    let mut trailers = HeaderMap::new();
    let error_type = HeaderValue::from_str(&err.error_type)
        .unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_ERROR_TYPE));
    let encoded = base64::engine::general_purpose::STANDARD.encode(err.to_json());
    trailers.insert(ERROR_TYPE_TRAILER, error_type);
    // Base64 output is always a valid header value.
    if let Ok(body) = HeaderValue::from_str(&encoded) {
        trailers.insert(ERROR_BODY_TRAILER, body);
    }
    trailers
}
