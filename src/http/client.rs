//! Runtime API client.
//!
//! Speaks the `2018-06-01` Runtime API over a pooled HTTP/1.1 connection:
//! long-poll for the next invoke, then post exactly one response or error
//! for it.

use crate::error::{InvocationError, Result, RuntimeError};
use crate::http::body::{OutgoingBody, ERROR_BODY_TRAILER, ERROR_TYPE_TRAILER};
use crate::http::invoke::{Invoke, REQUEST_ID_HEADER};
use crate::http::response::{Response, CONTENT_TYPE_JSON};
use bytes::{Bytes, BytesMut};
use http::header::{CONTENT_TYPE, TRAILER, USER_AGENT};
use http::{HeaderValue, Method, Request, StatusCode};
use http_body_util::BodyExt;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

const RUNTIME_API_VERSION: &str = "2018-06-01";

/// Sent as `User-Agent` on every request: the crate version and the minimum
/// Rust version it supports.
pub const USER_AGENT_VALUE: &str = concat!(
    "lambda-rt/",
    env!("CARGO_PKG_VERSION"),
    " (msrv ",
    env!("CARGO_PKG_RUST_VERSION"),
    ")"
);

/// Header naming the error type on `<id>/error` and `init/error` posts.
pub const FUNCTION_ERROR_TYPE_HEADER: &str = ERROR_TYPE_TRAILER;

pub(crate) type HttpClient = Client<HttpConnector, OutgoingBody>;

/// Client for the Runtime API at `host:port`.
///
/// Cheap to share: the underlying connection pool is reference counted.
#[derive(Clone)]
pub struct RuntimeApiClient {
    addr: String,
    base: String,
    http: HttpClient,
}

impl RuntimeApiClient {
    /// `addr` is the `host:port` from `AWS_LAMBDA_RUNTIME_API`.
    pub fn new(addr: impl Into<String>) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);
        let http = Client::builder(TokioExecutor::new()).build(connector);
        Self::with_http(addr, http)
    }

    pub(crate) fn with_http(addr: impl Into<String>, http: HttpClient) -> Self {
        let addr = addr.into();
        let base = format!("http://{addr}/{RUNTIME_API_VERSION}/runtime");
        Self { addr, base, http }
    }

    /// The `host:port` this client talks to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub(crate) fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Block until the host hands out the next invoke.
    ///
    /// `buf` is reused across calls so steady-state polling does not grow
    /// new allocations for every payload.
    pub async fn next(&self, buf: &mut BytesMut) -> Result<Invoke> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(format!("{}/invocation/next", self.base))
            .header(USER_AGENT, USER_AGENT_VALUE)
            .body(OutgoingBody::empty())?;

        let response = self.http.request(request).await?;
        if response.status() != StatusCode::OK {
            return Err(RuntimeError::UnexpectedStatus {
                endpoint: "invocation/next".to_string(),
                status: response.status().as_u16(),
            });
        }

        let (parts, mut body) = response.into_parts();
        buf.clear();
        while let Some(frame) = body.frame().await {
            if let Ok(data) = frame?.into_data() {
                buf.extend_from_slice(&data);
            }
        }

        let id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or(RuntimeError::MissingHeader(REQUEST_ID_HEADER))?
            .to_string();

        debug!(request_id = %id, bytes = buf.len(), "received invoke");
        Ok(Invoke {
            id,
            payload: buf.split().freeze(),
            headers: parts.headers,
        })
    }

    /// Post the handler's response for `request_id`.
    pub async fn success(&self, request_id: &str, response: Response) -> Result<()> {
        let uri = format!("{}/invocation/{request_id}/response", self.base);
        // The invocation loop reports invalid content types as invoke errors
        // before getting here.
        let content_type = HeaderValue::from_str(response.effective_content_type())
            .map_err(http::Error::from)?;
        let body = OutgoingBody::from(response);

        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(USER_AGENT, USER_AGENT_VALUE)
            .header(CONTENT_TYPE, content_type);
        if body.is_streaming() {
            // Matched against the lowercase trailer names when they are sent.
            let declared =
                format!("{ERROR_TYPE_TRAILER}, {ERROR_BODY_TRAILER}").to_ascii_lowercase();
            builder = builder.header(TRAILER, declared);
        }
        self.post("invocation/response", builder.body(body)?).await
    }

    /// Post an error document for `request_id`.
    pub async fn failure(&self, request_id: &str, err: &InvocationError) -> Result<()> {
        let uri = format!("{}/invocation/{request_id}/error", self.base);
        self.post_error("invocation/error", uri, err).await
    }

    /// Report a failure that happened before the first invoke.
    pub async fn init_error(&self, err: &InvocationError) -> Result<()> {
        let uri = format!("{}/init/error", self.base);
        self.post_error("init/error", uri, err).await
    }

    async fn post_error(&self, endpoint: &str, uri: String, err: &InvocationError) -> Result<()> {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(USER_AGENT, USER_AGENT_VALUE)
            .header(CONTENT_TYPE, CONTENT_TYPE_JSON);
        if let Ok(error_type) = HeaderValue::from_str(&err.error_type) {
            builder = builder.header(FUNCTION_ERROR_TYPE_HEADER, error_type);
        }
        let request = builder.body(OutgoingBody::full(Bytes::from(err.to_json())))?;
        self.post(endpoint, request).await
    }

    async fn post(&self, endpoint: &str, request: Request<OutgoingBody>) -> Result<()> {
        let response = self.http.request(request).await?;
        let status = response.status();
        // Drain so the connection goes back to the pool.
        response.into_body().collect().await?;
        if status != StatusCode::ACCEPTED {
            return Err(RuntimeError::UnexpectedStatus {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for RuntimeApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeApiClient").field("addr", &self.addr).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_names_runtime_and_msrv() {
        assert!(USER_AGENT_VALUE.starts_with("lambda-rt/"));
        let msrv = concat!("(msrv ", env!("CARGO_PKG_RUST_VERSION"), ")");
        assert!(USER_AGENT_VALUE.ends_with(msrv));
    }

    #[test]
    fn test_base_url() {
        let client = RuntimeApiClient::new("127.0.0.1:9001");
        assert_eq!(client.addr(), "127.0.0.1:9001");
        assert_eq!(client.base, "http://127.0.0.1:9001/2018-06-01/runtime");
    }
}
