//! Client for the `2020-01-01` Extension API.

use crate::error::{Result, RuntimeError};
use crate::http::client::{HttpClient, USER_AGENT_VALUE};
use crate::http::body::OutgoingBody;
use crate::http::RuntimeApiClient;
use bytes::Bytes;
use http::header::{CONTENT_TYPE, USER_AGENT};
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use serde::Serialize;
use std::fmt;

const EXTENSION_API_VERSION: &str = "2020-01-01";

/// Request header naming the extension on registration.
pub const EXTENSION_NAME_HEADER: &str = "Lambda-Extension-Name";
/// Header carrying the id assigned on registration.
pub const EXTENSION_ID_HEADER: &str = "Lambda-Extension-Identifier";

/// Identifier assigned by the host to a registered extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtensionId(pub String);

impl fmt::Display for ExtensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize)]
struct Registration<'a> {
    events: &'a [&'a str],
}

/// Extension API client sharing the Runtime API connection pool.
#[derive(Clone)]
pub struct ExtensionClient {
    base: String,
    http: HttpClient,
}

impl ExtensionClient {
    /// Client for the host behind `runtime`.
    pub fn new(runtime: &RuntimeApiClient) -> Self {
        Self {
            base: format!("http://{}/{EXTENSION_API_VERSION}/extension", runtime.addr()),
            http: runtime.http().clone(),
        }
    }

    /// Register `name` for `events`. Returns the id the host assigned.
    pub async fn register(&self, name: &str, events: &[&str]) -> Result<ExtensionId> {
        let body = serde_json::to_vec(&Registration { events })?;
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("{}/register", self.base))
            .header(USER_AGENT, USER_AGENT_VALUE)
            .header(CONTENT_TYPE, "application/json")
            .header(EXTENSION_NAME_HEADER, name)
            .body(OutgoingBody::full(body))?;

        let response = self.http.request(request).await?;
        let status = response.status();
        let id = response
            .headers()
            .get(EXTENSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        response.into_body().collect().await?;

        if status != StatusCode::OK {
            return Err(RuntimeError::UnexpectedStatus {
                endpoint: "extension/register".to_string(),
                status: status.as_u16(),
            });
        }
        id.filter(|id| !id.is_empty())
            .map(ExtensionId)
            .ok_or(RuntimeError::MissingHeader(EXTENSION_ID_HEADER))
    }

    /// Wait for the next lifecycle event.
    ///
    /// With no subscribed events this never returns; the call itself tells
    /// the host that initialisation is complete.
    pub async fn next(&self, id: &ExtensionId) -> Result<Bytes> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(format!("{}/event/next", self.base))
            .header(USER_AGENT, USER_AGENT_VALUE)
            .header(EXTENSION_ID_HEADER, id.0.as_str())
            .body(OutgoingBody::empty())?;

        let response = self.http.request(request).await?;
        if response.status() != StatusCode::OK {
            return Err(RuntimeError::UnexpectedStatus {
                endpoint: "extension/event/next".to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response.into_body().collect().await?.to_bytes())
    }
}

impl fmt::Debug for ExtensionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionClient").field("base", &self.base).finish()
    }
}
