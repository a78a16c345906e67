//! A single invoke received from `/runtime/invocation/next`.

use crate::error::{
    InvocationError, INVALID_CLIENT_CONTEXT, INVALID_COGNITO_IDENTITY, INVALID_DEADLINE,
};
use crate::function::lambda_context::{ClientContext, CognitoIdentity, LambdaContext};
use bytes::Bytes;
use http::HeaderMap;
use serde::de::DeserializeOwned;

pub const REQUEST_ID_HEADER: &str = "Lambda-Runtime-Aws-Request-Id";
pub const DEADLINE_HEADER: &str = "Lambda-Runtime-Deadline-Ms";
pub const FUNCTION_ARN_HEADER: &str = "Lambda-Runtime-Invoked-Function-Arn";
pub const TRACE_ID_HEADER: &str = "Lambda-Runtime-Trace-Id";
pub const COGNITO_IDENTITY_HEADER: &str = "Lambda-Runtime-Cognito-Identity";
pub const CLIENT_CONTEXT_HEADER: &str = "Lambda-Runtime-Client-Context";

/// Request id, payload, and the raw headers of one invoke.
#[derive(Debug, Clone)]
pub struct Invoke {
    pub id: String,
    pub payload: Bytes,
    pub headers: HeaderMap,
}

impl Invoke {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Deadline in milliseconds since the Unix epoch.
    pub fn deadline_ms(&self) -> Result<u64, InvocationError> {
        let raw = self.header(DEADLINE_HEADER).ok_or_else(|| {
            InvocationError::new(INVALID_DEADLINE, format!("missing {DEADLINE_HEADER}"))
        })?;
        raw.trim().parse().map_err(|e| {
            InvocationError::new(
                INVALID_DEADLINE,
                format!("invalid {DEADLINE_HEADER} {raw:?}: {e}"),
            )
        })
    }

    pub fn invoked_function_arn(&self) -> &str {
        self.header(FUNCTION_ARN_HEADER).unwrap_or_default()
    }

    /// `None` when the header is absent or empty.
    pub fn trace_id(&self) -> Option<&str> {
        self.header(TRACE_ID_HEADER).filter(|v| !v.is_empty())
    }

    pub fn cognito_identity(&self) -> Result<Option<CognitoIdentity>, InvocationError> {
        self.json_header(COGNITO_IDENTITY_HEADER, INVALID_COGNITO_IDENTITY)
    }

    pub fn client_context(&self) -> Result<Option<ClientContext>, InvocationError> {
        self.json_header(CLIENT_CONTEXT_HEADER, INVALID_CLIENT_CONTEXT)
    }

    fn json_header<T: DeserializeOwned>(
        &self,
        name: &str,
        error_type: &str,
    ) -> Result<Option<T>, InvocationError> {
        match self.header(name) {
            None | Some("") => Ok(None),
            Some(raw) => serde_json::from_str(raw)
                .map(Some)
                .map_err(|e| InvocationError::new(error_type, format!("invalid {name}: {e}"))),
        }
    }

    /// Build the metadata exposed to the handler.
    ///
    /// Fails with a `Runtime.*` error when a header is malformed; the caller
    /// reports it for this invoke and moves on.
    pub fn lambda_context(&self) -> Result<LambdaContext, InvocationError> {
        Ok(LambdaContext {
            aws_request_id: self.id.clone(),
            invoked_function_arn: self.invoked_function_arn().to_string(),
            identity: self.cognito_identity()?.unwrap_or_default(),
            client_context: self.client_context()?.unwrap_or_default(),
            deadline_ms: self.deadline_ms()?,
        })
    }
}
