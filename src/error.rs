//! Error types for the runtime.
//!
//! Two families live here:
//!
//! - [`RuntimeError`] is fatal. It ends the invocation loop and, through
//!   [`crate::start`], the process, so the host relaunches it.
//! - [`InvocationError`] is the error document posted to the host for a single
//!   invoke. It is recoverable unless `should_exit` is set (user panics).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error type reported when the invoke payload cannot be decoded.
pub const INPUT_ERROR: &str = "Runtime.InputError";
/// Error type reported when `Lambda-Runtime-Deadline-Ms` is missing or malformed.
pub const INVALID_DEADLINE: &str = "Runtime.InvalidDeadline";
/// Error type reported when `Lambda-Runtime-Cognito-Identity` is malformed.
pub const INVALID_COGNITO_IDENTITY: &str = "Runtime.InvalidCognitoIdentity";
/// Error type reported when `Lambda-Runtime-Client-Context` is malformed.
pub const INVALID_CLIENT_CONTEXT: &str = "Runtime.InvalidClientContext";
/// Error type reported to `init/error` for invalid start-up configuration.
pub const INVALID_CONFIG: &str = "Runtime.InvalidConfig";
/// Error type reported when a response's content type is not a valid header value.
pub const INVALID_CONTENT_TYPE: &str = "Runtime.InvalidContentType";
/// Error type reported when a response cannot be encoded.
pub const ENCODE_ERROR: &str = "Runtime.MarshalError";

/// Fatal runtime errors.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("HTTP client error: {0}")]
    Client(#[from] hyper_util::client::legacy::Error),

    #[error("HTTP error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("invalid HTTP request: {0}")]
    Http(#[from] http::Error),

    #[error("{endpoint} returned unexpected status {status}")]
    UnexpectedStatus { endpoint: String, status: u16 },

    #[error("missing response header: {0}")]
    MissingHeader(&'static str),

    #[error("missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("handler panicked: {0}")]
    HandlerPanicked(String),

    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),

    #[error("failed to exec wrapper {path}: {source}")]
    Exec {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("runtime worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type alias using [`RuntimeError`].
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Handler construction errors that can only be detected at runtime.
///
/// A handler that fails validation still starts; every invoke then fails
/// with this error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("indent prefix {0:?} must contain only JSON whitespace")]
    IndentPrefix(String),

    #[error("indent {0:?} must contain only JSON whitespace")]
    Indent(String),

    #[error("use_number requires the `use-number` feature")]
    UseNumberUnavailable,
}

/// One normalised stack frame of a panicking handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Crate-relative source path.
    pub path: String,
    /// Source line.
    pub line: u32,
    /// Final path component of the function name.
    pub label: String,
}

/// The error document posted to `<id>/error`.
///
/// `InvocationError` deliberately does not implement `Display`, which lets any
/// displayable error convert into it with `?` or `.into()`. The type name of
/// the source error becomes `errorType`. An `InvocationError` returned by a
/// handler is passed through untouched.
///
/// The type name is the static type being converted. A boxed error such as
/// `Box<dyn Error + Send + Sync>` reports `"Box<dyn Error + Send + Sync>"`,
/// not the type inside the box. Convert before boxing, or build the error
/// with [`InvocationError::new`] to name the type yourself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationError {
    #[serde(rename = "errorMessage")]
    pub message: String,
    #[serde(rename = "errorType")]
    pub error_type: String,
    #[serde(rename = "stackTrace", default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<Vec<StackFrame>>,
    /// Set for panics. The loop reports the error and then exits.
    #[serde(skip)]
    pub should_exit: bool,
}

impl InvocationError {
    /// Create a new invocation error.
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: error_type.into(),
            stack_trace: None,
            should_exit: false,
        }
    }

    /// Attach a stack trace.
    pub fn with_stack_trace(mut self, frames: Vec<StackFrame>) -> Self {
        self.stack_trace = Some(frames);
        self
    }

    /// Mark the error as fatal for the process.
    pub fn exit(mut self) -> Self {
        self.should_exit = true;
        self
    }

    /// Serialize to the JSON document the host expects.
    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|_| {
            // Only reachable if a field fails to serialize, which plain strings don't.
            br#"{"errorMessage":"failed to encode error","errorType":"Runtime.MarshalError"}"#
                .to_vec()
        })
    }
}

impl<E: fmt::Display> From<E> for InvocationError {
    fn from(err: E) -> Self {
        InvocationError::new(short_type_name::<E>(), err.to_string())
    }
}

/// `std::any::type_name` with every path prefix removed.
///
/// `alloc::boxed::Box<dyn core::error::Error + core::marker::Send>` becomes
/// `Box<dyn Error + Send>`.
pub(crate) fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let mut out = String::with_capacity(full.len());
    let mut token = String::new();
    for ch in full.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == ':' {
            token.push(ch);
        } else {
            push_last_segment(&mut out, &token);
            token.clear();
            out.push(ch);
        }
    }
    push_last_segment(&mut out, &token);
    out
}

fn push_last_segment(out: &mut String, token: &str) {
    if let Some(segment) = token.rsplit("::").next() {
        out.push_str(segment);
    }
}
