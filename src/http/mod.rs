//! HTTP plumbing between the function and the Runtime API host.

pub(crate) mod body;
pub mod client;
pub mod invoke;
pub mod response;
pub mod streaming;

pub use body::{ERROR_BODY_TRAILER, ERROR_TYPE_TRAILER};
pub use client::RuntimeApiClient;
pub use invoke::Invoke;
pub use response::{ByteStream, Response, ResponseBody, CONTENT_TYPE_BYTES, CONTENT_TYPE_JSON};
pub use streaming::{ResponseWriter, StreamClosed, StreamingResponse, STREAMING_CONTENT_TYPE};
