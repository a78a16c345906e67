//! # lambda-rt - Function runtime client
//!
//! lambda-rt runs a Rust function inside a managed Function-as-a-Service
//! host. It long-polls the host's Runtime API for invokes, hands each one to
//! your handler with a deadline-bearing [`Context`], posts the response or a
//! structured error, and repeats until the host stops the process.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Runtime API host                          │
//! └──────────────────────────────────────────────────────────────────┘
//!        ▲ GET next          │ invoke           ▲ POST response/error
//!        │                   ▼                  │
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Invocation loop (× N workers)                                   │
//! │   ┌─────────────┐   ┌────────────────┐   ┌──────────────────┐    │
//! │   │ RuntimeApi  │ → │ Handler        │ → │ JSON / streaming │    │
//! │   │ Client      │   │ (catch_unwind) │   │ response encoder │    │
//! │   └─────────────┘   └────────────────┘   └──────────────────┘    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lambda_rt::{handler_fn, Context};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize)]
//! struct Order {
//!     id: u64,
//! }
//!
//! #[derive(Serialize)]
//! struct Receipt {
//!     id: u64,
//!     request_id: String,
//! }
//!
//! async fn handle(ctx: Context, order: Order) -> Result<Receipt, std::io::Error> {
//!     Ok(Receipt {
//!         id: order.id,
//!         request_id: ctx.request_id().unwrap_or_default().to_string(),
//!     })
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     lambda_rt::logging::init();
//!     lambda_rt::start(handler_fn(handle)).await;
//! }
//! ```
//!
//! Or let `#[lambda_function]` write `main` for you.
//!
//! ## Errors
//!
//! A handler error is reported for that invoke only and the loop carries on.
//! A handler panic is reported with a stack trace and then stops the loop;
//! the host starts a fresh process. Transport failures are fatal.

pub mod error;
pub mod extension;
pub mod function;
pub mod http;
pub mod logging;
pub mod runtime;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::error::{InvocationError, RuntimeError};
    pub use crate::function::{
        context_fn, handler_fn, input_fn, unit_fn, Context, Handler, HandlerTrace, LambdaContext,
    };
    pub use crate::http::{Response, ResponseWriter, StreamingResponse};
    pub use crate::runtime::{run, start, start_with_options, HandlerOptions};
    pub use async_trait::async_trait;
    pub use lambda_rt_macro::lambda_function;
}

#[doc(hidden)]
pub mod __private {
    pub use tokio;
    pub use tracing;
}

// Re-export for convenience
pub use error::{InvocationError, RuntimeError};
pub use function::{
    context_fn, function_config, handler_fn, input_fn, unit_fn, Context, Handler, HandlerTrace,
    LambdaContext,
};
pub use http::{Response, ResponseWriter, RuntimeApiClient, StreamingResponse};
pub use lambda_rt_macro::lambda_function;
pub use runtime::{
    run, run_with_options, serve, start, start_with_options, HandlerOptions, RuntimeConfig,
};
