//! lambda-rt bootstrap example.
//!
//! An echo function: whatever JSON value arrives is sent back, along with
//! the request id and time left before the deadline.

use lambda_rt::Context;
use serde::Serialize;
use std::convert::Infallible;

#[derive(Serialize)]
struct Echo {
    request_id: String,
    remaining_ms: u128,
    function: String,
    event: serde_json::Value,
}

#[lambda_rt::lambda_function(sigterm = true)]
async fn echo(ctx: Context, event: serde_json::Value) -> Result<Echo, Infallible> {
    tracing::info!(request_id = ctx.request_id().unwrap_or_default(), "echoing event");
    Ok(Echo {
        request_id: ctx.request_id().unwrap_or_default().to_string(),
        remaining_ms: ctx.remaining().map(|d| d.as_millis()).unwrap_or_default(),
        function: lambda_rt::function_config().function_name.clone(),
        event,
    })
}
