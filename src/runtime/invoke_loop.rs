//! The invocation loop: next, handle, report, repeat.

use crate::error::{Result, RuntimeError};
use crate::function::context::Context;
use crate::function::handler::Handler;
use crate::function::lambda_context::TraceId;
use crate::function::panic::catch_panic;
use crate::http::{Invoke, RuntimeApiClient};
use crate::runtime::config::TRACE_ID_ENV;
use bytes::BytesMut;
use std::sync::Arc;
use tracing::{debug, info_span, warn, Instrument};

const INITIAL_BUFFER_CAPACITY: usize = 64 * 1024;

/// One invocation loop bound to a client and a handler.
///
/// Several loops may share the same client and handler; each owns its
/// receive buffer.
#[derive(Clone)]
pub struct Runtime {
    client: Arc<RuntimeApiClient>,
    handler: Arc<dyn Handler>,
    set_trace_env: bool,
}

impl Runtime {
    pub fn new(client: Arc<RuntimeApiClient>, handler: Arc<dyn Handler>) -> Self {
        Self {
            client,
            handler,
            set_trace_env: true,
        }
    }

    /// Whether to export the trace header as `_X_AMZN_TRACE_ID`. Only
    /// meaningful while a single loop runs in the process.
    pub fn set_trace_env(mut self, enabled: bool) -> Self {
        self.set_trace_env = enabled;
        self
    }

    /// Run until a fatal error. Every invoke context derives from `base`.
    ///
    /// Returns `Ok(())` only once `base` is cancelled.
    pub async fn run(&self, base: &Context) -> Result<()> {
        let mut buf = BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY);
        loop {
            let invoke = tokio::select! {
                biased;
                _ = base.done() => return Ok(()),
                next = self.client.next(&mut buf) => next?,
            };
            self.handle(base, invoke).await?;
        }
    }

    /// Handle one invoke and post its outcome.
    pub async fn handle(&self, base: &Context, invoke: Invoke) -> Result<()> {
        let request_id = invoke.id.clone();

        let lambda_context = match invoke.lambda_context() {
            Ok(lc) => lc,
            Err(err) => {
                warn!(
                    request_id = %request_id,
                    error_type = %err.error_type,
                    "rejecting invoke: {}",
                    err.message
                );
                return self.client.failure(&request_id, &err).await;
            }
        };

        if self.set_trace_env {
            std::env::set_var(TRACE_ID_ENV, invoke.trace_id().unwrap_or_default());
        }

        let (ctx, cancel) = base.with_deadline(lambda_context.deadline());
        let mut ctx = ctx.with_value(lambda_context);
        if let Some(trace_id) = invoke.trace_id() {
            ctx = ctx.with_value(TraceId(trace_id.to_string()));
        }

        let span = info_span!("invoke", request_id = %request_id);
        let result = catch_panic(self.handler.invoke(ctx, invoke.payload))
            .instrument(span)
            .await
            .and_then(|outcome| outcome)
            .and_then(|response| response.content_type_header().map(|_| response));

        let outcome = match result {
            Ok(response) => {
                debug!(request_id = %request_id, "posting response");
                self.client.success(&request_id, response).await
            }
            Err(err) => {
                warn!(
                    request_id = %request_id,
                    error_type = %err.error_type,
                    "invoke failed: {}",
                    err.message
                );
                match self.client.failure(&request_id, &err).await {
                    Ok(()) if err.should_exit => Err(RuntimeError::HandlerPanicked(err.message)),
                    posted => posted,
                }
            }
        };
        // Streamed bodies are drained by the post, so the context lives until here.
        cancel.cancel();
        outcome
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("client", &self.client)
            .field("set_trace_env", &self.set_trace_env)
            .finish()
    }
}
