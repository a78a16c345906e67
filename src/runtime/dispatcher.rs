//! Concurrent invocation loops.

use crate::error::{Result, RuntimeError};
use crate::function::context::Context;
use crate::runtime::invoke_loop::Runtime;
use tokio::task::JoinSet;
use tracing::{error, info, info_span, Instrument};

/// Run `workers` copies of `runtime` until the first fatal error.
///
/// The first worker to fail cancels the others; its error is returned once
/// every worker has stopped. Workers run as tokio tasks, so handler code
/// executes in parallel on a multi-threaded runtime.
pub async fn run_concurrent(runtime: Runtime, workers: usize, base: &Context) -> Result<()> {
    let runtime = runtime.set_trace_env(false);
    let (parent, cancel) = base.with_cancel();
    info!(workers, "starting invocation loops");

    let mut set = JoinSet::new();
    for worker in 0..workers {
        let runtime = runtime.clone();
        let ctx = parent.clone();
        set.spawn(
            async move { runtime.run(&ctx).await }.instrument(info_span!("worker", id = worker)),
        );
    }

    let mut first_error: Option<RuntimeError> = None;
    while let Some(joined) = set.join_next().await {
        let result = joined.map_err(RuntimeError::from).and_then(|r| r);
        if let Err(err) = result {
            if first_error.is_none() {
                error!("invocation loop failed, stopping all workers: {err}");
                cancel.cancel();
                first_error = Some(err);
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
