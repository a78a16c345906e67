//! Process entry points.

use crate::error::{InvocationError, Result, RuntimeError, INVALID_CONFIG};
use crate::extension::enable_sigterm;
use crate::function::handler::Handler;
use crate::http::RuntimeApiClient;
use crate::runtime::config::{RuntimeConfig, EXEC_WRAPPER_ENV};
use crate::runtime::dispatcher::run_concurrent;
use crate::runtime::invoke_loop::Runtime;
use crate::runtime::options::HandlerOptions;
use std::sync::Arc;
use tracing::{error, info};

/// Run `handler` until a fatal error, then exit the process with status 1.
pub async fn start<H: Handler + 'static>(handler: H) {
    start_with_options(handler, HandlerOptions::default()).await
}

/// [`start`] with options.
pub async fn start_with_options<H: Handler + 'static>(handler: H, options: HandlerOptions) {
    if let Err(err) = run_with_options(handler, options).await {
        error!("runtime stopped: {err}");
        std::process::exit(1);
    }
}

/// Run `handler` against the host named by the environment.
///
/// Only returns on a fatal error.
pub async fn run<H: Handler + 'static>(handler: H) -> Result<()> {
    run_with_options(handler, HandlerOptions::default()).await
}

/// [`run`] with options.
pub async fn run_with_options<H: Handler + 'static>(
    handler: H,
    options: HandlerOptions,
) -> Result<()> {
    let config = RuntimeConfig::from_env();
    if let Some(wrapper) = config.exec_wrapper.as_deref() {
        return Err(exec_wrapper(wrapper, &options));
    }

    let client = Arc::new(RuntimeApiClient::new(config.runtime_api()?));
    let workers = match options.concurrency_override() {
        Some(workers) => workers.max(1),
        None => match config.workers() {
            Ok(workers) => workers,
            Err(err) => {
                client
                    .init_error(&InvocationError::new(INVALID_CONFIG, err.to_string()))
                    .await?;
                return Err(err);
            }
        },
    };

    serve(client, handler, options, workers).await
}

/// Serve invokes from `client` with `workers` concurrent loops.
///
/// Configures the handler, registers for SIGTERM when enabled, then runs
/// until a fatal error.
pub async fn serve<H: Handler + 'static>(
    client: Arc<RuntimeApiClient>,
    mut handler: H,
    options: HandlerOptions,
    workers: usize,
) -> Result<()> {
    handler.configure(&options);

    if options.sigterm_enabled() {
        enable_sigterm(&client, options.sigterm_callbacks().to_vec()).await;
    }

    info!(api = client.addr(), workers, "starting runtime");
    let runtime = Runtime::new(client, Arc::new(handler));
    if workers > 1 {
        run_concurrent(runtime, workers, options.context()).await
    } else {
        runtime.run(options.context()).await
    }
}

/// Replace the process with the exec wrapper. Returns only on failure.
fn exec_wrapper(wrapper: &str, options: &HandlerOptions) -> RuntimeError {
    for callback in options.pre_exec_callbacks() {
        callback();
    }
    // The wrapper starts this binary again; it must not re-exec itself.
    std::env::remove_var(EXEC_WRAPPER_ENV);
    info!(wrapper, "handing off to exec wrapper");
    exec(wrapper)
}

#[cfg(unix)]
fn exec(wrapper: &str) -> RuntimeError {
    use std::os::unix::process::CommandExt;

    let source = std::process::Command::new(wrapper)
        .args(std::env::args_os())
        .exec();
    RuntimeError::Exec {
        path: wrapper.to_string(),
        source,
    }
}

#[cfg(not(unix))]
fn exec(wrapper: &str) -> RuntimeError {
    RuntimeError::UnsupportedTransport(format!("cannot exec {wrapper} on this platform"))
}
