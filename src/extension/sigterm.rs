//! SIGTERM handling through an internal extension.

use crate::extension::client::ExtensionClient;
use crate::http::RuntimeApiClient;
use crate::runtime::options::Callback;
use std::future::Future;
use tracing::{debug, info, warn};

/// Name the internal extension registers under.
pub const INTERNAL_EXTENSION_NAME: &str = "lambda-rt-sigterm";

/// Register the internal extension and run `callbacks` in order when SIGTERM
/// arrives.
///
/// Failures are logged and otherwise ignored: the function keeps serving,
/// just without graceful shutdown.
pub async fn enable_sigterm(runtime: &RuntimeApiClient, callbacks: Vec<Callback>) {
    let extension = ExtensionClient::new(runtime);
    let id = match extension.register(INTERNAL_EXTENSION_NAME, &[]).await {
        Ok(id) => id,
        Err(err) => {
            warn!("failed to register internal extension, SIGTERM handling disabled: {err}");
            return;
        }
    };
    debug!(extension_id = %id, "registered internal extension");

    if let Err(err) = listen_for_sigterm(callbacks) {
        warn!("failed to install SIGTERM handler: {err}");
        return;
    }

    // Blocks for the life of the process; tells the host init is done.
    tokio::spawn(async move {
        if let Err(err) = extension.next(&id).await {
            debug!("internal extension event loop ended: {err}");
        }
    });
}

#[cfg(unix)]
fn listen_for_sigterm(callbacks: Vec<Callback>) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::spawn(run_on(
        async move {
            sigterm.recv().await;
        },
        callbacks,
    ));
    Ok(())
}

#[cfg(not(unix))]
fn listen_for_sigterm(_callbacks: Vec<Callback>) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "SIGTERM is only delivered on unix",
    ))
}

/// Wait for `trigger`, then run every callback in registration order.
pub(crate) async fn run_on(trigger: impl Future<Output = ()>, callbacks: Vec<Callback>) {
    trigger.await;
    info!(callbacks = callbacks.len(), "received SIGTERM, running shutdown callbacks");
    for callback in &callbacks {
        callback();
    }
}
