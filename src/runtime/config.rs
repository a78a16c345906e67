//! Runtime configuration read from the environment.

use crate::error::{Result, RuntimeError};
use serde::{Deserialize, Serialize};

/// `host:port` of the Runtime API.
pub const RUNTIME_API_ENV: &str = "AWS_LAMBDA_RUNTIME_API";
/// Port of the legacy RPC transport.
pub const LEGACY_SERVER_PORT_ENV: &str = "_LAMBDA_SERVER_PORT";
/// Program to re-exec through before serving.
pub const EXEC_WRAPPER_ENV: &str = "AWS_LAMBDA_EXEC_WRAPPER";
/// Number of concurrent invocation loops.
pub const MAX_CONCURRENCY_ENV: &str = "AWS_LAMBDA_MAX_CONCURRENCY";
/// Trace header of the current invoke, for single-loop processes.
pub const TRACE_ID_ENV: &str = "_X_AMZN_TRACE_ID";

/// Configuration for the invocation loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Runtime API address.
    pub api_addr: Option<String>,
    /// Legacy RPC port; only used to report the transport as unsupported.
    pub legacy_server_port: Option<String>,
    /// Exec wrapper path.
    pub exec_wrapper: Option<String>,
    /// Raw concurrency setting, validated by [`RuntimeConfig::concurrency`].
    pub max_concurrency: Option<String>,
}

impl RuntimeConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        Self {
            api_addr: non_empty(RUNTIME_API_ENV),
            legacy_server_port: non_empty(LEGACY_SERVER_PORT_ENV),
            exec_wrapper: non_empty(EXEC_WRAPPER_ENV),
            max_concurrency: non_empty(MAX_CONCURRENCY_ENV),
        }
    }

    /// Set the Runtime API address.
    pub fn api_addr(mut self, addr: impl Into<String>) -> Self {
        self.api_addr = Some(addr.into());
        self
    }

    /// Set the number of concurrent invocation loops.
    pub fn concurrency(mut self, workers: usize) -> Self {
        self.max_concurrency = Some(workers.to_string());
        self
    }

    /// Number of invocation loops: `1` when unset, otherwise a positive integer.
    pub fn workers(&self) -> Result<usize> {
        match self.max_concurrency.as_deref() {
            None => Ok(1),
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n >= 1 => Ok(n),
                _ => Err(RuntimeError::InvalidConfig(format!(
                    "{MAX_CONCURRENCY_ENV} must be a positive integer, got {raw:?}"
                ))),
            },
        }
    }

    /// The Runtime API address, or why it cannot be used.
    pub fn runtime_api(&self) -> Result<&str> {
        match (&self.api_addr, &self.legacy_server_port) {
            (Some(addr), _) => Ok(addr),
            (None, Some(port)) => Err(RuntimeError::UnsupportedTransport(format!(
                "{LEGACY_SERVER_PORT_ENV}={port} selects the legacy transport; set {RUNTIME_API_ENV}"
            ))),
            (None, None) => Err(RuntimeError::MissingEnv(RUNTIME_API_ENV)),
        }
    }
}
