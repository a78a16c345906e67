//! Invocation metadata exposed to handlers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

/// Metadata of the invoke being handled. Stored in the handler's [`Context`].
///
/// [`Context`]: crate::Context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LambdaContext {
    pub aws_request_id: String,
    pub invoked_function_arn: String,
    pub identity: CognitoIdentity,
    pub client_context: ClientContext,
    /// Milliseconds since the Unix epoch.
    pub deadline_ms: u64,
}

impl LambdaContext {
    /// The deadline as an absolute instant.
    pub fn deadline(&self) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_millis(self.deadline_ms)
    }
}

/// Identity of the caller when invoked through a mobile SDK.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CognitoIdentity {
    #[serde(rename = "cognitoIdentityId", default)]
    pub cognito_identity_id: String,
    #[serde(rename = "cognitoIdentityPoolId", default)]
    pub cognito_identity_pool_id: String,
}

/// Client application details sent by mobile callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientApplication {
    #[serde(default)]
    pub installation_id: String,
    #[serde(default)]
    pub app_title: String,
    #[serde(default)]
    pub app_version_code: String,
    #[serde(default)]
    pub app_version_name: String,
    #[serde(default)]
    pub app_package_name: String,
}

/// Client context sent by mobile callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientContext {
    #[serde(default)]
    pub client: ClientApplication,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub custom: HashMap<String, String>,
}

/// The `Lambda-Runtime-Trace-Id` value of the current invoke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceId(pub String);

/// Static function settings the host exposes through the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionConfig {
    pub function_name: String,
    pub function_version: String,
    pub memory_size_mb: u32,
    pub log_group_name: String,
    pub log_stream_name: String,
    /// Configured timeout in seconds.
    pub timeout_secs: Option<u64>,
}

impl FunctionConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            function_name: lookup("AWS_LAMBDA_FUNCTION_NAME").unwrap_or_default(),
            function_version: lookup("AWS_LAMBDA_FUNCTION_VERSION").unwrap_or_default(),
            memory_size_mb: lookup("AWS_LAMBDA_FUNCTION_MEMORY_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
            log_group_name: lookup("AWS_LAMBDA_LOG_GROUP_NAME").unwrap_or_default(),
            log_stream_name: lookup("AWS_LAMBDA_LOG_STREAM_NAME").unwrap_or_default(),
            timeout_secs: lookup("AWS_LAMBDA_FUNCTION_TIMEOUT").and_then(|v| v.parse().ok()),
        }
    }
}

static FUNCTION_CONFIG: OnceLock<FunctionConfig> = OnceLock::new();

/// Process-wide function configuration, read from the environment on first use.
pub fn function_config() -> &'static FunctionConfig {
    FUNCTION_CONFIG.get_or_init(FunctionConfig::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_config_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("AWS_LAMBDA_FUNCTION_NAME", "orders"),
            ("AWS_LAMBDA_FUNCTION_VERSION", "$LATEST"),
            ("AWS_LAMBDA_FUNCTION_MEMORY_SIZE", "512"),
            ("AWS_LAMBDA_LOG_GROUP_NAME", "/aws/lambda/orders"),
            ("AWS_LAMBDA_FUNCTION_TIMEOUT", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config = FunctionConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.function_name, "orders");
        assert_eq!(config.function_version, "$LATEST");
        assert_eq!(config.memory_size_mb, 512);
        assert_eq!(config.log_group_name, "/aws/lambda/orders");
        assert_eq!(config.log_stream_name, "");
        assert_eq!(config.timeout_secs, None);
    }

    #[test]
    fn test_client_context_parses_partial_document() {
        let raw = r#"{"client":{"app_title":"shop"},"custom":{"tier":"gold"}}"#;
        let parsed: ClientContext = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.client.app_title, "shop");
        assert_eq!(parsed.custom.get("tier").map(String::as_str), Some("gold"));
        assert!(parsed.env.is_empty());
    }

    #[test]
    fn test_deadline_from_millis() {
        let lc = LambdaContext {
            deadline_ms: 1_500,
            ..Default::default()
        };
        assert_eq!(
            lc.deadline(),
            SystemTime::UNIX_EPOCH + Duration::from_millis(1_500)
        );
    }
}
