use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config failed: {0}")]
    Read(String),
    #[error("parse config failed: {0}")]
    Parse(String),
    #[error("schema load failed: {0}")]
    SchemaLoad(String),
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),
    #[error("unsupported config: {0}")]
    UnsupportedConfig(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: Server,
    pub gateway: Gateway,
    #[serde(default)]
    pub assistant: Assistant,
    pub sessions: Sessions,
    pub observability: Observability,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub listen_addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gateway {
    pub endpoint: String,
    #[serde(default)]
    pub api_token: Option<String>,
    pub timeout_ms: u64,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: usize,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_circuit_breaker_failures")]
    pub circuit_breaker_failures: u64,
    #[serde(default = "default_circuit_breaker_open_ms")]
    pub circuit_breaker_open_ms: u64,
    #[serde(default = "default_intent_operation")]
    pub intent_operation: String,
    #[serde(default = "default_commit_operation")]
    pub commit_operation: String,
    #[serde(default = "default_status_operation")]
    pub status_operation: String,
    #[serde(default = "default_require_ready")]
    pub require_ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assistant {
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

impl Default for Assistant {
    fn default() -> Self {
        Self {
            greeting: default_greeting(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sessions {
    pub max_sessions: usize,
    pub idle_ttl_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observability {
    pub log_level: String,
}

fn default_retry_max_attempts() -> usize {
    1
}

fn default_retry_backoff_ms() -> u64 {
    0
}

fn default_circuit_breaker_failures() -> u64 {
    5
}

fn default_circuit_breaker_open_ms() -> u64 {
    30_000
}

fn default_intent_operation() -> String {
    "aiBookingAssistant".to_string()
}

fn default_commit_operation() -> String {
    "squareCreateBooking".to_string()
}

fn default_status_operation() -> String {
    "sessionStatus".to_string()
}

fn default_require_ready() -> bool {
    true
}

pub fn default_greeting() -> String {
    "Hi! I'm your AI booking assistant. I can help you book appointments, reschedule, \
     check availability, or answer questions about our services. What can I help you with today?"
        .to_string()
}

pub fn load_and_validate(path: &str) -> Result<Config, ConfigError> {
    let config_text =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
    let value: serde_yaml::Value =
        serde_yaml::from_str(&config_text).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let instance = serde_json::to_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_against_schema(&instance)?;

    let cfg: Config =
        serde_json::from_value(instance).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_runtime_support(&cfg)?;
    Ok(cfg)
}

fn validate_against_schema(instance: &serde_json::Value) -> Result<(), ConfigError> {
    let schema_path = [
        std::path::PathBuf::from("config/config.schema.json"),
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .join("config/config.schema.json"),
    ]
    .into_iter()
    .find(|p| p.exists())
    .ok_or_else(|| {
        ConfigError::SchemaLoad(
            "config schema not found at config/config.schema.json or workspace config path"
                .to_string(),
        )
    })?;

    let schema_text =
        std::fs::read_to_string(schema_path).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    let schema: serde_json::Value =
        serde_json::from_str(&schema_text).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;

    let validator =
        jsonschema::validator_for(&schema).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    if let Err(first) = validator.validate(instance) {
        return Err(ConfigError::SchemaValidation(first.to_string()));
    }
    Ok(())
}

fn validate_runtime_support(cfg: &Config) -> Result<(), ConfigError> {
    let endpoint = url::Url::parse(&cfg.gateway.endpoint).map_err(|e| {
        ConfigError::UnsupportedConfig(format!("gateway.endpoint is not a valid URL: {e}"))
    })?;
    if endpoint.scheme() != "http" && endpoint.scheme() != "https" {
        return Err(ConfigError::UnsupportedConfig(format!(
            "gateway.endpoint scheme={} is not supported; supported: http, https",
            endpoint.scheme()
        )));
    }
    if cfg.gateway.retry_max_attempts == 0 {
        return Err(ConfigError::UnsupportedConfig(
            "gateway.retry_max_attempts must be >= 1".to_string(),
        ));
    }
    if cfg.gateway.circuit_breaker_failures == 0 {
        return Err(ConfigError::UnsupportedConfig(
            "gateway.circuit_breaker_failures must be >= 1".to_string(),
        ));
    }
    if cfg.gateway.circuit_breaker_open_ms == 0 {
        return Err(ConfigError::UnsupportedConfig(
            "gateway.circuit_breaker_open_ms must be >= 1".to_string(),
        ));
    }
    for (name, value) in [
        ("intent_operation", &cfg.gateway.intent_operation),
        ("commit_operation", &cfg.gateway.commit_operation),
        ("status_operation", &cfg.gateway.status_operation),
    ] {
        if value.trim().is_empty() || value.contains('/') {
            return Err(ConfigError::UnsupportedConfig(format!(
                "gateway.{name} must be a non-empty operation name without '/'"
            )));
        }
    }
    if cfg.assistant.greeting.trim().is_empty() {
        return Err(ConfigError::UnsupportedConfig(
            "assistant.greeting must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn write_temp_config(contents: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("concierge-config-test-{nanos}.yaml"));
        std::fs::write(&path, contents).expect("write temp config");
        path.to_string_lossy().to_string()
    }

    fn base_yaml() -> String {
        r#"
server:
  listen_addr: "127.0.0.1:0"

gateway:
  endpoint: "https://functions.example.com/v1"
  timeout_ms: 3000

assistant:
  greeting: "Hello there"

sessions:
  max_sessions: 10
  idle_ttl_ms: 60000

observability:
  log_level: "info"
"#
        .to_string()
    }

    #[test]
    fn applies_gateway_defaults() {
        let path = write_temp_config(&base_yaml());
        let cfg = load_and_validate(&path).expect("base config should be accepted");
        assert_eq!(cfg.gateway.retry_max_attempts, 1);
        assert_eq!(cfg.gateway.intent_operation, "aiBookingAssistant");
        assert_eq!(cfg.gateway.commit_operation, "squareCreateBooking");
        assert_eq!(cfg.gateway.status_operation, "sessionStatus");
        assert!(cfg.gateway.require_ready);
        assert_eq!(cfg.assistant.greeting, "Hello there");
    }

    #[test]
    fn accepts_shipped_example_config() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .join("config/example-config.yaml");
        let cfg = load_and_validate(&path.to_string_lossy()).expect("example config is valid");
        assert_eq!(cfg.gateway.retry_max_attempts, 2);
    }

    #[test]
    fn rejects_non_http_endpoint() {
        let path = write_temp_config(&base_yaml().replace(
            "https://functions.example.com/v1",
            "ftp://functions.example.com",
        ));
        let err = load_and_validate(&path).expect_err("expected unsupported config");
        assert!(matches!(err, ConfigError::UnsupportedConfig(_)));
    }

    #[test]
    fn rejects_zero_retry_attempts() {
        let path = write_temp_config(
            &base_yaml().replace("timeout_ms: 3000", "timeout_ms: 3000\n  retry_max_attempts: 0"),
        );
        let err = load_and_validate(&path).expect_err("expected unsupported config");
        assert!(matches!(err, ConfigError::UnsupportedConfig(_)));
    }

    #[test]
    fn rejects_unknown_log_level() {
        let path = write_temp_config(&base_yaml().replace("log_level: \"info\"", "log_level: \"loud\""));
        let err = load_and_validate(&path).expect_err("expected schema failure");
        assert!(matches!(err, ConfigError::SchemaValidation(_)));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = load_and_validate("/nonexistent/concierge.yaml").expect_err("expected read error");
        assert!(matches!(err, ConfigError::Read(_)));
    }
}
