use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// LoggingConfig controls how we initialize tracing/logging.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct LoggingConfig {
    /// One of trace, debug, info, warn, error. `RUST_LOG` wins when set.
    pub level: String,
    pub format: LogFormat,
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Structured JSON lines.
    Json,
    /// Human-readable output.
    Console,
}

fn default_service_name() -> String {
    "moviedb".to_string()
}
