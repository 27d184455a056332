use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Yaml};
use figment::Figment;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use super::logging::LoggingConfig;
use super::store::StoreBackend;

/// A top-level enum for versioned configurations.
#[derive(Deserialize, Serialize, JsonSchema)]
#[serde(tag = "version")]
pub enum Config {
    #[serde(rename = "1.0.0")]
    ConfigV1(ConfigV1),
}

/// Main config for v1.0.0.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct ConfigV1 {
    pub bind_address: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    pub logging: LoggingConfig,
    pub store: StoreBackend,
    /// Upper bound for a single storage call.
    #[serde(default = "default_storage_timeout_ms")]
    pub storage_timeout_ms: u64,
    #[serde(default)]
    pub tokens: TokenConfig,
}

impl ConfigV1 {
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }
}

/// Lifetimes of issued tokens, in seconds.
#[derive(Deserialize, Serialize, Debug, Clone, JsonSchema)]
pub struct TokenConfig {
    #[serde(default = "default_activation_ttl_secs")]
    pub activation_ttl_secs: u64,
    #[serde(default = "default_authorization_ttl_secs")]
    pub authorization_ttl_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        TokenConfig {
            activation_ttl_secs: default_activation_ttl_secs(),
            authorization_ttl_secs: default_authorization_ttl_secs(),
        }
    }
}

impl TokenConfig {
    pub fn activation_ttl(&self) -> Duration {
        Duration::from_secs(self.activation_ttl_secs)
    }

    pub fn authorization_ttl(&self) -> Duration {
        Duration::from_secs(self.authorization_ttl_secs)
    }
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_storage_timeout_ms() -> u64 {
    3000
}

fn default_activation_ttl_secs() -> u64 {
    3 * 24 * 60 * 60
}

fn default_authorization_ttl_secs() -> u64 {
    24 * 60 * 60
}

/// Builds the layered figment: the YAML file, then `MOVIEDB_` environment
/// variables with nested keys split on `__`.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Yaml::file(path))
        .merge(Env::prefixed("MOVIEDB_").split("__"))
}

/// Load and version-resolve the config at `path`.
pub fn load_config(path: &Path) -> Result<ConfigV1, figment::Error> {
    let config = figment(path).extract::<Config>()?;

    // handle configuration migration between versions here when necessary
    match config {
        Config::ConfigV1(c) => Ok(c),
    }
}

/// Parse a config from a YAML string, without environment overrides.
pub fn config_from_str(yaml: &str) -> Result<ConfigV1, figment::Error> {
    match Figment::new().merge(Yaml::string(yaml)).extract::<Config>()? {
        Config::ConfigV1(c) => Ok(c),
    }
}

/// Print the JSON schema for the configuration to stdout.
pub fn print_schema() -> Result<(), serde_json::Error> {
    let schema = schema_for!(Config);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
