use crate::error::AppError;
use config::{Config as Cfg, Environment, File};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Settings shared by every service in the workspace.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_service_name() -> String {
    "workshop-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_level: default_log_level(),
            otlp_endpoint: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        load_section(None)
    }

    pub fn load_from(path: &Path) -> Result<Self, AppError> {
        load_section(Some(path))
    }
}

/// Load any deserializable settings structure.
///
/// Sources, lowest precedence first: the `configuration` file in the working
/// directory (or `path` when given, which must then exist), then `APP__`
/// prefixed environment variables with `__` as the nesting separator.
pub fn load_section<T: DeserializeOwned>(path: Option<&Path>) -> Result<T, AppError> {
    dotenvy::dotenv().ok();

    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name("configuration").required(false),
    };

    let config = Cfg::builder()
        .add_source(file)
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    Ok(config.try_deserialize()?)
}
