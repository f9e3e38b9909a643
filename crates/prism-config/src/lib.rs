#![allow(clippy::must_use_candidate)]

mod env;
mod loader;
pub mod providers;

use serde::Deserialize;

pub use loader::CONFIG_PATH_ENV;
pub use providers::*;

/// Top-level Prism configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Provider credentials and endpoints
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// HTTP transport tuning
    #[serde(default)]
    pub http: HttpConfig,
}

/// Settings applied to the default HTTP transport
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Whole-request timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Connection establishment timeout in seconds
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
}
