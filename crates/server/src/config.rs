use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue, Method};
use orchestrator_keys::LeaseConfig;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Token orchestrator service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// The address to listen on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Lease length and reaper cadence
    #[serde(default)]
    pub lease: LeaseConfig,

    /// CORS settings
    #[serde(default)]
    pub cors: CorsConfig,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        default_config()
    }
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allow all origins
    #[serde(default = "default_true")]
    pub allow_all_origins: bool,

    /// Allowed origins (if allow_all_origins is false)
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Allowed methods
    #[serde(default = "default_allowed_methods")]
    pub allowed_methods: Vec<String>,

    /// Allowed headers
    #[serde(default = "default_allowed_headers")]
    pub allowed_headers: Vec<String>,

    /// Max age in seconds
    #[serde(default = "default_max_age")]
    pub max_age: u64,
}

const fn default_true() -> bool {
    true
}

fn default_allowed_methods() -> Vec<String> {
    ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
        .into_iter()
        .map(ToOwned::to_owned)
        .collect()
}

fn default_allowed_headers() -> Vec<String> {
    ["Authorization", "Content-Type", "Accept"]
        .into_iter()
        .map(ToOwned::to_owned)
        .collect()
}

const fn default_max_age() -> u64 {
    86400 // 24 hours
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_all_origins: true,
            allowed_origins: Vec::new(),
            allowed_methods: default_allowed_methods(),
            allowed_headers: default_allowed_headers(),
            max_age: default_max_age(),
        }
    }
}

impl CorsConfig {
    /// Build the CORS layer. Entries that fail to parse are skipped.
    #[must_use]
    pub fn layer(&self) -> CorsLayer {
        if self.allow_all_origins {
            return CorsLayer::permissive();
        }

        let origins = self
            .allowed_origins
            .iter()
            .filter_map(|origin| origin.parse::<HeaderValue>().ok())
            .collect::<Vec<_>>();

        let methods = self
            .allowed_methods
            .iter()
            .filter_map(|method| method.parse::<Method>().ok())
            .collect::<Vec<_>>();

        let headers = self
            .allowed_headers
            .iter()
            .filter_map(|header| header.parse::<HeaderName>().ok())
            .collect::<Vec<_>>();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(methods)
            .allow_headers(headers)
            .max_age(core::time::Duration::from_secs(self.max_age))
    }
}

/// Configuration used when no file is given
#[must_use]
pub fn default_config() -> OrchestratorConfig {
    OrchestratorConfig {
        listen_addr: default_listen_addr(),
        lease: LeaseConfig::default(),
        cors: CorsConfig::default(),
    }
}

/// Load the configuration from a file
///
/// Values can be overridden from the environment with the `ORCHESTRATOR`
/// prefix, e.g. `ORCHESTRATOR__LEASE__LEASE_SECS=120`.
pub fn load_config(path: &str) -> eyre::Result<OrchestratorConfig> {
    let config = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(config::Environment::with_prefix("ORCHESTRATOR").separator("__"))
        .build()?
        .try_deserialize()?;

    Ok(config)
}
