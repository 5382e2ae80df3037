use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use provisioning_http::{Credential, TlsRoots};
use serde::Deserialize;
use thiserror::Error;

/// Prefix of environment variables that override file settings,
/// e.g. `DPS_REGISTRY_ENDPOINT`.
pub const ENV_PREFIX: &str = "DPS_REGISTRY_";

/// Default service API version.
pub const DEFAULT_API_VERSION: &str = "2021-10-01";

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_owned()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_max_response_size_bytes() -> usize {
    10 * 1024 * 1024
}

/// Settings for [`crate::EnrollmentRegistryClient::from_config`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryClientConfig {
    /// Base URL of the provisioning service, e.g. `https://my-dps.azure-devices-provisioning.net`.
    pub endpoint: String,

    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_max_response_size_bytes")]
    pub max_response_size_bytes: usize,

    /// Overrides the executor's default `User-Agent`.
    pub user_agent: Option<String>,

    /// Full `Authorization` header value attached to every request.
    pub credential: Option<Credential>,

    /// Permit plain `http://` endpoints (local emulators only).
    ///
    /// Honored in debug builds or with the `allow-insecure-http` feature;
    /// otherwise [`crate::EnrollmentRegistryClient::from_config`] rejects it.
    pub allow_insecure_http: bool,

    /// `web_pki` (bundled) or `native` (OS store).
    pub tls_roots: TlsRoots,

    /// Fail fast with an overload error past this many in-flight requests.
    pub max_concurrent_requests: Option<usize>,
}

impl Default for RegistryClientConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_version: default_api_version(),
            request_timeout_ms: default_request_timeout_ms(),
            max_response_size_bytes: default_max_response_size_bytes(),
            user_agent: None,
            credential: None,
            allow_insecure_http: false,
            tls_roots: TlsRoots::default(),
            max_concurrent_requests: None,
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid registry client configuration: {0}")]
pub struct ConfigError(#[source] Box<figment::Error>);

impl RegistryClientConfig {
    /// Extract the configuration from an already assembled figment.
    ///
    /// # Errors
    /// Returns [`ConfigError`] on unknown keys or ill-typed values.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        figment.extract().map_err(|e| ConfigError(Box::new(e)))
    }

    /// Load from an optional YAML file overlaid with `DPS_REGISTRY_*`
    /// environment variables.
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be parsed or a value is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX));
        Self::from_figment(&figment)
    }
}
