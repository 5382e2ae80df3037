use std::time::Duration;

use serde::Deserialize;

/// `User-Agent` sent when the caller does not configure one.
pub const DEFAULT_USER_AGENT: &str = concat!("dps-provisioning-http/", env!("CARGO_PKG_VERSION"));

const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on requests in flight through one client and its clones.
///
/// Requests beyond the bound are shed immediately with
/// [`crate::HttpError::Overloaded`] instead of queueing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyLimit {
    pub max_in_flight: usize,
}

impl ConcurrencyLimit {
    /// A limit of 0 is raised to 1.
    #[must_use]
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            max_in_flight: max_in_flight.max(1),
        }
    }
}

/// Where server certificates are anchored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TlsRoots {
    /// Mozilla roots compiled into the binary.
    #[default]
    WebPki,
    /// The operating system's certificate store.
    Native,
}

/// Whether plain `http://` URLs may be used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    #[default]
    TlsOnly,
    /// Local emulators and mock servers only: the `Authorization`
    /// header travels in clear text.
    AllowInsecureHttp,
}

/// Settings of one [`crate::HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Deadline for one exchange, from connect until the body is read.
    pub request_timeout: Duration,

    /// Responses with a larger body fail with [`crate::HttpError::BodyTooLarge`].
    pub max_body_size: usize,

    pub user_agent: String,

    pub concurrency_limit: Option<ConcurrencyLimit>,

    pub transport: TransportSecurity,

    pub tls_roots: TlsRoots,

    /// Requests that may wait for the shared worker before callers see
    /// [`crate::HttpError::Overloaded`].
    pub buffer_capacity: usize,

    /// `None` keeps idle connections until the server closes them.
    pub pool_idle_timeout: Option<Duration>,

    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            concurrency_limit: None,
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRoots::WebPki,
            buffer_capacity: 1024,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}
