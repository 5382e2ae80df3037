#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! HTTP executor behind the provisioning registry client.
//!
//! One [`HttpClient`] wraps a hyper connection pool in a tower stack:
//! rustls (HTTPS only unless insecure HTTP is enabled), a per-request
//! timeout, `User-Agent` and `Authorization` injection, response
//! decompression and optional load-shedding concurrency limit.
//!
//! There is no retry and no redirect handling. Every status comes back
//! as an [`HttpResponse`]; only failures to obtain one are [`HttpError`]s.
//!
//! # Example
//!
//! ```ignore
//! use bytes::Bytes;
//! use http::HeaderMap;
//! use provisioning_http::{Credential, HttpClient};
//! use std::time::Duration;
//!
//! let client = HttpClient::builder()
//!     .timeout(Duration::from_secs(10))
//!     .credential(Credential::new("SharedAccessSignature sr=..."))
//!     .build()?;
//!
//! let resp = client
//!     .execute(http::Method::GET, "https://dps.example.net/enrollments/dev-1", HeaderMap::new(), Bytes::new())
//!     .await?;
//! assert!(resp.status().is_success());
//! ```

mod builder;
mod client;
mod config;
mod credential;
mod error;
mod layers;
mod response;
mod tls;

pub use builder::HttpClientBuilder;
pub use client::HttpClient;
pub use config::{
    ConcurrencyLimit, DEFAULT_USER_AGENT, HttpClientConfig, TlsRoots, TransportSecurity,
};
pub use credential::Credential;
pub use error::{HttpError, InvalidUriKind};
pub use layers::{CredentialLayer, CredentialService, UserAgentLayer, UserAgentService};
pub use response::{HttpResponse, ResponseBody, parse_retry_after};
