#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Enrollment registry client for a device provisioning service.
//!
//! Creates, reads, updates and deletes individual enrollments, applies
//! bulk mutations with per-item outcomes, and pages through query results
//! with a continuation-token cursor. Writes are guarded by opaque etags;
//! failures come back as a typed [`RegistryError`].
//!
//! ```ignore
//! use enrollment_registry::{EnrollmentRegistryClient, Enrollment, RegistryClientConfig};
//!
//! let config = RegistryClientConfig::load(Some("registry.yaml".as_ref()))?;
//! let client = EnrollmentRegistryClient::from_config(&config)?;
//!
//! let stored = client.create_or_update(&Enrollment::new("dev-1")).await?;
//! client.delete(&stored).await?;
//! ```

mod bulk;
mod client;
mod codec;
mod config;
mod error;
mod mapper;
mod models;
mod query;
mod transport;

pub use bulk::{BulkItemError, BulkItemOutcome, BulkOperationResult};
pub use client::EnrollmentRegistryClient;
pub use config::{ConfigError, DEFAULT_API_VERSION, ENV_PREFIX, RegistryClientConfig};
pub use error::{RegistryError, ServiceError, ServiceErrorKind};
pub use models::{
    BulkOperationMode, ContinuationToken, ETag, Enrollment, ProvisioningStatus,
    QuerySpecification, RegistrationState, RegistrationStatus,
};
pub use query::{CONTINUATION, ITEM_TYPE, MAX_ITEM_COUNT, Query, QueryPage};
pub use transport::{
    HttpRegistryTransport, RegistryTransport, TransportError, TransportRequest, TransportResponse,
};

pub use provisioning_http::Credential;
