//! Enrollment registry data model.
//!
//! Field names follow the service's JSON wire format (camelCase). Server
//! owned fields are optional so that a freshly constructed enrollment can
//! be sent without them.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque version token assigned by the service on every successful write.
///
/// Only equality and emptiness are meaningful; the content is never parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ETag(String);

impl ETag {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque cursor handed out by the service to fetch the next query page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContinuationToken(String);

impl ContinuationToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Desired provisioning state of an enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisioningStatus {
    Enabled,
    Disabled,
}

/// Registration progress reported by the service for an enrolled device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationStatus {
    Unassigned,
    Assigning,
    Assigned,
    Failed,
    Disabled,
    #[serde(other)]
    Unknown,
}

/// Server-owned snapshot of a device's latest registration attempt.
///
/// Read-only for the client: it is echoed back unchanged on update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_id: Option<String>,
    #[serde(
        default,
        rename = "createdDateTimeUtc",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_hub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<RegistrationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(
        default,
        rename = "lastUpdatedDateTimeUtc",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_updated_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<ETag>,
}

/// An individual enrollment: how one device identity is admitted by the
/// provisioning service.
///
/// `registration_id` is the immutable key. `etag`, `created_time`,
/// `last_updated_time` and `registration_state` are assigned by the
/// service; a client-built enrollment may leave them empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    pub registration_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// Attestation mechanism (TPM, X.509 or symmetric key), owned externally
    /// and carried verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestation: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iot_hub_host_name: Option<String>,
    /// Initial device twin state, carried verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_twin: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_status: Option<ProvisioningStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_state: Option<RegistrationState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<ETag>,
    #[serde(
        default,
        rename = "createdDateTimeUtc",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_time: Option<DateTime<Utc>>,
    #[serde(
        default,
        rename = "lastUpdatedDateTimeUtc",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_updated_time: Option<DateTime<Utc>>,
}

impl Enrollment {
    /// A minimal enrollment with only its key set.
    pub fn new(registration_id: impl Into<String>) -> Self {
        Self {
            registration_id: registration_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_attestation(mut self, attestation: Value) -> Self {
        self.attestation = Some(attestation);
        self
    }

    #[must_use]
    pub fn with_etag(mut self, etag: ETag) -> Self {
        self.etag = Some(etag);
        self
    }

    #[must_use]
    pub fn with_provisioning_status(mut self, status: ProvisioningStatus) -> Self {
        self.provisioning_status = Some(status);
        self
    }

    /// The etag to send as `If-Match`, if any. An empty etag counts as absent.
    #[must_use]
    pub fn conditional_etag(&self) -> Option<&ETag> {
        self.etag.as_ref().filter(|e| !e.is_empty())
    }
}

/// How a bulk request treats every item in the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BulkOperationMode {
    /// Fail items whose `registrationId` already exists.
    #[serde(rename = "create")]
    Create,
    /// Create or replace items unconditionally.
    #[serde(rename = "update")]
    Update,
    /// Replace items only when their etag matches the stored one.
    #[serde(rename = "updateIfMatchETag")]
    UpdateIfMatchETag,
    /// Remove items.
    #[serde(rename = "delete")]
    Delete,
}

/// Caller-owned query over the enrollment collection.
///
/// The expression is SQL-like (`SELECT * FROM enrollments WHERE ...`) and
/// carries any ordering clause itself. The client never inspects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpecification {
    pub query: String,
}

impl QuerySpecification {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }
}
