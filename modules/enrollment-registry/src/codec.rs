//! JSON mapping between [`Enrollment`] and its wire representation.

use bytes::Bytes;
use serde::{Deserialize, Deserializer};

use crate::error::RegistryError;
use crate::models::Enrollment;

pub(crate) fn encode_enrollment(enrollment: &Enrollment) -> Result<Bytes, RegistryError> {
    serde_json::to_vec(enrollment)
        .map(Bytes::from)
        .map_err(|e| RegistryError::validation(format!("enrollment cannot be encoded: {e}")))
}

/// Decode a single enrollment from a 2xx response body.
///
/// A missing body (empty, whitespace or JSON `null`) is a protocol
/// violation, as is an enrollment without a registration id.
pub(crate) fn decode_enrollment(body: &[u8]) -> Result<Enrollment, RegistryError> {
    require_body(body, "enrollment")?;
    let enrollment: Enrollment = serde_json::from_slice(body)
        .map_err(|e| RegistryError::protocol(format!("malformed enrollment: {e}")))?;
    if enrollment.registration_id.is_empty() {
        return Err(RegistryError::protocol(
            "enrollment in response has an empty registrationId",
        ));
    }
    Ok(enrollment)
}

/// Decode one page of query results (a JSON array of enrollments).
pub(crate) fn decode_enrollment_page(body: &[u8]) -> Result<Vec<Enrollment>, RegistryError> {
    require_body(body, "query page")?;
    serde_json::from_slice(body)
        .map_err(|e| RegistryError::protocol(format!("malformed query page: {e}")))
}

pub(crate) fn require_body(body: &[u8], what: &str) -> Result<(), RegistryError> {
    let trimmed = body.trim_ascii();
    if trimmed.is_empty() || trimmed == b"null" {
        return Err(RegistryError::protocol(format!(
            "response carried no {what} body"
        )));
    }
    Ok(())
}

/// Service error codes arrive as numbers (`404201`) or strings; both are
/// kept as their decimal/text form.
pub(crate) fn deserialize_error_code<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Number(i64),
        Text(String),
    }

    Ok(Option::<Code>::deserialize(deserializer)?.map(|code| match code {
        Code::Number(n) => n.to_string(),
        Code::Text(s) => s,
    }))
}
