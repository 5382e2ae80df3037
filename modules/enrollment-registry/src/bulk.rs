//! Bulk mutation request and mixed-success result.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::{deserialize_error_code, require_body};
use crate::error::RegistryError;
use crate::models::{BulkOperationMode, Enrollment};

/// Per-item failure reported by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemError {
    pub code: Option<String>,
    pub status: Option<String>,
    pub message: Option<String>,
}

/// Outcome of one submitted item. No error means the item succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemOutcome {
    pub registration_id: String,
    pub error: Option<BulkItemError>,
}

impl BulkItemOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of a bulk operation.
///
/// `outcomes` holds exactly one entry per submitted item, in submission
/// order. Items the service did not list as failed are successes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkOperationResult {
    pub is_successful: bool,
    pub outcomes: Vec<BulkItemOutcome>,
}

impl BulkOperationResult {
    pub fn failures(&self) -> impl Iterator<Item = &BulkItemOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    #[must_use]
    pub fn outcome(&self, registration_id: &str) -> Option<&BulkItemOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.registration_id == registration_id)
    }
}

#[derive(Serialize)]
struct BulkRequest<'a> {
    mode: BulkOperationMode,
    enrollments: &'a [Enrollment],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResult {
    is_successful: Option<bool>,
    #[serde(default)]
    errors: Option<Vec<WireItemError>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireItemError {
    registration_id: String,
    #[serde(default, deserialize_with = "deserialize_error_code")]
    error_code: Option<String>,
    #[serde(default)]
    error_status: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

/// Reject batches the service could not report on unambiguously.
pub(crate) fn validate_batch(enrollments: &[Enrollment]) -> Result<(), RegistryError> {
    if enrollments.is_empty() {
        return Err(RegistryError::validation(
            "bulk operation requires at least one enrollment",
        ));
    }

    let mut seen = HashSet::with_capacity(enrollments.len());
    for (index, enrollment) in enrollments.iter().enumerate() {
        if enrollment.registration_id.is_empty() {
            return Err(RegistryError::validation(format!(
                "enrollment at index {index} has an empty registration id"
            )));
        }
        if !seen.insert(enrollment.registration_id.as_str()) {
            return Err(RegistryError::validation(format!(
                "registration id '{}' appears more than once in the batch",
                enrollment.registration_id
            )));
        }
    }
    Ok(())
}

/// `{"mode": ..., "enrollments": [...]}`
pub(crate) fn encode_bulk_request(
    mode: BulkOperationMode,
    enrollments: &[Enrollment],
) -> Result<Bytes, RegistryError> {
    serde_json::to_vec(&BulkRequest { mode, enrollments })
        .map(Bytes::from)
        .map_err(|e| RegistryError::validation(format!("bulk request cannot be encoded: {e}")))
}

/// Decode the service's bulk result and align it with the submitted ids.
pub(crate) fn decode_bulk_result(
    body: &[u8],
    submitted: &[Enrollment],
) -> Result<BulkOperationResult, RegistryError> {
    require_body(body, "bulk result")?;
    let wire: WireResult = serde_json::from_slice(body)
        .map_err(|e| RegistryError::protocol(format!("malformed bulk result: {e}")))?;

    let is_successful = wire
        .is_successful
        .ok_or_else(|| RegistryError::protocol("bulk result is missing isSuccessful"))?;

    let errors = match wire.errors {
        Some(errors) => errors,
        None if is_successful => Vec::new(),
        None => {
            return Err(RegistryError::protocol(
                "bulk result reports failure but carries no per-item errors",
            ));
        }
    };

    let known: HashSet<&str> = submitted
        .iter()
        .map(|s| s.registration_id.as_str())
        .collect();
    let mut by_id: HashMap<String, BulkItemError> = HashMap::with_capacity(errors.len());
    for e in errors {
        if !known.contains(e.registration_id.as_str()) {
            tracing::warn!(
                registration_id = %e.registration_id,
                "dropping bulk error for an id that was not submitted"
            );
            continue;
        }
        by_id
            .entry(e.registration_id)
            .or_insert(BulkItemError {
                code: e.error_code,
                status: e.error_status,
                message: e.error_message,
            });
    }

    let outcomes = submitted
        .iter()
        .map(|s| BulkItemOutcome {
            registration_id: s.registration_id.clone(),
            error: by_id.remove(&s.registration_id),
        })
        .collect();

    Ok(BulkOperationResult {
        is_successful,
        outcomes,
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;

    fn batch(ids: &[&str]) -> Vec<Enrollment> {
        ids.iter().map(|id| Enrollment::new(*id)).collect()
    }

    #[test]
    fn test_validate_batch() {
        assert!(validate_batch(&batch(&["a", "b"])).is_ok());
        assert!(validate_batch(&[]).unwrap_err().is_validation());
        assert!(validate_batch(&batch(&["a", ""])).unwrap_err().is_validation());
        assert!(validate_batch(&batch(&["a", "b", "a"])).unwrap_err().is_validation());
    }

    #[test]
    fn test_encode_request_shape() {
        let body = encode_bulk_request(BulkOperationMode::UpdateIfMatchETag, &batch(&["a", "b"]))
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            value,
            json!({
                "mode": "updateIfMatchETag",
                "enrollments": [{"registrationId": "a"}, {"registrationId": "b"}]
            })
        );
    }

    #[test]
    fn test_every_submitted_id_gets_exactly_one_outcome() {
        let submitted = batch(&["a", "b", "c"]);
        let body = br#"{"isSuccessful":false,"errors":[
            {"registrationId":"c","errorCode":409201,"errorStatus":"Conflict"},
            {"registrationId":"zz","errorCode":400000,"errorStatus":"BadRequest"},
            {"registrationId":"c","errorCode":500000,"errorStatus":"Later"}
        ]}"#;

        let result = decode_bulk_result(body, &submitted).unwrap();
        assert!(!result.is_successful);
        let ids: Vec<&str> = result
            .outcomes
            .iter()
            .map(|o| o.registration_id.as_str())
            .collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert!(result.outcome("a").unwrap().is_success());
        assert!(result.outcome("b").unwrap().is_success());

        let failed: Vec<&BulkItemOutcome> = result.failures().collect();
        assert_eq!(failed.len(), 1);
        let error = failed[0].error.as_ref().unwrap();
        assert_eq!(error.code.as_deref(), Some("409201"));
        assert_eq!(error.status.as_deref(), Some("Conflict"));
        assert!(result.outcome("zz").is_none());
    }

    #[test]
    fn test_large_batch_aligns_errors() {
        let ids: Vec<String> = (0..5_000).map(|i| format!("dev-{i}")).collect();
        let submitted: Vec<Enrollment> = ids.iter().map(Enrollment::new).collect();
        let errors: Vec<serde_json::Value> = ids
            .iter()
            .step_by(2)
            .rev()
            .map(|id| json!({"registrationId": id, "errorCode": 409_201}))
            .chain([json!({"registrationId": "dev-x", "errorCode": 400_000})])
            .collect();
        let body = serde_json::to_vec(&json!({"isSuccessful": false, "errors": errors})).unwrap();

        let result = decode_bulk_result(&body, &submitted).unwrap();
        assert_eq!(result.outcomes.len(), 5_000);
        assert_eq!(result.failures().count(), 2_500);
        for (i, outcome) in result.outcomes.iter().enumerate() {
            assert_eq!(outcome.registration_id, ids[i]);
            assert_eq!(outcome.is_success(), i % 2 == 1);
        }
    }

    #[test]
    fn test_success_without_error_list() {
        let result = decode_bulk_result(br#"{"isSuccessful":true}"#, &batch(&["a"])).unwrap();
        assert!(result.is_successful);
        assert_eq!(result.failures().count(), 0);
    }

    #[test]
    fn test_contract_violations() {
        let submitted = batch(&["a"]);
        for body in [
            &b""[..],
            b"null",
            br#"{"errors":[]}"#,
            br#"{"isSuccessful":false}"#,
            br#"{"isSuccessful":false,"errors":{"a":1}}"#,
            br#"{"isSuccessful":false,"errors":[{"errorCode":1}]}"#,
        ] {
            let err = decode_bulk_result(body, &submitted).unwrap_err();
            assert!(
                matches!(err, RegistryError::ProtocolViolation { .. }),
                "{} -> {err:?}",
                String::from_utf8_lossy(body)
            );
        }
    }
}
