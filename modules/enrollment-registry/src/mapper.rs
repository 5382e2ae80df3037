//! Conversion of non-2xx responses into [`ServiceError`].

use http::{HeaderMap, StatusCode};
use provisioning_http::parse_retry_after;
use serde::Deserialize;

use crate::codec::deserialize_error_code;
use crate::error::{ServiceError, ServiceErrorKind};

/// Structured error body returned by the provisioning service.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    #[serde(default, deserialize_with = "deserialize_error_code")]
    error_code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default, alias = "Message")]
    error_message: Option<String>,
    #[serde(default)]
    tracking_id: Option<String>,
}

/// Build a [`ServiceError`] from a failed response.
///
/// When the body is not the structured error document, the status line
/// (for example `404 Not Found`) becomes the message.
pub(crate) fn map_error_response(
    status: StatusCode,
    headers: &HeaderMap,
    body: &[u8],
) -> ServiceError {
    let parsed = serde_json::from_slice::<ErrorBody>(body).ok();

    let (code, message, tracking_id) = match parsed {
        Some(b) => (
            b.error_code,
            b.message.or(b.error_message).filter(|m| !m.is_empty()),
            b.tracking_id,
        ),
        None => (None, None, None),
    };

    ServiceError {
        kind: ServiceErrorKind::from_status(status),
        status,
        code,
        message: message.unwrap_or_else(|| status.to_string()),
        tracking_id,
        retry_after: parse_retry_after(headers),
    }
}
