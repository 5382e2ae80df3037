use std::sync::Arc;
use std::time::Duration;

use http::header::IF_MATCH;
use http::{HeaderValue, Method};
use provisioning_http::{
    ConcurrencyLimit, HttpClientBuilder, HttpClientConfig, HttpError, TransportSecurity,
};

use crate::bulk::{BulkOperationResult, decode_bulk_result, encode_bulk_request, validate_batch};
use crate::codec::{decode_enrollment, encode_enrollment};
use crate::config::RegistryClientConfig;
use crate::error::RegistryError;
use crate::mapper::map_error_response;
use crate::models::{BulkOperationMode, ETag, Enrollment, QuerySpecification};
use crate::query::Query;
use crate::transport::{
    HttpRegistryTransport, RegistryTransport, TransportError, TransportRequest, TransportResponse,
    is_unaddressable,
};

const ENROLLMENTS: &str = "enrollments";

/// Client for the individual-enrollment registry of a provisioning service.
///
/// Stateless apart from the shared transport: clones are cheap and calls
/// may run concurrently. Nothing is cached and nothing is retried; a
/// throttled or failed call surfaces as a typed [`RegistryError`].
#[derive(Clone)]
pub struct EnrollmentRegistryClient {
    transport: Arc<dyn RegistryTransport>,
}

impl std::fmt::Debug for EnrollmentRegistryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrollmentRegistryClient").finish_non_exhaustive()
    }
}

impl EnrollmentRegistryClient {
    pub fn new(transport: Arc<dyn RegistryTransport>) -> Self {
        Self { transport }
    }

    /// Build a client talking HTTP(S) to `config.endpoint`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// [`RegistryError::Validation`] for an empty or unusable endpoint, a
    /// user agent / credential that is not a valid header value, or
    /// `allow_insecure_http` in a release build without the
    /// `allow-insecure-http` feature;
    /// [`RegistryError::Transport`] if the TLS stack cannot be initialized.
    pub fn from_config(config: &RegistryClientConfig) -> Result<Self, RegistryError> {
        crate::transport::parse_endpoint(&config.endpoint)?;

        let mut http_config = HttpClientConfig {
            request_timeout: Duration::from_millis(config.request_timeout_ms),
            max_body_size: config.max_response_size_bytes,
            concurrency_limit: config.max_concurrent_requests.map(ConcurrencyLimit::new),
            tls_roots: config.tls_roots,
            transport: transport_security(config.allow_insecure_http)?,
            ..HttpClientConfig::default()
        };
        if let Some(user_agent) = &config.user_agent {
            http_config.user_agent.clone_from(user_agent);
        }

        let mut builder = HttpClientBuilder::with_config(http_config);
        if let Some(credential) = &config.credential {
            builder = builder.credential(credential.clone());
        }
        let client = builder.build().map_err(|e| match e {
            HttpError::InvalidHeaderValue(_) | HttpError::InvalidHeaderName(_) => {
                RegistryError::validation(format!("invalid client configuration: {e}"))
            }
            other => RegistryError::Transport(TransportError::from(other)),
        })?;

        let transport = HttpRegistryTransport::new(client, &config.endpoint, &config.api_version)?;
        Ok(Self::new(Arc::new(transport)))
    }

    /// Create the enrollment, or replace it if it exists.
    ///
    /// A non-empty etag on `enrollment` makes the write conditional
    /// (`If-Match`); a stale etag fails with a conflict. Returns the
    /// service's copy with its new etag and timestamps.
    ///
    /// # Errors
    /// See [`RegistryError`].
    pub async fn create_or_update(&self, enrollment: &Enrollment) -> Result<Enrollment, RegistryError> {
        let path = enrollment_path(&enrollment.registration_id)?;
        let mut request = TransportRequest::new(Method::PUT, path)
            .with_body(encode_enrollment(enrollment)?);
        if let Some(etag) = enrollment.conditional_etag() {
            request.headers.insert(IF_MATCH, if_match(etag)?);
        }

        let response = send(self.transport.as_ref(), "create_or_update", request).await?;
        decode_enrollment(&response.body)
    }

    /// Fetch one enrollment. A missing record is a not-found failure.
    ///
    /// # Errors
    /// See [`RegistryError`].
    pub async fn get(&self, registration_id: &str) -> Result<Enrollment, RegistryError> {
        let request = TransportRequest::new(Method::GET, enrollment_path(registration_id)?);
        let response = send(self.transport.as_ref(), "get", request).await?;
        decode_enrollment(&response.body)
    }

    /// Delete using the enrollment's id and, when non-empty, its etag.
    ///
    /// # Errors
    /// See [`RegistryError`].
    pub async fn delete(&self, enrollment: &Enrollment) -> Result<(), RegistryError> {
        self.delete_by_id(&enrollment.registration_id, enrollment.etag.as_ref())
            .await
    }

    /// Delete by id. With a non-empty `etag` the delete only happens if it
    /// matches the stored version; otherwise it is unconditional.
    ///
    /// # Errors
    /// Not-found when the record does not exist, conflict on etag mismatch.
    pub async fn delete_by_id(
        &self,
        registration_id: &str,
        etag: Option<&ETag>,
    ) -> Result<(), RegistryError> {
        let mut request = TransportRequest::new(Method::DELETE, enrollment_path(registration_id)?);
        if let Some(etag) = etag.filter(|e| !e.is_empty()) {
            request.headers.insert(IF_MATCH, if_match(etag)?);
        }

        send(self.transport.as_ref(), "delete", request).await?;
        Ok(())
    }

    /// Apply `mode` to every enrollment in one request.
    ///
    /// The result has one outcome per submitted enrollment, in order.
    /// Item-level failures are reported there, not as an `Err`.
    ///
    /// # Errors
    /// Validation for an empty batch, an empty id or a repeated id;
    /// protocol violation for an empty or malformed result body.
    pub async fn bulk_operation(
        &self,
        mode: BulkOperationMode,
        enrollments: &[Enrollment],
    ) -> Result<BulkOperationResult, RegistryError> {
        validate_batch(enrollments)?;
        let request = TransportRequest::new(Method::POST, [ENROLLMENTS])
            .with_body(encode_bulk_request(mode, enrollments)?);

        let response = send(self.transport.as_ref(), "bulk_operation", request).await?;
        let result = decode_bulk_result(&response.body, enrollments)?;

        tracing::debug!(
            ?mode,
            items = enrollments.len(),
            failed = result.failures().count(),
            is_successful = result.is_successful,
            "bulk operation completed"
        );
        Ok(result)
    }

    /// Create a lazy cursor over the enrollments matching `specification`.
    ///
    /// `page_size` of 0 lets the service pick; negative values are rejected.
    /// No request is made until [`Query::next_page`].
    ///
    /// # Errors
    /// Validation for an empty query string or a negative page size.
    pub fn create_query(
        &self,
        specification: QuerySpecification,
        page_size: i32,
    ) -> Result<Query, RegistryError> {
        if specification.query.trim().is_empty() {
            return Err(RegistryError::validation("query specification must not be empty"));
        }
        let page_size = u32::try_from(page_size)
            .map_err(|_| RegistryError::validation(format!("page size must not be negative, got {page_size}")))?;

        Query::new(
            Arc::clone(&self.transport),
            ENROLLMENTS,
            specification,
            page_size,
        )
    }
}

/// Same build gate as `HttpClientBuilder::allow_insecure_http`.
fn transport_security(allow_insecure_http: bool) -> Result<TransportSecurity, RegistryError> {
    if !allow_insecure_http {
        return Ok(TransportSecurity::TlsOnly);
    }
    if cfg!(any(debug_assertions, feature = "allow-insecure-http")) {
        Ok(TransportSecurity::AllowInsecureHttp)
    } else {
        Err(RegistryError::validation(
            "allow_insecure_http requires a debug build or the allow-insecure-http feature",
        ))
    }
}

fn enrollment_path(registration_id: &str) -> Result<[&str; 2], RegistryError> {
    if registration_id.is_empty() {
        return Err(RegistryError::validation("registration id must not be empty"));
    }
    if is_unaddressable(registration_id) {
        return Err(RegistryError::validation(format!(
            "registration id '{registration_id}' cannot be used as a path segment"
        )));
    }
    Ok([ENROLLMENTS, registration_id])
}

fn if_match(etag: &ETag) -> Result<HeaderValue, RegistryError> {
    HeaderValue::from_str(etag.as_str())
        .map_err(|_| RegistryError::validation("etag is not a valid header value"))
}

/// Run one request; non-2xx statuses become [`RegistryError::Service`].
pub(crate) async fn send(
    transport: &dyn RegistryTransport,
    operation: &'static str,
    request: TransportRequest,
) -> Result<TransportResponse, RegistryError> {
    let method = request.method.clone();
    let path = request.path();

    let response = match transport.execute(request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(operation, %method, path = %path, error = %e, "registry request failed");
            return Err(e.into());
        }
    };

    tracing::debug!(
        operation,
        %method,
        path = %path,
        status = response.status.as_u16(),
        "registry response"
    );

    if !response.status.is_success() {
        return Err(map_error_response(response.status, &response.headers, &response.body).into());
    }
    Ok(response)
}
