//! Transport seam between the registry client and the network.
//!
//! The client speaks in terms of [`TransportRequest`] and
//! [`TransportResponse`] against service-relative path segments such as
//! `["enrollments", "dev-1"]`. A segment is never split or normalized, so a
//! registration id always addresses exactly one resource.
//! [`HttpRegistryTransport`] is the production implementation; tests plug
//! in their own.

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use provisioning_http::{HttpClient, HttpError};
use thiserror::Error;
use url::Url;

use crate::error::RegistryError;

const JSON: &str = "application/json";
const JSON_UTF8: &str = "application/json; charset=utf-8";

/// One request against the registry, addressed by service-relative path
/// segments.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub segments: Vec<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportRequest {
    pub fn new<I, S>(method: Method, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method,
            segments: segments.into_iter().map(Into::into).collect(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Segments joined with `/`, for logs only.
    #[must_use]
    pub fn path(&self) -> String {
        self.segments.join("/")
    }

    #[must_use]
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }
}

/// Raw response. Any status may appear here; interpretation is the client's.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportResponse {
    /// Convenience accessor for a header as UTF-8 text.
    #[must_use]
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// The executor could not obtain a response (connect, TLS, timeout, ...).
#[derive(Error, Debug)]
#[error("transport failure: {message}")]
pub struct TransportError {
    message: String,
    timeout: bool,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timeout: false,
            source: None,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            timeout: true,
            ..Self::new(message)
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.timeout
    }
}

impl From<HttpError> for TransportError {
    fn from(err: HttpError) -> Self {
        let base = if err.is_timeout() {
            Self::timeout(err.to_string())
        } else {
            Self::new(err.to_string())
        };
        base.with_source(err)
    }
}

/// Executes registry requests.
///
/// Implementations must be safe to share between tasks; the registry client
/// holds one behind an `Arc` and issues independent calls concurrently.
#[async_trait]
pub trait RegistryTransport: Send + Sync {
    /// Perform one exchange. Non-2xx statuses are returned as `Ok`.
    ///
    /// # Errors
    /// Returns [`TransportError`] when no response was obtained.
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// [`RegistryTransport`] over [`provisioning_http::HttpClient`].
///
/// Resolves request segments against the service endpoint, percent-encoding
/// each one (`/` included), and appends the `api-version` query parameter.
#[derive(Debug, Clone)]
pub struct HttpRegistryTransport {
    client: HttpClient,
    endpoint: Url,
    api_version: String,
}

impl HttpRegistryTransport {
    /// # Errors
    /// Returns [`RegistryError::Validation`] if `endpoint` is not an absolute
    /// `http`/`https` URL that can carry a path.
    pub fn new(
        client: HttpClient,
        endpoint: &str,
        api_version: impl Into<String>,
    ) -> Result<Self, RegistryError> {
        Ok(Self {
            client,
            endpoint: parse_endpoint(endpoint)?,
            api_version: api_version.into(),
        })
    }

    fn url_for(&self, segments: &[String]) -> Result<Url, TransportError> {
        // `Url` silently drops dot segments, which would retarget the request.
        if let Some(bad) = segments.iter().find(|s| is_unaddressable(s)) {
            return Err(TransportError::new(format!(
                "path segment '{bad}' cannot be addressed"
            )));
        }

        let mut url = self.endpoint.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| TransportError::new("endpoint cannot carry a path"))?;
            path.pop_if_empty();
            path.extend(segments);
        }
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        Ok(url)
    }
}

/// Segments that cannot travel as a single literal path segment.
pub(crate) fn is_unaddressable(segment: &str) -> bool {
    matches!(segment, "" | "." | "..")
}

pub(crate) fn parse_endpoint(endpoint: &str) -> Result<Url, RegistryError> {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return Err(RegistryError::validation("service endpoint must not be empty"));
    }
    let mut url = Url::parse(trimmed)
        .map_err(|e| RegistryError::validation(format!("invalid service endpoint '{trimmed}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(RegistryError::validation(format!(
            "service endpoint '{trimmed}' must be an absolute http(s) URL"
        )));
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

#[async_trait]
impl RegistryTransport for HttpRegistryTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let url = self.url_for(&request.segments)?;

        let mut headers = request.headers;
        headers
            .entry(ACCEPT)
            .or_insert(HeaderValue::from_static(JSON));
        if !request.body.is_empty() {
            headers
                .entry(CONTENT_TYPE)
                .or_insert(HeaderValue::from_static(JSON_UTF8));
        }

        tracing::trace!(method = %request.method, url = %url, "dispatching registry request");

        let response = self
            .client
            .execute(request.method, url.as_str(), headers, request.body)
            .await?;

        let (status, headers, body) = response.into_parts();
        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
