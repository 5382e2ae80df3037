use crate::builder::HttpClientBuilder;
use crate::config::TransportSecurity;
use crate::error::{HttpError, InvalidUriKind};
use crate::response::{HttpResponse, ResponseBody, read_body_limited};
use bytes::Bytes;
use http::{HeaderMap, Method, Request, Response};
use http_body_util::Full;
use std::future::Future;
use std::pin::Pin;
use std::task::Poll;
use std::time::Duration;
use tower::Service;
use tower::buffer::Buffer;

pub(crate) type ServiceFuture =
    Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, HttpError>> + Send>>;

pub(crate) type BufferedService = Buffer<Request<Full<Bytes>>, ServiceFuture>;

/// HTTP executor over a buffered tower stack.
///
/// `HttpClient` is `Clone + Send + Sync` and cheap to clone; clones share the
/// connection pool and the buffer worker, so no external locking is needed.
#[derive(Clone)]
pub struct HttpClient {
    pub(crate) service: BufferedService,
    pub(crate) request_timeout: Duration,
    pub(crate) max_body_size: usize,
    pub(crate) transport_security: TransportSecurity,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("request_timeout", &self.request_timeout)
            .field("max_body_size", &self.max_body_size)
            .field("transport_security", &self.transport_security)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Perform one HTTP exchange and buffer the response body.
    ///
    /// Any status code, including 4xx and 5xx, is returned as `Ok`. `Err` is
    /// reserved for failures where no response was obtained: invalid URL,
    /// connect/TLS failure, timeout, overload, or an oversized body.
    ///
    /// The request timeout bounds the whole exchange, from sending the
    /// request until the last body byte is read.
    ///
    /// # Errors
    /// See [`HttpError`].
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<HttpResponse, HttpError> {
        let uri = validate_url(url, self.transport_security)?;

        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(body))?;
        *request.headers_mut() = headers;

        let mut service = self.service.clone();
        try_acquire_buffer_slot(&mut service).await?;

        let exchange = async {
            let response = service.call(request).await.map_err(map_buffer_error)?;
            read_body_limited(response, self.max_body_size).await
        };
        tokio::time::timeout(self.request_timeout, exchange)
            .await
            .map_err(|_| HttpError::Timeout(self.request_timeout))?
    }
}

/// Parse `url` and check its scheme against the transport security mode.
fn validate_url(url: &str, transport: TransportSecurity) -> Result<http::Uri, HttpError> {
    let uri: http::Uri = url
        .parse()
        .map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::ParseError,
            reason: e.to_string(),
        })?;

    if uri.authority().is_none() {
        return Err(HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::MissingAuthority,
            reason: "missing host/authority".to_owned(),
        });
    }

    match (uri.scheme_str(), transport) {
        (Some("https"), _) | (Some("http"), TransportSecurity::AllowInsecureHttp) => Ok(uri),
        (Some("http"), TransportSecurity::TlsOnly) => Err(HttpError::InvalidScheme {
            scheme: "http".to_owned(),
            reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
        }),
        (Some(scheme), _) => Err(HttpError::InvalidScheme {
            scheme: scheme.to_owned(),
            reason: "only http:// and https:// schemes are supported".to_owned(),
        }),
        (None, _) => Err(HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::MissingScheme,
            reason: "missing scheme".to_owned(),
        }),
    }
}

fn map_buffer_error(err: tower::BoxError) -> HttpError {
    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(err) => {
            tracing::error!(error = %err, "request buffer worker closed unexpectedly");
            HttpError::ServiceClosed
        }
    }
}

/// Reserve a buffer slot without waiting: a full buffer is `Overloaded`.
async fn try_acquire_buffer_slot(service: &mut BufferedService) -> Result<(), HttpError> {
    let polled = std::future::poll_fn(|cx| match service.poll_ready(cx) {
        Poll::Ready(result) => Poll::Ready(Some(result)),
        Poll::Pending => Poll::Ready(None),
    })
    .await;

    match polled {
        Some(Ok(())) => Ok(()),
        Some(Err(e)) => Err(map_buffer_error(e)),
        None => Err(HttpError::Overloaded),
    }
}
