use crate::credential::Credential;
use crate::error::HttpError;
use http::{HeaderValue, Request, header::AUTHORIZATION};
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Attaches the registry credential as the `Authorization` header.
///
/// The header value is marked sensitive so that `Debug` output and HTTP/2
/// header compression never expose it. A request that already carries an
/// `Authorization` header is left untouched.
#[derive(Clone)]
pub struct CredentialLayer {
    value: HeaderValue,
}

impl CredentialLayer {
    /// # Errors
    /// Returns `HttpError::InvalidHeaderValue` if the credential contains
    /// characters that are not allowed in a header value.
    pub fn try_new(credential: &Credential) -> Result<Self, HttpError> {
        let mut value = HeaderValue::from_str(credential.expose())?;
        value.set_sensitive(true);
        Ok(Self { value })
    }
}

impl std::fmt::Debug for CredentialLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialLayer").finish_non_exhaustive()
    }
}

impl<S> Layer<S> for CredentialLayer {
    type Service = CredentialService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CredentialService {
            inner,
            value: self.value.clone(),
        }
    }
}

#[derive(Clone)]
pub struct CredentialService<S> {
    inner: S,
    value: HeaderValue,
}

impl<S, B> Service<Request<B>> for CredentialService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        req.headers_mut()
            .entry(AUTHORIZATION)
            .or_insert_with(|| self.value.clone());
        self.inner.call(req)
    }
}
