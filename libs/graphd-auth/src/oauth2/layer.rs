use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use http::header::{AUTHORIZATION, HeaderName};
use http::{HeaderValue, Request, Response};
use tower::{Layer, Service};

use super::error::AuthError;
use super::provider::TokenProvider;
use graphd_http::HttpError;

/// Tower layer that attaches a bearer token to outbound HTTP requests.
///
/// Every request first awaits [`TokenProvider::get_token`]; the token is set
/// as `Authorization: Bearer <token>` (or under a custom header), replacing
/// any value already present. If no token can be obtained the request fails
/// with [`HttpError::Unauthenticated`] and is never sent.
///
/// Responses and transport errors from the inner service pass through as-is.
#[derive(Clone, Debug)]
pub struct BearerAuthLayer {
    provider: TokenProvider,
    header_name: HeaderName,
}

impl BearerAuthLayer {
    /// Create a layer that injects `Authorization: Bearer <token>`.
    #[must_use]
    pub fn new(provider: TokenProvider) -> Self {
        Self {
            provider,
            header_name: AUTHORIZATION,
        }
    }

    /// Create a layer that injects `<header_name>: Bearer <token>`.
    #[must_use]
    pub fn with_header_name(provider: TokenProvider, header_name: HeaderName) -> Self {
        Self {
            provider,
            header_name,
        }
    }
}

impl<S> Layer<S> for BearerAuthLayer {
    type Service = BearerAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuthService {
            inner,
            provider: self.provider.clone(),
            header_name: self.header_name.clone(),
        }
    }
}

/// Service created by [`BearerAuthLayer`].
#[derive(Clone, Debug)]
pub struct BearerAuthService<S> {
    inner: S,
    provider: TokenProvider,
    header_name: HeaderName,
}

impl<S, B, ResBody> Service<Request<B>> for BearerAuthService<S>
where
    S: Service<Request<B>, Response = Response<ResBody>, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
    B: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Response<ResBody>, HttpError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        // The readied service goes into the future, a fresh clone stays behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let provider = self.provider.clone();
        let header_name = self.header_name.clone();

        Box::pin(async move {
            let token = provider
                .get_token()
                .await
                .map_err(|e| HttpError::Unauthenticated(Box::new(e)))?;

            let mut value = {
                let raw = zeroize::Zeroizing::new(format!("Bearer {}", token.expose()));
                HeaderValue::from_str(&raw).map_err(HttpError::InvalidHeaderValue)?
            };
            value.set_sensitive(true);
            req.headers_mut().insert(header_name, value);

            inner.call(req).await
        })
    }
}

/// The [`AuthError`] behind a request that failed for lack of a token.
///
/// Returns `None` for every other kind of [`HttpError`].
#[must_use]
pub fn auth_error(err: &HttpError) -> Option<&AuthError> {
    match err {
        HttpError::Unauthenticated(source) => source.downcast_ref::<AuthError>(),
        _ => None,
    }
}
