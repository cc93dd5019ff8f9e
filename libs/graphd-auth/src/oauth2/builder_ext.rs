use http::header::HeaderName;
use tower::ServiceExt;

use super::layer::BearerAuthLayer;
use super::provider::TokenProvider;

/// Extension trait adding bearer auth to [`graphd_http::HttpClientBuilder`].
///
/// # Example
///
/// ```ignore
/// use graphd_auth::HttpClientBuilderExt;
///
/// let provider = TokenProvider::new(config)?;
/// let client = HttpClientBuilder::new()
///     .with_bearer_auth(provider)
///     .build()?;
/// ```
pub trait HttpClientBuilderExt {
    /// Send `Authorization: Bearer <token>` on every request.
    #[must_use]
    fn with_bearer_auth(self, provider: TokenProvider) -> Self;

    /// Send `<header_name>: Bearer <token>` on every request.
    #[must_use]
    fn with_bearer_auth_header(self, provider: TokenProvider, header_name: HeaderName) -> Self;
}

impl HttpClientBuilderExt for graphd_http::HttpClientBuilder {
    fn with_bearer_auth(self, provider: TokenProvider) -> Self {
        apply(self, BearerAuthLayer::new(provider))
    }

    fn with_bearer_auth_header(self, provider: TokenProvider, header_name: HeaderName) -> Self {
        apply(self, BearerAuthLayer::with_header_name(provider, header_name))
    }
}

fn apply(
    builder: graphd_http::HttpClientBuilder,
    layer: BearerAuthLayer,
) -> graphd_http::HttpClientBuilder {
    builder.with_auth_layer(move |svc| {
        tower::ServiceBuilder::new()
            .layer(layer)
            .service(svc)
            .boxed_clone()
    })
}
