use crate::config::{HttpClientConfig, TlsRootConfig, TransportSecurity};
use crate::error::HttpError;
use crate::layers::UserAgentLayer;
use crate::response::ResponseBody;
use crate::tls;
use bytes::Bytes;
use http::Response;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::time::Duration;
use tower::buffer::Buffer;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneService;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;

/// Type-erased service handed to an auth layer in [`HttpClientBuilder::with_auth_layer`].
pub type InnerService =
    BoxCloneService<http::Request<Full<Bytes>>, http::Response<ResponseBody>, HttpError>;

/// Builder for an [`HttpClient`](crate::HttpClient) and its tower stack.
pub struct HttpClientBuilder {
    config: HttpClientConfig,
    auth_layer: Option<Box<dyn FnOnce(InnerService) -> InnerService + Send>>,
}

impl HttpClientBuilder {
    /// Create a new builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: HttpClientConfig::default(),
            auth_layer: None,
        }
    }

    /// Create a builder with a specific configuration
    #[must_use]
    pub fn with_config(config: HttpClientConfig) -> Self {
        Self {
            config,
            auth_layer: None,
        }
    }

    /// Set the per-request timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the user agent string
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Allow plain `http://` URLs (for testing only)
    ///
    /// Only compiled in debug builds or with the `allow-insecure-http` feature.
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        tracing::warn!(
            target: "graphd_http::security",
            "allow_insecure_http() called - HTTP traffic will NOT be encrypted"
        );
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    /// Wrap the stack with an auth layer.
    ///
    /// Stack position: `Buffer → **this layer** → Timeout → …`
    ///
    /// The layer runs once per request, before the timeout starts. Only one
    /// auth layer can be set; a second call replaces the first.
    #[must_use]
    pub fn with_auth_layer(
        mut self,
        wrap: impl FnOnce(InnerService) -> InnerService + Send + 'static,
    ) -> Self {
        self.auth_layer = Some(Box::new(wrap));
        self
    }

    /// Build the client.
    ///
    /// Must be called inside a Tokio runtime; the buffer worker is spawned here.
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails or the user agent is not
    /// a valid header value
    pub fn build(self) -> Result<crate::HttpClient, HttpError> {
        if self.config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 use only for testing with mock servers"
            );
        }

        let timeout = self.config.request_timeout;
        let https = build_https_connector(self.config.tls_roots, self.config.transport)?;

        let mut client_builder = Client::builder(TokioExecutor::new());
        // pool_idle_timeout has no effect without a pool timer
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(self.config.pool_max_idle_per_host)
            .http2_only(false);
        if let Some(idle_timeout) = self.config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle_timeout);
        }
        let hyper_client = client_builder.build::<_, Full<Bytes>>(https);

        let ua_layer = UserAgentLayer::try_new(&self.config.user_agent)?;

        // Request flow (outer → inner):
        //   Buffer → [AuthLayer?] → ErrorMapping → Timeout → UserAgent →
        //   Decompression → hyper_client
        //
        // send() resolves Ok for every HTTP status; only transport, TLS,
        // timeout and auth failures are errors.
        let service = ServiceBuilder::new()
            .layer(TimeoutLayer::new(timeout))
            .layer(ua_layer)
            .layer(DecompressionLayer::new())
            .service(hyper_client);

        let service = service.map_response(map_decompression_response);
        let service = service.map_err(move |e: tower::BoxError| map_tower_error(e, timeout));

        let mut boxed_service = service.boxed_clone();
        if let Some(wrap) = self.auth_layer {
            boxed_service = wrap(boxed_service);
        }

        let buffered_service: crate::client::BufferedService =
            Buffer::new(boxed_service, self.config.buffer_capacity.max(1));

        Ok(crate::HttpClient {
            service: buffered_service,
            max_body_size: self.config.max_body_size,
            transport_security: self.config.transport,
        })
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Map tower errors to `HttpError`, reporting the configured timeout on `Elapsed`.
fn map_tower_error(err: tower::BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }

    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(other) => HttpError::Transport(other),
    }
}

/// Box the decompression body into [`ResponseBody`].
fn map_decompression_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    let boxed_body: ResponseBody = body.map_err(Into::into).boxed();
    Response::from_parts(parts, boxed_body)
}

/// Build the HTTPS connector for the given root source.
///
/// ALPN advertises both h2 and http/1.1.
///
/// # Errors
///
/// Returns `HttpError::Tls` if the provider rejects its configuration or
/// `TlsRootConfig::Native` finds no usable root certificates.
fn build_https_connector(
    tls_roots: TlsRootConfig,
    transport: TransportSecurity,
) -> Result<HttpsConnector<HttpConnector>, HttpError> {
    let allow_http = transport == TransportSecurity::AllowInsecureHttp;

    match tls_roots {
        TlsRootConfig::WebPki => {
            let builder = hyper_rustls::HttpsConnectorBuilder::new()
                .with_provider_and_webpki_roots(tls::crypto_provider())
                .map_err(|e| HttpError::Tls(Box::new(e)))?;
            let connector = if allow_http {
                builder.https_or_http().enable_all_versions().build()
            } else {
                builder.https_only().enable_all_versions().build()
            };
            Ok(connector)
        }
        TlsRootConfig::Native => {
            let client_config =
                tls::native_roots_client_config().map_err(|e| HttpError::Tls(e.into()))?;
            let builder = hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(client_config);
            let connector = if allow_http {
                builder.https_or_http().enable_all_versions().build()
            } else {
                builder.https_only().enable_all_versions().build()
            };
            Ok(connector)
        }
    }
}
