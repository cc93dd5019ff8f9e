use std::time::Duration;

/// Default User-Agent string for HTTP requests
pub const DEFAULT_USER_AGENT: &str = concat!("graphd-http/", env!("CARGO_PKG_VERSION"));

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Transport security configuration
///
/// Controls whether the client enforces TLS or allows insecure HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Require TLS for all connections (HTTPS only) - default and recommended
    #[default]
    TlsOnly,
    /// Allow plain `http://` URLs. Intended for local mock servers only.
    AllowInsecureHttp,
}

/// HTTP client configuration
///
/// The client never retries on its own. Callers that want a retry policy
/// apply it around `send()`, where they can see both the request and the
/// outcome.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Timeout applied to each request (default: 30s)
    pub request_timeout: Duration,

    /// Maximum response body size in bytes (default: 10 MB)
    pub max_body_size: usize,

    /// User-Agent header value, added when the request does not set one
    pub user_agent: String,

    /// Transport security mode (default: TLS only)
    pub transport: TransportSecurity,

    /// Root certificate source for TLS (default: webpki roots)
    pub tls_roots: TlsRootConfig,

    /// Capacity of the request buffer in front of the service stack
    /// (default: 1024). A full buffer fails fast with `HttpError::Overloaded`.
    pub buffer_capacity: usize,

    /// Idle timeout for pooled connections (default: 90s, `None` = keep forever)
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum idle connections kept per host (default: 32)
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024, // 10 MB
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::default(),
            buffer_capacity: 1024,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

impl HttpClientConfig {
    /// Create minimal configuration (small timeout, small body limit)
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024, // 1 MB
            buffer_capacity: 256,
            pool_idle_timeout: Some(Duration::from_secs(30)),
            pool_max_idle_per_host: 8,
            ..Self::default()
        }
    }

    /// Configuration for talking to an `OAuth2` token endpoint.
    ///
    /// Token responses are tiny and the endpoint is hit at most once per
    /// token lifetime, so the pool is kept small.
    #[must_use]
    pub fn token_endpoint() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024, // 1 MB
            buffer_capacity: 256,
            pool_idle_timeout: Some(Duration::from_secs(60)),
            pool_max_idle_per_host: 4,
            ..Self::default()
        }
    }

    /// Configuration for tests against local mock servers.
    ///
    /// Allows plain HTTP and uses a short timeout.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            transport: TransportSecurity::AllowInsecureHttp,
            buffer_capacity: 64,
            ..Self::minimal()
        }
    }
}
