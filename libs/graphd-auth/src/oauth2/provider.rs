use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use time::{OffsetDateTime, PrimitiveDateTime};
use tokio::sync::{Mutex, OnceCell};
use url::Url;

use super::clock::{Clock, SystemClock};
use super::config::OAuthClientConfig;
use super::discovery::discover_token_endpoint;
use super::error::AuthError;
use super::source::{FetchedToken, OAuthTokenSource};
use crate::SecretString;

/// A token together with the instants that bound its use.
struct CachedToken {
    value: SecretString,
    /// Point after which the token is not handed out any more.
    refresh_at: OffsetDateTime,
    expires_at: OffsetDateTime,
}

impl CachedToken {
    fn new(fetched: FetchedToken, fetched_at: OffsetDateTime, margin: Duration) -> Self {
        let expires_at = saturating_add(fetched_at, fetched.lifetime);
        // Short-lived tokens are still reused for half their lifetime
        let margin = margin.min(fetched.lifetime / 2);
        let refresh_at = saturating_add(fetched_at, fetched.lifetime - margin);

        Self {
            value: fetched.access_token,
            refresh_at,
            expires_at,
        }
    }

    fn is_fresh(&self, now: OffsetDateTime) -> bool {
        now < self.refresh_at
    }
}

fn saturating_add(at: OffsetDateTime, by: Duration) -> OffsetDateTime {
    time::Duration::try_from(by)
        .ok()
        .and_then(|by| at.checked_add(by))
        .unwrap_or_else(|| PrimitiveDateTime::MAX.assume_utc())
}

enum TokenEndpoint {
    Direct(Url),
    Discovered { issuer: Url, resolved: OnceCell<Url> },
}

struct Inner {
    source: OAuthTokenSource,
    endpoint: TokenEndpoint,
    refresh_margin: Duration,
    clock: Arc<dyn Clock>,
    cache: ArcSwapOption<CachedToken>,
    /// Serializes fetches. Holds the error of the most recent fetch, if it failed.
    refresh: Mutex<Option<AuthError>>,
    /// Number of completed fetches.
    generation: AtomicU64,
}

/// Handle for obtaining `OAuth2` client-credentials access tokens.
///
/// Tokens are fetched lazily on the first [`get_token`](Self::get_token)
/// call, cached, and refetched once the cached token is within the refresh
/// margin of its expiry. There is no background refresh.
///
/// Concurrent callers that find the cache stale share a single request to
/// the token endpoint: whoever takes the refresh lock fetches, everyone
/// queued behind it gets that fetch's token or its error.
///
/// `TokenProvider` is [`Clone`] + [`Send`] + [`Sync`]; clones share one cache.
#[derive(Clone)]
pub struct TokenProvider {
    inner: Arc<Inner>,
}

impl fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenProvider")
            .field("refresh_margin", &self.inner.refresh_margin)
            .finish_non_exhaustive()
    }
}

impl TokenProvider {
    /// Create a provider using the system clock.
    ///
    /// Validates the configuration and builds the token endpoint client.
    /// No network request is made. Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ConfigInvalid`] if the configuration is invalid
    /// or the token endpoint client cannot be built.
    pub fn new(config: OAuthClientConfig) -> Result<Self, AuthError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a provider reading time from `clock`.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_clock(config: OAuthClientConfig, clock: Arc<dyn Clock>) -> Result<Self, AuthError> {
        config.validate()?;

        let endpoint = match (config.token_endpoint.clone(), config.issuer_url.clone()) {
            (Some(url), _) => TokenEndpoint::Direct(url),
            (None, Some(issuer)) => TokenEndpoint::Discovered {
                issuer,
                resolved: OnceCell::new(),
            },
            (None, None) => {
                return Err(AuthError::ConfigInvalid(
                    "one of token_endpoint or issuer_url must be set".into(),
                ));
            }
        };

        let source = OAuthTokenSource::new(&config)?;

        Ok(Self {
            inner: Arc::new(Inner {
                source,
                endpoint,
                refresh_margin: config.refresh_margin,
                clock,
                cache: ArcSwapOption::empty(),
                refresh: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        })
    }

    /// Return a currently valid access token, fetching one if needed.
    ///
    /// # Errors
    ///
    /// Returns an error of kind
    /// [`TokenRequestFailed`](super::AuthErrorKind::TokenRequestFailed) if
    /// the token (or discovery) request fails. The cache is left as it was.
    pub async fn get_token(&self) -> Result<SecretString, AuthError> {
        let inner = &*self.inner;

        if let Some(token) = inner.fresh_token(inner.clock.now()) {
            tracing::trace!("using cached OAuth2 token");
            return Ok(token);
        }

        let seen = inner.generation.load(Ordering::Acquire);
        let mut last_failure = inner.refresh.lock().await;

        // Someone else may have refreshed while we waited for the lock
        let now = inner.clock.now();
        if let Some(token) = inner.fresh_token(now) {
            tracing::trace!("using OAuth2 token refreshed by a concurrent caller");
            return Ok(token);
        }
        if inner.generation.load(Ordering::Acquire) != seen
            && let Some(err) = last_failure.as_ref()
        {
            return Err(err.clone());
        }

        tracing::debug!("requesting OAuth2 token");
        let result = inner.fetch(now).await;
        inner.generation.fetch_add(1, Ordering::AcqRel);

        match result {
            Ok(cached) => {
                tracing::info!(
                    expires_at = %cached.expires_at,
                    refresh_at = %cached.refresh_at,
                    "acquired OAuth2 token"
                );
                let value = cached.value.clone();
                inner.cache.store(Some(Arc::new(cached)));
                *last_failure = None;
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(error = %err, "OAuth2 token request failed");
                *last_failure = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Drop the cached token so the next [`get_token`](Self::get_token) fetches.
    ///
    /// Use after a downstream service rejects the token (e.g. HTTP 401).
    pub fn invalidate(&self) {
        if self.inner.cache.swap(None).is_some() {
            tracing::debug!("OAuth2 token invalidated");
        }
    }
}

impl Inner {
    fn fresh_token(&self, now: OffsetDateTime) -> Option<SecretString> {
        self.cache
            .load_full()
            .filter(|cached| cached.is_fresh(now))
            .map(|cached| cached.value.clone())
    }

    async fn fetch(&self, now: OffsetDateTime) -> Result<CachedToken, AuthError> {
        let endpoint = self.token_endpoint().await?;
        let fetched = self.source.request_token(endpoint).await?;
        Ok(CachedToken::new(fetched, now, self.refresh_margin))
    }

    async fn token_endpoint(&self) -> Result<&Url, AuthError> {
        match &self.endpoint {
            TokenEndpoint::Direct(url) => Ok(url),
            TokenEndpoint::Discovered { issuer, resolved } => {
                resolved
                    .get_or_try_init(|| discover_token_endpoint(self.source.http_client(), issuer))
                    .await
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::oauth2::{AuthErrorKind, ManualClock};
    use httpmock::prelude::*;

    fn test_config(server: &MockServer) -> OAuthClientConfig {
        OAuthClientConfig {
            token_endpoint: Some(
                Url::parse(&format!("http://localhost:{}/token", server.port())).unwrap(),
            ),
            client_id: "test-client".into(),
            client_secret: SecretString::new("test-secret"),
            scopes: vec!["https://graph.example.com/.default".into()],
            http_config: Some(graphd_http::HttpClientConfig::for_testing()),
            ..Default::default()
        }
    }

    fn token_json(token: &str, expires_in: u64) -> String {
        format!(r#"{{"access_token":"{token}","expires_in":{expires_in},"token_type":"Bearer"}}"#)
    }

    fn provider_with_clock(server: &MockServer) -> (TokenProvider, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let provider = TokenProvider::with_clock(test_config(server), clock.clone()).unwrap();
        (provider, clock)
    }

    // -- trait assertions -----------------------------------------------------

    #[test]
    fn provider_is_send_sync_clone() {
        fn assert_traits<T: Send + Sync + Clone>() {}
        assert_traits::<TokenProvider>();
    }

    // -- refresh timing -------------------------------------------------------

    #[test]
    fn refresh_at_uses_margin() {
        let t0 = OffsetDateTime::UNIX_EPOCH;
        let cached = CachedToken::new(
            FetchedToken {
                access_token: SecretString::new("t"),
                lifetime: Duration::from_secs(3600),
            },
            t0,
            Duration::from_secs(60),
        );
        assert_eq!(cached.expires_at, t0 + Duration::from_secs(3600));
        assert_eq!(cached.refresh_at, t0 + Duration::from_secs(3540));
    }

    #[test]
    fn margin_capped_at_half_lifetime() {
        let t0 = OffsetDateTime::UNIX_EPOCH;
        let cached = CachedToken::new(
            FetchedToken {
                access_token: SecretString::new("t"),
                lifetime: Duration::from_secs(40),
            },
            t0,
            Duration::from_secs(60),
        );
        assert_eq!(cached.refresh_at, t0 + Duration::from_secs(20));
        assert!(cached.is_fresh(t0 + Duration::from_secs(19)));
        assert!(!cached.is_fresh(t0 + Duration::from_secs(20)));
    }

    #[test]
    fn huge_lifetime_saturates() {
        let cached = CachedToken::new(
            FetchedToken {
                access_token: SecretString::new("t"),
                lifetime: Duration::from_secs(u64::MAX),
            },
            OffsetDateTime::UNIX_EPOCH,
            Duration::from_secs(60),
        );
        assert!(cached.refresh_at <= cached.expires_at);
    }

    // -- construction ---------------------------------------------------------

    #[tokio::test]
    async fn missing_secret_is_config_invalid_without_network() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(200).body(token_json("never", 3600));
        });

        let cfg = OAuthClientConfig {
            client_secret: SecretString::new(""),
            ..test_config(&server)
        };
        let err = TokenProvider::new(cfg).unwrap_err();

        assert_eq!(err.kind(), AuthErrorKind::ConfigInvalid);
        mock.assert_calls(0);
    }

    // -- caching --------------------------------------------------------------

    #[tokio::test]
    async fn cached_token_reused() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(200)
                .header("content-type", "application/json")
                .body(token_json("tok-cached", 3600));
        });

        let (provider, clock) = provider_with_clock(&server);
        let first = provider.get_token().await.unwrap();
        clock.advance(Duration::from_secs(600));
        let second = provider.get_token().await.unwrap();

        assert_eq!(first.expose(), "tok-cached");
        assert_eq!(second, first);
        mock.assert_calls(1);
    }

    #[tokio::test]
    async fn expired_token_refetched_once() {
        let server = MockServer::start();
        let mut first_mock = server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(200).body(token_json("tok-1", 3600));
        });

        let (provider, clock) = provider_with_clock(&server);
        assert_eq!(provider.get_token().await.unwrap().expose(), "tok-1");
        first_mock.assert_calls(1);
        first_mock.delete();

        let second_mock = server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(200).body(token_json("tok-2", 3600));
        });

        clock.advance(Duration::from_secs(3601));
        assert_eq!(provider.get_token().await.unwrap().expose(), "tok-2");
        assert_eq!(provider.get_token().await.unwrap().expose(), "tok-2");
        second_mock.assert_calls(1);
    }

    #[tokio::test]
    async fn short_lived_token_reused_for_half_lifetime() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(200).body(token_json("tok-short", 60));
        });

        let (provider, clock) = provider_with_clock(&server);
        provider.get_token().await.unwrap();
        clock.advance(Duration::from_secs(29));
        provider.get_token().await.unwrap();
        mock.assert_calls(1);

        clock.advance(Duration::from_secs(1));
        provider.get_token().await.unwrap();
        mock.assert_calls(2);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(200).body(token_json("tok", 3600));
        });

        let (provider, _clock) = provider_with_clock(&server);
        provider.get_token().await.unwrap();
        provider.invalidate();
        provider.get_token().await.unwrap();

        mock.assert_calls(2);
    }

    // -- failures -------------------------------------------------------------

    #[tokio::test]
    async fn already_expired_token_never_returned() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(200).body(token_json("dead", 0));
        });

        let (provider, _clock) = provider_with_clock(&server);
        let first = provider.get_token().await.unwrap_err();
        let second = provider.get_token().await.unwrap_err();

        assert_eq!(first.kind(), AuthErrorKind::TokenRequestFailed);
        assert_eq!(second, first);
        mock.assert_calls(2);
    }

    #[tokio::test]
    async fn unauthorized_leaves_empty_cache_empty() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(401)
                .body(r#"{"error":"invalid_client"}"#);
        });

        let (provider, _clock) = provider_with_clock(&server);
        let err = provider.get_token().await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::TokenRequestFailed);
        assert!(err.to_string().contains("401"), "got {err}");

        // Not cached: the next call tries again
        provider.get_token().await.unwrap_err();
        mock.assert_calls(2);
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_token() {
        let server = MockServer::start();
        let mut ok_mock = server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(200).body(token_json("tok-old", 3600));
        });

        let (provider, clock) = provider_with_clock(&server);
        let start = clock.now();
        provider.get_token().await.unwrap();
        ok_mock.delete();

        let fail_mock = server.mock(|when, then| {
            when.method(POST).path("/token");
            then.status(503);
        });

        clock.advance(Duration::from_secs(3590));
        provider.get_token().await.unwrap_err();
        fail_mock.assert_calls(1);

        // Back inside the validity window the old token is still there
        clock.set(start + Duration::from_secs(10));
        assert_eq!(provider.get_token().await.unwrap().expose(), "tok-old");
        fail_mock.assert_calls(1);
    }

    // -- discovery ------------------------------------------------------------

    #[tokio::test]
    async fn discovery_runs_once() {
        let server = MockServer::start();
        let token_ep = format!("http://localhost:{}/oauth2/v2.0/token", server.port());
        let discovery = server.mock(|when, then| {
            when.method(GET).path("/.well-known/openid-configuration");
            then.status(200)
                .json_body(serde_json::json!({ "token_endpoint": token_ep }));
        });
        let token = server.mock(|when, then| {
            when.method(POST).path("/oauth2/v2.0/token");
            then.status(200).body(token_json("tok-disc", 3600));
        });

        let cfg = OAuthClientConfig {
            token_endpoint: None,
            issuer_url: Some(Url::parse(&format!("http://localhost:{}", server.port())).unwrap()),
            ..test_config(&server)
        };
        let provider = TokenProvider::new(cfg).unwrap();
        discovery.assert_calls(0);

        assert_eq!(provider.get_token().await.unwrap().expose(), "tok-disc");
        provider.invalidate();
        provider.get_token().await.unwrap();

        discovery.assert_calls(1);
        token.assert_calls(2);
    }
}
