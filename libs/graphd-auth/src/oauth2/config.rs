use std::fmt;
use std::time::Duration;
use url::Url;

use super::error::AuthError;
use super::types::ClientAuthMethod;
use crate::SecretString;

/// Default Azure AD authority host.
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Configuration for an outbound `OAuth2` client-credentials flow.
///
/// Exactly one of [`token_endpoint`](Self::token_endpoint) or
/// [`issuer_url`](Self::issuer_url) must be set. [`TokenProvider::new`]
/// runs [`validate`](Self::validate) before anything else.
///
/// `Debug` redacts [`client_secret`](Self::client_secret) and extra header values.
///
/// [`TokenProvider::new`]: super::TokenProvider::new
pub struct OAuthClientConfig {
    // ---- endpoint resolution ------------------------------------------------
    /// Direct token endpoint URL (mutually exclusive with `issuer_url`).
    pub token_endpoint: Option<Url>,

    /// OIDC issuer URL (mutually exclusive with `token_endpoint`).
    /// The token endpoint is read from
    /// `{issuer_url}/.well-known/openid-configuration` on first use.
    pub issuer_url: Option<Url>,

    // ---- credentials --------------------------------------------------------
    /// `OAuth2` client (application) identifier.
    pub client_id: String,

    /// `OAuth2` client secret.
    pub client_secret: SecretString,

    /// Requested scopes, e.g. `https://graph.microsoft.com/.default`.
    pub scopes: Vec<String>,

    /// How client credentials are sent to the token endpoint.
    pub auth_method: ClientAuthMethod,

    /// Extra headers attached to every token request.
    pub extra_headers: Vec<(String, String)>,

    // ---- refresh policy -----------------------------------------------------
    /// A cached token stops being handed out this long before it expires
    /// (default: 60 s). Capped at half the token lifetime.
    pub refresh_margin: Duration,

    /// Lifetime assumed when the response omits `expires_in` (default: 5 min).
    pub default_ttl: Duration,

    // ---- HTTP client --------------------------------------------------------
    /// Override for the token endpoint client configuration.
    /// `None` uses [`HttpClientConfig::token_endpoint()`](graphd_http::HttpClientConfig::token_endpoint).
    pub http_config: Option<graphd_http::HttpClientConfig>,
}

impl OAuthClientConfig {
    /// Config for an Azure AD (Microsoft identity platform v2.0) tenant.
    ///
    /// Token endpoint: `{authority_host}/{tenant_id}/oauth2/v2.0/token`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ConfigInvalid`] if `tenant_id` is blank or the
    /// authority host is not a valid base URL.
    pub fn azure_ad(
        authority_host: &str,
        tenant_id: &str,
        client_id: impl Into<String>,
        client_secret: SecretString,
        scope: impl Into<String>,
    ) -> Result<Self, AuthError> {
        let tenant_id = tenant_id.trim();
        if tenant_id.is_empty() {
            return Err(AuthError::ConfigInvalid(
                "tenant_id must not be empty".into(),
            ));
        }

        let host = authority_host.trim_end_matches('/');
        let token_endpoint = Url::parse(&format!("{host}/{tenant_id}/oauth2/v2.0/token"))
            .map_err(|e| AuthError::ConfigInvalid(format!("invalid authority host: {e}")))?;

        Ok(Self {
            token_endpoint: Some(token_endpoint),
            client_id: client_id.into(),
            client_secret,
            scopes: vec![scope.into()],
            ..Default::default()
        })
    }

    /// Validate that the configuration is complete and self-consistent.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ConfigInvalid`] if:
    /// - `client_id` or `client_secret` is blank,
    /// - no non-blank scope is given,
    /// - both or neither of `token_endpoint` and `issuer_url` are set, or
    /// - the endpoint is not an `http`/`https` URL.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::ConfigInvalid(
                "client_id must not be empty".into(),
            ));
        }
        if self.client_secret.is_blank() {
            return Err(AuthError::ConfigInvalid(
                "client_secret must not be empty".into(),
            ));
        }
        if self.scope_param().is_none() {
            return Err(AuthError::ConfigInvalid(
                "at least one scope is required".into(),
            ));
        }

        let endpoint = match (&self.token_endpoint, &self.issuer_url) {
            (Some(_), Some(_)) => {
                return Err(AuthError::ConfigInvalid(
                    "token_endpoint and issuer_url are mutually exclusive".into(),
                ));
            }
            (None, None) => {
                return Err(AuthError::ConfigInvalid(
                    "one of token_endpoint or issuer_url must be set".into(),
                ));
            }
            (Some(url), None) | (None, Some(url)) => url,
        };

        if !matches!(endpoint.scheme(), "https" | "http") {
            return Err(AuthError::ConfigInvalid(format!(
                "unsupported endpoint scheme '{}'",
                endpoint.scheme()
            )));
        }

        Ok(())
    }

    /// Space-separated, trimmed scopes; `None` when every entry is blank.
    pub(crate) fn scope_param(&self) -> Option<String> {
        let scopes: Vec<&str> = self
            .scopes
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        (!scopes.is_empty()).then(|| scopes.join(" "))
    }
}

impl Clone for OAuthClientConfig {
    fn clone(&self) -> Self {
        Self {
            token_endpoint: self.token_endpoint.clone(),
            issuer_url: self.issuer_url.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            scopes: self.scopes.clone(),
            auth_method: self.auth_method,
            extra_headers: self.extra_headers.clone(),
            refresh_margin: self.refresh_margin,
            default_ttl: self.default_ttl,
            http_config: self.http_config.clone(),
        }
    }
}

impl fmt::Debug for OAuthClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redacted_headers: Vec<_> = self
            .extra_headers
            .iter()
            .map(|(k, _)| (k.as_str(), "[REDACTED]"))
            .collect();
        f.debug_struct("OAuthClientConfig")
            .field("token_endpoint", &self.token_endpoint)
            .field("issuer_url", &self.issuer_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .field("auth_method", &self.auth_method)
            .field("extra_headers", &redacted_headers)
            .field("refresh_margin", &self.refresh_margin)
            .field("default_ttl", &self.default_ttl)
            .field("http_config", &self.http_config)
            .finish()
    }
}

impl Default for OAuthClientConfig {
    fn default() -> Self {
        Self {
            token_endpoint: None,
            issuer_url: None,
            client_id: String::new(),
            client_secret: SecretString::new(String::new()),
            scopes: Vec::new(),
            auth_method: ClientAuthMethod::default(),
            extra_headers: Vec::new(),
            refresh_margin: Duration::from_secs(60),
            default_ttl: Duration::from_secs(5 * 60),
            http_config: None,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn test_url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn valid_base() -> OAuthClientConfig {
        OAuthClientConfig {
            token_endpoint: Some(test_url("https://auth.example.com/token")),
            client_id: "my-client".into(),
            client_secret: SecretString::new("my-secret"),
            scopes: vec!["https://graph.example.com/.default".into()],
            ..Default::default()
        }
    }

    fn config_error(cfg: &OAuthClientConfig) -> String {
        match cfg.validate() {
            Err(AuthError::ConfigInvalid(msg)) => msg,
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn validate_ok_with_token_endpoint_only() {
        assert!(valid_base().validate().is_ok());
    }

    #[test]
    fn validate_ok_with_issuer_url_only() {
        let cfg = OAuthClientConfig {
            token_endpoint: None,
            issuer_url: Some(test_url("https://auth.example.com")),
            ..valid_base()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_err_when_both_set() {
        let cfg = OAuthClientConfig {
            issuer_url: Some(test_url("https://b.example.com")),
            ..valid_base()
        };
        assert!(config_error(&cfg).contains("mutually exclusive"));
    }

    #[test]
    fn validate_err_when_neither_set() {
        let cfg = OAuthClientConfig {
            token_endpoint: None,
            ..valid_base()
        };
        assert!(config_error(&cfg).contains("must be set"));
    }

    #[test]
    fn validate_err_when_client_id_whitespace() {
        let cfg = OAuthClientConfig {
            client_id: "   ".into(),
            ..valid_base()
        };
        assert!(config_error(&cfg).contains("client_id"));
    }

    #[test]
    fn validate_err_when_client_secret_empty() {
        let cfg = OAuthClientConfig {
            client_secret: SecretString::new(""),
            ..valid_base()
        };
        assert!(config_error(&cfg).contains("client_secret"));
    }

    #[test]
    fn validate_err_when_scopes_blank() {
        let cfg = OAuthClientConfig {
            scopes: vec![" ".into(), String::new()],
            ..valid_base()
        };
        assert!(config_error(&cfg).contains("scope"));
    }

    #[test]
    fn validate_err_on_non_http_scheme() {
        let cfg = OAuthClientConfig {
            token_endpoint: Some(test_url("ftp://auth.example.com/token")),
            ..valid_base()
        };
        assert!(config_error(&cfg).contains("ftp"));
    }

    #[test]
    fn scope_param_joins_trimmed() {
        let cfg = OAuthClientConfig {
            scopes: vec![" a ".into(), String::new(), "b".into()],
            ..valid_base()
        };
        assert_eq!(cfg.scope_param().as_deref(), Some("a b"));
    }

    #[test]
    fn azure_ad_builds_tenant_endpoint() {
        let cfg = OAuthClientConfig::azure_ad(
            "https://login.microsoftonline.com/",
            "contoso.onmicrosoft.com",
            "app-id",
            SecretString::new("s"),
            "https://graph.microsoft.com/.default",
        )
        .unwrap();

        assert_eq!(
            cfg.token_endpoint.as_ref().map(Url::as_str),
            Some("https://login.microsoftonline.com/contoso.onmicrosoft.com/oauth2/v2.0/token")
        );
        assert_eq!(cfg.scopes, vec!["https://graph.microsoft.com/.default"]);
        assert_eq!(cfg.auth_method, ClientAuthMethod::Form);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn azure_ad_rejects_blank_tenant() {
        let err = OAuthClientConfig::azure_ad(
            DEFAULT_AUTHORITY_HOST,
            " ",
            "app-id",
            SecretString::new("s"),
            "scope",
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::ConfigInvalid(_)));
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg = OAuthClientConfig {
            client_secret: SecretString::new("super-secret"),
            extra_headers: vec![("x-api-key".into(), "secret-api-key-value".into())],
            ..valid_base()
        };
        let dbg = format!("{cfg:?}");
        assert!(dbg.contains("[REDACTED]"));
        assert!(!dbg.contains("super-secret"));
        assert!(!dbg.contains("secret-api-key-value"));
        assert!(dbg.contains("my-client"));
        assert!(dbg.contains("x-api-key"));
    }

    #[test]
    fn default_durations() {
        let cfg = OAuthClientConfig::default();
        assert_eq!(cfg.refresh_margin, Duration::from_secs(60));
        assert_eq!(cfg.default_ttl, Duration::from_secs(5 * 60));
    }
}
