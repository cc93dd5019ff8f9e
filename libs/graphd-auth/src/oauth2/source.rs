use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
use http::header::AUTHORIZATION;
use url::Url;
use zeroize::Zeroizing;

use super::config::OAuthClientConfig;
use super::error::AuthError;
use super::types::{ClientAuthMethod, TokenResponse};
use crate::SecretString;
use crate::http_error::format_http_error;

/// A token as returned by the endpoint, before it is stamped with a time.
#[derive(Debug)]
pub(crate) struct FetchedToken {
    pub access_token: SecretString,
    pub lifetime: Duration,
}

/// Performs client-credentials token requests over a `graphd-http` client.
///
/// Holds no token state; caching and refresh decisions belong to
/// [`TokenProvider`](super::TokenProvider).
pub(crate) struct OAuthTokenSource {
    client: graphd_http::HttpClient,
    client_id: String,
    client_secret: SecretString,
    /// Pre-joined, space-separated scopes.
    scope: String,
    auth_method: ClientAuthMethod,
    extra_headers: Vec<(String, String)>,
    default_ttl: Duration,
}

impl OAuthTokenSource {
    /// Build a source from an already validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::ConfigInvalid`] if the HTTP client cannot be
    /// built or the scope list is empty.
    pub fn new(config: &OAuthClientConfig) -> Result<Self, AuthError> {
        let scope = config
            .scope_param()
            .ok_or_else(|| AuthError::ConfigInvalid("at least one scope is required".into()))?;

        let http_config = config
            .http_config
            .clone()
            .unwrap_or_else(graphd_http::HttpClientConfig::token_endpoint);

        let client = graphd_http::HttpClientBuilder::with_config(http_config)
            .build()
            .map_err(|e| AuthError::ConfigInvalid(format_http_error(&e, "OAuth2 token client")))?;

        Ok(Self {
            client,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scope,
            auth_method: config.auth_method,
            extra_headers: config.extra_headers.clone(),
            default_ttl: config.default_ttl,
        })
    }

    /// Client used for token and discovery requests.
    pub fn http_client(&self) -> &graphd_http::HttpClient {
        &self.client
    }

    /// Exchange the client credentials for an access token.
    ///
    /// One request, no retry.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Http`] on transport failure or non-2xx status
    /// - [`AuthError::InvalidResponse`] on an unparseable body, a missing
    ///   or empty `access_token`, or `expires_in` of zero
    /// - [`AuthError::UnsupportedTokenType`] when `token_type` is not `Bearer`
    pub async fn request_token(&self, token_endpoint: &Url) -> Result<FetchedToken, AuthError> {
        // -- form fields ----------------------------------------------------------
        let mut fields: Vec<(&str, &str)> = vec![
            ("grant_type", "client_credentials"),
            ("scope", self.scope.as_str()),
        ];

        // Scrubbed on drop
        let secret_expose;
        if self.auth_method == ClientAuthMethod::Form {
            secret_expose = Zeroizing::new(self.client_secret.expose().to_owned());
            fields.push(("client_id", &self.client_id));
            fields.push(("client_secret", &secret_expose));
        }

        // -- request --------------------------------------------------------------
        let mut builder = self
            .client
            .post(token_endpoint.as_str())
            .header("accept", "application/json");

        if self.auth_method == ClientAuthMethod::Basic {
            let credentials = Zeroizing::new(format!(
                "{}:{}",
                self.client_id,
                self.client_secret.expose()
            ));
            let encoded = Zeroizing::new(general_purpose::STANDARD.encode(credentials.as_bytes()));
            let header_value = Zeroizing::new(format!("Basic {}", &*encoded));
            builder = builder.header(AUTHORIZATION.as_str(), &header_value);
        }

        for (name, value) in &self.extra_headers {
            builder = builder.header(name, value);
        }

        let response = builder
            .form(fields.as_slice())
            .map_err(|e| AuthError::Http(format_http_error(&e, "OAuth2 token")))?
            .send()
            .await
            .map_err(|e| AuthError::Http(format_http_error(&e, "OAuth2 token")))?
            .error_for_status()
            .map_err(|e| AuthError::Http(format_http_error(&e, "OAuth2 token")))?;

        let token_resp: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(format_http_error(&e, "OAuth2 token")))?;

        // -- validate -------------------------------------------------------------
        if let Some(ref tt) = token_resp.token_type
            && !tt.eq_ignore_ascii_case("bearer")
        {
            return Err(AuthError::UnsupportedTokenType(tt.clone()));
        }

        let access_token = match token_resp.access_token {
            Some(token) if !token.trim().is_empty() => SecretString::from(token),
            Some(_) => {
                return Err(AuthError::InvalidResponse("empty access_token".into()));
            }
            None => {
                return Err(AuthError::InvalidResponse("missing access_token".into()));
            }
        };

        let lifetime = match token_resp.expires_in {
            Some(0) => {
                return Err(AuthError::InvalidResponse(
                    "expires_in is zero, token already expired".into(),
                ));
            }
            Some(secs) => Duration::from_secs(secs),
            None => self.default_ttl,
        };

        Ok(FetchedToken {
            access_token,
            lifetime,
        })
    }
}
