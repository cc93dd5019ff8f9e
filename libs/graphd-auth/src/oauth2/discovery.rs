use serde::Deserialize;
use url::Url;

use super::error::AuthError;
use crate::http_error::format_http_error;

/// The one field read from the OIDC discovery document.
#[derive(Deserialize)]
struct OidcDiscoveryDoc {
    token_endpoint: String,
}

/// Resolve the token endpoint from an OIDC issuer URL.
///
/// Fetches `{issuer_url}/.well-known/openid-configuration` and returns its
/// `token_endpoint`.
///
/// # Errors
///
/// Returns [`AuthError::Http`] if the request fails or returns a non-2xx
/// status, and [`AuthError::InvalidResponse`] if the body cannot be parsed
/// or `token_endpoint` is missing or not a URL.
pub(crate) async fn discover_token_endpoint(
    client: &graphd_http::HttpClient,
    issuer_url: &Url,
) -> Result<Url, AuthError> {
    let base = issuer_url.as_str().trim_end_matches('/');
    let discovery_url = format!("{base}/.well-known/openid-configuration");

    let doc: OidcDiscoveryDoc = client
        .get(&discovery_url)
        .send()
        .await
        .map_err(|e| AuthError::Http(format_http_error(&e, "OIDC discovery")))?
        .error_for_status()
        .map_err(|e| AuthError::Http(format_http_error(&e, "OIDC discovery")))?
        .json()
        .await
        .map_err(|e| AuthError::InvalidResponse(format_http_error(&e, "OIDC discovery")))?;

    let endpoint = Url::parse(&doc.token_endpoint).map_err(|e| {
        AuthError::InvalidResponse(format!(
            "invalid token_endpoint URL in discovery document: {e}"
        ))
    })?;

    tracing::debug!(token_endpoint = %endpoint, "resolved token endpoint via OIDC discovery");
    Ok(endpoint)
}
