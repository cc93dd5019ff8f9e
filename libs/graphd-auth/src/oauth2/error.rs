use thiserror::Error;

/// Coarse classification of an [`AuthError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// Credentials are incomplete or inconsistent; no request was made.
    ConfigInvalid,
    /// The token request failed (transport, non-2xx, malformed response).
    TokenRequestFailed,
}

/// Errors returned by the `OAuth2` client-credentials flow.
///
/// Every variant carries a pre-rendered message built without secret values
/// (`client_secret`, access tokens, token endpoint response bodies).
/// `Clone` lets one failed fetch be reported to every caller waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthError {
    /// Configuration is invalid (missing credentials, no scope, both or
    /// neither of `token_endpoint` / `issuer_url`).
    #[error("OAuth2 config error: {0}")]
    ConfigInvalid(String),

    /// HTTP transport or status error during token acquisition.
    ///
    /// The message comes from [`format_http_error`](crate::http_error::format_http_error).
    #[error("{0}")]
    Http(String),

    /// The token endpoint returned an unparseable or incomplete response.
    #[error("invalid token response: {0}")]
    InvalidResponse(String),

    /// The token endpoint returned a `token_type` other than `Bearer`.
    #[error("unsupported token type: {0}")]
    UnsupportedTokenType(String),
}

impl AuthError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            Self::ConfigInvalid(_) => AuthErrorKind::ConfigInvalid,
            Self::Http(_) | Self::InvalidResponse(_) | Self::UnsupportedTokenType(_) => {
                AuthErrorKind::TokenRequestFailed
            }
        }
    }
}
