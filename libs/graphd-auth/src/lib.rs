#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! App-only authentication for graphd.
//!
//! Exchanges client credentials for access tokens (`OAuth2`
//! client-credentials grant), caches them until shortly before expiry and
//! injects them into outbound requests made with `graphd-http`.
//!
//! # Example
//!
//! ```ignore
//! use graphd_auth::{HttpClientBuilderExt, OAuthClientConfig, SecretString, TokenProvider};
//!
//! let config = OAuthClientConfig::azure_ad(
//!     graphd_auth::DEFAULT_AUTHORITY_HOST,
//!     "contoso.onmicrosoft.com",
//!     "app-id",
//!     SecretString::new(secret),
//!     "https://graph.microsoft.com/.default",
//! )?;
//! let provider = TokenProvider::new(config)?;
//!
//! let client = graphd_http::HttpClientBuilder::new()
//!     .with_bearer_auth(provider)
//!     .build()?;
//! ```

pub mod http_error;
pub mod oauth2;
mod secret;

pub use oauth2::{
    AuthError, AuthErrorKind, BearerAuthLayer, BearerAuthService, ClientAuthMethod, Clock,
    DEFAULT_AUTHORITY_HOST, HttpClientBuilderExt, ManualClock, OAuthClientConfig, SystemClock,
    TokenProvider, auth_error,
};
pub use secret::SecretString;
