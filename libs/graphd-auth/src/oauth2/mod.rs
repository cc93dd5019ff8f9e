//! Outbound `OAuth2` client-credentials flow.
//!
//! [`TokenProvider`] acquires and caches app-only access tokens;
//! [`BearerAuthLayer`] (usually installed through
//! [`HttpClientBuilderExt::with_bearer_auth`]) attaches them to every request
//! of a `graphd-http` client.

pub mod builder_ext;
pub mod clock;
pub mod config;
pub(crate) mod discovery;
pub mod error;
pub mod layer;
pub mod provider;
pub(crate) mod source;
pub mod types;

pub use builder_ext::HttpClientBuilderExt;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{DEFAULT_AUTHORITY_HOST, OAuthClientConfig};
pub use error::{AuthError, AuthErrorKind};
pub use layer::{BearerAuthLayer, BearerAuthService, auth_error};
pub use provider::TokenProvider;
pub use types::ClientAuthMethod;
