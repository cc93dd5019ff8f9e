#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! HTTP client infrastructure for graphd
//!
//! A hyper-based HTTP client with:
//! - TLS via rustls (HTTPS only by default)
//! - Connection pooling
//! - Per-request timeouts
//! - User-Agent header injection
//! - Transparent response decompression (gzip, brotli, deflate)
//! - A slot for one auth layer (see `graphd-auth` for the bearer-token layer)
//!
//! Body size limits apply to the decompressed bytes.
//!
//! # Example
//!
//! ```ignore
//! use graphd_http::HttpClient;
//! use std::time::Duration;
//!
//! let client = HttpClient::builder()
//!     .timeout(Duration::from_secs(10))
//!     .user_agent("my-app/1.0")
//!     .build()?;
//!
//! let data: MyData = client
//!     .get("https://example.com/api")
//!     .send()
//!     .await?
//!     .json()
//!     .await?;
//! ```

mod builder;
mod client;
mod config;
mod error;
mod layers;
mod request;
mod response;
mod tls;

pub use builder::{HttpClientBuilder, InnerService};
pub use client::HttpClient;
pub use config::{DEFAULT_USER_AGENT, HttpClientConfig, TlsRootConfig, TransportSecurity};
pub use error::{HttpError, InvalidUriKind};
pub use layers::{UserAgentLayer, UserAgentService};
pub use request::RequestBuilder;
pub use response::{ERROR_BODY_PREVIEW_LIMIT, HttpResponse, ResponseBody};
