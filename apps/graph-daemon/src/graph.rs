//! Minimal Graph API client.
//!
//! Typed access to the `users` collection plus raw GETs, both over an
//! [`HttpClient`] that already carries bearer authentication.

use graphd_auth::{AuthError, auth_error};
use graphd_http::{HttpClient, HttpError, HttpResponse};
use http::StatusCode;
use serde::Deserialize;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// No token could be obtained; the request was not sent.
    #[error("authentication failed: {0}")]
    Unauthenticated(AuthError),

    #[error("Graph API returned {status}: {code}: {message}")]
    Api {
        status: StatusCode,
        code: String,
        message: String,
    },

    #[error("invalid Graph URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Http(HttpError),
}

impl From<HttpError> for GraphError {
    fn from(err: HttpError) -> Self {
        match auth_error(&err) {
            Some(auth) => Self::Unauthenticated(auth.clone()),
            None => Self::Http(err),
        }
    }
}

/// Directory user, as returned with the default or `displayName` projection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub user_principal_name: Option<String>,
}

#[derive(Deserialize)]
struct Collection<T> {
    value: Vec<T>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Clone, Debug)]
pub struct GraphClient {
    http: HttpClient,
    base_url: String,
}

impl GraphClient {
    /// `base_url` is the versioned service root, e.g. `https://graph.microsoft.com/v1.0`.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::InvalidUrl` if `base_url` is not an absolute URL.
    pub fn new(http: HttpClient, base_url: &str) -> Result<Self, GraphError> {
        let parsed = Url::parse(base_url).map_err(|e| GraphError::InvalidUrl {
            url: base_url.to_owned(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            http,
            base_url: parsed.as_str().trim_end_matches('/').to_owned(),
        })
    }

    #[must_use]
    pub fn users(&self) -> UsersRequest<'_> {
        UsersRequest {
            client: self,
            top: None,
            order_by: None,
            select: Vec::new(),
        }
    }

    /// GET `path_or_url` and return the body as text.
    ///
    /// Relative paths are resolved against the service root; absolute URLs
    /// are used as given.
    ///
    /// # Errors
    ///
    /// Fails on credential, transport and non-2xx outcomes.
    pub async fn get_raw(&self, path_or_url: &str) -> Result<String, GraphError> {
        let url = self.resolve(path_or_url)?;
        let resp = self.http.get(url.as_str()).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.text().await?)
    }

    fn resolve(&self, path_or_url: &str) -> Result<Url, GraphError> {
        let raw = if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            path_or_url.to_owned()
        } else {
            format!("{}/{}", self.base_url, path_or_url.trim_start_matches('/'))
        };
        Url::parse(&raw).map_err(|e| GraphError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })
    }
}

/// Query over the `users` collection.
#[must_use]
pub struct UsersRequest<'a> {
    client: &'a GraphClient,
    top: Option<u32>,
    order_by: Option<String>,
    select: Vec<String>,
}

impl UsersRequest<'_> {
    pub fn top(mut self, n: u32) -> Self {
        self.top = Some(n);
        self
    }

    /// e.g. `displayName desc`
    pub fn order_by(mut self, expr: impl Into<String>) -> Self {
        self.order_by = Some(expr.into());
        self
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Relative request path with `OData` query options.
    fn path(&self) -> String {
        let mut options = Vec::new();
        if let Some(top) = self.top {
            options.push(format!("$top={top}"));
        }
        if let Some(ref order_by) = self.order_by {
            options.push(format!("$orderby={}", encode_query_value(order_by)));
        }
        if !self.select.is_empty() {
            options.push(format!(
                "$select={}",
                encode_query_value(&self.select.join(","))
            ));
        }

        if options.is_empty() {
            "users".to_owned()
        } else {
            format!("users?{}", options.join("&"))
        }
    }

    /// Send the query and return the first page of users.
    ///
    /// # Errors
    ///
    /// Fails on credential, transport and non-2xx outcomes, or if the
    /// response is not a user collection.
    pub async fn get(self) -> Result<Vec<User>, GraphError> {
        let url = self.client.resolve(&self.path())?;
        tracing::debug!(url = %url, "listing users");

        let resp = self.client.http.get(url.as_str()).send().await?;
        let resp = check_status(resp).await?;
        let page: Collection<User> = resp.json().await?;
        Ok(page.value)
    }
}

/// Escape characters that would end an `OData` query value.
///
/// Spaces and other non-ASCII characters are percent-encoded by URL parsing.
fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '#' => out.push_str("%23"),
            '+' => out.push_str("%2B"),
            _ => out.push(c),
        }
    }
    out
}

async fn check_status(resp: HttpResponse) -> Result<HttpResponse, GraphError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.bytes().await?;
    let (code, message) = match serde_json::from_slice::<ErrorEnvelope>(&body) {
        Ok(envelope) => (envelope.error.code, envelope.error.message),
        Err(_) => (
            status.canonical_reason().unwrap_or("error").to_owned(),
            String::new(),
        ),
    };

    Err(GraphError::Api {
        status,
        code,
        message,
    })
}
