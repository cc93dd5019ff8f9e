use crate::client::{BufferedService, map_buffer_error, try_acquire_buffer_slot};
use crate::config::TransportSecurity;
use crate::error::{HttpError, InvalidUriKind};
use crate::response::{HttpResponse, ResponseBody};
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{Request, Response};
use http_body_util::Full;
use tower::Service;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// HTTP request builder with fluent API
///
/// Created by [`HttpClient::get`](crate::HttpClient::get) and
/// [`HttpClient::post`](crate::HttpClient::post). Header errors are
/// deferred and reported by [`send()`](RequestBuilder::send).
///
/// Query strings are not composed here; build the URL with `url::Url` and
/// pass the final string.
///
/// # Example
///
/// ```ignore
/// let resp = client
///     .post("https://login.example.com/tenant/oauth2/v2.0/token")
///     .form(&[("grant_type", "client_credentials")])?
///     .send()
///     .await?;
/// ```
#[must_use = "RequestBuilder does nothing until .send() is called"]
pub struct RequestBuilder {
    service: BufferedService,
    max_body_size: usize,
    method: http::Method,
    url: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    /// Form-encoded body, if any
    form: Option<Bytes>,
    /// Error captured during building (deferred to `send()`)
    error: Option<HttpError>,
    transport_security: TransportSecurity,
}

impl RequestBuilder {
    pub(crate) fn new(
        service: BufferedService,
        max_body_size: usize,
        method: http::Method,
        url: String,
        transport_security: TransportSecurity,
    ) -> Self {
        Self {
            service,
            max_body_size,
            method,
            url,
            headers: Vec::new(),
            form: None,
            error: None,
            transport_security,
        }
    }

    /// Add a single header to the request
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }

        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => self.headers.push((name, value)),
            (Err(e), _) => self.error = Some(HttpError::InvalidHeaderName(e)),
            (_, Err(e)) => self.error = Some(HttpError::InvalidHeaderValue(e)),
        }
        self
    }

    /// Set a form URL-encoded body
    /// (`Content-Type: application/x-www-form-urlencoded` unless already set)
    ///
    /// # Errors
    ///
    /// Returns a deferred header error, or `HttpError::FormEncode` if encoding fails.
    pub fn form(mut self, fields: &[(&str, &str)]) -> Result<Self, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }

        self.form = Some(Bytes::from(serde_urlencoded::to_string(fields)?));
        Ok(self)
    }

    /// Parse the URL and check its scheme against the transport security mode.
    fn validate_url(&self) -> Result<http::Uri, HttpError> {
        let uri: http::Uri =
            self.url
                .parse()
                .map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
                    url: self.url.clone(),
                    kind: InvalidUriKind::ParseError,
                    reason: e.to_string(),
                })?;

        if uri.authority().is_none() {
            return Err(HttpError::InvalidUri {
                url: self.url.clone(),
                kind: InvalidUriKind::MissingAuthority,
                reason: "missing host/authority".to_owned(),
            });
        }

        match uri.scheme_str() {
            Some("https") => Ok(uri),
            Some("http") if self.transport_security == TransportSecurity::AllowInsecureHttp => {
                Ok(uri)
            }
            Some("http") => Err(HttpError::InvalidScheme {
                scheme: "http".to_owned(),
                reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
            }),
            Some(scheme) => Err(HttpError::InvalidScheme {
                scheme: scheme.to_owned(),
                reason: "only http:// and https:// schemes are supported".to_owned(),
            }),
            None => Err(HttpError::InvalidUri {
                url: self.url.clone(),
                kind: InvalidUriKind::MissingScheme,
                reason: "missing scheme".to_owned(),
            }),
        }
    }

    /// Send the request through the client's service stack.
    ///
    /// Resolves to `Ok` for every HTTP status; use
    /// [`HttpResponse::error_for_status`] to turn non-2xx into an error.
    ///
    /// # Errors
    ///
    /// Returns `HttpError` if a header or the URL is invalid, the scheme is
    /// not allowed, credentials could not be attached (`Unauthenticated`),
    /// the request buffer is full (`Overloaded`), or the transport fails or
    /// times out.
    pub async fn send(mut self) -> Result<HttpResponse, HttpError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }

        let uri = self.validate_url()?;
        let mut builder = Request::builder().method(self.method).uri(uri);

        let has_content_type = self.headers.iter().any(|(name, _)| name == CONTENT_TYPE);
        if !has_content_type && self.form.is_some() {
            builder = builder.header(CONTENT_TYPE, FORM_CONTENT_TYPE);
        }

        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }

        let request = builder.body(Full::new(self.form.unwrap_or_default()))?;

        try_acquire_buffer_slot(&mut self.service).await?;

        let inner: Response<ResponseBody> =
            self.service.call(request).await.map_err(map_buffer_error)?;

        Ok(HttpResponse {
            inner,
            max_body_size: self.max_body_size,
        })
    }
}
