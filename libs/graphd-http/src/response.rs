use crate::error::HttpError;
use bytes::Bytes;
use http::{Response, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;

/// Maximum body preview kept in [`HttpError::HttpStatus`] (8KB).
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;

/// Type-erased response body (raw or decompressed).
pub type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// HTTP response wrapper with body-reading helpers
///
/// `send()` returns this for every status. Non-2xx statuses only become
/// errors through [`error_for_status`](Self::error_for_status) or the
/// checked readers (`json`, `text`). All body reads enforce
/// the configured `max_body_size`.
#[derive(Debug)]
pub struct HttpResponse {
    pub(crate) inner: Response<ResponseBody>,
    pub(crate) max_body_size: usize,
}

impl HttpResponse {
    /// Get the response status code
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    /// Return an error for non-2xx responses without reading the body.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::HttpStatus` (with an empty body preview) if the
    /// status is not 2xx.
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        if self.inner.status().is_success() {
            return Ok(self);
        }

        Err(HttpError::HttpStatus {
            status: self.inner.status(),
            body_preview: String::new(),
        })
    }

    /// Read the body as bytes without a status check.
    ///
    /// # Errors
    /// Returns `HttpError::BodyTooLarge` if the body exceeds the limit.
    pub async fn bytes(self) -> Result<Bytes, HttpError> {
        read_body_limited(self.inner, self.max_body_size).await
    }

    /// Parse the body as JSON, failing on non-2xx statuses.
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus` if the status is not 2xx,
    /// `HttpError::BodyTooLarge` if the body exceeds the limit,
    /// `HttpError::Json` if parsing fails.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, HttpError> {
        let body = checked_body(self.inner, self.max_body_size).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Read the body as UTF-8 text (lossy), failing on non-2xx statuses.
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus` if the status is not 2xx,
    /// `HttpError::BodyTooLarge` if the body exceeds the limit.
    pub async fn text(self) -> Result<String, HttpError> {
        let body = checked_body(self.inner, self.max_body_size).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

async fn checked_body(
    response: Response<ResponseBody>,
    max_body_size: usize,
) -> Result<Bytes, HttpError> {
    let status = response.status();
    if status.is_success() {
        return read_body_limited(response, max_body_size).await;
    }

    // An oversized error body must not hide the status
    let preview_limit = max_body_size.min(ERROR_BODY_PREVIEW_LIMIT);
    let body_preview = match read_body_limited(response, preview_limit).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(HttpError::BodyTooLarge { .. }) => "<body too large for preview>".to_owned(),
        Err(e) => return Err(e),
    };

    Err(HttpError::HttpStatus {
        status,
        body_preview,
    })
}

/// Collect the (decompressed) body, failing once `limit` bytes are exceeded.
async fn read_body_limited(
    response: Response<ResponseBody>,
    limit: usize,
) -> Result<Bytes, HttpError> {
    let mut body = std::pin::pin!(response.into_body());
    let mut collected = Vec::new();

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            let actual = collected.len() + chunk.len();
            if actual > limit {
                return Err(HttpError::BodyTooLarge { limit, actual });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}
