/// Format a [`graphd_http::HttpError`] into a message with a context prefix.
///
/// `HttpStatus` errors keep only the status code. The response body is
/// dropped so identity-provider diagnostics never reach logs or callers.
#[must_use]
pub fn format_http_error(e: &graphd_http::HttpError, prefix: &str) -> String {
    use graphd_http::HttpError;

    match e {
        HttpError::HttpStatus { status, .. } => format!("{prefix} HTTP {status}"),
        HttpError::Json(err) => format!("{prefix} JSON parse failed: {err}"),
        HttpError::Timeout(duration) => {
            format!("{prefix} request timed out after {duration:?}")
        }
        HttpError::Transport(err) => format!("{prefix} transport error: {err}"),
        HttpError::BodyTooLarge { limit, actual } => {
            format!("{prefix} response too large: limit {limit} bytes, got {actual} bytes")
        }
        HttpError::Tls(err) => format!("{prefix} TLS error: {err}"),
        HttpError::RequestBuild(err) => format!("{prefix} request build failed: {err}"),
        HttpError::InvalidHeaderName(err) => format!("{prefix} invalid header name: {err}"),
        HttpError::InvalidHeaderValue(_) => format!("{prefix} invalid header value"),
        HttpError::FormEncode(err) => format!("{prefix} form encode error: {err}"),
        HttpError::Overloaded => format!("{prefix} request rejected: service overloaded"),
        HttpError::ServiceClosed => format!("{prefix} service unavailable"),
        HttpError::InvalidUri { url, reason, .. } => {
            format!("{prefix} invalid URL '{url}': {reason}")
        }
        HttpError::InvalidScheme { scheme, reason } => {
            format!("{prefix} invalid scheme '{scheme}': {reason}")
        }
        // Unknown variants: omit detail, their Display may carry anything
        _ => format!("{prefix} request failed"),
    }
}
