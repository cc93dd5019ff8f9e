use crate::builder::HttpClientBuilder;
use crate::config::TransportSecurity;
use crate::error::HttpError;
use crate::request::RequestBuilder;
use crate::response::ResponseBody;
use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use std::future::Future;
use std::pin::Pin;
use tower::Service;
use tower::buffer::Buffer;

/// Future returned by the inner (unbuffered) service stack
pub type ServiceFuture =
    Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, HttpError>> + Send>>;

/// The buffered service every [`HttpClient`] clone shares
pub type BufferedService = Buffer<Request<Full<Bytes>>, ServiceFuture>;

/// HTTP client over a tower middleware stack
///
/// The stack applies, outermost first: the optional auth layer, request
/// timeout, `User-Agent` injection and response decompression, on top of a
/// pooled hyper client with rustls.
///
/// `HttpClient` is `Clone + Send + Sync`. Clones share one `tower::buffer`
/// worker and one connection pool, so store it directly; no `Mutex` needed.
///
/// # Example
///
/// ```ignore
/// let client = HttpClient::builder().build()?;
/// let users: Page = client.get("https://graph.example.com/v1.0/users").send().await?.json().await?;
/// ```
#[derive(Clone)]
pub struct HttpClient {
    pub(crate) service: BufferedService,
    pub(crate) max_body_size: usize,
    pub(crate) transport_security: TransportSecurity,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("max_body_size", &self.max_body_size)
            .field("transport_security", &self.transport_security)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Create a client with the default configuration
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails
    pub fn new() -> Result<Self, HttpError> {
        HttpClientBuilder::new().build()
    }

    /// Create a builder for configuring the client
    #[must_use]
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Start a GET request
    pub fn get(&self, url: &str) -> RequestBuilder {
        self.request(http::Method::GET, url)
    }

    /// Start a POST request
    pub fn post(&self, url: &str) -> RequestBuilder {
        self.request(http::Method::POST, url)
    }

    fn request(&self, method: http::Method, url: &str) -> RequestBuilder {
        RequestBuilder::new(
            self.service.clone(),
            self.max_body_size,
            method,
            url.to_owned(),
            self.transport_security,
        )
    }

    /// Send a prebuilt `http::Request` through the stack.
    ///
    /// Skips URL scheme validation; the request is sent as given.
    ///
    /// # Errors
    /// Same as [`RequestBuilder::send`](crate::RequestBuilder::send), minus
    /// the URL checks.
    pub async fn execute(
        &self,
        request: Request<Full<Bytes>>,
    ) -> Result<crate::HttpResponse, HttpError> {
        let mut service = self.service.clone();
        try_acquire_buffer_slot(&mut service).await?;
        let inner = service.call(request).await.map_err(map_buffer_error)?;
        Ok(crate::HttpResponse {
            inner,
            max_body_size: self.max_body_size,
        })
    }
}

/// Map an error coming out of the buffer back to `HttpError`.
///
/// Inner-service errors come through boxed and are unboxed as-is; anything
/// else means the buffer worker is gone.
pub fn map_buffer_error(err: tower::BoxError) -> HttpError {
    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(err) => {
            tracing::error!(
                error = %err,
                "buffer worker closed unexpectedly; service unavailable"
            );
            HttpError::ServiceClosed
        }
    }
}

/// Reserve a buffer slot without waiting.
///
/// Returns `HttpError::Overloaded` when the buffer is full.
pub async fn try_acquire_buffer_slot(service: &mut BufferedService) -> Result<(), HttpError> {
    use std::task::Poll;

    let poll_result = std::future::poll_fn(|cx| match service.poll_ready(cx) {
        Poll::Ready(result) => Poll::Ready(Some(result)),
        Poll::Pending => Poll::Ready(None),
    })
    .await;

    match poll_result {
        Some(Ok(())) => Ok(()),
        Some(Err(e)) => Err(map_buffer_error(e)),
        None => Err(HttpError::Overloaded),
    }
}
