//! Outbound HTTP capability used by http-request tasks.

use std::future::Future;
use std::pin::Pin;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one request. Transport failures are `HttpRequestFailed` with no
/// status; non-2xx responses are returned, not treated as errors.
pub trait HttpClient: Send + Sync {
    fn send<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, EngineError>> + Send + 'a>>;
}
