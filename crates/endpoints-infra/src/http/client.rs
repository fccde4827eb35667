//! reqwest implementation of the `HttpClient` capability.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use endpoints_core::capability::{HttpClient, HttpRequest, HttpResponse};
use endpoints_core::error::EngineError;
use reqwest::Method;

/// Default per-request timeout for http-request tasks.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, EngineError> {
        let transport_error = |message: String| EngineError::HttpRequestFailed {
            url: request.url.clone(),
            status: None,
            message,
        };

        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| transport_error(format!("invalid HTTP method '{}'", request.method)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| transport_error(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| EngineError::HttpRequestFailed {
            url: request.url.clone(),
            status: Some(status),
            message: format!("failed to read response body: {e}"),
        })?;

        tracing::debug!(url = %request.url, status, "HTTP request completed");
        Ok(HttpResponse { status, body })
    }
}

impl HttpClient for ReqwestHttpClient {
    fn send<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, EngineError>> + Send + 'a>> {
        Box::pin(self.execute(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> ReqwestHttpClient {
        ReqwestHttpClient::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_post_with_headers_and_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(header("X-Order", "7"))
            .and(body_string(r#"{"id":"7"}"#))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"ok": true})))
            .mount(&mock_server)
            .await;

        let response = client()
            .send(HttpRequest {
                method: "POST".into(),
                url: format!("{}/orders", mock_server.uri()),
                headers: vec![("X-Order".into(), "7".into())],
                body: Some(r#"{"id":"7"}"#.into()),
            })
            .await
            .unwrap();

        assert_eq!(response.status, 201);
        assert!(response.is_success());
        assert_eq!(response.body, r#"{"ok":true}"#);
    }

    #[tokio::test]
    async fn test_error_status_is_returned_not_raised() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
            .mount(&mock_server)
            .await;

        let response = client()
            .send(HttpRequest {
                method: "GET".into(),
                url: format!("{}/missing", mock_server.uri()),
                headers: Vec::new(),
                body: None,
            })
            .await
            .unwrap();

        assert_eq!(response.status, 404);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_transport_failure_has_no_status() {
        let err = client()
            .send(HttpRequest {
                method: "GET".into(),
                url: "http://127.0.0.1:1/unreachable".into(),
                headers: Vec::new(),
                body: None,
            })
            .await
            .unwrap_err();

        match err {
            EngineError::HttpRequestFailed { url, status, .. } => {
                assert_eq!(url, "http://127.0.0.1:1/unreachable");
                assert_eq!(status, None);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
