//! Inbound request and buffered response.

use std::collections::BTreeMap;

use crate::error::EngineError;

/// User agent of requests synthesised by forward-to-endpoint responses.
pub const FORWARD_USER_AGENT: &str = "<forward-to-endpoint>";

/// A request as handed over by the transport layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// Request parameters; a name may carry several values.
    pub parameters: BTreeMap<String, Vec<String>>,
    /// `None` for requests without a body.
    pub content_type: Option<String>,
    pub body: Option<Vec<u8>>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl ExecutionRequest {
    /// Request with single-valued parameters and no body.
    pub fn with_parameters<I, K, V>(parameters: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            parameters: parameters
                .into_iter()
                .map(|(k, v)| (k.into(), vec![v.into()]))
                .collect(),
            ..Default::default()
        }
    }

    pub(crate) fn forwarded(parameters: BTreeMap<String, String>) -> Self {
        Self {
            parameters: parameters.into_iter().map(|(k, v)| (k, vec![v])).collect(),
            user_agent: Some(FORWARD_USER_AGENT.to_string()),
            ..Default::default()
        }
    }

    pub fn content_kind(&self) -> Result<ContentKind, EngineError> {
        ContentKind::parse(self.content_type.as_deref())
    }
}

/// How parameters are carried by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// No body, url-encoded form or multipart: parameters come from the request map.
    Form,
    /// A JSON document handed to the parameter transformation.
    Json,
}

impl ContentKind {
    pub fn parse(content_type: Option<&str>) -> Result<Self, EngineError> {
        let Some(content_type) = content_type else {
            return Ok(ContentKind::Form);
        };
        // Ignore parameters such as "; charset=utf-8" or "; boundary=..."
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match mime.as_str() {
            "" | "application/x-www-form-urlencoded" | "multipart/form-data" => Ok(ContentKind::Form),
            "application/json" => Ok(ContentKind::Json),
            _ => Err(EngineError::request_invalid(format!(
                "Unexpected content type '{content_type}': expected \
                 'application/x-www-form-urlencoded', 'multipart/form-data' or 'application/json'"
            ))),
        }
    }
}

/// A complete response, delivered to the caller exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferedResponse {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl BufferedResponse {
    pub fn status(status_code: u16) -> Self {
        Self {
            status_code,
            ..Default::default()
        }
    }

    pub fn redirect(location: impl Into<String>) -> Self {
        Self {
            status_code: 302,
            headers: vec![("Location".to_string(), location.into())],
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
