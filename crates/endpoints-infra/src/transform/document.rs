//! Plain-template document generation for rendered-document responses.
//!
//! Templates use the same `${name}` placeholders as every other pattern. The
//! content type follows from the template's first character: `<` renders
//! HTML (values escaped), `{` or `[` JSON, anything else plain text.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use endpoints_core::capability::{DocumentGenerator, GeneratedDocument};
use endpoints_core::engine::pattern::substitute;
use endpoints_core::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TemplateKind {
    Html,
    Json,
    Text,
}

impl TemplateKind {
    fn detect(template: &str) -> Self {
        match template.trim_start().chars().next() {
            Some('<') => TemplateKind::Html,
            Some('{') | Some('[') => TemplateKind::Json,
            _ => TemplateKind::Text,
        }
    }

    fn content_type(self) -> &'static str {
        match self {
            TemplateKind::Html => "text/html; charset=utf-8",
            TemplateKind::Json => "application/json",
            TemplateKind::Text => "text/plain; charset=utf-8",
        }
    }
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn escape_json(value: &str) -> String {
    let quoted = serde_json::Value::String(value.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateDocumentGenerator;

impl TemplateDocumentGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn render(
        &self,
        template: &str,
        values: &BTreeMap<String, String>,
    ) -> Result<GeneratedDocument, EngineError> {
        let kind = TemplateKind::detect(template);
        let body = match kind {
            TemplateKind::Html => substitute(template, &escaped(values, escape_html))?,
            TemplateKind::Json => substitute(template, &escaped(values, escape_json))?,
            TemplateKind::Text => substitute(template, values)?,
        };
        Ok(GeneratedDocument {
            content_type: kind.content_type().to_string(),
            body: body.into_bytes(),
        })
    }
}

fn escaped(values: &BTreeMap<String, String>, escape: fn(&str) -> String) -> BTreeMap<String, String> {
    values
        .iter()
        .map(|(name, value)| (name.clone(), escape(value)))
        .collect()
}

impl DocumentGenerator for TemplateDocumentGenerator {
    fn generate<'a>(
        &'a self,
        template: &'a str,
        parameters: &'a BTreeMap<String, String>,
    ) -> Pin<Box<dyn Future<Output = Result<GeneratedDocument, EngineError>> + Send + 'a>> {
        Box::pin(async move { self.render(template, parameters) })
    }
}
