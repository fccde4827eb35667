//! Response production for the non-forwarding response kinds.

use std::collections::BTreeMap;

use crate::capability::DocumentGenerator;
use crate::error::EngineError;

use super::pattern::substitute;
use super::request::BufferedResponse;

pub fn status_for(success: bool) -> u16 {
    if success { 200 } else { 400 }
}

pub fn empty(success: bool) -> BufferedResponse {
    BufferedResponse::status(status_for(success))
}

/// An entry matches when the URL equals it or starts with it.
pub fn is_whitelisted(url: &str, whitelist: &[String]) -> bool {
    whitelist
        .iter()
        .any(|entry| url == entry || url.starts_with(entry.as_str()))
}

pub fn redirect(
    url_pattern: &str,
    whitelist: &[String],
    visible: &BTreeMap<String, String>,
) -> Result<BufferedResponse, EngineError> {
    let url = substitute(url_pattern, visible)?;
    if !is_whitelisted(&url, whitelist) {
        return Err(EngineError::request_invalid(format!(
            "Redirect URL '{url}' is not in whitelist"
        )));
    }
    Ok(BufferedResponse::redirect(url))
}

pub async fn rendered_document(
    generator: &dyn DocumentGenerator,
    template: &str,
    download_filename_pattern: Option<&str>,
    visible: &BTreeMap<String, String>,
    success: bool,
) -> Result<BufferedResponse, EngineError> {
    let filename = download_filename_pattern
        .map(|pattern| substitute(pattern, visible))
        .transpose()?;
    let document = generator.generate(template, visible).await?;

    let mut response = BufferedResponse {
        status_code: status_for(success),
        headers: vec![("Content-Type".to_string(), document.content_type)],
        body: document.body,
    };
    if let Some(filename) = filename {
        let filename = filename.replace('"', "");
        response = response.with_header(
            "Content-Disposition",
            format!("attachment; filename=\"{filename}\""),
        );
    }
    Ok(response)
}
