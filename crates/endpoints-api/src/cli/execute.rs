//! Executing an endpoint from the command line, and computing request hashes.

use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;
use endpoints_core::auth::{RequestAuthenticator, hash_parameters};
use endpoints_core::engine::parameters::{request_parameters, validate_parameters};
use endpoints_core::engine::{BufferedResponse, ExecutionRequest};
use endpoints_infra::config::load_application;
use endpoints_infra::crypto::HmacRequestHasher;

use super::RequestArgs;
use crate::state::AppState;

fn build_request(args: &RequestArgs) -> Result<ExecutionRequest> {
    let mut request = ExecutionRequest {
        parameters: args.parameter_map(),
        user_agent: args.user_agent.clone(),
        ..Default::default()
    };
    if let Some(body) = &args.json_body {
        serde_json::from_str::<serde_json::Value>(body).context("--json-body is not valid JSON")?;
        request.content_type = Some("application/json".to_string());
        request.body = Some(body.clone().into_bytes());
    }
    Ok(request)
}

/// Run the endpoint once and print the buffered response.
pub async fn execute_endpoint(state: &AppState, args: RequestArgs, json: bool) -> Result<()> {
    let application = Arc::new(load_application(&args.application).await?);
    let request = build_request(&args)?;

    let result = state
        .engine
        .execute(
            args.environment,
            application,
            &args.endpoint,
            args.debug,
            args.hash.as_deref(),
            request,
        )
        .await;

    match result {
        Ok(response) => {
            print_response(&response, json)?;
            Ok(())
        }
        Err(failure) => {
            let response = BufferedResponse {
                status_code: failure.status_code(),
                headers: vec![("Content-Type".to_string(), "text/plain; charset=utf-8".to_string())],
                body: failure.external_message().as_bytes().to_vec(),
            };
            print_response(&response, json)?;
            Err(anyhow::Error::new(failure).context(format!("endpoint '{}' failed", args.endpoint)))
        }
    }
}

fn print_response(response: &BufferedResponse, json: bool) -> Result<()> {
    let body = String::from_utf8_lossy(&response.body);

    if json {
        let headers: serde_json::Map<String, serde_json::Value> = response
            .headers
            .iter()
            .map(|(name, value)| (name.clone(), serde_json::Value::String(value.clone())))
            .collect();
        let output = serde_json::json!({
            "status_code": response.status_code,
            "headers": headers,
            "body": body,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let status = response.status_code.to_string();
    let status = match response.status_code {
        200..=299 => style(status).green().bold(),
        300..=399 => style(status).cyan().bold(),
        400..=499 => style(status).yellow().bold(),
        _ => style(status).red().bold(),
    };
    println!("{} {status}", style("Status").dim());
    for (name, value) in &response.headers {
        println!("{} {value}", style(format!("{name}:")).dim());
    }
    if !body.is_empty() {
        println!();
        println!("{body}");
    }
    Ok(())
}

/// Print the hash a caller must send for the given form parameters.
///
/// Endpoints with a parameter transformation hash the transformed
/// parameters, which cannot be computed here.
pub async fn print_expected_hash(args: RequestArgs, json: bool) -> Result<()> {
    let application = load_application(&args.application).await?;
    let endpoint = application
        .find_endpoint(&args.endpoint)
        .with_context(|| format!("endpoint '{}' not found in application '{}'", args.endpoint, application.name))?;
    if endpoint.parameter_transformation.is_some() {
        anyhow::bail!(
            "endpoint '{}' transforms its parameters; the hash depends on the transformation output",
            endpoint.name
        );
    }

    let request = build_request(&args)?;
    let parameters = validate_parameters(endpoint, &request_parameters(endpoint, &request))?;
    let authenticator = RequestAuthenticator::new(Arc::new(HmacRequestHasher), true, false);
    let hash = authenticator
        .expected_hash(&application, args.environment, &endpoint.name, &hash_parameters(endpoint, &parameters))?
        .context("application has no secret key")?;

    if json {
        let output = serde_json::json!({
            "application": application.name,
            "environment": args.environment,
            "endpoint": endpoint.name,
            "hash": hash,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{hash}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::cli::{Cli, Commands};

    fn request_args(argv: &[&str]) -> RequestArgs {
        let mut full = vec!["endpoints", "execute", "shop.toml", "order"];
        full.extend_from_slice(argv);
        match Cli::try_parse_from(full).unwrap().command {
            Commands::Execute(args) => args,
            _ => panic!("expected execute"),
        }
    }

    #[test]
    fn test_build_form_request() {
        let request = build_request(&request_args(&["-p", "id=1", "--user-agent", "curl"])).unwrap();
        assert_eq!(request.parameters["id"], vec!["1".to_string()]);
        assert_eq!(request.user_agent.as_deref(), Some("curl"));
        assert!(request.content_type.is_none());
    }

    #[test]
    fn test_build_json_request() {
        let request = build_request(&request_args(&["--json-body", r#"{"a": 1}"#])).unwrap();
        assert_eq!(request.content_type.as_deref(), Some("application/json"));
        assert_eq!(request.body.as_deref(), Some(br#"{"a": 1}"#.as_slice()));

        assert!(build_request(&request_args(&["--json-body", "{oops"])).is_err());
    }

    #[tokio::test]
    async fn test_expected_hash_for_form_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shop.toml");
        tokio::fs::write(
            &path,
            r#"
name = "shop"
secret_keys = ["Jefe"]

[[endpoints.endpoints]]
name = "order"
success = { type = "empty" }
error = { type = "empty" }
[endpoints.endpoints.parameters.id]
"#,
        )
        .await
        .unwrap();

        let mut args = request_args(&["-p", "id=7"]);
        args.application = path.clone();
        print_expected_hash(args, true).await.unwrap();

        let mut missing = request_args(&[]);
        missing.application = path;
        assert!(print_expected_hash(missing, false).await.is_err());
    }
}
