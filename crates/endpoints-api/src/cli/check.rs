//! Validating an application definition.

use std::path::Path;

use anyhow::{Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use endpoints_core::execution::scheduler::check_graph;
use endpoints_infra::config::load_application;
use endpoints_types::application::Application;
use endpoints_types::endpoint::{Endpoint, ResponseKind};

/// Load and validate the definition, then list its endpoints.
pub async fn check_application(path: &Path, json: bool) -> Result<()> {
    let application = match load_application(path).await {
        Ok(application) => application,
        Err(err) => {
            if json {
                let check = serde_json::json!({
                    "path": path.display().to_string(),
                    "valid": false,
                    "error": err.to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&check)?);
            } else {
                println!();
                println!("  {} {}", style("✗").red(), style(path.display()).bold());
                println!("    {err}");
                println!();
            }
            return Err(err.into());
        }
    };

    let graph_errors = graph_errors(&application);
    if !graph_errors.is_empty() {
        if json {
            let errors: Vec<_> = graph_errors
                .iter()
                .map(|(endpoint, error)| serde_json::json!({ "endpoint": endpoint, "error": error }))
                .collect();
            let check = serde_json::json!({
                "path": path.display().to_string(),
                "valid": false,
                "application": application.name,
                "errors": errors,
            });
            println!("{}", serde_json::to_string_pretty(&check)?);
        } else {
            println!();
            println!("  {} {}", style("✗").red(), style(&application.name).bold());
            for (endpoint, error) in &graph_errors {
                println!("    {}: {error}", style(endpoint).cyan());
            }
            println!();
        }
        bail!("{} endpoint(s) of '{}' cannot be scheduled", graph_errors.len(), application.name);
    }

    if json {
        let endpoints: Vec<_> = application
            .endpoints
            .iter()
            .map(|endpoint| {
                serde_json::json!({
                    "name": endpoint.name,
                    "parameters": endpoint.parameters.keys().collect::<Vec<_>>(),
                    "tasks": endpoint.tasks.len(),
                    "success": response_label(&endpoint.success.kind),
                    "error": response_label(&endpoint.error.kind),
                    "transformation": endpoint.parameter_transformation.is_some(),
                })
            })
            .collect();
        let check = serde_json::json!({
            "path": path.display().to_string(),
            "valid": true,
            "application": application.name,
            "timezone": application.timezone.name(),
            "secret_keys": application.secret_keys.len(),
            "endpoints": endpoints,
        });
        println!("{}", serde_json::to_string_pretty(&check)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} ({} endpoint(s), timezone {}, {} secret key(s))",
        style("✓").green(),
        style(&application.name).cyan().bold(),
        application.endpoints.len(),
        application.timezone,
        application.secret_keys.len()
    );

    if !application.endpoints.is_empty() {
        let mut table = Table::new();
        table.load_preset(presets::UTF8_FULL_CONDENSED);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Endpoint").fg(Color::White),
            Cell::new("Parameters").fg(Color::White),
            Cell::new("Tasks").fg(Color::White),
            Cell::new("Success").fg(Color::White),
            Cell::new("Error").fg(Color::White),
        ]);
        for endpoint in &application.endpoints {
            table.add_row(vec![
                Cell::new(endpoint_label(endpoint)).fg(Color::Cyan),
                Cell::new(parameter_list(endpoint)),
                Cell::new(endpoint.tasks.len()),
                Cell::new(response_label(&endpoint.success.kind)),
                Cell::new(response_label(&endpoint.error.kind)),
            ]);
        }
        println!();
        println!("{table}");
    }
    println!();
    Ok(())
}

/// Task graph defects (cycles, missing or duplicate producers) per endpoint.
fn graph_errors(application: &Application) -> Vec<(String, String)> {
    application
        .endpoints
        .iter()
        .filter_map(|endpoint| {
            check_graph(&endpoint.tasks, "success-response", &endpoint.success.input_intermediate_values)
                .err()
                .map(|error| (endpoint.name.clone(), error.to_string()))
        })
        .collect()
}

fn endpoint_label(endpoint: &Endpoint) -> String {
    if endpoint.parameter_transformation.is_some() {
        format!("{} (transformed)", endpoint.name)
    } else {
        endpoint.name.clone()
    }
}

/// Declared parameters, defaults shown as `name=value`.
fn parameter_list(endpoint: &Endpoint) -> String {
    if endpoint.parameters.is_empty() {
        return "-".to_string();
    }
    endpoint
        .parameters
        .iter()
        .map(|(name, definition)| match &definition.default_value {
            Some(default) => format!("{name}={default}"),
            None => name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn response_label(kind: &ResponseKind) -> String {
    match kind {
        ResponseKind::Empty => "empty".to_string(),
        ResponseKind::Redirect { .. } => "redirect".to_string(),
        ResponseKind::RenderedDocument { .. } => "document".to_string(),
        ResponseKind::ForwardToEndpoint { endpoint, .. } => format!("forward -> {endpoint}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFINITION: &str = r#"
name = "shop"
secret_keys = ["k1"]

[[endpoints.endpoints]]
name = "order"
success = { type = "forward-to-endpoint", endpoint = "thanks" }
error = { type = "empty" }
[endpoints.endpoints.parameters.id]
[endpoints.endpoints.parameters.lang]
default = "en"

[[endpoints.endpoints]]
name = "thanks"
success = { type = "redirect", url_pattern = "https://shop.example.com/", whitelist = ["https://shop.example.com/"] }
error = { type = "empty" }
"#;

    #[test]
    fn test_labels() {
        let application = endpoints_infra::config::parse_application(DEFINITION).unwrap();
        let order = application.find_endpoint("order").unwrap();
        assert_eq!(parameter_list(order), "id, lang=en");
        assert_eq!(response_label(&order.success.kind), "forward -> thanks");
        assert_eq!(endpoint_label(order), "order");
        let thanks = application.find_endpoint("thanks").unwrap();
        assert_eq!(parameter_list(thanks), "-");
        assert_eq!(response_label(&thanks.success.kind), "redirect");
    }

    #[tokio::test]
    async fn test_check_reports_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let valid = dir.path().join("shop.toml");
        tokio::fs::write(&valid, DEFINITION).await.unwrap();
        check_application(&valid, true).await.unwrap();

        let invalid = dir.path().join("broken.toml");
        tokio::fs::write(&invalid, "name = \"broken\"\nsecret_keys = []\n").await.unwrap();
        assert!(check_application(&invalid, true).await.is_err());
    }

    const CYCLIC: &str = r#"
name = "loops"
secret_keys = ["k1"]

[[endpoints.endpoints]]
name = "ok"
success = { type = "empty" }
error = { type = "empty" }

[[endpoints.endpoints]]
name = "cyclic"
success = { type = "rendered-document", template = "${a}", input_intermediate_values = ["a"] }
error = { type = "empty" }
[[endpoints.endpoints.tasks]]
name = "make-a"
type = "intermediate-value"
input_intermediate_values = ["b"]
output = "a"
pattern = "${b}"
[[endpoints.endpoints.tasks]]
name = "make-b"
type = "intermediate-value"
input_intermediate_values = ["a"]
output = "b"
pattern = "${a}"
"#;

    #[test]
    fn test_graph_errors_name_the_cyclic_endpoint() {
        let application = endpoints_infra::config::parse_application(CYCLIC).unwrap();
        let errors = graph_errors(&application);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "cyclic");
        assert!(errors[0].1.contains("cycle"));

        let valid = endpoints_infra::config::parse_application(DEFINITION).unwrap();
        assert!(graph_errors(&valid).is_empty());
    }

    #[tokio::test]
    async fn test_check_rejects_cyclic_definition() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loops.toml");
        tokio::fs::write(&path, CYCLIC).await.unwrap();

        let err = check_application(&path, true).await.unwrap_err();
        assert!(err.to_string().contains("cannot be scheduled"));
    }
}
