//! CLI command definitions for the `endpoints` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod app_config;
pub mod check;
pub mod execute;
pub mod log;

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use endpoints_observe::tracing_setup::LogFormat;
use endpoints_types::application::Environment;

/// Execute configured endpoints and inspect their audit log.
#[derive(Parser)]
#[command(name = "endpoints", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Log output format (text or json).
    #[arg(long, global = true, default_value = "text", env = "ENDPOINTS_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Export spans to stdout through OpenTelemetry.
    #[arg(long, global = true)]
    pub otel: bool,

    /// SQLite URL, overriding config.toml and ENDPOINTS_DATABASE_URL.
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute an endpoint once and print its response.
    #[command(alias = "run")]
    Execute(RequestArgs),

    /// Print the hash a caller must send for the given parameters.
    Hash(RequestArgs),

    /// Show recent audit rows.
    Log {
        /// Only rows of this application.
        #[arg(long)]
        application: Option<String>,

        /// Maximum number of rows.
        #[arg(short = 'n', long, default_value = "20")]
        limit: u32,
    },

    /// Set the stored configuration of an application.
    Config(app_config::ConfigArgs),

    /// Validate an application definition file.
    Check {
        /// Path to the application TOML file.
        application: PathBuf,
    },
}

/// Arguments describing one request against an endpoint.
#[derive(Args)]
pub struct RequestArgs {
    /// Path to the application TOML file.
    pub application: PathBuf,

    /// Endpoint name.
    pub endpoint: String,

    /// Environment the request runs in.
    #[arg(short, long, default_value = "live")]
    pub environment: Environment,

    /// Request parameter as name=value. Repeat a name for multiple values.
    #[arg(short = 'p', long = "param", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Request hash.
    #[arg(long)]
    pub hash: Option<String>,

    /// Ask for the transformation debug payload to be recorded.
    #[arg(long)]
    pub debug: bool,

    /// Send this JSON document as an application/json body.
    #[arg(long, conflicts_with = "params")]
    pub json_body: Option<String>,

    /// User agent recorded in the audit row.
    #[arg(long)]
    pub user_agent: Option<String>,
}

impl RequestArgs {
    /// Parameters grouped by name, values in command-line order.
    pub fn parameter_map(&self) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in &self.params {
            map.entry(name.clone()).or_default().push(value.clone());
        }
        map
    }
}

/// Parse a `name=value` pair. The value may itself contain `=`.
pub fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("parameter name is empty in '{raw}'"));
    }
    Ok((name.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("id=42").unwrap(), ("id".to_string(), "42".to_string()));
        assert_eq!(parse_param("q=a=b").unwrap(), ("q".to_string(), "a=b".to_string()));
        assert_eq!(parse_param("empty=").unwrap(), ("empty".to_string(), String::new()));
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn test_execute_arguments() {
        let cli = Cli::try_parse_from([
            "endpoints", "execute", "shop.toml", "order", "-e", "preview", "-p", "tag=a", "-p", "id=7", "-p",
            "tag=b", "--hash", "abc",
        ])
        .unwrap();
        let Commands::Execute(args) = cli.command else {
            panic!("expected execute");
        };
        assert_eq!(args.environment, Environment::Preview);
        assert_eq!(args.hash.as_deref(), Some("abc"));
        let map = args.parameter_map();
        assert_eq!(map["tag"], vec!["a".to_string(), "b".to_string()]);
        assert_eq!(map["id"], vec!["7".to_string()]);
    }

    #[test]
    fn test_unknown_environment_is_rejected() {
        let result = Cli::try_parse_from(["endpoints", "execute", "shop.toml", "order", "-e", "staging"]);
        assert!(result.is_err());
    }
}
