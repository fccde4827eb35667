//! Listing the request audit log.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use endpoints_core::repository::RequestStore;
use endpoints_types::request_log::RequestLogRecord;

use crate::state::AppState;

pub async fn list_requests(state: &AppState, application: Option<&str>, limit: u32, json: bool) -> Result<()> {
    let records = state.engine.store().recent_requests(application, limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!();
        println!(
            "  {} No requests logged yet. Run one with: {}",
            style("i").blue().bold(),
            style("endpoints execute <application.toml> <endpoint>").yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Time (UTC)").fg(Color::White),
        Cell::new("Application").fg(Color::White),
        Cell::new("Env").fg(Color::White),
        Cell::new("Endpoint").fg(Color::White),
        Cell::new("Status").fg(Color::White),
        Cell::new("Duration").fg(Color::White),
        Cell::new("Ids").fg(Color::White),
        Cell::new("Failure").fg(Color::White),
    ]);

    for record in &records {
        let status_color = match record.status_code {
            200..=399 => Color::Green,
            400..=499 => Color::Yellow,
            _ => Color::Red,
        };

        table.add_row(vec![
            Cell::new(record.datetime_utc.format("%Y-%m-%d %H:%M:%S")).fg(Color::DarkGrey),
            Cell::new(&record.application).fg(Color::Cyan),
            Cell::new(record.environment),
            Cell::new(&record.endpoint),
            Cell::new(record.status_code).fg(status_color),
            Cell::new(format!("{} ms", record.duration_ms)),
            Cell::new(id_summary(record)),
            Cell::new(failure_summary(record)).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!("  {} row(s)", records.len());
    Ok(())
}

/// Incremental id, random id and counters that were allocated.
fn id_summary(record: &RequestLogRecord) -> String {
    let mut parts = Vec::new();
    if let Some(id) = record.incremental_id_per_endpoint {
        parts.push(format!("#{id}"));
    }
    if let Some(id) = record.random_id_per_application {
        parts.push(format!("r{id}"));
    }
    let counters = [
        ("perpetual", record.on_demand_perpetual),
        ("year", record.on_demand_year),
        ("month", record.on_demand_month),
    ];
    for (name, value) in counters {
        if let Some(value) = value {
            parts.push(format!("{name}={value}"));
        }
    }
    if parts.is_empty() { "-".to_string() } else { parts.join(" ") }
}

fn failure_summary(record: &RequestLogRecord) -> String {
    let Some(kind) = record.failure_kind else {
        return "-".to_string();
    };
    let detail = record
        .transformation_error_message
        .as_deref()
        .or(record.exception_message.as_deref())
        .unwrap_or_default();
    let mut summary = format!("{kind}: {detail}");
    if let Some(url) = &record.http_request_failed_url {
        match record.http_request_failed_status_code {
            Some(status) => summary.push_str(&format!(" ({url} -> {status})")),
            None => summary.push_str(&format!(" ({url})")),
        }
    }
    if summary.len() > 80 {
        let cut = summary.char_indices().nth(77).map(|(i, _)| i).unwrap_or(summary.len());
        summary.truncate(cut);
        summary.push_str("...");
    }
    summary
}
