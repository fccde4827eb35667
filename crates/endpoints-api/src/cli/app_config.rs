//! Stored per-application settings (lock, debug permission, display name).

use anyhow::Result;
use clap::Args;
use console::style;
use endpoints_core::repository::{AttemptTransaction, RequestStore};
use endpoints_types::application::ApplicationConfig;

use crate::state::AppState;

#[derive(Args)]
pub struct ConfigArgs {
    /// Application name.
    pub application: String,

    /// Lock (true) or unlock (false) the application.
    #[arg(long)]
    pub locked: Option<bool>,

    /// Allow callers to request the transformation debug payload.
    #[arg(long)]
    pub debug_allowed: Option<bool>,

    /// Display name exposed to transformations.
    #[arg(long)]
    pub display_name: Option<String>,
}

impl ConfigArgs {
    /// `current` with every supplied flag applied.
    fn apply(&self, current: ApplicationConfig) -> ApplicationConfig {
        ApplicationConfig {
            display_name: self.display_name.clone().or(current.display_name),
            locked: self.locked.unwrap_or(current.locked),
            debug_allowed: self.debug_allowed.unwrap_or(current.debug_allowed),
        }
    }
}

/// Update the stored configuration, leaving unspecified fields unchanged,
/// and print the result.
pub async fn set_config(state: &AppState, args: ConfigArgs, json: bool) -> Result<()> {
    let store = state.engine.store();

    let tx = store.begin().await?;
    let current = tx.fetch_application_config(&args.application).await?;
    tx.rollback().await?;

    let updated = args.apply(current);
    store.set_application_config(&args.application, &updated).await?;
    tracing::info!(
        application = %args.application,
        locked = updated.locked,
        debug_allowed = updated.debug_allowed,
        "application config updated"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&updated)?);
        return Ok(());
    }

    let flag = |on: bool| if on { style("yes").green() } else { style("no").dim() };
    println!();
    println!("  {}", style(&args.application).cyan().bold());
    println!("  Display name:  {}", updated.display_name.as_deref().unwrap_or("-"));
    println!("  Locked:        {}", flag(updated.locked));
    println!("  Debug allowed: {}", flag(updated.debug_allowed));
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_keeps_unspecified_fields() {
        let args = ConfigArgs {
            application: "shop".to_string(),
            locked: Some(true),
            debug_allowed: None,
            display_name: None,
        };
        let current = ApplicationConfig {
            display_name: Some("Shop".to_string()),
            locked: false,
            debug_allowed: true,
        };
        let updated = args.apply(current);
        assert!(updated.locked);
        assert!(updated.debug_allowed);
        assert_eq!(updated.display_name.as_deref(), Some("Shop"));
    }
}
