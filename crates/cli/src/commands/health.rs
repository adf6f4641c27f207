//! Daemon health command

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, HealthResponse, ReadinessResponse};
use crate::output::{color_status, print_warning, OutputFormat};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Show daemon readiness and per-container health
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (_, health): (bool, HealthResponse) = client.get_status("healthz").await?;
    let (_, readiness): (bool, ReadinessResponse) = client.get_status("readyz").await?;

    match format {
        OutputFormat::Json => {
            let combined = serde_json::json!({
                "health": health,
                "readiness": readiness,
            });
            println!("{}", serde_json::to_string_pretty(&combined)?);
        }
        OutputFormat::Table => {
            println!("{}", "Daemon Health".bold());
            println!("{}", "=".repeat(50));
            println!("Status: {}", color_status(&health.status));
            let ready = if readiness.ready { "ready" } else { "not ready" };
            println!("Ready:  {}", color_status(ready));
            if let Some(reason) = &readiness.reason {
                println!("Reason: {}", reason);
            }
            println!();

            if health.components.is_empty() {
                print_warning("No container health reported yet");
                return Ok(());
            }

            let mut rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, component)| ComponentRow {
                    container: name.clone(),
                    status: color_status(&component.status),
                    message: component.message.clone().unwrap_or_default(),
                })
                .collect();
            rows.sort_by(|a, b| a.container.cmp(&b.container));

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}
