//! Container listing and event publishing commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, ContainerStatus, PublishRequest, PublishResponse};
use crate::output::{color_status, print_info, print_success, print_warning, short_id, OutputFormat};

/// Source recorded on events published from the CLI
const EVENT_SOURCE: &str = "dbctl";

/// Row for the container table
#[derive(Tabled)]
struct ContainerRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Image")]
    image: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "ID")]
    id: String,
}

impl From<&ContainerStatus> for ContainerRow {
    fn from(status: &ContainerStatus) -> Self {
        Self {
            key: status.key.clone(),
            name: status.container_name.clone(),
            image: status.image_name.clone(),
            mode: status.lifecycle_mode.clone(),
            state: state_label(status),
            id: status
                .container_id
                .as_deref()
                .map(short_id)
                .unwrap_or("-")
                .to_string(),
        }
    }
}

fn state_label(status: &ContainerStatus) -> String {
    if status.last_error.is_some() {
        color_status("error")
    } else if status.running {
        color_status("running")
    } else {
        color_status("stopped")
    }
}

/// List every managed container
pub async fn list_containers(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let containers: Vec<ContainerStatus> = client.get("api/v1/containers").await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&containers)?);
        }
        OutputFormat::Table => {
            if containers.is_empty() {
                print_warning("No containers are managed by this daemon");
                return Ok(());
            }

            let rows: Vec<ContainerRow> = containers.iter().map(ContainerRow::from).collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);

            let running = containers.iter().filter(|c| c.running).count();
            println!("\n{} of {} containers running", running, containers.len());
        }
    }

    Ok(())
}

/// Show one managed container
pub async fn show_container(client: &ApiClient, key: &str, format: OutputFormat) -> Result<()> {
    let status: ContainerStatus = client.get(&format!("api/v1/containers/{}", key)).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        OutputFormat::Table => {
            println!("{}", "Container Status".bold());
            println!("{}", "=".repeat(50));
            println!("Key:       {}", status.key.cyan());
            println!("Name:      {}", status.container_name);
            println!("Image:     {}", status.image_name);
            println!("Lifecycle: {}", status.lifecycle_mode);
            println!("State:     {}", state_label(&status));
            println!(
                "ID:        {}",
                status.container_id.as_deref().unwrap_or("-")
            );
            if let Some(error) = &status.last_error {
                println!("Error:     {}", error.red());
            }
        }
    }

    Ok(())
}

/// Ask one manager to act on its container
pub async fn send_event(client: &ApiClient, key: &str, action: &str, format: OutputFormat) -> Result<()> {
    let response: PublishResponse = client
        .post(&format!("api/v1/containers/{}/events", key), &request(action))
        .await?;

    report(&response, format)
}

/// Ask every manager to act on its container
pub async fn broadcast(client: &ApiClient, action: &str, format: OutputFormat) -> Result<()> {
    let response: PublishResponse = client.post("api/v1/events", &request(action)).await?;

    report(&response, format)
}

fn request(action: &str) -> PublishRequest {
    PublishRequest {
        action: action.to_uppercase(),
        source: EVENT_SOURCE.to_string(),
    }
}

fn report(response: &PublishResponse, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(response)?);
        }
        OutputFormat::Table => {
            let target = response.event.target.as_deref().unwrap_or("all containers");
            print_success(&format!(
                "{} event published for {}",
                response.event.action, target
            ));
            print_info(&format!(
                "Delivered to {} listener(s); the daemon applies it asynchronously",
                response.delivered_to
            ));
        }
    }
    Ok(())
}
