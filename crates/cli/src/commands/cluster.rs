//! Cluster inspection CLI commands

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use scheduler_lib::{HealthResponse, ReadinessResponse};
use serde_json::json;
use tabled::Tabled;

use crate::client::{ApiClient, AssignmentList};
use crate::output::{color_status, format_age, print_json, print_rows, OutputFormat};

#[derive(Tabled)]
struct AssignmentRow {
    #[tabled(rename = "Pod")]
    pod: String,
    #[tabled(rename = "UID")]
    uid: String,
    #[tabled(rename = "Assigned")]
    assigned: String,
    #[tabled(rename = "Age")]
    age: String,
}

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Pods assigned to a node that its telemetry may not reflect yet
pub async fn assignments(client: &ApiClient, node: &str, format: OutputFormat) -> Result<()> {
    let path = format!("api/v1/assignments/{}", node);
    let list: AssignmentList = client.get(&path).await?;

    if let OutputFormat::Json = format {
        return print_json(&list);
    }

    println!("Node: {}", list.node.cyan());
    let now = Utc::now();
    let rows = list
        .assignments
        .iter()
        .map(|a| AssignmentRow {
            pod: a.pod.clone(),
            uid: a.uid.clone(),
            assigned: a.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            age: format_age(a.timestamp, now),
        })
        .collect();
    print_rows(rows, "No tracked assignments on this node");
    Ok(())
}

/// Liveness and readiness of the scheduler
pub async fn health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (_, health): (bool, HealthResponse) = client.probe("healthz").await?;
    let (_, readiness): (bool, ReadinessResponse) = client.probe("readyz").await?;

    if let OutputFormat::Json = format {
        return print_json(&json!({ "health": health, "readiness": readiness }));
    }

    let status = format!("{:?}", health.status).to_lowercase();
    println!("{}", "Scheduler Health".bold());
    println!("{}", "=".repeat(50));
    println!("Status:  {}", color_status(&status));
    match &readiness.reason {
        Some(reason) if !readiness.ready => {
            println!("Ready:   {} ({})", color_status("not ready"), reason)
        }
        _ => println!("Ready:   {}", color_status("ready")),
    }
    println!();

    let rows = health
        .components
        .iter()
        .map(|(name, c)| ComponentRow {
            component: name.clone(),
            status: color_status(&format!("{:?}", c.status).to_lowercase()),
            message: c.message.clone().unwrap_or_default(),
        })
        .collect();
    print_rows(rows, "No components registered");
    Ok(())
}
