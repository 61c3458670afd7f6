//! Scheduling CLI commands

use anyhow::{Context, Result};
use colored::Colorize;
use scheduler_lib::Pod;
use std::path::Path;
use tabled::Tabled;

use crate::client::{ApiClient, ReserveRequest, ReserveResponse, ScheduleResult};
use crate::output::{
    color_score, color_status, print_info, print_json, print_rows, print_success, print_warning,
    OutputFormat,
};

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Outcome")]
    outcome: String,
    #[tabled(rename = "Plugin")]
    plugin: String,
    #[tabled(rename = "Reasons")]
    reasons: String,
}

pub fn read_pod(path: &Path) -> Result<Pod> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pod file {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid pod in {}", path.display()))
}

/// Ask the scheduler to evaluate a pod against every node
pub async fn schedule(client: &ApiClient, pod_file: &Path, format: OutputFormat) -> Result<()> {
    let pod = read_pod(pod_file)?;
    let result: ScheduleResult = client.post("api/v1/schedule", &pod).await?;

    if let OutputFormat::Json = format {
        return print_json(&result);
    }

    println!("Pod: {}", result.pod.cyan());
    let rows = result
        .nodes
        .iter()
        .map(|n| NodeRow {
            node: n.node.clone(),
            score: color_score(n.score),
            outcome: if n.feasible {
                color_status("feasible")
            } else {
                color_status(&format!("{:?}", n.status.code).to_lowercase())
            },
            plugin: n.plugin.clone().unwrap_or_default(),
            reasons: n.status.reasons.join("; "),
        })
        .collect();
    print_rows(rows, "No nodes in the cluster");

    match &result.selected_node {
        Some(node) => print_success(&format!("Selected node {}", node.bold())),
        None => print_warning("No feasible node"),
    }
    Ok(())
}

pub async fn reserve(
    client: &ApiClient,
    pod_file: &Path,
    node: &str,
    format: OutputFormat,
) -> Result<()> {
    let request = ReserveRequest {
        pod: read_pod(pod_file)?,
        node: node.to_string(),
    };
    let response: ReserveResponse = client.post("api/v1/reserve", &request).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table if response.status.is_success() => {
            print_success(&format!("Reserved {} on {}", response.pod, response.node))
        }
        OutputFormat::Table => print_warning(&format!(
            "Reservation of {} on {} returned {}",
            response.pod, response.node, response.status
        )),
    }
    Ok(())
}

pub async fn unreserve(
    client: &ApiClient,
    pod_file: &Path,
    node: &str,
    format: OutputFormat,
) -> Result<()> {
    let request = ReserveRequest {
        pod: read_pod(pod_file)?,
        node: node.to_string(),
    };
    let response: ReserveResponse = client.post("api/v1/unreserve", &request).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            print_info(&format!("Released {} from {}", response.pod, response.node))
        }
    }
    Ok(())
}
