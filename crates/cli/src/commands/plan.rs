//! Request a partitioning plan from the service

use anyhow::Result;
use std::path::Path;
use tabled::Tabled;

use crate::client::{ApiClient, PlanRequest, PlanResponse};
use crate::input::{read_objects, read_optional};
use crate::output::{color_state, format_geometry, print_info, print_json, print_success, print_table, OutputFormat};

/// Row for the planned layout table
#[derive(Tabled, serde::Serialize)]
struct PlanRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "GPU")]
    gpu: u32,
    #[tabled(rename = "Geometry")]
    geometry: String,
    #[tabled(rename = "Action")]
    action: String,
}

fn plan_rows(response: &PlanResponse) -> Vec<PlanRow> {
    response
        .plan
        .nodes()
        .flat_map(|node| {
            node.gpus.iter().map(move |gpu| {
                let changed = response
                    .changes
                    .iter()
                    .any(|c| c.node_name == node.node_name && c.gpu_index == gpu.gpu_index);
                PlanRow {
                    node: node.node_name.clone(),
                    gpu: gpu.gpu_index,
                    geometry: format_geometry(&gpu.resources),
                    action: color_state(if changed { "repartition" } else { "unchanged" }),
                }
            })
        })
        .collect()
}

/// Post the cluster state to the service and print the resulting plan
pub async fn run_plan(
    client: &ApiClient,
    nodes: &Path,
    pods: &Path,
    scheduled: Option<&Path>,
    timeout_secs: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    let request = PlanRequest {
        nodes: read_objects(nodes)?,
        scheduled_pods: read_optional(scheduled)?,
        candidate_pods: read_objects(pods)?,
        timeout_secs,
    };

    let response = client.plan(&request).await?;

    match format {
        OutputFormat::Json => print_json(&response),
        OutputFormat::Table => {
            print_table(&plan_rows(&response), format);
            for change in &response.changes {
                println!(
                    "  {}/{} ({}): {} -> {}",
                    change.node_name,
                    change.gpu_index,
                    change.model,
                    format_geometry(&change.from),
                    format_geometry(&change.to)
                );
            }
            if response.changes.is_empty() {
                print_info("No GPU needs repartitioning");
            } else {
                print_success(&format!(
                    "{} GPU(s) to repartition, plan generated at {}",
                    response.changes.len(),
                    response.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
                ));
            }
        }
    }

    Ok(())
}
