//! Build a snapshot locally and show per-GPU slice state

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::{Node as K8sNode, Pod as K8sPod};
use partitioner_lib::{snapshot::k8s::snapshot_from_k8s, ClusterSnapshot};
use std::path::Path;
use tabled::Tabled;

use crate::input::{read_objects, read_optional};
use crate::output::{color_state, format_geometry, print_info, print_table, OutputFormat};

/// Row for the GPU state table
#[derive(Tabled, serde::Serialize)]
struct GpuRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "GPU")]
    gpu: u32,
    #[tabled(rename = "Used")]
    used: String,
    #[tabled(rename = "Free")]
    free: String,
    #[tabled(rename = "State")]
    state: String,
}

fn gpu_state(has_used: bool, partitioned: bool) -> &'static str {
    if has_used {
        "in use"
    } else if partitioned {
        "free"
    } else {
        "unpartitioned"
    }
}

fn gpu_rows(snapshot: &ClusterSnapshot, colored: bool) -> Vec<GpuRow> {
    snapshot
        .nodes()
        .flat_map(|node| {
            node.gpus().iter().map(move |gpu| {
                let state = gpu_state(gpu.has_used_slices(), gpu.is_partitioned());
                GpuRow {
                    node: node.name().to_string(),
                    model: gpu.model.to_string(),
                    gpu: gpu.index,
                    used: format_geometry(&gpu.used),
                    free: format_geometry(&gpu.free),
                    state: if colored { color_state(state) } else { state.to_string() },
                }
            })
        })
        .collect()
}

pub fn build_snapshot(nodes: &Path, scheduled: Option<&Path>) -> Result<ClusterSnapshot> {
    let nodes: Vec<K8sNode> = read_objects(nodes)?;
    let pods: Vec<K8sPod> = read_optional(scheduled)?;
    snapshot_from_k8s(&nodes, &pods).context("Failed to build cluster snapshot")
}

/// Print the used and free slices of every GPU
pub fn inspect(nodes: &Path, scheduled: Option<&Path>, format: OutputFormat) -> Result<()> {
    let snapshot = build_snapshot(nodes, scheduled)?;
    let rows = gpu_rows(&snapshot, format == OutputFormat::Table);
    print_table(&rows, format);

    if format == OutputFormat::Table {
        print_info(&format!(
            "{} node(s), {} GPU(s)",
            snapshot.len(),
            snapshot.gpu_count()
        ));
    }
    Ok(())
}
