//! Planner output

use crate::mig::{Geometry, GpuModel};
use crate::snapshot::ClusterSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Target geometry of one GPU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuPartitioning {
    pub gpu_index: u32,
    pub resources: Geometry,
}

/// Target geometries of a node's GPUs, ordered by index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePartitioning {
    pub node_name: String,
    pub gpus: Vec<GpuPartitioning>,
}

/// The partitioning plan: node name to its GPUs' target geometries.
///
/// A GPU without an entry stays as it is and is not in MIG mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan(BTreeMap<String, NodePartitioning>);

/// A GPU whose planned geometry differs from what the snapshot reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuChange {
    pub node_name: String,
    pub gpu_index: u32,
    pub model: GpuModel,
    pub from: Geometry,
    pub to: Geometry,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every partitioned GPU at its current geometry.
    pub fn from_current(snapshot: &ClusterSnapshot) -> Self {
        let mut plan = Self::new();
        for node in snapshot.nodes() {
            for gpu in node.gpus().iter().filter(|g| g.is_partitioned()) {
                plan.insert(node.name(), gpu.index, gpu.current_geometry());
            }
        }
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of nodes in the plan.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn gpu_count(&self) -> usize {
        self.0.values().map(|n| n.gpus.len()).sum()
    }

    pub fn node(&self, name: &str) -> Option<&NodePartitioning> {
        self.0.get(name)
    }

    /// Nodes ordered by name.
    pub fn nodes(&self) -> impl Iterator<Item = &NodePartitioning> {
        self.0.values()
    }

    pub fn geometry(&self, node: &str, gpu_index: u32) -> Option<&Geometry> {
        self.node(node)?
            .gpus
            .iter()
            .find(|g| g.gpu_index == gpu_index)
            .map(|g| &g.resources)
    }

    /// Set the geometry of a GPU, replacing any previous entry.
    pub fn insert(&mut self, node: &str, gpu_index: u32, geometry: Geometry) {
        let entry = self
            .0
            .entry(node.to_string())
            .or_insert_with(|| NodePartitioning {
                node_name: node.to_string(),
                gpus: Vec::new(),
            });
        match entry.gpus.binary_search_by_key(&gpu_index, |g| g.gpu_index) {
            Ok(i) => entry.gpus[i].resources = geometry,
            Err(i) => entry.gpus.insert(
                i,
                GpuPartitioning {
                    gpu_index,
                    resources: geometry,
                },
            ),
        }
    }

    /// GPUs the plan changes relative to `snapshot`, in node and index order.
    pub fn changes(&self, snapshot: &ClusterSnapshot) -> Vec<GpuChange> {
        let mut changes = Vec::new();
        for node in snapshot.nodes() {
            for gpu in node.gpus() {
                let from = gpu.current_geometry();
                let Some(to) = self.geometry(node.name(), gpu.index) else {
                    continue;
                };
                if *to != from {
                    changes.push(GpuChange {
                        node_name: node.name().to_string(),
                        gpu_index: gpu.index,
                        model: gpu.model.clone(),
                        from,
                        to: to.clone(),
                    });
                }
            }
        }
        changes
    }
}
