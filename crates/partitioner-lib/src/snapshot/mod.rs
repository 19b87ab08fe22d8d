//! Read-only view of the cluster's GPU inventory
//!
//! A [`ClusterSnapshot`] is built once per planning pass, either directly
//! through [`Node::builder`] or from Kubernetes objects (see [`k8s`]), and
//! is never mutated afterwards.

pub mod k8s;
mod pod;
mod quantity;
mod resources;

pub use pod::{CandidatePod, SliceRequest};
pub use quantity::{parse_milli_value, parse_value};
pub use resources::Resources;

use crate::error::SnapshotError;
use crate::mig::{Geometry, GpuModel, SliceProfile};
use serde::Serialize;
use std::collections::BTreeMap;

/// Upper bound on GPUs per node. Anything above is a malformed report.
pub const MAX_GPUS_PER_NODE: u32 = 64;

/// One physical GPU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Gpu {
    pub index: u32,
    pub model: GpuModel,
    /// Slices bound to running pods.
    pub used: Geometry,
    /// Slices created but not bound to any pod.
    pub free: Geometry,
}

impl Gpu {
    /// A bare GPU with no MIG slices.
    pub fn new(index: u32, model: GpuModel) -> Self {
        Self {
            index,
            model,
            used: Geometry::new(),
            free: Geometry::new(),
        }
    }

    /// Layout currently on the hardware: used and free slices together.
    pub fn current_geometry(&self) -> Geometry {
        self.used.merged(&self.free)
    }

    /// GPUs with used slices must not be repartitioned.
    pub fn has_used_slices(&self) -> bool {
        !self.used.is_empty()
    }

    pub fn is_partitioned(&self) -> bool {
        !self.used.is_empty() || !self.free.is_empty()
    }
}

/// A node and its GPUs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    name: String,
    model: GpuModel,
    gpu_count: u32,
    gpus: Vec<Gpu>,
    allocatable: Resources,
    requested: Resources,
}

impl Node {
    /// Build a node from its GPUs. Missing indices below `gpu_count` are
    /// filled with bare GPUs; the result is ordered by index.
    ///
    /// `gpu_count` may not exceed [`MAX_GPUS_PER_NODE`].
    pub fn new(
        name: impl Into<String>,
        model: GpuModel,
        gpu_count: u32,
        gpus: Vec<Gpu>,
        allocatable: Resources,
        requested: Resources,
    ) -> Result<Self, SnapshotError> {
        let name = name.into();
        if gpu_count > MAX_GPUS_PER_NODE {
            return Err(SnapshotError::TooManyGpus {
                node: name,
                count: u64::from(gpu_count),
                max: MAX_GPUS_PER_NODE,
            });
        }
        let mut by_index: BTreeMap<u32, Gpu> = BTreeMap::new();

        for gpu in gpus {
            if gpu.index >= gpu_count {
                return Err(SnapshotError::GpuIndexOutOfRange {
                    node: name,
                    index: gpu.index,
                    count: gpu_count,
                });
            }
            if gpu.model != model {
                return Err(SnapshotError::GpuModelMismatch {
                    node: name,
                    index: gpu.index,
                    expected: model.to_string(),
                    found: gpu.model.to_string(),
                });
            }
            if by_index.contains_key(&gpu.index) {
                return Err(SnapshotError::DuplicateGpuIndex {
                    node: name,
                    index: gpu.index,
                });
            }
            by_index.insert(gpu.index, gpu);
        }

        for index in 0..gpu_count {
            by_index
                .entry(index)
                .or_insert_with(|| Gpu::new(index, model.clone()));
        }

        Ok(Self {
            name,
            model,
            gpu_count,
            gpus: by_index.into_values().collect(),
            allocatable,
            requested,
        })
    }

    pub fn builder(name: impl Into<String>, model: impl Into<GpuModel>) -> NodeBuilder {
        NodeBuilder::new(name, model)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &GpuModel {
        &self.model
    }

    pub fn gpu_count(&self) -> u32 {
        self.gpu_count
    }

    /// GPUs ordered by index.
    pub fn gpus(&self) -> &[Gpu] {
        &self.gpus
    }

    pub fn gpu(&self, index: u32) -> Option<&Gpu> {
        self.gpus.iter().find(|g| g.index == index)
    }

    /// Declared CPU, memory and non-GPU scalar resources.
    pub fn allocatable(&self) -> &Resources {
        &self.allocatable
    }

    /// Resources requested by pods already bound to the node.
    pub fn requested(&self) -> &Resources {
        &self.requested
    }

    /// Allocatable minus requested.
    pub fn spare(&self) -> Resources {
        self.allocatable.saturating_sub(&self.requested)
    }
}

/// Incremental construction of a [`Node`].
#[derive(Debug, Clone)]
pub struct NodeBuilder {
    name: String,
    model: GpuModel,
    gpu_count: Option<u32>,
    slices: BTreeMap<u32, (Geometry, Geometry)>,
    allocatable: Resources,
    requested: Resources,
}

impl NodeBuilder {
    pub fn new(name: impl Into<String>, model: impl Into<GpuModel>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            gpu_count: None,
            slices: BTreeMap::new(),
            allocatable: Resources::default(),
            requested: Resources::default(),
        }
    }

    /// Declared number of GPUs. Defaults to the highest index with slices
    /// plus one.
    pub fn gpu_count(mut self, count: u32) -> Self {
        self.gpu_count = Some(count);
        self
    }

    /// Add used slices on GPU `index`.
    pub fn used(mut self, index: u32, profile: SliceProfile, count: u32) -> Self {
        self.slices.entry(index).or_default().0.add(profile, count);
        self
    }

    /// Add free slices on GPU `index`.
    pub fn free(mut self, index: u32, profile: SliceProfile, count: u32) -> Self {
        self.slices.entry(index).or_default().1.add(profile, count);
        self
    }

    /// Set the free slices of GPU `index` to `geometry`.
    pub fn free_geometry(mut self, index: u32, geometry: Geometry) -> Self {
        self.slices.entry(index).or_default().1 = geometry;
        self
    }

    pub fn allocatable(mut self, resources: Resources) -> Self {
        self.allocatable = resources;
        self
    }

    pub fn requested(mut self, resources: Resources) -> Self {
        self.requested = resources;
        self
    }

    pub fn build(self) -> Result<Node, SnapshotError> {
        let inferred = self
            .slices
            .keys()
            .next_back()
            .map(|i| i.saturating_add(1))
            .unwrap_or(0);
        let gpu_count = self.gpu_count.unwrap_or(inferred);

        let gpus = self
            .slices
            .into_iter()
            .filter(|(_, (used, free))| !used.is_empty() || !free.is_empty())
            .map(|(index, (used, free))| Gpu {
                index,
                model: self.model.clone(),
                used,
                free,
            })
            .collect();

        Node::new(
            self.name,
            self.model,
            gpu_count,
            gpus,
            self.allocatable,
            self.requested,
        )
    }
}

/// All nodes taking part in a planning pass, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterSnapshot {
    nodes: BTreeMap<String, Node>,
}

impl ClusterSnapshot {
    pub fn new(nodes: impl IntoIterator<Item = Node>) -> Result<Self, SnapshotError> {
        let mut by_name = BTreeMap::new();
        for node in nodes {
            if by_name.contains_key(&node.name) {
                return Err(SnapshotError::DuplicateNode(node.name));
            }
            by_name.insert(node.name.clone(), node);
        }
        Ok(Self { nodes: by_name })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Nodes ordered by name.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn gpu_count(&self) -> usize {
        self.nodes.values().map(|n| n.gpus.len()).sum()
    }

    pub fn gpu(&self, node: &str, index: u32) -> Option<&Gpu> {
        self.nodes.get(node).and_then(|n| n.gpu(index))
    }
}
