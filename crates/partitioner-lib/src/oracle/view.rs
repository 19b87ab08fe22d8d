//! Hypothetical node state handed to the oracle

use crate::mig::{Geometry, GpuModel, SliceProfile, GPU_RESOURCE};
use crate::snapshot::{CandidatePod, Node, Resources};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
struct GpuLayout {
    geometry: Geometry,
    used: Geometry,
}

/// A private, mutable copy of one node's resources.
///
/// GPU resources are derived from the per-GPU geometries: every slice is
/// exposed as `nvidia.com/mig-<profile>` and every unpartitioned GPU as one
/// `nvidia.com/gpu`. Used slices count as requested, including the slices of
/// pods admitted during the pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeView {
    name: String,
    model: GpuModel,
    allocatable: Resources,
    requested: Resources,
    gpus: BTreeMap<u32, GpuLayout>,
    admitted: Resources,
}

impl NodeView {
    pub fn from_node(node: &Node) -> Self {
        let gpus = node
            .gpus()
            .iter()
            .map(|gpu| {
                (
                    gpu.index,
                    GpuLayout {
                        geometry: gpu.current_geometry(),
                        used: gpu.used.clone(),
                    },
                )
            })
            .collect();

        Self {
            name: node.name().to_string(),
            model: node.model().clone(),
            allocatable: node.allocatable().clone(),
            requested: node.requested().clone(),
            gpus,
            admitted: Resources::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &GpuModel {
        &self.model
    }

    pub fn gpu_geometry(&self, index: u32) -> Option<&Geometry> {
        self.gpus.get(&index).map(|l| &l.geometry)
    }

    /// Replace the geometry of GPU `index`. Unknown indices are ignored.
    pub fn set_geometry(&mut self, index: u32, geometry: Geometry) {
        if let Some(layout) = self.gpus.get_mut(&index) {
            layout.geometry = geometry;
        }
    }

    /// A copy of this view with GPU `index` set to `geometry`.
    pub fn with_geometry(&self, index: u32, geometry: Geometry) -> Self {
        let mut view = self.clone();
        view.set_geometry(index, geometry);
        view
    }

    /// Whether GPU `index` has slices bound to pods, running or placed
    /// during this pass.
    pub fn gpu_in_use(&self, index: u32) -> bool {
        self.gpus.get(&index).is_some_and(|l| !l.used.is_empty())
    }

    /// Unbound slices per GPU, in index order.
    pub fn free_slots(&self) -> impl Iterator<Item = (u32, SliceProfile, u32)> + '_ {
        self.gpus.iter().flat_map(|(index, layout)| {
            layout.geometry.iter().filter_map(move |(profile, count)| {
                let free = count.saturating_sub(layout.used.get(profile));
                (free > 0).then_some((*index, *profile, free))
            })
        })
    }

    /// Account for a pod placed on this node, its slices taken from GPU `gpu`.
    pub fn admit_on(&mut self, pod: &CandidatePod, gpu: u32) {
        self.admitted.add(&pod.requests);
        if let Some(request) = &pod.slice_request {
            if let Some(layout) = self.gpus.get_mut(&gpu) {
                layout.used.add(request.profile, request.quantity);
            }
        }
    }

    pub fn allocatable(&self) -> Resources {
        let mut total = self.allocatable.clone();
        let mut bare = 0;
        for layout in self.gpus.values() {
            if layout.geometry.is_empty() {
                bare += 1;
            }
            for (profile, count) in layout.geometry.iter() {
                total.add_scalar(profile.resource_name(), i64::from(*count));
            }
        }
        total.add_scalar(GPU_RESOURCE, bare);
        total
    }

    pub fn requested(&self) -> Resources {
        let mut total = self.requested.clone();
        for layout in self.gpus.values() {
            for (profile, count) in layout.used.iter() {
                total.add_scalar(profile.resource_name(), i64::from(*count));
            }
        }
        total.add(&self.admitted);
        total
    }

    /// What is left for new pods.
    pub fn spare(&self) -> Resources {
        self.allocatable().saturating_sub(&self.requested())
    }
}
