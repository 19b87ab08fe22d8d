//! Demand pool construction and grouping
//!
//! A slice profile only has meaning on the models whose catalog offers it.
//! Models that share a demanded profile compete for the same pods and are
//! searched together; everything else is independent.

use crate::mig::{GpuModel, SliceCatalog, SliceProfile};
use crate::snapshot::{CandidatePod, ClusterSnapshot, SliceRequest};
use std::collections::BTreeSet;
use tracing::debug;

/// A pod that asks for slices, with its position in the caller's input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DemandPod {
    pub arrival: usize,
    pub request: SliceRequest,
    pub pod: CandidatePod,
}

/// Models competing for the same pods, their nodes and the pods.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DemandGroup {
    pub models: BTreeSet<GpuModel>,
    /// Node names, sorted.
    pub nodes: Vec<String>,
    /// Sorted by requested profile, quantity, then arrival.
    pub pods: Vec<DemandPod>,
}

/// Pods with a slice request, in scoring order: smallest profile first,
/// then fewest slices, arrival order among equals.
pub(crate) fn build_demand(candidates: &[CandidatePod]) -> Vec<DemandPod> {
    let mut demand: Vec<DemandPod> = candidates
        .iter()
        .enumerate()
        .filter_map(|(arrival, pod)| {
            let request = pod.slice_request.filter(|r| r.quantity > 0)?;
            Some(DemandPod {
                arrival,
                request,
                pod: pod.clone(),
            })
        })
        .collect();
    demand.sort_by_key(|d| (d.request.profile, d.request.quantity, d.arrival));
    demand
}

/// Split demand into independent groups.
///
/// Only models present in the snapshot and known to the catalog take part.
/// A pod goes to the group of the first model (by name) that supports its
/// profile; pods no present model supports are dropped.
pub(crate) fn group_demand(
    snapshot: &ClusterSnapshot,
    catalog: &SliceCatalog,
    demand: Vec<DemandPod>,
) -> Vec<DemandGroup> {
    let present: BTreeSet<GpuModel> = snapshot
        .nodes()
        .filter(|n| n.gpu_count() > 0)
        .map(|n| n.model().clone())
        .filter(|m| catalog.is_known(m))
        .collect();

    let profiles: BTreeSet<SliceProfile> = demand.iter().map(|d| d.request.profile).collect();

    // One component per model, merged whenever a profile spans several.
    let mut components: Vec<BTreeSet<GpuModel>> =
        present.iter().map(|m| BTreeSet::from([m.clone()])).collect();
    for profile in &profiles {
        let supporting: BTreeSet<&GpuModel> = present
            .iter()
            .filter(|m| catalog.supports_profile(m, profile))
            .collect();
        if supporting.len() < 2 {
            continue;
        }
        let (merged, rest): (Vec<_>, Vec<_>) = components
            .into_iter()
            .partition(|c| c.iter().any(|m| supporting.contains(m)));
        components = rest;
        components.push(merged.into_iter().flatten().collect());
    }
    components.sort();

    let mut groups: Vec<DemandGroup> = components
        .into_iter()
        .map(|models| DemandGroup {
            nodes: snapshot
                .nodes()
                .filter(|n| models.contains(n.model()))
                .map(|n| n.name().to_string())
                .collect(),
            models,
            pods: Vec::new(),
        })
        .collect();

    for item in demand {
        let profile = item.request.profile;
        let owner = present
            .iter()
            .find(|m| catalog.supports_profile(m, &profile))
            .and_then(|m| groups.iter().position(|g| g.models.contains(m)));
        match owner {
            Some(i) => groups[i].pods.push(item),
            None => debug!(
                pod = %item.pod.key(),
                profile = %profile,
                "No GPU model in the cluster offers the requested profile"
            ),
        }
    }

    groups.retain(|g| !g.pods.is_empty());
    groups
}
