//! Snapshot construction from Kubernetes objects
//!
//! Nodes carry their GPU model and count as labels set by the NVIDIA GPU
//! feature discovery, and their MIG status as annotations written by the
//! node agent:
//!
//! ```text
//! n8s.nebuly.ai/status-gpu-<index>-<profile>-free: "<count>"
//! n8s.nebuly.ai/status-gpu-<index>-<profile>-used: "<count>"
//! ```

use super::quantity::{parse_milli_value, parse_value};
use super::{CandidatePod, ClusterSnapshot, Gpu, Node, Resources, MAX_GPUS_PER_NODE};
use crate::error::{QuantityError, SnapshotError};
use crate::mig::{GpuModel, SliceProfile, GPU_RESOURCE};
use k8s_openapi::api::core::v1::{Container, Node as K8sNode, Pod as K8sPod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub const LABEL_GPU_PRODUCT: &str = "nvidia.com/gpu.product";
pub const LABEL_GPU_COUNT: &str = "nvidia.com/gpu.count";
pub const ANNOTATION_GPU_STATUS_PREFIX: &str = "n8s.nebuly.ai/status-gpu-";

/// Pod phases whose resources are released.
const TERMINAL_PHASES: &[&str] = &["Succeeded", "Failed"];

/// Build a snapshot from GPU nodes and the pods already bound to them.
///
/// Nodes without a GPU product label are skipped.
pub fn snapshot_from_k8s(
    nodes: &[K8sNode],
    scheduled_pods: &[K8sPod],
) -> Result<ClusterSnapshot, SnapshotError> {
    let mut converted = Vec::with_capacity(nodes.len());
    for node in nodes {
        if let Some(node) = node_from_k8s(node, scheduled_pods)? {
            converted.push(node);
        }
    }
    ClusterSnapshot::new(converted)
}

/// Convert one node. Returns `None` for nodes without a GPU model label.
pub fn node_from_k8s(
    node: &K8sNode,
    scheduled_pods: &[K8sPod],
) -> Result<Option<Node>, SnapshotError> {
    let name = node
        .metadata
        .name
        .clone()
        .ok_or(SnapshotError::MissingName)?;
    let labels = node.metadata.labels.clone().unwrap_or_default();

    let Some(model) = labels.get(LABEL_GPU_PRODUCT).map(|m| GpuModel::new(m.as_str())) else {
        debug!(node = %name, "Skipping node without GPU product label");
        return Ok(None);
    };

    let slices = parse_status_annotations(&name, node.metadata.annotations.as_ref())?;

    let empty = BTreeMap::new();
    let allocatable_raw = node
        .status
        .as_ref()
        .and_then(|s| s.allocatable.as_ref())
        .unwrap_or(&empty);

    let gpu_count = match labels.get(LABEL_GPU_COUNT) {
        Some(raw) => raw.parse::<u32>().map_err(|e| SnapshotError::InvalidLabel {
            node: name.clone(),
            key: LABEL_GPU_COUNT.to_string(),
            detail: e.to_string(),
        })?,
        None => {
            let bare = match allocatable_raw.get(GPU_RESOURCE) {
                Some(q) => u64::try_from(quantity_value(&name, GPU_RESOURCE, q)?).map_err(|_| {
                    SnapshotError::InvalidQuantity {
                        object: name.clone(),
                        resource: GPU_RESOURCE.to_string(),
                        source: QuantityError(q.0.clone()),
                    }
                })?,
                None => 0,
            };
            let highest = slices.keys().next_back().map_or(0, |i| u64::from(*i) + 1);
            let derived = bare.saturating_add(slices.len() as u64).max(highest);
            u32::try_from(derived).map_err(|_| SnapshotError::TooManyGpus {
                node: name.clone(),
                count: derived,
                max: MAX_GPUS_PER_NODE,
            })?
        }
    };

    let mut allocatable = resources_from_map(&name, allocatable_raw)?;
    strip_gpu_resources(&mut allocatable);

    let mut requested = Resources::default();
    for pod in scheduled_pods.iter().filter(|p| is_bound_to(p, &name)) {
        let mut pod_requests = effective_requests(pod)?;
        strip_gpu_resources(&mut pod_requests);
        requested.add(&pod_requests);
    }

    let gpus = slices
        .into_iter()
        .map(|(index, (used, free))| Gpu {
            index,
            model: model.clone(),
            used,
            free,
        })
        .collect();

    Node::new(name, model, gpu_count, gpus, allocatable, requested).map(Some)
}

/// Convert a pending pod.
///
/// Pods requesting more than one distinct MIG profile carry no slice
/// request and are left out of partitioning decisions.
pub fn candidate_from_k8s(pod: &K8sPod) -> Result<CandidatePod, SnapshotError> {
    let name = pod.metadata.name.clone().ok_or(SnapshotError::MissingName)?;
    let namespace = pod
        .metadata
        .namespace
        .clone()
        .unwrap_or_else(|| "default".to_string());

    let mut requests = effective_requests(pod)?;
    let mig: Vec<(SliceProfile, i64)> = requests
        .scalar
        .iter()
        .filter_map(|(res, qty)| SliceProfile::from_resource_name(res).map(|p| (p, *qty)))
        .filter(|(_, qty)| *qty > 0)
        .collect();
    requests
        .scalar
        .retain(|res, _| !SliceProfile::is_mig_resource(res));

    let mut candidate = CandidatePod::new(namespace, name).with_requests(requests);
    match mig.as_slice() {
        [(profile, qty)] => {
            candidate = candidate.requesting(*profile, u32::try_from(*qty).unwrap_or(u32::MAX));
        }
        [] => {}
        _ => debug!(
            pod = %candidate.key(),
            profiles = mig.len(),
            "Pod requests several MIG profiles, ignoring it for partitioning"
        ),
    }
    Ok(candidate)
}

/// Pod resource requests as the scheduler computes them: the larger of the
/// summed app containers and any single init container, plus overhead.
pub fn effective_requests(pod: &K8sPod) -> Result<Resources, SnapshotError> {
    let object = format!(
        "{}/{}",
        pod.metadata.namespace.as_deref().unwrap_or("default"),
        pod.metadata.name.as_deref().unwrap_or("<unnamed>")
    );
    let Some(spec) = pod.spec.as_ref() else {
        return Ok(Resources::default());
    };

    let mut total = Resources::default();
    for container in &spec.containers {
        total.add(&container_requests(&object, container)?);
    }
    for container in spec.init_containers.iter().flatten() {
        total.max(&container_requests(&object, container)?);
    }
    if let Some(overhead) = &spec.overhead {
        total.add(&resources_from_map(&object, overhead)?);
    }
    Ok(total)
}

/// Requests, defaulting each missing request to its limit.
fn container_requests(object: &str, container: &Container) -> Result<Resources, SnapshotError> {
    let Some(resources) = container.resources.as_ref() else {
        return Ok(Resources::default());
    };
    let mut merged: BTreeMap<String, Quantity> = resources.limits.clone().unwrap_or_default();
    merged.extend(resources.requests.clone().unwrap_or_default());
    resources_from_map(object, &merged)
}

fn resources_from_map(
    object: &str,
    map: &BTreeMap<String, Quantity>,
) -> Result<Resources, SnapshotError> {
    let mut out = Resources::default();
    for (resource, quantity) in map {
        match resource.as_str() {
            "cpu" => {
                out.milli_cpu = parse_milli_value(&quantity.0).map_err(|source| {
                    SnapshotError::InvalidQuantity {
                        object: object.to_string(),
                        resource: resource.clone(),
                        source,
                    }
                })?
            }
            "memory" => out.memory_bytes = quantity_value(object, resource, quantity)?,
            _ => out.add_scalar(resource.clone(), quantity_value(object, resource, quantity)?),
        }
    }
    Ok(out)
}

fn quantity_value(object: &str, resource: &str, quantity: &Quantity) -> Result<i64, SnapshotError> {
    parse_value(&quantity.0).map_err(|source| SnapshotError::InvalidQuantity {
        object: object.to_string(),
        resource: resource.to_string(),
        source,
    })
}

/// GPU resources are derived from geometries, not from reported numbers.
fn strip_gpu_resources(resources: &mut Resources) {
    resources
        .scalar
        .retain(|res, _| res != GPU_RESOURCE && !SliceProfile::is_mig_resource(res));
}

fn is_bound_to(pod: &K8sPod, node: &str) -> bool {
    let bound = pod
        .spec
        .as_ref()
        .and_then(|s| s.node_name.as_deref())
        .is_some_and(|n| n == node);
    let terminal = pod
        .status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .is_some_and(|phase| TERMINAL_PHASES.contains(&phase));
    bound && !terminal
}

type SliceStatus = BTreeMap<u32, (crate::mig::Geometry, crate::mig::Geometry)>;

/// Parse `status-gpu-<index>-<profile>-<free|used>` annotations into
/// (used, free) per GPU index.
fn parse_status_annotations(
    node: &str,
    annotations: Option<&BTreeMap<String, String>>,
) -> Result<SliceStatus, SnapshotError> {
    let mut status = SliceStatus::new();
    let invalid = |key: &str, detail: &str| SnapshotError::InvalidAnnotation {
        node: node.to_string(),
        key: key.to_string(),
        detail: detail.to_string(),
    };

    let mut seen = BTreeSet::new();
    for (key, value) in annotations.into_iter().flatten() {
        let Some(rest) = key.strip_prefix(ANNOTATION_GPU_STATUS_PREFIX) else {
            continue;
        };

        let (rest, used) = if let Some(r) = rest.strip_suffix("-used") {
            (r, true)
        } else if let Some(r) = rest.strip_suffix("-free") {
            (r, false)
        } else {
            return Err(invalid(key, "expected a -free or -used suffix"));
        };

        let (index, profile) = rest
            .split_once('-')
            .ok_or_else(|| invalid(key, "expected <index>-<profile>"))?;
        let index: u32 = index.parse().map_err(|_| invalid(key, "GPU index is not a number"))?;
        let profile: SliceProfile = profile.parse().map_err(|e: crate::error::ProfileParseError| {
            invalid(key, &e.to_string())
        })?;
        let count: u32 = value
            .trim()
            .parse()
            .map_err(|_| invalid(key, "count is not a non-negative integer"))?;

        if !seen.insert((index, profile, used)) {
            return Err(invalid(key, "duplicate status entry"));
        }

        let entry = status.entry(index).or_default();
        if used {
            entry.0.add(profile, count);
        } else {
            entry.1.add(profile, count);
        }
    }

    status.retain(|_, (used, free)| !used.is_empty() || !free.is_empty());
    Ok(status)
}
