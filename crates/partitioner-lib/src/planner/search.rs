//! Per-GPU geometry search and scoring

use super::context::PlanContext;
use super::demand::DemandPod;
use crate::error::{CancelReason, OracleError};
use crate::mig::{Geometry, SliceProfile};
use crate::observability::{phase, PlannerMetrics};
use crate::oracle::{all_passed, AdmissionOracle, NodeView};
use crate::snapshot::SliceRequest;
use std::collections::HashMap;
use tracing::trace;

/// Why a search stopped without an outcome.
#[derive(Debug, Clone)]
pub(crate) enum Interrupt {
    Cancelled(CancelReason),
    Oracle(OracleError),
}

impl From<CancelReason> for Interrupt {
    fn from(reason: CancelReason) -> Self {
        Interrupt::Cancelled(reason)
    }
}

impl From<OracleError> for Interrupt {
    fn from(err: OracleError) -> Self {
        Interrupt::Oracle(err)
    }
}

/// Unbound slots of one node, one entry per (GPU, profile).
///
/// Entries are kept in placement order: a pod takes slots from the first
/// entry with room, so GPUs whose layout is already settled fill up before
/// the GPU being searched, which fills up before GPUs still to be searched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SlotArena {
    gpus: Vec<u32>,
    profiles: Vec<SliceProfile>,
    remaining: Vec<u32>,
}

impl SlotArena {
    /// Slots of `view` while GPU `searched` is being searched. With no
    /// searched GPU, every GPU counts as settled.
    pub fn new(view: &NodeView, searched: Option<u32>) -> Self {
        let mut slots: Vec<(u32, SliceProfile, u32)> = view.free_slots().collect();
        slots.sort_by_key(|(gpu, _, _)| {
            let rank = match searched {
                None => 0,
                Some(s) if *gpu < s || view.gpu_in_use(*gpu) => 0,
                Some(s) if *gpu == s => 1,
                Some(_) => 2,
            };
            (rank, *gpu)
        });

        let mut arena = Self {
            gpus: Vec::with_capacity(slots.len()),
            profiles: Vec::with_capacity(slots.len()),
            remaining: Vec::with_capacity(slots.len()),
        };
        for (gpu, profile, free) in slots {
            arena.gpus.push(gpu);
            arena.profiles.push(profile);
            arena.remaining.push(free);
        }
        arena
    }

    fn slot(&self, request: &SliceRequest) -> Option<usize> {
        (0..self.profiles.len())
            .find(|&i| self.profiles[i] == request.profile && self.remaining[i] >= request.quantity)
    }

    pub fn has_room(&self, request: &SliceRequest) -> bool {
        self.slot(request).is_some()
    }

    /// Take slots for `request` and return the GPU they come from, or None,
    /// leaving the arena untouched, when no single GPU has enough room.
    pub fn consume(&mut self, request: &SliceRequest) -> Option<u32> {
        let i = self.slot(request)?;
        self.remaining[i] -= request.quantity;
        Some(self.gpus[i])
    }
}

/// A pool pod admitted on the node and the GPU holding its slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Placement {
    pub position: usize,
    pub gpu: u32,
}

/// Winning geometry of one GPU and where the pods it admits are placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SearchOutcome {
    pub geometry: Geometry,
    pub score: usize,
    pub admitted: Vec<Placement>,
}

/// Scores candidate geometries for the GPUs of one demand group.
///
/// Pre-filter answers do not depend on the node, so they are cached per pod
/// for the lifetime of the search.
pub(crate) struct GeometrySearch<'a> {
    oracle: &'a dyn AdmissionOracle,
    ctx: &'a PlanContext,
    metrics: &'a PlannerMetrics,
    pre_filter: HashMap<usize, bool>,
}

impl<'a> GeometrySearch<'a> {
    pub fn new(
        oracle: &'a dyn AdmissionOracle,
        ctx: &'a PlanContext,
        metrics: &'a PlannerMetrics,
    ) -> Self {
        Self {
            oracle,
            ctx,
            metrics,
            pre_filter: HashMap::new(),
        }
    }

    /// Pick the best geometry for GPU `index` of `base`.
    ///
    /// `candidates` must start with the GPU's current geometry. A candidate
    /// replaces the best so far only with a higher score, or an equal score
    /// and strictly fewer changes from the current geometry. Remaining ties
    /// therefore keep the current geometry, then the earliest catalog entry.
    pub async fn search(
        &mut self,
        base: &NodeView,
        index: u32,
        candidates: &[Geometry],
        pool: &[DemandPod],
    ) -> Result<SearchOutcome, Interrupt> {
        let current = base.gpu_geometry(index).cloned().unwrap_or_default();
        let mut best: Option<(SearchOutcome, u32)> = None;

        for candidate in candidates {
            let (score, admitted) = self.score(base, index, candidate, pool).await?;
            let distance = candidate.distance(&current);
            trace!(
                node = %base.name(),
                gpu_index = index,
                geometry = %candidate,
                score = score,
                distance = distance,
                "Scored candidate geometry"
            );

            let replace = match &best {
                None => true,
                Some((b, d)) => score > b.score || (score == b.score && distance < *d),
            };
            if replace {
                best = Some((
                    SearchOutcome {
                        geometry: candidate.clone(),
                        score,
                        admitted,
                    },
                    distance,
                ));
            }
        }

        Ok(best.map(|(outcome, _)| outcome).unwrap_or(SearchOutcome {
            geometry: current,
            score: 0,
            admitted: Vec::new(),
        }))
    }

    /// Place pool pods on the free slots `base` already offers, without
    /// touching any geometry.
    pub async fn settle(
        &mut self,
        base: &NodeView,
        pool: &[DemandPod],
    ) -> Result<Vec<Placement>, Interrupt> {
        let mut view = base.clone();
        let arena = SlotArena::new(&view, None);
        self.admit_pool(&mut view, arena, pool).await
    }

    /// Number of pool pods admitted with GPU `index` set to `candidate`, and
    /// their placements.
    ///
    /// The score covers the whole node: pods fitting slices of other GPUs
    /// count for every candidate alike, so they never justify a change.
    async fn score(
        &mut self,
        base: &NodeView,
        index: u32,
        candidate: &Geometry,
        pool: &[DemandPod],
    ) -> Result<(usize, Vec<Placement>), Interrupt> {
        let mut view = base.with_geometry(index, candidate.clone());
        let arena = SlotArena::new(&view, Some(index));
        let admitted = self.admit_pool(&mut view, arena, pool).await?;
        Ok((admitted.len(), admitted))
    }

    /// Try pods in pool order against `view`; each admitted pod consumes its
    /// slots and resources before the next one is tried.
    async fn admit_pool(
        &mut self,
        view: &mut NodeView,
        mut arena: SlotArena,
        pool: &[DemandPod],
    ) -> Result<Vec<Placement>, Interrupt> {
        let mut admitted = Vec::new();

        for (position, item) in pool.iter().enumerate() {
            if !arena.has_room(&item.request) {
                continue;
            }
            if !self.passes_pre_filter(item).await? {
                continue;
            }

            self.ctx.check()?;
            self.metrics.inc_oracle_calls(phase::FILTER);
            let result = self.oracle.filter(&item.pod, view).await?;
            if !all_passed(&result) {
                continue;
            }

            if let Some(gpu) = arena.consume(&item.request) {
                view.admit_on(&item.pod, gpu);
                admitted.push(Placement { position, gpu });
            }
        }

        Ok(admitted)
    }

    async fn passes_pre_filter(&mut self, item: &DemandPod) -> Result<bool, Interrupt> {
        if let Some(passed) = self.pre_filter.get(&item.arrival) {
            return Ok(*passed);
        }
        self.ctx.check()?;
        self.metrics.inc_oracle_calls(phase::PRE_FILTER);
        let passed = self.oracle.pre_filter(&item.pod).await?.is_success();
        self.pre_filter.insert(item.arrival, passed);
        Ok(passed)
    }
}

/// Current geometry first, then catalog entries not equal to it.
pub(crate) fn candidate_geometries(current: &Geometry, catalog: &[Geometry]) -> Vec<Geometry> {
    std::iter::once(current.clone())
        .chain(catalog.iter().filter(|g| *g != current).cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Node;

    fn p(s: &str) -> SliceProfile {
        s.parse().unwrap()
    }

    fn request(profile: &str, quantity: u32) -> SliceRequest {
        SliceRequest {
            profile: p(profile),
            quantity,
        }
    }

    fn view(gpus: &[(u32, Geometry)]) -> NodeView {
        let mut node = Node::builder("node-1", "NVIDIA-A30").gpu_count(3);
        for (index, geometry) in gpus {
            node = node.free_geometry(*index, geometry.clone());
        }
        NodeView::from_node(&node.build().unwrap())
    }

    #[test]
    fn test_arena_consumes_without_double_counting() {
        let geometry = Geometry::new().with(p("1g.6gb"), 2).with(p("2g.12gb"), 1);
        let mut arena = SlotArena::new(&view(&[(0, geometry)]), Some(0));

        assert_eq!(arena.consume(&request("1g.6gb", 1)), Some(0));
        assert_eq!(arena.consume(&request("1g.6gb", 1)), Some(0));
        assert!(!arena.has_room(&request("1g.6gb", 1)));
        assert_eq!(arena.consume(&request("1g.6gb", 1)), None);

        assert_eq!(arena.consume(&request("2g.12gb", 2)), None);
        assert_eq!(arena.consume(&request("2g.12gb", 1)), Some(0));
        assert!(!arena.has_room(&request("4g.24gb", 1)));
    }

    #[test]
    fn test_arena_fills_settled_gpus_first() {
        let four = Geometry::new().with(p("1g.6gb"), 4);
        let two = Geometry::new().with(p("1g.6gb"), 2).with(p("2g.12gb"), 1);
        let node = view(&[(0, two.clone()), (1, four.clone()), (2, two)]);

        // GPU 0 is settled, GPU 1 is searched, GPU 2 comes later.
        let mut arena = SlotArena::new(&node, Some(1));
        let placed: Vec<Option<u32>> = (0..8).map(|_| arena.consume(&request("1g.6gb", 1))).collect();
        assert_eq!(
            placed,
            [Some(0), Some(0), Some(1), Some(1), Some(1), Some(1), Some(2), Some(2)]
        );
        assert_eq!(arena.consume(&request("1g.6gb", 1)), None);
    }

    #[test]
    fn test_candidates_start_with_current_without_duplicates() {
        let current = Geometry::new().with(p("2g.12gb"), 2);
        let catalog = vec![
            Geometry::new().with(p("1g.6gb"), 4),
            current.clone(),
            Geometry::new().with(p("4g.24gb"), 1),
        ];

        let candidates = candidate_geometries(&current, &catalog);
        assert_eq!(
            candidates,
            [current, catalog[0].clone(), catalog[2].clone()]
        );
    }
}
