//! Partitioning planner
//!
//! [`Planner::plan`] turns a [`ClusterSnapshot`] and pending pods into a
//! [`Plan`]. Each call is a pure function of its inputs and the oracle's
//! answers.
//!
//! GPUs whose models share demanded profiles form a demand group. Groups
//! are searched in parallel; inside a group GPUs are searched one after the
//! other in node and index order, and pods admitted on one GPU leave the
//! pool before the next GPU is scored.

mod context;
mod demand;
mod plan;
mod search;

pub use context::{CancelHandle, PlanContext};
pub use plan::{GpuChange, GpuPartitioning, NodePartitioning, Plan};

use crate::error::{CancelReason, PlanError};
use crate::mig::{Geometry, SliceCatalog};
use crate::observability::{outcome, PlannerMetrics, StructuredLogger};
use crate::oracle::{AdmissionOracle, NodeView};
use crate::snapshot::{CandidatePod, ClusterSnapshot, Node};
use demand::{build_demand, group_demand, DemandPod};
use search::{candidate_geometries, GeometrySearch, Interrupt, Placement};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

/// Planner tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerConfig {
    /// Demand groups searched at the same time.
    pub max_concurrency: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

/// Computes partitioning plans.
#[derive(Clone)]
pub struct Planner {
    oracle: Arc<dyn AdmissionOracle>,
    catalog: Arc<SliceCatalog>,
    config: PlannerConfig,
    metrics: PlannerMetrics,
    logger: StructuredLogger,
}

/// Final geometry of one searched GPU.
#[derive(Debug, Clone)]
struct GpuDecision {
    node: String,
    index: u32,
    geometry: Geometry,
    previous: Geometry,
    admitted: Vec<String>,
}

/// What a group worker produced before finishing or being interrupted.
struct GroupOutcome {
    decisions: Vec<GpuDecision>,
    /// Pods placed on free slices without any repartition.
    settled: usize,
    interrupt: Option<Interrupt>,
}

impl Planner {
    pub fn new(oracle: Arc<dyn AdmissionOracle>, catalog: Arc<SliceCatalog>) -> Self {
        Self {
            oracle,
            catalog,
            config: PlannerConfig::default(),
            metrics: PlannerMetrics::new(),
            logger: StructuredLogger::new("planner"),
        }
    }

    pub fn with_config(mut self, config: PlannerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn catalog(&self) -> &SliceCatalog {
        &self.catalog
    }

    /// Compute the target geometry of every GPU worth reporting.
    ///
    /// Partitioned GPUs always appear, at their current geometry unless the
    /// search picked a better one. GPUs with used slices are never changed.
    /// Unpartitioned GPUs appear only when they get a geometry.
    ///
    /// On cancellation or deadline the GPUs finalized so far are returned
    /// inside [`PlanError::Cancelled`]; that plan must not be applied.
    pub async fn plan(
        &self,
        ctx: &PlanContext,
        snapshot: &ClusterSnapshot,
        candidates: &[CandidatePod],
    ) -> Result<Plan, PlanError> {
        if snapshot.is_empty() || candidates.is_empty() {
            debug!(
                nodes = snapshot.len(),
                candidate_pods = candidates.len(),
                "Nothing to plan"
            );
            return Ok(Plan::new());
        }

        let started = Instant::now();
        let baseline = Plan::from_current(snapshot);
        if let Err(reason) = ctx.check() {
            return Err(self.cancelled(reason, baseline, 0, started));
        }

        let groups = group_demand(snapshot, &self.catalog, build_demand(candidates));
        self.logger.log_plan_started(
            snapshot.len(),
            snapshot.gpu_count(),
            candidates.len(),
            groups.len(),
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut workers = JoinSet::new();
        for group in groups {
            let worker = GroupWorker {
                oracle: Arc::clone(&self.oracle),
                catalog: Arc::clone(&self.catalog),
                ctx: ctx.clone(),
                metrics: self.metrics.clone(),
                nodes: group
                    .nodes
                    .iter()
                    .filter_map(|name| snapshot.node(name).cloned())
                    .collect(),
                pool: group.pods,
            };
            let semaphore = Arc::clone(&semaphore);
            workers.spawn(async move {
                match semaphore.acquire_owned().await {
                    Ok(_permit) => worker.run().await,
                    Err(_) => GroupOutcome {
                        decisions: Vec::new(),
                        settled: 0,
                        interrupt: Some(Interrupt::Cancelled(CancelReason::Cancelled)),
                    },
                }
            });
        }

        let mut decisions = Vec::new();
        let mut stopped: Option<CancelReason> = None;
        let mut settled = 0;
        while let Some(joined) = workers.join_next().await {
            let finished = match joined {
                Ok(finished) => finished,
                Err(e) => {
                    workers.abort_all();
                    semaphore.close();
                    return Err(self.failed(PlanError::Worker(e.to_string()), started));
                }
            };
            decisions.extend(finished.decisions);
            settled += finished.settled;
            match finished.interrupt {
                None => {}
                Some(Interrupt::Cancelled(reason)) => {
                    stopped.get_or_insert(reason);
                }
                Some(Interrupt::Oracle(err)) => {
                    workers.abort_all();
                    semaphore.close();
                    return Err(self.failed(PlanError::Oracle(err), started));
                }
            }
        }

        decisions.sort_by(|a, b| (&a.node, a.index).cmp(&(&b.node, b.index)));
        let plan = assemble(baseline, &decisions);

        if let Some(reason) = stopped {
            return Err(self.cancelled(reason, plan, decisions.len(), started));
        }

        let mut changed = 0;
        let mut admitted = settled;
        for decision in &decisions {
            admitted += decision.admitted.len();
            if decision.geometry != decision.previous {
                changed += 1;
                self.logger.log_gpu_repartitioned(
                    &decision.node,
                    decision.index,
                    &decision.previous.to_string(),
                    &decision.geometry.to_string(),
                    decision.admitted.len(),
                );
            }
        }

        self.metrics.inc_plans(outcome::SUCCESS);
        self.metrics.add_gpus_repartitioned(changed as u64);
        self.metrics.add_pods_admitted(admitted as u64);
        self.metrics
            .observe_plan_duration(started.elapsed().as_secs_f64());
        self.logger.log_plan_completed(
            plan.len(),
            changed,
            admitted,
            started.elapsed().as_millis(),
        );
        Ok(plan)
    }

    fn cancelled(
        &self,
        reason: CancelReason,
        partial: Plan,
        finalized: usize,
        started: Instant,
    ) -> PlanError {
        self.metrics.inc_plans(outcome::CANCELLED);
        self.metrics
            .observe_plan_duration(started.elapsed().as_secs_f64());
        self.logger.log_plan_cancelled(&reason.to_string(), finalized);
        PlanError::Cancelled { reason, partial }
    }

    fn failed(&self, error: PlanError, started: Instant) -> PlanError {
        self.metrics.inc_plans(outcome::FAILED);
        self.metrics
            .observe_plan_duration(started.elapsed().as_secs_f64());
        self.logger.log_plan_failed(&error.to_string());
        error
    }
}

/// Overlay searched GPUs on the pass-through entries. A GPU that stays
/// unpartitioned gets no entry.
fn assemble(mut plan: Plan, decisions: &[GpuDecision]) -> Plan {
    for decision in decisions {
        if !decision.geometry.is_empty() {
            plan.insert(&decision.node, decision.index, decision.geometry.clone());
        }
    }
    plan
}

/// Searches the GPUs of one demand group. Owns everything it touches.
struct GroupWorker {
    oracle: Arc<dyn AdmissionOracle>,
    catalog: Arc<SliceCatalog>,
    ctx: PlanContext,
    metrics: PlannerMetrics,
    nodes: Vec<Node>,
    pool: Vec<DemandPod>,
}

impl GroupWorker {
    async fn run(self) -> GroupOutcome {
        let mut outcome = GroupOutcome {
            decisions: Vec::new(),
            settled: 0,
            interrupt: None,
        };
        if let Err(interrupt) = self.search_nodes(&mut outcome).await {
            outcome.interrupt = Some(interrupt);
        }
        outcome
    }

    /// Records into `outcome` as it goes, so an interrupted search keeps
    /// the GPUs finalized before the interrupt.
    async fn search_nodes(self, outcome: &mut GroupOutcome) -> Result<(), Interrupt> {
        let GroupWorker {
            oracle,
            catalog,
            ctx,
            metrics,
            nodes,
            mut pool,
        } = self;
        let mut search = GeometrySearch::new(oracle.as_ref(), &ctx, &metrics);

        for node in &nodes {
            if pool.is_empty() {
                return Ok(());
            }
            let mut view = NodeView::from_node(node);
            let allowed = catalog.geometries_for(node.model());

            // Pods the node can take as it is never drive a repartition.
            ctx.check()?;
            let placements = search.settle(&view, &pool).await?;
            let placed = place(&mut view, &mut pool, &placements);
            if !placed.is_empty() {
                debug!(node = %node.name(), pods = ?placed, "Pods fit existing free slices");
            }
            outcome.settled += placed.len();

            for gpu in node.gpus() {
                if pool.is_empty() {
                    return Ok(());
                }
                if view.gpu_in_use(gpu.index) {
                    continue;
                }
                ctx.check()?;

                let current = gpu.current_geometry();
                let candidates = candidate_geometries(&current, allowed);
                let found = search.search(&view, gpu.index, &candidates, &pool).await?;
                metrics.inc_gpus_searched();

                view.set_geometry(gpu.index, found.geometry.clone());
                let admitted = place(&mut view, &mut pool, &found.admitted);

                debug!(
                    node = %node.name(),
                    gpu_index = gpu.index,
                    geometry = %found.geometry,
                    score = found.score,
                    remaining_demand = pool.len(),
                    "GPU searched"
                );
                outcome.decisions.push(GpuDecision {
                    node: node.name().to_string(),
                    index: gpu.index,
                    geometry: found.geometry,
                    previous: current,
                    admitted,
                });
            }
        }

        Ok(())
    }
}

/// Bind placed pods to their GPUs on `view` and remove them from `pool`.
/// Returns the keys of the placed pods.
fn place(view: &mut NodeView, pool: &mut Vec<DemandPod>, placements: &[Placement]) -> Vec<String> {
    let mut keys = Vec::with_capacity(placements.len());
    for placement in placements {
        let pod = &pool[placement.position].pod;
        view.admit_on(pod, placement.gpu);
        keys.push(pod.key());
    }

    let taken: BTreeSet<usize> = placements.iter().map(|p| p.position).collect();
    let remaining = std::mem::take(pool);
    *pool = remaining
        .into_iter()
        .enumerate()
        .filter(|(position, _)| !taken.contains(position))
        .map(|(_, item)| item)
        .collect();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mig::SliceProfile;
    use crate::oracle::StaticOracle;

    fn p(s: &str) -> SliceProfile {
        s.parse().unwrap()
    }

    fn planner() -> Planner {
        Planner::new(Arc::new(StaticOracle::accept_all()), Arc::new(SliceCatalog::builtin()))
    }

    #[tokio::test]
    async fn test_empty_inputs_yield_empty_plan() {
        let ctx = PlanContext::background();
        let pods = vec![CandidatePod::new("ns", "pd").requesting(p("1g.6gb"), 1)];

        let plan = planner().plan(&ctx, &ClusterSnapshot::empty(), &[]).await.unwrap();
        assert!(plan.is_empty());

        let plan = planner().plan(&ctx, &ClusterSnapshot::empty(), &pods).await.unwrap();
        assert!(plan.is_empty());
    }

    #[tokio::test]
    async fn test_pool_shrinks_across_gpus_of_a_node() {
        let snapshot = ClusterSnapshot::new([Node::builder("node-1", "NVIDIA-A30")
            .gpu_count(2)
            .build()
            .unwrap()])
        .unwrap();
        let pods: Vec<CandidatePod> = (0..4)
            .map(|i| CandidatePod::new("ns", format!("pd-{i}")).requesting(p("1g.6gb"), 1))
            .collect();

        let plan = planner()
            .plan(&PlanContext::background(), &snapshot, &pods)
            .await
            .unwrap();

        assert_eq!(
            plan.geometry("node-1", 0),
            Some(&Geometry::new().with(p("1g.6gb"), 4))
        );
        assert_eq!(plan.geometry("node-1", 1), None);
    }

    #[test]
    fn test_assemble_skips_unpartitioned_decisions() {
        let decisions = vec![
            GpuDecision {
                node: "node-1".into(),
                index: 0,
                geometry: Geometry::new(),
                previous: Geometry::new(),
                admitted: Vec::new(),
            },
            GpuDecision {
                node: "node-1".into(),
                index: 1,
                geometry: Geometry::new().with(p("4g.24gb"), 1),
                previous: Geometry::new(),
                admitted: vec!["ns/pd".into()],
            },
        ];

        let plan = assemble(Plan::new(), &decisions);
        assert_eq!(plan.gpu_count(), 1);
        assert!(plan.geometry("node-1", 0).is_none());
    }
}
