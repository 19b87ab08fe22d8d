//! Observability infrastructure for the partitioning planner
//!
//! Provides:
//! - Prometheus metrics (plan latency, outcomes, GPUs searched and changed, oracle calls)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for planning passes (in seconds)
const PLAN_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PlannerMetricsInner> = OnceLock::new();

struct PlannerMetricsInner {
    plan_duration_seconds: Histogram,
    plans_total: IntCounterVec,
    gpus_searched: IntCounter,
    gpus_repartitioned: IntCounter,
    oracle_calls: IntCounterVec,
    pods_admitted: IntCounter,
}

impl PlannerMetricsInner {
    fn new() -> Self {
        Self {
            plan_duration_seconds: register_histogram!(
                "mig_partitioner_plan_duration_seconds",
                "Time spent computing a partitioning plan",
                PLAN_BUCKETS.to_vec()
            )
            .expect("Failed to register plan_duration_seconds"),

            plans_total: register_int_counter_vec!(
                "mig_partitioner_plans_total",
                "Planning passes by outcome",
                &["outcome"]
            )
            .expect("Failed to register plans_total"),

            gpus_searched: register_int_counter!(
                "mig_partitioner_gpus_searched_total",
                "GPUs whose candidate geometries were scored"
            )
            .expect("Failed to register gpus_searched_total"),

            gpus_repartitioned: register_int_counter!(
                "mig_partitioner_gpus_repartitioned_total",
                "GPUs assigned a geometry different from their current one"
            )
            .expect("Failed to register gpus_repartitioned_total"),

            oracle_calls: register_int_counter_vec!(
                "mig_partitioner_oracle_calls_total",
                "Admission oracle invocations by phase",
                &["phase"]
            )
            .expect("Failed to register oracle_calls_total"),

            pods_admitted: register_int_counter!(
                "mig_partitioner_pods_admitted_total",
                "Candidate pods satisfied by returned plans"
            )
            .expect("Failed to register pods_admitted_total"),
        }
    }
}

/// Outcome label values for `mig_partitioner_plans_total`
pub mod outcome {
    pub const SUCCESS: &str = "success";
    pub const CANCELLED: &str = "cancelled";
    pub const FAILED: &str = "failed";
}

/// Phase label values for `mig_partitioner_oracle_calls_total`
pub mod phase {
    pub const PRE_FILTER: &str = "pre_filter";
    pub const FILTER: &str = "filter";
}

/// Planner metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance. Clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct PlannerMetrics {
    _private: (),
}

impl Default for PlannerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PlannerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PlannerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PlannerMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_plan_duration(&self, duration_secs: f64) {
        self.inner().plan_duration_seconds.observe(duration_secs);
    }

    pub fn inc_plans(&self, outcome: &str) {
        self.inner().plans_total.with_label_values(&[outcome]).inc();
    }

    pub fn inc_gpus_searched(&self) {
        self.inner().gpus_searched.inc();
    }

    pub fn add_gpus_repartitioned(&self, count: u64) {
        self.inner().gpus_repartitioned.inc_by(count);
    }

    pub fn inc_oracle_calls(&self, phase: &str) {
        self.inner().oracle_calls.with_label_values(&[phase]).inc();
    }

    pub fn add_pods_admitted(&self, count: u64) {
        self.inner().pods_admitted.inc_by(count);
    }
}

/// Structured logger for planner events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_plan_started(&self, nodes: usize, gpus: usize, pods: usize, groups: usize) {
        info!(
            event = "plan_started",
            instance = %self.instance,
            nodes = nodes,
            gpus = gpus,
            candidate_pods = pods,
            demand_groups = groups,
            "Planning pass started"
        );
    }

    pub fn log_gpu_repartitioned(
        &self,
        node: &str,
        gpu_index: u32,
        from: &str,
        to: &str,
        admitted_pods: usize,
    ) {
        info!(
            event = "gpu_repartitioned",
            instance = %self.instance,
            node = %node,
            gpu_index = gpu_index,
            from = %from,
            to = %to,
            admitted_pods = admitted_pods,
            "GPU assigned a new geometry"
        );
    }

    pub fn log_plan_completed(&self, nodes: usize, changed_gpus: usize, admitted_pods: usize, duration_ms: u128) {
        info!(
            event = "plan_completed",
            instance = %self.instance,
            nodes = nodes,
            changed_gpus = changed_gpus,
            admitted_pods = admitted_pods,
            duration_ms = duration_ms as u64,
            "Planning pass completed"
        );
    }

    pub fn log_plan_cancelled(&self, reason: &str, finalized_gpus: usize) {
        warn!(
            event = "plan_cancelled",
            instance = %self.instance,
            reason = %reason,
            finalized_gpus = finalized_gpus,
            "Planning pass stopped early, result is partial"
        );
    }

    pub fn log_plan_failed(&self, error: &str) {
        warn!(
            event = "plan_failed",
            instance = %self.instance,
            error = %error,
            "Planning pass failed"
        );
    }

    pub fn log_startup(&self, version: &str, catalog_models: usize) {
        info!(
            event = "partitioner_started",
            instance = %self.instance,
            version = %version,
            catalog_models = catalog_models,
            "MIG partitioner started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "partitioner_shutdown",
            instance = %self.instance,
            reason = %reason,
            "MIG partitioner shutting down"
        );
    }
}
