//! Admission oracle abstraction
//!
//! The planner never decides on its own whether a pod fits a node. It asks an
//! [`AdmissionOracle`], which mirrors the two scheduler phases that matter for
//! partitioning: a node-independent pre-filter and a per-node filter run
//! against a hypothetical [`NodeView`].

mod resource_fit;
mod static_oracle;
mod view;

pub use resource_fit::{ResourceFitOracle, NODE_RESOURCES_FIT};
pub use static_oracle::StaticOracle;
pub use view::NodeView;

use crate::error::OracleError;
use crate::snapshot::CandidatePod;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome code of one predicate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum Code {
    Success,
    /// The predicate itself hit a problem evaluating this pod.
    Error,
    Unschedulable,
    UnschedulableAndUnresolvable,
}

/// Result of a pre-filter or of a single filter check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: Code,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

impl Status {
    pub fn success() -> Self {
        Self {
            code: Code::Success,
            reasons: Vec::new(),
        }
    }

    pub fn unschedulable(reason: impl Into<String>) -> Self {
        Self {
            code: Code::Unschedulable,
            reasons: vec![reason.into()],
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            code: Code::Error,
            reasons: vec![reason.into()],
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Code::Success
    }
}

/// Filter results keyed by check name.
pub type FilterResult = BTreeMap<String, Status>;

/// Returns true when every filter check succeeded.
pub fn all_passed(result: &FilterResult) -> bool {
    result.values().all(Status::is_success)
}

/// Two-phase admission predicate.
///
/// A non-success [`Status`] is a rejection of the pod and never an error. An
/// `Err` means the oracle could not answer at all and aborts the planning
/// pass.
#[async_trait]
pub trait AdmissionOracle: Send + Sync {
    /// Node-independent checks. Called at most once per pod and pass.
    async fn pre_filter(&self, pod: &CandidatePod) -> Result<Status, OracleError>;

    /// Per-node checks against a hypothetical view.
    async fn filter(&self, pod: &CandidatePod, node: &NodeView)
        -> Result<FilterResult, OracleError>;
}
