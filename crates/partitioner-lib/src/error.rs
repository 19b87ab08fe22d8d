//! Error types for the partitioning planner

use crate::planner::Plan;

/// A MIG profile string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid MIG profile '{0}': expected <compute>g.<memory>gb")]
pub struct ProfileParseError(pub String);

/// A Kubernetes quantity string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid quantity '{0}'")]
pub struct QuantityError(pub String);

/// Errors raised while loading the slice catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read known geometries file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse known geometries: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error(transparent)]
    Profile(#[from] ProfileParseError),

    /// A geometry lists a profile with a zero count, or no profile at all.
    #[error("model '{model}' declares an empty or zero-count geometry")]
    EmptyGeometry { model: String },

    #[error("model '{0}' has no allowed geometries")]
    NoGeometries(String),
}

/// The cluster snapshot is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    #[error("node '{0}' appears more than once")]
    DuplicateNode(String),

    #[error("node '{node}' reports GPU index {index} more than once")]
    DuplicateGpuIndex { node: String, index: u32 },

    #[error("node '{node}' reports GPU index {index} but declares only {count} GPUs")]
    GpuIndexOutOfRange { node: String, index: u32, count: u32 },

    #[error("node '{node}' declares {count} GPUs, at most {max} are supported")]
    TooManyGpus { node: String, count: u64, max: u32 },

    #[error("node '{node}': GPU {index} is a {found}, node model is {expected}")]
    GpuModelMismatch {
        node: String,
        index: u32,
        expected: String,
        found: String,
    },

    #[error("node '{node}': invalid annotation '{key}': {detail}")]
    InvalidAnnotation {
        node: String,
        key: String,
        detail: String,
    },

    #[error("node '{node}': invalid label '{key}': {detail}")]
    InvalidLabel {
        node: String,
        key: String,
        detail: String,
    },

    #[error("'{object}': resource '{resource}': {source}")]
    InvalidQuantity {
        object: String,
        resource: String,
        #[source]
        source: QuantityError,
    },

    #[error("object without a name")]
    MissingName,
}

/// The admission oracle could not answer. This is distinct from a
/// rejection, which the oracle reports through a non-success [`Status`].
///
/// [`Status`]: crate::oracle::Status
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("oracle unreachable: {0}")]
    Transport(String),

    #[error("oracle internal failure: {0}")]
    Internal(String),
}

/// Why a planning pass stopped before finishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CancelReason {
    #[error("cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Errors returned by [`Planner::plan`](crate::planner::Planner::plan).
///
/// Snapshots are validated when built, so an invalid one never reaches the
/// planner; see [`SnapshotError`].
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("admission oracle failed: {0}")]
    Oracle(#[from] OracleError),

    /// The pass stopped early. `partial` holds the GPUs finalized before the
    /// stop and must not be applied.
    #[error("planning {reason}; partial plan covers {} node(s)", partial.len())]
    Cancelled { reason: CancelReason, partial: Plan },

    #[error("planning worker failed: {0}")]
    Worker(String),
}

impl PlanError {
    /// Returns true if the error came from cancellation or a deadline.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PlanError::Cancelled { .. })
    }
}
