//! MIG partitioning planner library
//!
//! This crate provides:
//! - The MIG slice catalog (profiles, geometries, known geometries per GPU model)
//! - The cluster snapshot model and its Kubernetes adapter
//! - The admission oracle abstraction
//! - The partitioning planner
//! - Health checks and observability

pub mod error;
pub mod health;
pub mod mig;
pub mod observability;
pub mod oracle;
pub mod planner;
pub mod snapshot;

pub use error::{CancelReason, CatalogError, OracleError, PlanError, SnapshotError};
pub use health::{ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse};
pub use mig::{Geometry, GpuModel, SliceCatalog, SliceProfile};
pub use observability::{PlannerMetrics, StructuredLogger};
pub use oracle::{AdmissionOracle, NodeView, ResourceFitOracle, StaticOracle, Status};
pub use planner::{CancelHandle, Plan, PlanContext, Planner, PlannerConfig};
pub use snapshot::{CandidatePod, ClusterSnapshot, Gpu, Node};
