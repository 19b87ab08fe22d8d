//! MIG hardware model: profiles, geometries and the slice catalog

mod catalog;
mod geometry;
mod profile;

pub use catalog::SliceCatalog;
pub use geometry::Geometry;
pub use profile::{GpuModel, SliceProfile, GPU_RESOURCE, MIG_RESOURCE_PREFIX};
