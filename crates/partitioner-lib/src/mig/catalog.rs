//! Slice catalog: the allowed geometries of each GPU model
//!
//! The catalog is pure data. It is loaded from a known-geometries YAML file
//! (or the embedded default) and only ever read by the planner.

use super::{Geometry, GpuModel, SliceProfile};
use crate::error::CatalogError;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Catalog shipped with the crate.
const BUILTIN_GEOMETRIES: &str = include_str!("known_geometries.yaml");

/// One entry of the known-geometries file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogEntry {
    models: Vec<GpuModel>,
    allowed_geometries: Vec<BTreeMap<String, u32>>,
}

/// Allowed geometries per GPU model, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct SliceCatalog {
    geometries: BTreeMap<GpuModel, Vec<Geometry>>,
}

impl SliceCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// The embedded catalog covering A30, A100 and H100 models.
    pub fn builtin() -> Self {
        Self::from_yaml_str(BUILTIN_GEOMETRIES).expect("embedded known geometries are valid")
    }

    /// Load a known-geometries file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    /// Parse the known-geometries YAML format.
    pub fn from_yaml_str(content: &str) -> Result<Self, CatalogError> {
        let entries: Vec<CatalogEntry> = serde_yaml::from_str(content)?;
        let mut catalog = Self::new();

        for entry in entries {
            let model_name = entry
                .models
                .first()
                .map(|m| m.to_string())
                .unwrap_or_default();

            let mut geometries = Vec::with_capacity(entry.allowed_geometries.len());
            for raw in entry.allowed_geometries {
                if raw.is_empty() || raw.values().any(|count| *count == 0) {
                    return Err(CatalogError::EmptyGeometry { model: model_name });
                }
                let mut geometry = Geometry::new();
                for (profile, count) in raw {
                    geometry.add(profile.parse::<SliceProfile>()?, count);
                }
                geometries.push(geometry);
            }

            if geometries.is_empty() {
                return Err(CatalogError::NoGeometries(model_name));
            }

            for model in entry.models {
                catalog.insert(model, geometries.iter().cloned());
            }
        }

        tracing::debug!(models = catalog.geometries.len(), "Loaded slice catalog");
        Ok(catalog)
    }

    /// Append geometries for `model`, skipping ones already present.
    pub fn insert(&mut self, model: GpuModel, geometries: impl IntoIterator<Item = Geometry>) {
        let known = self.geometries.entry(model).or_default();
        for geometry in geometries {
            if !known.contains(&geometry) {
                known.push(geometry);
            }
        }
    }

    pub fn with_model(
        mut self,
        model: impl Into<GpuModel>,
        geometries: impl IntoIterator<Item = Geometry>,
    ) -> Self {
        self.insert(model.into(), geometries);
        self
    }

    /// Allowed geometries for `model`. Unknown models have none.
    pub fn geometries_for(&self, model: &GpuModel) -> &[Geometry] {
        self.geometries
            .get(model)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_known(&self, model: &GpuModel) -> bool {
        self.geometries.contains_key(model)
    }

    pub fn models(&self) -> impl Iterator<Item = &GpuModel> {
        self.geometries.keys()
    }

    /// Returns true if `geometry` is an allowed layout for `model`.
    pub fn allows(&self, model: &GpuModel, geometry: &Geometry) -> bool {
        self.geometries_for(model).contains(geometry)
    }

    /// Returns true if any allowed geometry of `model` offers `profile`.
    pub fn supports_profile(&self, model: &GpuModel, profile: &SliceProfile) -> bool {
        self.geometries_for(model)
            .iter()
            .any(|g| g.contains(profile))
    }

    /// All profiles that appear in some geometry of `model`.
    pub fn profiles_for(&self, model: &GpuModel) -> BTreeSet<SliceProfile> {
        self.geometries_for(model)
            .iter()
            .flat_map(|g| g.profiles().copied())
            .collect()
    }
}
