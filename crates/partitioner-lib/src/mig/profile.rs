//! MIG profiles and GPU models

use crate::error::ProfileParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix of the extended resource a MIG profile is exposed as.
pub const MIG_RESOURCE_PREFIX: &str = "nvidia.com/mig-";

/// Extended resource for a whole, unpartitioned GPU.
pub const GPU_RESOURCE: &str = "nvidia.com/gpu";

/// A MIG instance shape, e.g. `1g.6gb`.
///
/// Profiles order by capacity: memory first, then compute slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SliceProfile {
    // Field order drives the derived ordering.
    memory_gb: u16,
    compute: u8,
}

impl SliceProfile {
    pub fn new(compute: u8, memory_gb: u16) -> Self {
        Self { memory_gb, compute }
    }

    /// Number of compute slices (the `g` part).
    pub fn compute(&self) -> u8 {
        self.compute
    }

    /// Memory in GB (the `gb` part).
    pub fn memory_gb(&self) -> u16 {
        self.memory_gb
    }

    /// The extended resource name, e.g. `nvidia.com/mig-1g.6gb`.
    pub fn resource_name(&self) -> String {
        format!("{}{}", MIG_RESOURCE_PREFIX, self)
    }

    /// Parse an extended resource name. Returns `None` for anything that is
    /// not a MIG resource.
    pub fn from_resource_name(name: &str) -> Option<Self> {
        name.strip_prefix(MIG_RESOURCE_PREFIX)
            .and_then(|p| p.parse().ok())
    }

    /// Returns true if the resource name refers to a MIG profile.
    pub fn is_mig_resource(name: &str) -> bool {
        name.starts_with(MIG_RESOURCE_PREFIX)
    }
}

impl fmt::Display for SliceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}g.{}gb", self.compute, self.memory_gb)
    }
}

impl FromStr for SliceProfile {
    type Err = ProfileParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ProfileParseError(s.to_string());

        let (compute, memory) = s.split_once('.').ok_or_else(err)?;
        let compute = compute
            .strip_suffix('g')
            .and_then(|c| c.parse::<u8>().ok())
            .filter(|c| *c > 0)
            .ok_or_else(err)?;
        let memory_gb = memory
            .strip_suffix("gb")
            .and_then(|m| m.parse::<u16>().ok())
            .filter(|m| *m > 0)
            .ok_or_else(err)?;

        Ok(Self::new(compute, memory_gb))
    }
}

impl TryFrom<String> for SliceProfile {
    type Error = ProfileParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SliceProfile> for String {
    fn from(profile: SliceProfile) -> Self {
        profile.to_string()
    }
}

/// GPU product name as reported by the node, e.g. `NVIDIA-A30`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GpuModel(String);

impl GpuModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GpuModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GpuModel {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let profile: SliceProfile = "1g.6gb".parse().unwrap();
        assert_eq!(profile.compute(), 1);
        assert_eq!(profile.memory_gb(), 6);
        assert_eq!(profile.to_string(), "1g.6gb");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "1g", "g.6gb", "1g.gb", "0g.5gb", "1x.5gb", "1g.5mb", "nvidia.com/mig-1g.5gb"] {
            assert!(bad.parse::<SliceProfile>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_resource_name_round_trip() {
        let profile = SliceProfile::new(2, 12);
        assert_eq!(profile.resource_name(), "nvidia.com/mig-2g.12gb");
        assert_eq!(
            SliceProfile::from_resource_name("nvidia.com/mig-2g.12gb"),
            Some(profile)
        );
        assert_eq!(SliceProfile::from_resource_name("nvidia.com/gpu"), None);
        assert_eq!(SliceProfile::from_resource_name("cpu"), None);
    }

    #[test]
    fn test_ordering_by_memory_then_compute() {
        let mut profiles: Vec<SliceProfile> = ["4g.20gb", "1g.5gb", "3g.20gb", "2g.10gb", "7g.40gb"]
            .iter()
            .map(|p| p.parse().unwrap())
            .collect();
        profiles.sort();

        let names: Vec<String> = profiles.iter().map(|p| p.to_string()).collect();
        assert_eq!(names, ["1g.5gb", "2g.10gb", "3g.20gb", "4g.20gb", "7g.40gb"]);
    }

    #[test]
    fn test_serde_as_string() {
        let profile = SliceProfile::new(3, 20);
        let json = serde_json::to_string(&profile).unwrap();
        assert_eq!(json, "\"3g.20gb\"");

        let back: SliceProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, profile);
        assert!(serde_json::from_str::<SliceProfile>("\"bogus\"").is_err());
    }
}
