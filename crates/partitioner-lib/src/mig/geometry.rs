//! GPU partition geometries

use super::SliceProfile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A complete partition of one GPU: how many instances of each profile.
///
/// Zero counts are never stored, so two geometries describing the same
/// layout always compare equal. The empty geometry is an unpartitioned GPU.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "BTreeMap<SliceProfile, u32>")]
pub struct Geometry(BTreeMap<SliceProfile, u32>);

impl Geometry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count of instances of `profile`.
    pub fn get(&self, profile: &SliceProfile) -> u32 {
        self.0.get(profile).copied().unwrap_or(0)
    }

    /// Set the count for `profile`, removing it when `count` is zero.
    pub fn set(&mut self, profile: SliceProfile, count: u32) {
        if count == 0 {
            self.0.remove(&profile);
        } else {
            self.0.insert(profile, count);
        }
    }

    /// Add `count` instances of `profile`.
    pub fn add(&mut self, profile: SliceProfile, count: u32) {
        let current = self.get(&profile);
        self.set(profile, current.saturating_add(count));
    }

    pub fn with(mut self, profile: SliceProfile, count: u32) -> Self {
        self.add(profile, count);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of instances across profiles.
    pub fn total_slices(&self) -> u32 {
        self.0.values().sum()
    }

    pub fn contains(&self, profile: &SliceProfile) -> bool {
        self.0.contains_key(profile)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SliceProfile, &u32)> {
        self.0.iter()
    }

    pub fn profiles(&self) -> impl Iterator<Item = &SliceProfile> {
        self.0.keys()
    }

    /// Per-profile sum of both geometries.
    pub fn merged(&self, other: &Geometry) -> Geometry {
        let mut out = self.clone();
        for (profile, count) in other.iter() {
            out.add(*profile, *count);
        }
        out
    }

    /// Number of instance additions and removals needed to turn `self`
    /// into `other`.
    pub fn distance(&self, other: &Geometry) -> u32 {
        let mut distance = 0;
        for profile in self.profiles().chain(other.profiles().filter(|p| !self.contains(p))) {
            distance += self.get(profile).abs_diff(other.get(profile));
        }
        distance
    }
}

impl From<BTreeMap<SliceProfile, u32>> for Geometry {
    fn from(map: BTreeMap<SliceProfile, u32>) -> Self {
        map.into_iter().collect()
    }
}

impl FromIterator<(SliceProfile, u32)> for Geometry {
    fn from_iter<I: IntoIterator<Item = (SliceProfile, u32)>>(iter: I) -> Self {
        let mut geometry = Geometry::new();
        for (profile, count) in iter {
            geometry.add(profile, count);
        }
        geometry
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("<unpartitioned>");
        }
        let parts: Vec<String> = self
            .iter()
            .map(|(profile, count)| format!("{}x{}", count, profile))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> SliceProfile {
        s.parse().unwrap()
    }

    #[test]
    fn test_zero_counts_are_dropped() {
        let mut g = Geometry::new().with(p("1g.6gb"), 2);
        g.set(p("1g.6gb"), 0);
        assert!(g.is_empty());
        assert_eq!(g, Geometry::new());

        let from_map: Geometry = [(p("2g.12gb"), 0), (p("1g.6gb"), 4)].into_iter().collect();
        assert_eq!(from_map, Geometry::new().with(p("1g.6gb"), 4));
    }

    #[test]
    fn test_distance() {
        let current = Geometry::new().with(p("1g.6gb"), 4);
        let mixed = Geometry::new().with(p("1g.6gb"), 2).with(p("2g.12gb"), 1);
        let whole = Geometry::new().with(p("4g.24gb"), 1);

        assert_eq!(current.distance(&current), 0);
        assert_eq!(current.distance(&mixed), 3);
        assert_eq!(mixed.distance(&current), 3);
        assert_eq!(current.distance(&whole), 5);
        assert_eq!(Geometry::new().distance(&whole), 1);
    }

    #[test]
    fn test_merged_and_totals() {
        let used = Geometry::new().with(p("1g.5gb"), 1);
        let free = Geometry::new().with(p("1g.5gb"), 2).with(p("2g.10gb"), 1);
        let merged = used.merged(&free);

        assert_eq!(merged.get(&p("1g.5gb")), 3);
        assert_eq!(merged.get(&p("2g.10gb")), 1);
        assert_eq!(merged.total_slices(), 4);
    }

    #[test]
    fn test_serde_map_with_profile_keys() {
        let g = Geometry::new().with(p("1g.6gb"), 2).with(p("2g.12gb"), 1);
        let json = serde_json::to_string(&g).unwrap();
        assert_eq!(json, r#"{"1g.6gb":2,"2g.12gb":1}"#);

        let back: Geometry = serde_json::from_str(r#"{"2g.12gb":1,"1g.6gb":2,"4g.24gb":0}"#).unwrap();
        assert_eq!(back, g);
    }

    #[test]
    fn test_display() {
        let g = Geometry::new().with(p("1g.6gb"), 2).with(p("2g.12gb"), 1);
        assert_eq!(g.to_string(), "2x1g.6gb, 1x2g.12gb");
        assert_eq!(Geometry::new().to_string(), "<unpartitioned>");
    }
}
