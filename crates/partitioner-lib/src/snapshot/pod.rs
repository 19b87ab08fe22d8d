//! Unscheduled workloads considered by the planner

use super::Resources;
use crate::mig::SliceProfile;
use serde::{Deserialize, Serialize};

/// A request for `quantity` instances of one MIG profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceRequest {
    pub profile: SliceProfile,
    pub quantity: u32,
}

/// A pending pod.
///
/// `requests` holds everything except GPU resources and is forwarded to the
/// admission oracle untouched. Only `slice_request` drives partitioning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidatePod {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub requests: Resources,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slice_request: Option<SliceRequest>,
}

impl CandidatePod {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            requests: Resources::default(),
            slice_request: None,
        }
    }

    /// Request `quantity` instances of `profile`. A zero quantity clears the
    /// slice request.
    pub fn requesting(mut self, profile: SliceProfile, quantity: u32) -> Self {
        self.slice_request = (quantity > 0).then_some(SliceRequest { profile, quantity });
        self
    }

    pub fn with_requests(mut self, requests: Resources) -> Self {
        self.requests = requests;
        self
    }

    /// `namespace/name`
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// All requested resources including the MIG extended resource.
    pub fn total_requests(&self) -> Resources {
        let mut total = self.requests.clone();
        if let Some(request) = &self.slice_request {
            total.add_scalar(request.profile.resource_name(), i64::from(request.quantity));
        }
        total
    }
}
