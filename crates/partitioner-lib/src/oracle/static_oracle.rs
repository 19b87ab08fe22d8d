//! Oracle with fixed answers

use super::{AdmissionOracle, FilterResult, NodeView, Status};
use crate::error::OracleError;
use crate::snapshot::CandidatePod;
use async_trait::async_trait;

/// Answers every call with the same statuses, regardless of pod or node.
///
/// Useful for dry runs and tests where admission is not the question.
#[derive(Debug, Clone)]
pub struct StaticOracle {
    pre_filter: Status,
    filter: FilterResult,
}

impl StaticOracle {
    pub fn new(pre_filter: Status, filter: FilterResult) -> Self {
        Self { pre_filter, filter }
    }

    /// Every pod is admissible everywhere.
    pub fn accept_all() -> Self {
        Self::new(Status::success(), FilterResult::new())
    }

    /// Every pod is rejected at pre-filter.
    pub fn reject_all(reason: impl Into<String>) -> Self {
        Self::new(Status::unschedulable(reason), FilterResult::new())
    }
}

#[async_trait]
impl AdmissionOracle for StaticOracle {
    async fn pre_filter(&self, _pod: &CandidatePod) -> Result<Status, OracleError> {
        Ok(self.pre_filter.clone())
    }

    async fn filter(
        &self,
        _pod: &CandidatePod,
        _node: &NodeView,
    ) -> Result<FilterResult, OracleError> {
        Ok(self.filter.clone())
    }
}
