//! Resource-fit oracle

use super::{AdmissionOracle, Code, FilterResult, NodeView, Status};
use crate::error::OracleError;
use crate::snapshot::CandidatePod;
use async_trait::async_trait;

pub const NODE_RESOURCES_FIT: &str = "NodeResourcesFit";

/// Admits a pod when the node's spare capacity covers all of its requests,
/// slices included. Equivalent to the scheduler's `NodeResourcesFit` plugin
/// without scoring.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceFitOracle;

impl ResourceFitOracle {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AdmissionOracle for ResourceFitOracle {
    async fn pre_filter(&self, _pod: &CandidatePod) -> Result<Status, OracleError> {
        Ok(Status::success())
    }

    async fn filter(
        &self,
        pod: &CandidatePod,
        node: &NodeView,
    ) -> Result<FilterResult, OracleError> {
        let missing = node.spare().insufficient_for(&pod.total_requests());
        let status = if missing.is_empty() {
            Status::success()
        } else {
            Status {
                code: Code::Unschedulable,
                reasons: missing.iter().map(|r| format!("Insufficient {}", r)).collect(),
            }
        };
        Ok(FilterResult::from([(NODE_RESOURCES_FIT.to_string(), status)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Node, Resources};

    fn view() -> NodeView {
        let node = Node::builder("node-1", "NVIDIA-A30")
            .free(0, "1g.6gb".parse().unwrap(), 2)
            .allocatable(Resources::new().with_milli_cpu(1000).with_memory(1 << 30))
            .build()
            .unwrap();
        NodeView::from_node(&node)
    }

    #[tokio::test]
    async fn test_fits() {
        let pod = CandidatePod::new("ns", "pd")
            .with_requests(Resources::new().with_milli_cpu(500))
            .requesting("1g.6gb".parse().unwrap(), 2);

        let oracle = ResourceFitOracle::new();
        assert!(oracle.pre_filter(&pod).await.unwrap().is_success());
        let result = oracle.filter(&pod, &view()).await.unwrap();
        assert!(result[NODE_RESOURCES_FIT].is_success());
    }

    #[tokio::test]
    async fn test_reports_every_insufficient_resource() {
        let pod = CandidatePod::new("ns", "pd")
            .with_requests(Resources::new().with_milli_cpu(1500))
            .requesting("2g.12gb".parse().unwrap(), 1);

        let result = ResourceFitOracle.filter(&pod, &view()).await.unwrap();
        let status = &result[NODE_RESOURCES_FIT];
        assert_eq!(status.code, Code::Unschedulable);
        assert_eq!(
            status.reasons,
            ["Insufficient cpu", "Insufficient nvidia.com/mig-2g.12gb"]
        );
    }
}
