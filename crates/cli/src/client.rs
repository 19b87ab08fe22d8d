//! API client for communicating with the partitioner service

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Node as K8sNode, Pod as K8sPod};
use partitioner_lib::{planner::GpuChange, Geometry, GpuModel, Plan};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

/// API client for the partitioner service
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        response.json().await.context("Failed to parse response")
    }

    /// Request a partitioning plan
    pub async fn plan(&self, request: &PlanRequest) -> Result<PlanResponse> {
        self.post("v1/plan", request).await
    }

    /// Allowed geometries of a GPU model
    pub async fn geometries(&self, model: &str) -> Result<GeometriesResponse> {
        self.get(&format!("v1/geometries/{}", model)).await
    }
}

// API request and response types

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub nodes: Vec<K8sNode>,
    pub scheduled_pods: Vec<K8sPod>,
    pub candidate_pods: Vec<K8sPod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResponse {
    pub plan: Plan,
    pub changes: Vec<GpuChange>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeometriesResponse {
    pub model: GpuModel,
    pub geometries: Vec<Geometry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_geometries_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/geometries/NVIDIA-A30")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"model":"NVIDIA-A30","geometries":[{"1g.6gb":4},{"4g.24gb":1}]}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let response = client.geometries("NVIDIA-A30").await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.model.as_str(), "NVIDIA-A30");
        assert_eq!(response.geometries.len(), 2);
    }

    #[tokio::test]
    async fn test_plan_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/plan")
            .match_body(mockito::Matcher::PartialJson(
                serde_json::json!({"candidatePods": [], "timeoutSecs": 5}),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "plan": {"node-1": {"nodeName": "node-1", "gpus": [{"gpuIndex": 0, "resources": {"1g.6gb": 4}}]}},
                    "changes": [{"nodeName": "node-1", "gpuIndex": 0, "model": "NVIDIA-A30", "from": {}, "to": {"1g.6gb": 4}}],
                    "generatedAt": "2024-05-01T12:00:00Z"
                }"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let request = PlanRequest {
            nodes: vec![],
            scheduled_pods: vec![],
            candidate_pods: vec![],
            timeout_secs: Some(5),
        };
        let response = client.plan(&request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.plan.gpu_count(), 1);
        assert_eq!(response.changes.len(), 1);
        assert_eq!(response.changes[0].gpu_index, 0);
    }

    #[tokio::test]
    async fn test_error_body_surfaces_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/geometries/Tesla-T4")
            .with_status(404)
            .with_body(r#"{"error":"unknown GPU model 'Tesla-T4'"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.geometries("Tesla-T4").await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("404"));
        assert!(message.contains("unknown GPU model 'Tesla-T4'"));
    }
}
