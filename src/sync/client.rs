use serde::Serialize;

use crate::models::ingest::{
    DistanceEventPayload, HrSamplePayload, IngestResponse, Spo2SamplePayload, StepsEventPayload,
};
use crate::sync::SyncError;

/// Explicitly constructed, injected handle to the ingestion API. Lifecycle
/// belongs to whatever owns the sync loop; nothing here is global state.
pub struct IngestClient {
    http: reqwest::Client,
    base_url: String,
}

impl IngestClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        IngestClient {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    pub async fn post_steps(
        &self,
        batch: &[StepsEventPayload],
    ) -> Result<IngestResponse, SyncError> {
        self.post_batch("/ingest/steps-events", batch).await
    }

    pub async fn post_distance(
        &self,
        batch: &[DistanceEventPayload],
    ) -> Result<IngestResponse, SyncError> {
        self.post_batch("/ingest/distance-events", batch).await
    }

    pub async fn post_hr(&self, batch: &[HrSamplePayload]) -> Result<IngestResponse, SyncError> {
        self.post_batch("/ingest/hr-samples", batch).await
    }

    pub async fn post_spo2(
        &self,
        batch: &[Spo2SamplePayload],
    ) -> Result<IngestResponse, SyncError> {
        self.post_batch("/ingest/spo2-samples", batch).await
    }

    async fn post_batch<T: Serialize>(
        &self,
        path: &str,
        batch: &[T],
    ) -> Result<IngestResponse, SyncError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.post(&url).json(batch).send().await?;
        let status = response.status();
        if !status.is_success() {
            let reason = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|body| body.get("error").and_then(|e| e.as_str().map(str::to_owned)))
                .unwrap_or_else(|| format!("HTTP {}", status));
            return Err(SyncError::Rejected {
                status: status.as_u16(),
                reason,
            });
        }
        Ok(response.json::<IngestResponse>().await?)
    }
}
