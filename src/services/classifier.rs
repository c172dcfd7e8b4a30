//! Automatic habitat classification
//!
//! The classification model itself runs elsewhere; this is the client used by
//! re-analysis.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::db::schemas::{AnalysisResult, HabitatRecord, RecordLocation};
use crate::types::{BiotopError, Result};

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify a record; any failure surfaces as `BiotopError::Upstream`
    async fn classify(&self, record: &HabitatRecord) -> Result<AnalysisResult>;
}

/// Payload posted to the classification service
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationRequest<'a> {
    pub record_id: &'a str,
    pub location: &'a RecordLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_result: Option<&'a AnalysisResult>,
}

#[derive(Debug, Deserialize)]
pub struct ClassifierResponse {
    #[serde(default)]
    pub result: Option<AnalysisResult>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Classifier reached over HTTP
pub struct HttpClassifier {
    endpoint: String,
    http_client: reqwest::Client,
}

impl HttpClassifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BiotopError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.into(),
            http_client,
        })
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, record: &HabitatRecord) -> Result<AnalysisResult> {
        let request = ClassificationRequest {
            record_id: &record.record_id,
            location: &record.location,
            previous_result: record.auto_result.as_ref(),
        };

        debug!(record_id = %record.record_id, endpoint = %self.endpoint, "Requesting classification");

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(record_id = %record.record_id, %status, "Classifier returned error status");
            return Err(BiotopError::Upstream(format!(
                "Classifier returned {}",
                status
            )));
        }

        let body: ClassifierResponse = response.json().await?;
        interpret(body)
    }
}

fn interpret(body: ClassifierResponse) -> Result<AnalysisResult> {
    match (body.result, body.error) {
        (_, Some(error)) => Err(BiotopError::Upstream(error)),
        (Some(result), None) => Ok(result),
        (None, None) => Err(BiotopError::Upstream(
            "Classifier response carried no result".into(),
        )),
    }
}
