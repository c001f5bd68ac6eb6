//! Two-tier object-detection gateway
//!
//! Detection runs through an ordered list of strategies: the model's remote
//! endpoint first, then the local inference service when the model carries a
//! local path. The gateway is **fail-soft**: tier failures are logged and the
//! next tier is tried; when every tier is exhausted the caller gets `None`,
//! never an error. Both tiers parse the same response shape.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use waste_vision_common::{CoordinateMode, DetectionModel, RawDetection};

/// Detector tier errors. These never escape the gateway.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("detector returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response body: {0}")]
    InvalidResponse(String),
}

/// Response envelope shared by both detector tiers.
#[derive(Debug, Deserialize)]
struct PredictionResponse {
    #[serde(default, alias = "Predictions")]
    predictions: Vec<RawDetection>,
}

/// Gateway timeouts and the local inference service address.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Timeout for the remote detection endpoint
    pub remote_timeout: Duration,
    /// Timeout for the local inference service (slower, it loads models)
    pub local_timeout: Duration,
    /// Base URL of the local inference service
    pub local_inference_url: String,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            remote_timeout: Duration::from_secs(
                std::env::var("REMOTE_DETECTOR_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            ),
            local_timeout: Duration::from_secs(
                std::env::var("LOCAL_INFERENCE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            ),
            local_inference_url: std::env::var("LOCAL_INFERENCE_URL")
                .unwrap_or_else(|_| "http://localhost:5000".to_string()),
        }
    }
}

/// Successful gateway outcome: the reporting tier's coordinate convention
/// and its boxes. A tier that found nothing still succeeds with zero boxes.
#[derive(Debug, Clone)]
pub struct Detections {
    pub mode: CoordinateMode,
    pub boxes: Vec<RawDetection>,
}

/// One detection tier. Implementations declare the coordinate convention of
/// the boxes they report; nothing downstream guesses it from magnitudes.
#[async_trait]
pub trait DetectionStrategy: Send + Sync {
    /// Tier name for logging
    fn name(&self) -> &'static str;

    /// Convention of the boxes this tier reports
    fn coordinate_mode(&self) -> CoordinateMode;

    /// Run detection against this tier
    async fn detect(&self, image: &[u8]) -> Result<Vec<RawDetection>, DetectorError>;
}

/// Primary tier: the model's hosted detection endpoint.
///
/// Posts the image base64-encoded with the API key as a query parameter.
pub struct RemoteDetector {
    client: Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl RemoteDetector {
    #[must_use]
    pub fn new(client: Client, endpoint: String, api_key: String, timeout: Duration) -> Self {
        Self {
            client,
            endpoint,
            api_key,
            timeout,
        }
    }
}

#[async_trait]
impl DetectionStrategy for RemoteDetector {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn coordinate_mode(&self) -> CoordinateMode {
        CoordinateMode::CenterPixel
    }

    async fn detect(&self, image: &[u8]) -> Result<Vec<RawDetection>, DetectorError> {
        let url = format!("{}?api_key={}", self.endpoint, self.api_key);
        info!(endpoint = %self.endpoint, "sending detection request to remote endpoint");

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .timeout(self.timeout)
            .body(BASE64.encode(image))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DetectorError::Status { status, body });
        }

        let parsed: PredictionResponse = response
            .json()
            .await
            .map_err(|e| DetectorError::InvalidResponse(e.to_string()))?;
        Ok(parsed.predictions)
    }
}

/// Fallback tier: the local inference service.
///
/// Posts the image as multipart form data together with the model path the
/// service should load.
pub struct LocalDetector {
    client: Client,
    base_url: String,
    model_path: String,
    timeout: Duration,
}

impl LocalDetector {
    #[must_use]
    pub fn new(client: Client, base_url: String, model_path: String, timeout: Duration) -> Self {
        Self {
            client,
            base_url,
            model_path,
            timeout,
        }
    }
}

#[async_trait]
impl DetectionStrategy for LocalDetector {
    fn name(&self) -> &'static str {
        "local"
    }

    fn coordinate_mode(&self) -> CoordinateMode {
        CoordinateMode::CenterPixel
    }

    async fn detect(&self, image: &[u8]) -> Result<Vec<RawDetection>, DetectorError> {
        info!(
            base_url = %self.base_url,
            model_path = %self.model_path,
            "sending detection request to local inference service"
        );

        let file = reqwest::multipart::Part::bytes(image.to_vec())
            .file_name("image.jpg")
            .mime_str("image/jpeg")?;
        let form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model_path", self.model_path.clone());

        let response = self
            .client
            .post(format!("{}/detect", self.base_url))
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DetectorError::Status { status, body });
        }

        let parsed: PredictionResponse = response
            .json()
            .await
            .map_err(|e| DetectorError::InvalidResponse(e.to_string()))?;
        Ok(parsed.predictions)
    }
}

/// Ordered detection tiers folded to the first success.
pub struct DetectorGateway {
    strategies: Vec<Box<dyn DetectionStrategy>>,
}

impl DetectorGateway {
    #[must_use]
    pub fn new(strategies: Vec<Box<dyn DetectionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Build the tier list for a model: remote endpoint first, the local
    /// inference service only when the model carries a local path.
    #[must_use]
    pub fn for_model(model: &DetectionModel, client: &Client, config: &DetectorConfig) -> Self {
        let mut strategies: Vec<Box<dyn DetectionStrategy>> = vec![Box::new(RemoteDetector::new(
            client.clone(),
            model.endpoint.clone(),
            model.api_key.clone(),
            config.remote_timeout,
        ))];

        if let Some(model_path) = &model.local_model_path {
            strategies.push(Box::new(LocalDetector::new(
                client.clone(),
                config.local_inference_url.clone(),
                model_path.clone(),
                config.local_timeout,
            )));
        }

        Self::new(strategies)
    }

    /// Try each tier in order and return the first success.
    ///
    /// Fail-soft: timeouts, transport errors, and bad statuses all fall
    /// through to the next tier; exhausting every tier yields `None`. A tier
    /// that responds successfully ends the fold even with zero boxes.
    pub async fn detect(&self, image: &[u8]) -> Option<Detections> {
        if image.is_empty() {
            warn!("detect called with an empty image payload");
            return None;
        }

        for strategy in &self.strategies {
            match strategy.detect(image).await {
                Ok(boxes) => {
                    info!(
                        tier = strategy.name(),
                        count = boxes.len(),
                        "detection tier succeeded"
                    );
                    return Some(Detections {
                        mode: strategy.coordinate_mode(),
                        boxes,
                    });
                }
                Err(err) => {
                    warn!(tier = strategy.name(), error = %err, "detection tier failed");
                }
            }
        }

        warn!("all detection tiers exhausted, returning no detections");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = DetectorConfig::default();
        assert_eq!(config.remote_timeout, Duration::from_secs(10));
        assert_eq!(config.local_timeout, Duration::from_secs(30));
        assert!(config.local_inference_url.starts_with("http"));
    }

    #[test]
    fn test_for_model_without_local_path_has_one_tier() {
        let model = DetectionModel {
            id: uuid_for_test(),
            name: "waste-v1".to_string(),
            endpoint: "https://detect.example/waste/1".to_string(),
            api_key: "key".to_string(),
            local_model_path: None,
            active: true,
        };
        let gateway =
            DetectorGateway::for_model(&model, &Client::new(), &DetectorConfig::default());
        assert_eq!(gateway.strategies.len(), 1);
        assert_eq!(gateway.strategies[0].name(), "remote");
    }

    #[test]
    fn test_for_model_with_local_path_has_two_tiers() {
        let model = DetectionModel {
            id: uuid_for_test(),
            name: "waste-v1".to_string(),
            endpoint: "https://detect.example/waste/1".to_string(),
            api_key: "key".to_string(),
            local_model_path: Some("models/waste.pt".to_string()),
            active: true,
        };
        let gateway =
            DetectorGateway::for_model(&model, &Client::new(), &DetectorConfig::default());
        assert_eq!(gateway.strategies.len(), 2);
        assert_eq!(gateway.strategies[1].name(), "local");
    }

    fn uuid_for_test() -> uuid::Uuid {
        uuid::Uuid::nil()
    }
}
