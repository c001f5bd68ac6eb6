//! API request and response types
//!
//! Every response body is a `{ data | message }` envelope: successes carry
//! the payload under `data`, failures carry a human-readable `message`.

use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;
use waste_vision_common::RawDetection;
use waste_vision_storage::{ObjectPredictionRecord, PredictionRecord};

/// Wrap a payload in the success envelope.
pub fn data<T: Serialize>(value: T) -> Json<Value> {
    Json(json!({ "data": value }))
}

/// Wrap an error description in the failure envelope.
pub fn message(text: impl Into<String>) -> Json<Value> {
    Json(json!({ "message": text.into() }))
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
}

/// Outcome of one detection upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResponse {
    /// Id of the persisted prediction aggregate
    pub prediction_id: Uuid,
    /// Model the detection ran against
    pub model_id: Uuid,
    /// URL of the stored original image
    pub original_image_url: String,
    /// URL of the stored annotated image, when annotation succeeded
    pub processed_image_url: Option<String>,
    /// Raw boxes reported by the detector
    pub detections: Vec<RawDetection>,
}

/// A stored prediction with its object records
#[derive(Debug, Clone, Serialize)]
pub struct PredictionView {
    #[serde(flatten)]
    pub prediction: PredictionRecord,
    pub objects: Vec<ObjectPredictionRecord>,
}

/// Query parameters for the prediction listing
#[derive(Debug, Clone, Deserialize)]
pub struct ListPredictionsParams {
    pub user_id: Uuid,
}
