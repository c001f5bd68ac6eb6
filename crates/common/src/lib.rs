//! Shared types for the waste-vision detection pipeline
//!
//! The pipeline crates exchange three things: the configuration of a
//! detection model, the raw boxes a detector tier reports, and the composed
//! result of one orchestration run. All three live here so the annotator,
//! gateway, storage, and orchestrator crates agree on a single shape.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Configuration of one detection model, read-only to the pipeline.
///
/// `local_model_path` is a proper optional: the legacy `"None"`/`"N/A"`
/// sentinels are decoded at the repository boundary and never travel further.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionModel {
    /// Model identifier
    pub id: Uuid,
    /// Human-readable model name
    pub name: String,
    /// Remote detection endpoint URL
    pub endpoint: String,
    /// API key for the remote endpoint
    pub api_key: String,
    /// Path handed to the local inference service, if the model has one
    pub local_model_path: Option<String>,
    /// Inactive models must never be used for detection
    pub active: bool,
}

/// Coordinate convention a detector tier reports its boxes in.
///
/// Every detection source declares its convention explicitly; nothing in the
/// pipeline guesses from coordinate magnitudes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateMode {
    /// (x, y) is the box center, all values in pixels
    CenterPixel,
    /// (x, y) is the box center, all values normalized to 0-1
    CenterNormalized,
}

/// A single detected object as reported by a detector tier.
///
/// (x, y) is the box **center**; see [`CoordinateMode`] for the pixel vs.
/// normalized distinction. The serde aliases accept the capitalized field
/// names some legacy detector deployments emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    #[serde(alias = "X")]
    pub x: f64,
    #[serde(alias = "Y")]
    pub y: f64,
    #[serde(alias = "Width")]
    pub width: f64,
    #[serde(alias = "Height")]
    pub height: f64,
    /// Confidence score (0.0-1.0)
    #[serde(alias = "Confidence")]
    pub confidence: f64,
    /// Category label (e.g. "PLASTIC")
    #[serde(alias = "Class")]
    pub class: String,
    /// Numeric class id assigned by the detector
    #[serde(default, alias = "ClassId", alias = "Class_Id")]
    pub class_id: i64,
    /// External tracking id, when the detector assigns one
    #[serde(default, alias = "DetectionId", alias = "Detection_Id")]
    pub detection_id: Option<String>,
}

/// Composed outcome of one orchestration run.
///
/// Immutable once built. Partial results are valid: a soft failure
/// mid-pipeline leaves `detections` empty and/or `processed_image_url`
/// unset while the run itself still succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    /// URL of the stored original image
    pub original_image_url: String,
    /// Raw boxes reported by the detector (empty when none were found)
    pub detections: Vec<RawDetection>,
    /// URL of the stored annotated image, when annotation succeeded
    pub processed_image_url: Option<String>,
}

impl DetectionResult {
    /// A result that carries only the stored original image.
    #[must_use]
    pub fn partial(original_image_url: String) -> Self {
        Self {
            original_image_url,
            detections: Vec::new(),
            processed_image_url: None,
        }
    }

    /// Whether the detector reported any boxes.
    #[must_use]
    pub fn has_detections(&self) -> bool {
        !self.detections.is_empty()
    }
}
