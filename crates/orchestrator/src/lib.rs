//! Detection pipeline orchestration
//!
//! One upload request runs through a fixed sequence of stages: validate the
//! model, persist the original image, detect, annotate, persist the
//! annotated image, compose the result. Stages past the original-image write
//! fail **soft**: the pipeline logs the stage and returns whatever partial
//! result it has instead of erroring. Only a missing/inactive model, a
//! failed original-image write, or a genuinely unexpected error abort the
//! run.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;
use waste_vision_annotator::Annotator;
use waste_vision_common::{DetectionModel, DetectionResult};
use waste_vision_detector::{DetectorConfig, DetectorGateway, Detections};
use waste_vision_storage::{ModelRepository, ObjectStorage};

/// Filename prefix for stored original images.
const ORIGINAL_PREFIX: &str = "detection_";
/// Filename prefix for stored annotated images.
const PROCESSED_PREFIX: &str = "processed_";

/// Hard pipeline failures. Everything else degrades to a partial result.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("model not found: {0}")]
    ModelNotFound(Uuid),

    #[error("model {0} is not active")]
    ModelInactive(Uuid),

    #[error("failed to store uploaded image: {0}")]
    Storage(String),

    #[error("detection pipeline failure: {0}")]
    Internal(String),
}

/// One uploaded image as received at the HTTP boundary.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    /// Original filename extension, used for the stored blob
    pub extension: String,
}

/// Fail-soft detection seam.
///
/// The production implementation wraps the two-tier gateway; tests substitute
/// canned outcomes. `None` means every tier was exhausted.
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    async fn detect(&self, model: &DetectionModel, image: &[u8]) -> Option<Detections>;
}

/// Production detector: builds a per-model gateway over a shared HTTP client.
pub struct GatewayDetector {
    client: reqwest::Client,
    config: DetectorConfig,
}

impl GatewayDetector {
    #[must_use]
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl ObjectDetector for GatewayDetector {
    async fn detect(&self, model: &DetectionModel, image: &[u8]) -> Option<Detections> {
        DetectorGateway::for_model(model, &self.client, &self.config)
            .detect(image)
            .await
    }
}

/// The detection pipeline over its injected collaborators.
pub struct DetectionPipeline {
    models: Arc<dyn ModelRepository>,
    storage: Arc<dyn ObjectStorage>,
    detector: Arc<dyn ObjectDetector>,
    annotator: Arc<Annotator>,
}

impl DetectionPipeline {
    #[must_use]
    pub fn new(
        models: Arc<dyn ModelRepository>,
        storage: Arc<dyn ObjectStorage>,
        detector: Arc<dyn ObjectDetector>,
        annotator: Arc<Annotator>,
    ) -> Self {
        Self {
            models,
            storage,
            detector,
            annotator,
        }
    }

    /// Run the full pipeline for one upload.
    ///
    /// Soft-failure stages return early with the partial result built so
    /// far; see the crate docs for the taxonomy.
    pub async fn run(
        &self,
        upload: UploadedImage,
        model_id: Uuid,
    ) -> Result<DetectionResult, PipelineError> {
        // Stage 1: the model must exist and be active before anything is
        // written.
        let model = self
            .models
            .get_by_id(model_id)
            .await
            .map_err(|e| PipelineError::Internal(e.to_string()))?
            .ok_or(PipelineError::ModelNotFound(model_id))?;

        if !model.active {
            error!(%model_id, "detection requested against an inactive model");
            return Err(PipelineError::ModelInactive(model_id));
        }

        // Stage 2: persist the original image. Nothing downstream can
        // proceed without a stored original, so this failure is hard.
        let original_image_url = self
            .storage
            .save(&upload.bytes, ORIGINAL_PREFIX, &upload.extension)
            .await
            .map_err(|e| {
                error!(%model_id, error = %e, "failed to store original image");
                PipelineError::Storage(e.to_string())
            })?;
        info!(%model_id, url = %original_image_url, "stored original image");

        // Stage 3: an empty upload still yields a result carrying the
        // stored URL.
        if upload.bytes.is_empty() {
            warn!(%model_id, "uploaded image is empty, skipping detection");
            return Ok(DetectionResult::partial(original_image_url));
        }

        // Stage 4: fail-soft detection. No detections is a valid terminal
        // outcome, not an error.
        let Some(detections) = self.detector.detect(&model, &upload.bytes).await else {
            info!(%model_id, "detector returned nothing, returning partial result");
            return Ok(DetectionResult::partial(original_image_url));
        };
        if detections.boxes.is_empty() {
            info!(%model_id, "detector reported zero objects");
            return Ok(DetectionResult::partial(original_image_url));
        }
        info!(%model_id, count = detections.boxes.len(), "objects detected");

        // Stage 5: annotate. Drawing is CPU-bound, so it runs off the
        // request executor. A failed annotation degrades to predictions
        // without a processed image.
        let annotator = Arc::clone(&self.annotator);
        let bytes = upload.bytes.clone();
        let boxes = detections.boxes.clone();
        let mode = detections.mode;
        let annotated =
            match tokio::task::spawn_blocking(move || annotator.annotate(&bytes, &boxes, mode))
                .await
            {
                Ok(Ok(annotated)) => annotated,
                Ok(Err(err)) => {
                    warn!(%model_id, error = %err, "annotation failed, returning result without processed image");
                    return Ok(DetectionResult {
                        original_image_url,
                        detections: detections.boxes,
                        processed_image_url: None,
                    });
                }
                Err(err) => {
                    return Err(PipelineError::Internal(format!(
                        "annotation task failed: {err}"
                    )));
                }
            };

        // Stage 6: persist the annotated image; also soft.
        let processed_image_url = match self.storage.save(&annotated, PROCESSED_PREFIX, "jpg").await
        {
            Ok(url) => {
                info!(%model_id, url = %url, "stored processed image");
                Some(url)
            }
            Err(err) => {
                warn!(%model_id, error = %err, "failed to store processed image");
                None
            }
        };

        // Stage 7: the fully composed result.
        info!(%model_id, "detection pipeline completed");
        Ok(DetectionResult {
            original_image_url,
            detections: detections.boxes,
            processed_image_url,
        })
    }
}
