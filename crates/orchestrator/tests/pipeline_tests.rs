//! Pipeline stage tests over mocked collaborators.
//!
//! The annotator is real (with font probing disabled); model repository,
//! blob storage, and detector are in-test substitutes so every soft- and
//! hard-failure branch can be forced deterministically.

use async_trait::async_trait;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use waste_vision_annotator::{Annotator, AnnotatorConfig};
use waste_vision_common::{CoordinateMode, DetectionModel, RawDetection};
use waste_vision_detector::Detections;
use waste_vision_orchestrator::{DetectionPipeline, ObjectDetector, PipelineError, UploadedImage};
use waste_vision_storage::{ModelRepository, ObjectStorage, StorageError, StorageResult};

struct StaticModels(Option<DetectionModel>);

#[async_trait]
impl ModelRepository for StaticModels {
    async fn get_by_id(&self, _id: Uuid) -> StorageResult<Option<DetectionModel>> {
        Ok(self.0.clone())
    }
}

/// Records every save; optionally fails for one filename prefix.
struct RecordingStorage {
    saved: Mutex<Vec<String>>,
    fail_prefix: Option<&'static str>,
}

impl RecordingStorage {
    fn new() -> Self {
        Self {
            saved: Mutex::new(Vec::new()),
            fail_prefix: None,
        }
    }

    fn failing_on(prefix: &'static str) -> Self {
        Self {
            saved: Mutex::new(Vec::new()),
            fail_prefix: Some(prefix),
        }
    }

    fn saved_prefixes(&self) -> Vec<String> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStorage for RecordingStorage {
    async fn save(&self, _data: &[u8], prefix: &str, extension: &str) -> StorageResult<String> {
        if self.fail_prefix == Some(prefix) {
            return Err(StorageError::Io(std::io::Error::other("disk full")));
        }
        self.saved.lock().unwrap().push(prefix.to_string());
        Ok(format!("http://files.test/{prefix}{}.{extension}", Uuid::new_v4()))
    }
}

/// Returns a canned outcome; flags whether it was ever invoked.
struct StaticDetector {
    outcome: Option<Detections>,
    called: AtomicBool,
}

impl StaticDetector {
    fn returning(outcome: Option<Detections>) -> Self {
        Self {
            outcome,
            called: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ObjectDetector for StaticDetector {
    async fn detect(&self, _model: &DetectionModel, _image: &[u8]) -> Option<Detections> {
        self.called.store(true, Ordering::SeqCst);
        self.outcome.clone()
    }
}

fn active_model() -> DetectionModel {
    DetectionModel {
        id: Uuid::new_v4(),
        name: "waste-v1".to_string(),
        endpoint: "https://detect.example/waste/1".to_string(),
        api_key: "key".to_string(),
        local_model_path: None,
        active: true,
    }
}

fn fontless_annotator() -> Arc<Annotator> {
    Arc::new(Annotator::new(AnnotatorConfig {
        font_candidates: Vec::new(),
        font_dirs: Vec::new(),
        ..AnnotatorConfig::default()
    }))
}

fn png_upload() -> UploadedImage {
    let img = image::RgbImage::from_pixel(64, 48, image::Rgb([10, 20, 30]));
    let mut bytes = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    UploadedImage {
        bytes,
        extension: "png".to_string(),
    }
}

fn one_box() -> Detections {
    Detections {
        mode: CoordinateMode::CenterPixel,
        boxes: vec![RawDetection {
            x: 32.0,
            y: 24.0,
            width: 20.0,
            height: 10.0,
            confidence: 0.8,
            class: "PLASTIC".to_string(),
            class_id: 1,
            detection_id: None,
        }],
    }
}

fn pipeline(
    models: StaticModels,
    storage: Arc<RecordingStorage>,
    detector: Arc<StaticDetector>,
) -> DetectionPipeline {
    DetectionPipeline::new(Arc::new(models), storage, detector, fontless_annotator())
}

#[tokio::test]
async fn inactive_model_fails_before_any_storage_write() {
    let mut model = active_model();
    model.active = false;
    let model_id = model.id;

    let storage = Arc::new(RecordingStorage::new());
    let detector = Arc::new(StaticDetector::returning(Some(one_box())));
    let pipeline = pipeline(StaticModels(Some(model)), Arc::clone(&storage), detector);

    let err = pipeline.run(png_upload(), model_id).await.unwrap_err();
    assert!(matches!(err, PipelineError::ModelInactive(id) if id == model_id));
    assert!(storage.saved_prefixes().is_empty());
}

#[tokio::test]
async fn missing_model_is_a_hard_failure() {
    let storage = Arc::new(RecordingStorage::new());
    let detector = Arc::new(StaticDetector::returning(Some(one_box())));
    let pipeline = pipeline(StaticModels(None), Arc::clone(&storage), detector);

    let model_id = Uuid::new_v4();
    let err = pipeline.run(png_upload(), model_id).await.unwrap_err();
    assert!(matches!(err, PipelineError::ModelNotFound(id) if id == model_id));
    assert!(storage.saved_prefixes().is_empty());
}

#[tokio::test]
async fn empty_detections_yield_partial_success() {
    let model = active_model();
    let model_id = model.id;

    let storage = Arc::new(RecordingStorage::new());
    let detector = Arc::new(StaticDetector::returning(Some(Detections {
        mode: CoordinateMode::CenterPixel,
        boxes: vec![],
    })));
    let pipeline = pipeline(StaticModels(Some(model)), Arc::clone(&storage), detector);

    let result = pipeline.run(png_upload(), model_id).await.unwrap();
    assert!(result.original_image_url.starts_with("http://files.test/detection_"));
    assert!(result.detections.is_empty());
    assert!(result.processed_image_url.is_none());
    // Only the original image was written.
    assert_eq!(storage.saved_prefixes(), vec!["detection_"]);
}

#[tokio::test]
async fn exhausted_detector_yields_partial_success() {
    let model = active_model();
    let model_id = model.id;

    let storage = Arc::new(RecordingStorage::new());
    let detector = Arc::new(StaticDetector::returning(None));
    let pipeline = pipeline(StaticModels(Some(model)), Arc::clone(&storage), detector);

    let result = pipeline.run(png_upload(), model_id).await.unwrap();
    assert!(result.detections.is_empty());
    assert!(result.processed_image_url.is_none());
}

#[tokio::test]
async fn empty_upload_is_stored_but_skips_detection() {
    let model = active_model();
    let model_id = model.id;

    let storage = Arc::new(RecordingStorage::new());
    let detector = Arc::new(StaticDetector::returning(Some(one_box())));
    let pipeline = pipeline(
        StaticModels(Some(model)),
        Arc::clone(&storage),
        Arc::clone(&detector),
    );

    let upload = UploadedImage {
        bytes: Vec::new(),
        extension: "jpg".to_string(),
    };
    let result = pipeline.run(upload, model_id).await.unwrap();

    assert!(!result.original_image_url.is_empty());
    assert!(result.detections.is_empty());
    assert!(!detector.called.load(Ordering::SeqCst));
}

#[tokio::test]
async fn annotation_failure_keeps_detections_without_processed_image() {
    let model = active_model();
    let model_id = model.id;

    let storage = Arc::new(RecordingStorage::new());
    let detector = Arc::new(StaticDetector::returning(Some(one_box())));
    let pipeline = pipeline(StaticModels(Some(model)), Arc::clone(&storage), detector);

    // Bytes that no image decoder accepts: annotation fails softly.
    let upload = UploadedImage {
        bytes: b"not an image at all".to_vec(),
        extension: "jpg".to_string(),
    };
    let result = pipeline.run(upload, model_id).await.unwrap();

    assert_eq!(result.detections.len(), 1);
    assert!(result.processed_image_url.is_none());
    assert_eq!(storage.saved_prefixes(), vec!["detection_"]);
}

#[tokio::test]
async fn processed_image_storage_failure_is_soft() {
    let model = active_model();
    let model_id = model.id;

    let storage = Arc::new(RecordingStorage::failing_on("processed_"));
    let detector = Arc::new(StaticDetector::returning(Some(one_box())));
    let pipeline = pipeline(StaticModels(Some(model)), Arc::clone(&storage), detector);

    let result = pipeline.run(png_upload(), model_id).await.unwrap();
    assert_eq!(result.detections.len(), 1);
    assert!(result.processed_image_url.is_none());
}

#[tokio::test]
async fn original_image_storage_failure_is_hard() {
    let model = active_model();
    let model_id = model.id;

    let storage = Arc::new(RecordingStorage::failing_on("detection_"));
    let detector = Arc::new(StaticDetector::returning(Some(one_box())));
    let pipeline = pipeline(StaticModels(Some(model)), Arc::clone(&storage), detector);

    let err = pipeline.run(png_upload(), model_id).await.unwrap_err();
    assert!(matches!(err, PipelineError::Storage(_)));
}

#[tokio::test]
async fn full_run_composes_both_urls_and_detections() {
    let model = active_model();
    let model_id = model.id;

    let storage = Arc::new(RecordingStorage::new());
    let detector = Arc::new(StaticDetector::returning(Some(one_box())));
    let pipeline = pipeline(StaticModels(Some(model)), Arc::clone(&storage), detector);

    let result = pipeline.run(png_upload(), model_id).await.unwrap();

    assert!(result.original_image_url.starts_with("http://files.test/detection_"));
    let processed = result.processed_image_url.as_deref().unwrap();
    assert!(processed.starts_with("http://files.test/processed_"));
    assert!(processed.ends_with(".jpg"));
    assert_eq!(result.detections.len(), 1);
    assert_eq!(storage.saved_prefixes(), vec!["detection_", "processed_"]);
}
