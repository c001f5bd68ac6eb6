//! HTTP request handlers for API endpoints

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

use crate::types::{
    data, message, DetectionResponse, HealthResponse, ListPredictionsParams, PredictionView,
};
use crate::AppState;
use waste_vision_orchestrator::{PipelineError, UploadedImage};
use waste_vision_storage::PredictionRecord;

type ApiError = (StatusCode, Json<Value>);

fn bad_request(text: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, message(text))
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Run the detection pipeline for an uploaded image and persist the result.
///
/// Accepts `multipart/form-data` with `file`, `model_id`, and `user_id`
/// fields. Soft pipeline failures still produce a 200 with a partial result;
/// hard failures map to 404 (unknown model), 400 (inactive model, malformed
/// request), or 500.
pub async fn create_detection(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut extension = "jpg".to_string();
    let mut model_id: Option<String> = None;
    let mut user_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("malformed multipart request: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                if let Some(ext) = field.file_name().and_then(extension_of) {
                    extension = ext;
                }
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("failed to read uploaded file: {e}")))?;
                file_bytes = Some(bytes.to_vec());
            }
            Some("model_id") => {
                model_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| bad_request(format!("failed to read model_id: {e}")))?,
                );
            }
            Some("user_id") => {
                user_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| bad_request(format!("failed to read user_id: {e}")))?,
                );
            }
            _ => {}
        }
    }

    let bytes = file_bytes.ok_or_else(|| bad_request("no image file provided"))?;
    let model_id = parse_uuid_field(model_id, "model_id")?;
    let user_id = parse_uuid_field(user_id, "user_id")?;

    info!(%model_id, %user_id, bytes = bytes.len(), "detection upload received");

    let upload = UploadedImage { bytes, extension };
    let result = match state.pipeline.run(upload, model_id).await {
        Ok(result) => result,
        Err(PipelineError::ModelNotFound(id)) => {
            return Err((
                StatusCode::NOT_FOUND,
                message(format!("model not found: {id}")),
            ));
        }
        Err(PipelineError::ModelInactive(id)) => {
            return Err((
                StatusCode::BAD_REQUEST,
                message(format!("model {id} is not active")),
            ));
        }
        Err(err @ (PipelineError::Storage(_) | PipelineError::Internal(_))) => {
            error!(%model_id, error = %err, "detection pipeline failed");
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                message("detection pipeline failed"),
            ));
        }
    };

    let (prediction, objects) = PredictionRecord::from_result(&result, user_id, model_id);
    let prediction_id = state
        .predictions
        .store(&prediction, &objects)
        .await
        .map_err(|err| {
            error!(%model_id, error = %err, "failed to persist prediction");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                message("failed to persist prediction"),
            )
        })?;

    Ok((
        StatusCode::OK,
        data(DetectionResponse {
            prediction_id,
            model_id,
            original_image_url: result.original_image_url,
            processed_image_url: result.processed_image_url,
            detections: result.detections,
        }),
    ))
}

/// Fetch one stored prediction with its object records.
pub async fn get_prediction(
    State(state): State<AppState>,
    Path(prediction_id): Path<Uuid>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let stored = state.predictions.get(prediction_id).await.map_err(|err| {
        error!(%prediction_id, error = %err, "failed to load prediction");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            message("failed to load prediction"),
        )
    })?;

    match stored {
        Some(stored) => Ok((
            StatusCode::OK,
            data(PredictionView {
                prediction: stored.prediction,
                objects: stored.objects,
            }),
        )),
        None => Err((
            StatusCode::NOT_FOUND,
            message(format!("prediction not found: {prediction_id}")),
        )),
    }
}

/// List a user's predictions, newest first.
pub async fn list_predictions(
    State(state): State<AppState>,
    Query(params): Query<ListPredictionsParams>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let predictions = state
        .predictions
        .list_by_user(params.user_id)
        .await
        .map_err(|err| {
            error!(user_id = %params.user_id, error = %err, "failed to list predictions");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                message("failed to list predictions"),
            )
        })?;

    Ok((StatusCode::OK, data(predictions)))
}

fn parse_uuid_field(value: Option<String>, field: &str) -> Result<Uuid, ApiError> {
    let value = value.ok_or_else(|| bad_request(format!("missing {field}")))?;
    Uuid::parse_str(value.trim()).map_err(|_| bad_request(format!("invalid {field}: {value}")))
}

fn extension_of(file_name: &str) -> Option<String> {
    let ext = std::path::Path::new(file_name).extension()?.to_str()?;
    Some(ext.to_string())
}
