//! REST API server for the waste-vision detection service
//!
//! Exposes the detection pipeline over HTTP:
//! - `POST /api/v1/detections`: multipart image upload, runs the pipeline
//!   and persists the resulting prediction aggregate
//! - `GET /api/v1/predictions/{id}` and `GET /api/v1/predictions?user_id=`:
//!   read-back of stored predictions
//! - `/uploads/*`: static serving of stored original/annotated images

mod handlers;
mod types;

use axum::extract::DefaultBodyLimit;
use axum::{
    routing::{get, post},
    Router,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use waste_vision_orchestrator::DetectionPipeline;
use waste_vision_storage::PredictionStore;

pub use handlers::*;
pub use types::*;

/// Uploads larger than this are rejected outright.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// API server state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// The detection pipeline
    pub pipeline: Arc<DetectionPipeline>,
    /// Prediction persistence
    pub predictions: Arc<dyn PredictionStore>,
}

/// Server configuration from the environment
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address
    pub bind_addr: String,
    /// Directory stored images are written to and served from
    pub uploads_dir: PathBuf,
    /// Public base URL mapped onto `uploads_dir`
    pub public_base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let bind_addr =
            std::env::var("API_SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        Self {
            uploads_dir: std::env::var("UPLOADS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("http://{}/uploads", bind_addr.replace("0.0.0.0", "localhost"))),
            bind_addr,
        }
    }
}

/// Build the API router with all endpoints
pub fn build_router(state: AppState, uploads_dir: &Path) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Detection pipeline
        .route("/api/v1/detections", post(create_detection))
        // Prediction read-back
        .route("/api/v1/predictions/{prediction_id}", get(get_prediction))
        .route("/api/v1/predictions", get(list_predictions))
        // Stored images
        .nest_service("/uploads", ServeDir::new(uploads_dir))
        // Middleware
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the API server
pub async fn start_server(
    addr: &str,
    state: AppState,
    uploads_dir: &Path,
) -> Result<(), std::io::Error> {
    tracing::info!("starting API server on {}", addr);

    let app = build_router(state, uploads_dir);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await
}
