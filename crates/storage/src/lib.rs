//! Storage layer for the waste-vision service
//!
//! Three collaborators the detection pipeline writes to or reads from:
//! - **Blob storage**: uploaded and annotated images, served back by URL
//! - **Model repository**: read-only detection model configuration
//! - **Prediction store**: the persisted prediction aggregate and its
//!   per-object child records
//!
//! The Postgres-backed implementations live behind `async` traits so the
//! orchestrator can be tested with in-memory substitutes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_postgres::{Client, NoTls};
use uuid::Uuid;
use waste_vision_common::DetectionResult;

pub mod model_repository;
pub mod object_storage;
pub mod prediction_store;

pub use model_repository::{ModelRepository, PostgresModelRepository};
pub use object_storage::{FsObjectStorage, ObjectStorage};
pub use prediction_store::{PostgresPredictionStore, PredictionStore, StoredPrediction};

/// Storage layer errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("postgres error: {0}")]
    Postgres(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// `PostgreSQL` configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Database host
    pub host: String,

    /// Database port
    pub port: u16,

    /// Database name
    pub database: String,

    /// Database user
    pub user: String,

    /// Database password
    pub password: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("POSTGRES_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5432),
            database: std::env::var("POSTGRES_DB").unwrap_or_else(|_| "waste_vision".to_string()),
            user: std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("POSTGRES_PASSWORD").unwrap_or_default(),
        }
    }
}

impl PostgresConfig {
    /// Build connection string
    #[must_use]
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.database, self.user, self.password
        )
    }
}

/// Connect and spawn the connection driver in the background.
pub(crate) async fn connect(config: &PostgresConfig) -> StorageResult<Client> {
    let (client, connection) = tokio_postgres::connect(&config.connection_string(), NoTls)
        .await
        .map_err(|e| StorageError::Postgres(e.to_string()))?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("postgres connection error: {}", e);
        }
    });

    Ok(client)
}

/// Persisted prediction aggregate root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub model_id: Uuid,
    pub original_image_url: String,
    pub processed_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One detected object belonging to a prediction, created 1:1 from the raw
/// detector box at persistence time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectPredictionRecord {
    pub id: Uuid,
    pub prediction_id: Uuid,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub category: String,
    pub confidence: f64,
}

impl PredictionRecord {
    /// Convert a completed detection result into the aggregate to persist:
    /// the parent record plus one child per raw detection.
    #[must_use]
    pub fn from_result(
        result: &DetectionResult,
        user_id: Uuid,
        model_id: Uuid,
    ) -> (Self, Vec<ObjectPredictionRecord>) {
        let prediction = Self {
            id: Uuid::new_v4(),
            user_id,
            model_id,
            original_image_url: result.original_image_url.clone(),
            processed_image_url: result.processed_image_url.clone(),
            created_at: Utc::now(),
        };

        let objects = result
            .detections
            .iter()
            .map(|detection| ObjectPredictionRecord {
                id: Uuid::new_v4(),
                prediction_id: prediction.id,
                x: detection.x,
                y: detection.y,
                width: detection.width,
                height: detection.height,
                category: detection.class.clone(),
                confidence: detection.confidence,
            })
            .collect();

        (prediction, objects)
    }
}
