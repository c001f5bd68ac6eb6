//! Persistence of the prediction aggregate.
//!
//! The parent prediction row and all of its object rows are written inside a
//! single transaction: either the whole aggregate exists afterwards or none
//! of it does.

use crate::{connect, ObjectPredictionRecord, PostgresConfig, PredictionRecord, StorageError, StorageResult};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_postgres::{Client, Row};
use tracing::info;
use uuid::Uuid;

/// A stored prediction with its object records.
#[derive(Debug, Clone)]
pub struct StoredPrediction {
    pub prediction: PredictionRecord,
    pub objects: Vec<ObjectPredictionRecord>,
}

/// Prediction store trait
#[async_trait]
pub trait PredictionStore: Send + Sync {
    /// Persist the aggregate atomically and return the prediction id.
    async fn store(
        &self,
        prediction: &PredictionRecord,
        objects: &[ObjectPredictionRecord],
    ) -> StorageResult<Uuid>;

    /// Fetch a prediction with its objects; `None` when it does not exist.
    async fn get(&self, id: Uuid) -> StorageResult<Option<StoredPrediction>>;

    /// List a user's predictions, newest first.
    async fn list_by_user(&self, user_id: Uuid) -> StorageResult<Vec<PredictionRecord>>;
}

/// `PostgreSQL` prediction store
pub struct PostgresPredictionStore {
    // Transactions need exclusive access to the client.
    client: Mutex<Client>,
}

impl PostgresPredictionStore {
    /// Connect a new store.
    pub async fn new(config: &PostgresConfig) -> StorageResult<Self> {
        Ok(Self {
            client: Mutex::new(connect(config).await?),
        })
    }

    /// Create prediction tables and indexes if they do not exist.
    pub async fn init_schema(&self) -> StorageResult<()> {
        let client = self.client.lock().await;

        client
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS predictions (
                    id UUID PRIMARY KEY,
                    user_id UUID NOT NULL,
                    model_id UUID NOT NULL,
                    original_image_url TEXT NOT NULL,
                    processed_image_url TEXT,
                    created_at TIMESTAMP WITH TIME ZONE NOT NULL
                )
                ",
                &[],
            )
            .await
            .map_err(|e| StorageError::Postgres(e.to_string()))?;

        client
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS object_predictions (
                    id UUID PRIMARY KEY,
                    prediction_id UUID NOT NULL REFERENCES predictions(id) ON DELETE CASCADE,
                    x DOUBLE PRECISION NOT NULL,
                    y DOUBLE PRECISION NOT NULL,
                    width DOUBLE PRECISION NOT NULL,
                    height DOUBLE PRECISION NOT NULL,
                    category TEXT NOT NULL,
                    confidence DOUBLE PRECISION NOT NULL
                )
                ",
                &[],
            )
            .await
            .map_err(|e| StorageError::Postgres(e.to_string()))?;

        client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_predictions_user_id ON predictions(user_id)",
                &[],
            )
            .await
            .map_err(|e| StorageError::Postgres(e.to_string()))?;

        client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_object_predictions_prediction_id ON object_predictions(prediction_id)",
                &[],
            )
            .await
            .map_err(|e| StorageError::Postgres(e.to_string()))?;

        info!("prediction schema initialized");
        Ok(())
    }
}

#[async_trait]
impl PredictionStore for PostgresPredictionStore {
    async fn store(
        &self,
        prediction: &PredictionRecord,
        objects: &[ObjectPredictionRecord],
    ) -> StorageResult<Uuid> {
        let mut client = self.client.lock().await;
        let tx = client
            .transaction()
            .await
            .map_err(|e| StorageError::Postgres(e.to_string()))?;

        tx.execute(
            r"
            INSERT INTO predictions
            (id, user_id, model_id, original_image_url, processed_image_url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
            &[
                &prediction.id,
                &prediction.user_id,
                &prediction.model_id,
                &prediction.original_image_url,
                &prediction.processed_image_url,
                &prediction.created_at,
            ],
        )
        .await
        .map_err(|e| StorageError::Postgres(e.to_string()))?;

        for object in objects {
            tx.execute(
                r"
                INSERT INTO object_predictions
                (id, prediction_id, x, y, width, height, category, confidence)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ",
                &[
                    &object.id,
                    &object.prediction_id,
                    &object.x,
                    &object.y,
                    &object.width,
                    &object.height,
                    &object.category,
                    &object.confidence,
                ],
            )
            .await
            .map_err(|e| StorageError::Postgres(e.to_string()))?;
        }

        // Dropping the transaction without this rolls everything back,
        // parent row included.
        tx.commit()
            .await
            .map_err(|e| StorageError::Postgres(e.to_string()))?;

        info!(
            prediction_id = %prediction.id,
            objects = objects.len(),
            "stored prediction aggregate"
        );
        Ok(prediction.id)
    }

    async fn get(&self, id: Uuid) -> StorageResult<Option<StoredPrediction>> {
        let client = self.client.lock().await;

        let Some(row) = client
            .query_opt(
                r"
                SELECT id, user_id, model_id, original_image_url, processed_image_url, created_at
                FROM predictions
                WHERE id = $1
                ",
                &[&id],
            )
            .await
            .map_err(|e| StorageError::Postgres(e.to_string()))?
        else {
            return Ok(None);
        };

        let objects = client
            .query(
                r"
                SELECT id, prediction_id, x, y, width, height, category, confidence
                FROM object_predictions
                WHERE prediction_id = $1
                ",
                &[&id],
            )
            .await
            .map_err(|e| StorageError::Postgres(e.to_string()))?
            .into_iter()
            .map(row_to_object)
            .collect();

        Ok(Some(StoredPrediction {
            prediction: row_to_prediction(&row),
            objects,
        }))
    }

    async fn list_by_user(&self, user_id: Uuid) -> StorageResult<Vec<PredictionRecord>> {
        let client = self.client.lock().await;

        let rows = client
            .query(
                r"
                SELECT id, user_id, model_id, original_image_url, processed_image_url, created_at
                FROM predictions
                WHERE user_id = $1
                ORDER BY created_at DESC
                ",
                &[&user_id],
            )
            .await
            .map_err(|e| StorageError::Postgres(e.to_string()))?;

        Ok(rows.iter().map(row_to_prediction).collect())
    }
}

fn row_to_prediction(row: &Row) -> PredictionRecord {
    PredictionRecord {
        id: row.get(0),
        user_id: row.get(1),
        model_id: row.get(2),
        original_image_url: row.get(3),
        processed_image_url: row.get(4),
        created_at: row.get(5),
    }
}

fn row_to_object(row: Row) -> ObjectPredictionRecord {
    ObjectPredictionRecord {
        id: row.get(0),
        prediction_id: row.get(1),
        x: row.get(2),
        y: row.get(3),
        width: row.get(4),
        height: row.get(5),
        category: row.get(6),
        confidence: row.get(7),
    }
}
