//! Read-only access to detection model configuration.

use crate::{connect, PostgresConfig, StorageError, StorageResult};
use async_trait::async_trait;
use tokio_postgres::{Client, Row};
use uuid::Uuid;
use waste_vision_common::DetectionModel;

/// Model repository trait
#[async_trait]
pub trait ModelRepository: Send + Sync {
    /// Fetch a model by id; `None` when no such model exists.
    async fn get_by_id(&self, id: Uuid) -> StorageResult<Option<DetectionModel>>;
}

/// `PostgreSQL` model repository
pub struct PostgresModelRepository {
    client: Client,
}

impl PostgresModelRepository {
    /// Connect a new repository.
    pub async fn new(config: &PostgresConfig) -> StorageResult<Self> {
        Ok(Self {
            client: connect(config).await?,
        })
    }

    /// Create the models table if it does not exist.
    pub async fn init_schema(&self) -> StorageResult<()> {
        self.client
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS detection_models (
                    id UUID PRIMARY KEY,
                    name TEXT NOT NULL,
                    endpoint TEXT NOT NULL,
                    api_key TEXT NOT NULL,
                    local_model_path TEXT,
                    active BOOLEAN NOT NULL DEFAULT TRUE
                )
                ",
                &[],
            )
            .await
            .map_err(|e| StorageError::Postgres(e.to_string()))?;

        tracing::info!("detection model schema initialized");
        Ok(())
    }
}

#[async_trait]
impl ModelRepository for PostgresModelRepository {
    async fn get_by_id(&self, id: Uuid) -> StorageResult<Option<DetectionModel>> {
        let row = self
            .client
            .query_opt(
                r"
                SELECT id, name, endpoint, api_key, local_model_path, active
                FROM detection_models
                WHERE id = $1
                ",
                &[&id],
            )
            .await
            .map_err(|e| StorageError::Postgres(e.to_string()))?;

        Ok(row.map(row_to_model))
    }
}

fn row_to_model(row: Row) -> DetectionModel {
    DetectionModel {
        id: row.get(0),
        name: row.get(1),
        endpoint: row.get(2),
        api_key: row.get(3),
        local_model_path: decode_local_path(row.get(4)),
        active: row.get(5),
    }
}

/// Decode the legacy local-path sentinels at the wire boundary.
///
/// Older deployments stored `"None"` or `"N/A"` instead of NULL; past this
/// function the path is a proper `Option` and the sentinels never travel
/// further.
fn decode_local_path(raw: Option<String>) -> Option<String> {
    let value = raw?;
    let trimmed = value.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("none")
        || trimmed.eq_ignore_ascii_case("n/a")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}
