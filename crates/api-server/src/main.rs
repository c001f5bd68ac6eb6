//! API Server Binary Entry Point

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use waste_vision_annotator::{Annotator, AnnotatorConfig};
use waste_vision_api_server::{start_server, ApiConfig, AppState};
use waste_vision_detector::DetectorConfig;
use waste_vision_orchestrator::{DetectionPipeline, GatewayDetector};
use waste_vision_storage::{
    FsObjectStorage, PostgresConfig, PostgresModelRepository, PostgresPredictionStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "waste_vision=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let api_config = ApiConfig::default();
    let postgres_config = PostgresConfig::default();

    // Persistence collaborators
    let models = PostgresModelRepository::new(&postgres_config).await?;
    models.init_schema().await?;
    let predictions = PostgresPredictionStore::new(&postgres_config).await?;
    predictions.init_schema().await?;

    let storage = FsObjectStorage::new(
        api_config.uploads_dir.clone(),
        api_config.public_base_url.clone(),
    );

    // Pipeline
    let pipeline = DetectionPipeline::new(
        Arc::new(models),
        Arc::new(storage),
        Arc::new(GatewayDetector::new(DetectorConfig::default())),
        Arc::new(Annotator::new(AnnotatorConfig::default())),
    );

    let state = AppState {
        pipeline: Arc::new(pipeline),
        predictions: Arc::new(predictions),
    };

    tracing::info!("starting waste-vision detection service");
    start_server(&api_config.bind_addr, state, &api_config.uploads_dir).await?;

    Ok(())
}
