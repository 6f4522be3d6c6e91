use std::{sync::Arc, time::Instant};

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post, put},
};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::task;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    config::AppConfig,
    error::BackendError,
    evaluation::{EvaluationReport, fallback_samples, load_samples_from_path, run_evaluation},
    model::{
        ArtifactMetadata, Capabilities, GenerationRequest, GenerationResponse, HUGGING_FACE_KEY,
        InitConfig, ModelBackend, ModelFamily, RunConfig,
    },
    quantization::QuantizationSummary,
};

pub type SharedBackend = Arc<RwLock<ModelBackend>>;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub backend: SharedBackend,
    pub evaluation: Arc<RwLock<Option<EvaluationReport>>>,
}

#[derive(Serialize)]
struct MetadataResponse {
    family: ModelFamily,
    model: String,
    capabilities: Capabilities,
    init_config: InitConfig,
    run_config: RunConfig,
    artifact: ArtifactMetadata,
    quantization: Option<QuantizationSummary>,
    evaluation: Option<EvaluationReport>,
}

#[derive(Serialize)]
struct FamilyEntry {
    key: &'static str,
    family: ModelFamily,
    models: &'static [&'static str],
    context_length: usize,
}

#[derive(Serialize)]
struct FamiliesResponse {
    generic_key: &'static str,
    families: Vec<FamilyEntry>,
}

pub fn build_router(config: Arc<AppConfig>, backend: SharedBackend) -> Router {
    let state = AppState {
        evaluation: Arc::new(RwLock::new(None)),
        backend,
        config,
    };

    Router::new()
        .route("/health", get(health))
        .route("/generate", post(generate))
        .route("/config/run", put(reconfigure))
        .route("/metadata", get(metadata))
        .route("/families", get(families))
        .route("/smoke", post(smoke))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health() -> &'static str {
    "ok"
}

async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> Result<Json<GenerationResponse>, BackendError> {
    let backend = state.backend.clone();
    let response = task::spawn_blocking(move || {
        let backend = backend.read();
        let run = match request.config_run.as_ref() {
            Some(overrides) => backend.run_config().merged(overrides)?,
            None => backend.run_config().clone(),
        };
        let start = Instant::now();
        let responses = backend.generate_with(&request.prompts, &run)?;
        Ok::<_, BackendError>(GenerationResponse {
            responses,
            total_time_ms: start.elapsed().as_millis(),
            model: backend.metadata(),
        })
    })
    .await
    .map_err(|err| BackendError::Inference(format!("inference task failed: {err}")))??;
    Ok(Json(response))
}

async fn reconfigure(
    State(state): State<AppState>,
    Json(overrides): Json<Map<String, Value>>,
) -> Result<Json<RunConfig>, BackendError> {
    let backend = state.backend.clone();
    let updated = task::spawn_blocking(move || {
        let mut backend = backend.write();
        backend.reconfigure(&overrides).cloned()
    })
    .await
    .map_err(|err| BackendError::Other(format!("reconfigure task failed: {err}")))??;
    Ok(Json(updated))
}

async fn metadata(State(state): State<AppState>) -> Result<Json<MetadataResponse>, BackendError> {
    let backend = state.backend.clone();
    let evaluation = state.evaluation.clone();
    let response = task::spawn_blocking(move || {
        let backend = backend.read();
        let artifact = backend.metadata();
        MetadataResponse {
            family: backend.family(),
            model: backend.model_name().to_string(),
            capabilities: backend.capabilities(),
            init_config: backend.init_config().clone(),
            run_config: backend.run_config().clone(),
            quantization: QuantizationSummary::from_metadata(&artifact),
            artifact,
            evaluation: evaluation.read().clone(),
        }
    })
    .await
    .map_err(|err| BackendError::Other(format!("metadata task failed: {err}")))?;
    Ok(Json(response))
}

async fn families() -> Json<FamiliesResponse> {
    let families = ModelFamily::ALL
        .into_iter()
        .map(|family| FamilyEntry {
            key: family.registry_key(),
            family,
            models: family.model_names(),
            context_length: family.context_length(),
        })
        .collect();
    Json(FamiliesResponse {
        generic_key: HUGGING_FACE_KEY,
        families,
    })
}

async fn smoke(State(state): State<AppState>) -> Result<Json<EvaluationReport>, BackendError> {
    let samples = if let Some(path) = state.config.smoke_prompts_path.as_ref() {
        load_samples_from_path(path)?
    } else {
        fallback_samples()
    };

    info!(count = samples.len(), "running smoke evaluation");

    let backend = state.backend.clone();
    let report = task::spawn_blocking(move || run_evaluation(&backend.read(), samples))
        .await
        .map_err(|err| BackendError::Inference(format!("evaluation task failed: {err}")))??;
    state.evaluation.write().replace(report.clone());

    Ok(Json(report))
}
