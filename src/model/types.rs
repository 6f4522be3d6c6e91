use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A request for one backend, as handed to the registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelSpec {
    pub factory_key: String,
    pub model_name: String,
    pub run_config: Map<String, Value>,
    pub init_config: Map<String, Value>,
}

impl ModelSpec {
    pub fn new(factory_key: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            factory_key: factory_key.into(),
            model_name: model_name.into(),
            ..Default::default()
        }
    }

    pub fn with_run_config(mut self, run_config: Map<String, Value>) -> Self {
        self.run_config = run_config;
        self
    }

    pub fn with_init_config(mut self, init_config: Map<String, Value>) -> Self {
        self.init_config = init_config;
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerationRequest {
    pub prompts: Vec<String>,
    /// Applied to this request only; the backend keeps its own run config.
    #[serde(default)]
    pub config_run: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationResponse {
    pub responses: Vec<String>,
    pub total_time_ms: u128,
    pub model: ArtifactMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub context_length: usize,
    pub supports_chat: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactMetadata {
    pub name: String,
    pub quantized: bool,
    pub dtype: String,
    pub device: String,
    pub size_bytes: u64,
    /// Size of the full-precision weights, when a quantized artifact was loaded instead.
    pub full_precision_size_bytes: Option<u64>,
}
