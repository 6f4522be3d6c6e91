use crate::{
    error::BackendError,
    model::{
        ArtifactMetadata, ModelFamily,
        settings::{InitConfig, RunConfig},
    },
};

#[derive(Debug, Clone)]
pub struct LoadRequest<'a> {
    pub family: ModelFamily,
    pub model_name: &'a str,
    pub init: &'a InitConfig,
}

impl LoadRequest<'_> {
    pub fn hub_id(&self) -> String {
        self.family.hub_id(self.model_name)
    }
}

/// Loads weights. Called exactly once per constructed backend.
pub trait ModelRuntime: Send + Sync {
    fn load(&self, request: &LoadRequest<'_>) -> Result<Box<dyn LoadedModel>, BackendError>;
}

/// Weights and tokenizer held in memory. Dropping it releases them.
pub trait LoadedModel: Send + Sync {
    /// Returns only the continuation of `prompt`, never the prompt itself.
    fn generate(&self, prompt: &str, run: &RunConfig) -> Result<String, BackendError>;

    fn metadata(&self) -> ArtifactMetadata;
}
