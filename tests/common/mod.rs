use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use hf_llm_backends::{
    BackendError, LoadRequest, LoadedModel, ModelRuntime, RunConfig, model::ArtifactMetadata,
};

/// Answers every prompt with a short summary instead of running a model.
#[derive(Default, Clone)]
pub struct ScriptedRuntime {
    loads: Arc<AtomicUsize>,
}

impl ScriptedRuntime {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModelRuntime for ScriptedRuntime {
    fn load(&self, request: &LoadRequest<'_>) -> Result<Box<dyn LoadedModel>, BackendError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedModel {
            name: request.hub_id(),
            quantized: request.init.load_in_8bit,
        }))
    }
}

struct ScriptedModel {
    name: String,
    quantized: bool,
}

impl LoadedModel for ScriptedModel {
    fn generate(&self, prompt: &str, run: &RunConfig) -> Result<String, BackendError> {
        let words = prompt.split_whitespace().count();
        Ok(format!(
            " Seen {words} words, budget {} tokens. ",
            run.max_new_tokens
        ))
    }

    fn metadata(&self) -> ArtifactMetadata {
        ArtifactMetadata {
            name: self.name.clone(),
            quantized: self.quantized,
            dtype: if self.quantized { "int8" } else { "float32" }.to_string(),
            device: "cpu".to_string(),
            size_bytes: if self.quantized { 250 } else { 1000 },
            full_precision_size_bytes: self.quantized.then_some(1000),
        }
    }
}
