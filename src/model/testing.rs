use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use parking_lot::Mutex;

use crate::{
    error::BackendError,
    model::{
        ArtifactMetadata,
        runtime::{LoadRequest, LoadedModel, ModelRuntime},
        settings::RunConfig,
    },
};

#[derive(Default)]
struct Counters {
    loads: AtomicUsize,
    generations: AtomicUsize,
    drops: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
    last_run: Mutex<Option<RunConfig>>,
}

/// Runtime that records how often it was asked to load and generate.
#[derive(Default, Clone)]
pub(crate) struct CountingRuntime {
    counters: Arc<Counters>,
    failure: Option<String>,
}

impl CountingRuntime {
    pub(crate) fn failing_with(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub(crate) fn loads(&self) -> usize {
        self.counters.loads.load(Ordering::SeqCst)
    }

    pub(crate) fn generations(&self) -> usize {
        self.counters.generations.load(Ordering::SeqCst)
    }

    pub(crate) fn drops(&self) -> usize {
        self.counters.drops.load(Ordering::SeqCst)
    }

    pub(crate) fn last_prompt(&self) -> Option<String> {
        self.counters.last_prompt.lock().clone()
    }

    pub(crate) fn last_run(&self) -> Option<RunConfig> {
        self.counters.last_run.lock().clone()
    }
}

impl ModelRuntime for CountingRuntime {
    fn load(&self, request: &LoadRequest<'_>) -> Result<Box<dyn LoadedModel>, BackendError> {
        self.counters.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingModel {
            name: request.hub_id(),
            counters: self.counters.clone(),
            failure: self.failure.clone(),
        }))
    }
}

struct CountingModel {
    name: String,
    counters: Arc<Counters>,
    failure: Option<String>,
}

impl LoadedModel for CountingModel {
    fn generate(&self, prompt: &str, run: &RunConfig) -> Result<String, BackendError> {
        if let Some(message) = &self.failure {
            return Err(BackendError::Resource(message.clone()));
        }
        let n = self.counters.generations.fetch_add(1, Ordering::SeqCst);
        *self.counters.last_prompt.lock() = Some(prompt.to_string());
        *self.counters.last_run.lock() = Some(run.clone());
        Ok(format!("response {n}: {} chars", prompt.chars().count()))
    }

    fn metadata(&self) -> ArtifactMetadata {
        ArtifactMetadata {
            name: self.name.clone(),
            quantized: false,
            dtype: "float32".into(),
            device: "cpu".into(),
            size_bytes: 1024,
            full_precision_size_bytes: None,
        }
    }
}

impl Drop for CountingModel {
    fn drop(&mut self) {
        self.counters.drops.fetch_add(1, Ordering::SeqCst);
    }
}
