use std::{collections::BTreeMap, sync::Arc};

use once_cell::sync::Lazy;
use tracing::debug;

use crate::{
    error::BackendError,
    model::{ModelBackend, ModelFamily, ModelSpec, runtime::ModelRuntime},
};

/// Resolves the family from the model name instead of the key.
pub const HUGGING_FACE_KEY: &str = "llm.HuggingFace.v1";

pub type BackendFactory =
    Arc<dyn Fn(&ModelSpec, &dyn ModelRuntime) -> Result<ModelBackend, BackendError> + Send + Sync>;

static BUILTIN: Lazy<BackendRegistry> = Lazy::new(BackendRegistry::builtin);

/// Maps registry keys to backend factories.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    factories: BTreeMap<String, BackendFactory>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One key per family plus [`HUGGING_FACE_KEY`].
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for family in ModelFamily::ALL {
            registry.register(family.registry_key(), move |spec, runtime| {
                ModelBackend::construct(family, spec, runtime)
            });
        }
        registry.register(HUGGING_FACE_KEY, |spec, runtime| {
            let family = ModelFamily::for_model_name(&spec.model_name).ok_or_else(|| {
                BackendError::unexpected_value("name", ModelFamily::all_model_names())
            })?;
            ModelBackend::construct(family, spec, runtime)
        });
        registry
    }

    /// Shared instance of [`BackendRegistry::builtin`].
    pub fn global() -> &'static BackendRegistry {
        &BUILTIN
    }

    pub fn register<F>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn(&ModelSpec, &dyn ModelRuntime) -> Result<ModelBackend, BackendError>
            + Send
            + Sync
            + 'static,
    {
        let key = key.into();
        debug!(%key, "registering model factory");
        self.factories.insert(key, Arc::new(factory));
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    pub fn resolve(&self, key: &str) -> Result<&BackendFactory, BackendError> {
        self.factories
            .get(key)
            .ok_or_else(|| BackendError::UnknownFactory {
                key: key.to_string(),
                available: self.keys().map(str::to_string).collect(),
            })
    }

    pub fn construct(
        &self,
        spec: &ModelSpec,
        runtime: &dyn ModelRuntime,
    ) -> Result<ModelBackend, BackendError> {
        let factory = self.resolve(&spec.factory_key)?;
        factory(spec, runtime)
    }
}
