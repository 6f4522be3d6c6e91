use std::{fmt, time::Instant};

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::{
    error::BackendError,
    model::{
        ArtifactMetadata, Capabilities, ModelFamily, ModelSpec, PromptTemplate,
        runtime::{LoadRequest, LoadedModel, ModelRuntime},
        settings::{InitConfig, RunConfig},
    },
};

/// A loaded model of one family, ready to answer prompts.
///
/// Weights are loaded once in [`ModelBackend::construct`] and owned by this
/// value until it is dropped or [`ModelBackend::dispose`]d.
pub struct ModelBackend {
    family: ModelFamily,
    model_name: String,
    template: PromptTemplate,
    init_config: InitConfig,
    run_config: RunConfig,
    model: Box<dyn LoadedModel>,
}

impl ModelBackend {
    pub fn construct(
        family: ModelFamily,
        spec: &ModelSpec,
        runtime: &dyn ModelRuntime,
    ) -> Result<Self, BackendError> {
        family.check_model_name(&spec.model_name)?;
        let init_config = family.default_init_config().merged(&spec.init_config)?;
        let run_config = family.default_run_config().merged(&spec.run_config)?;

        info!(
            %family,
            model = %spec.model_name,
            device = %init_config.device,
            "loading model weights"
        );
        let start = Instant::now();
        let model = runtime.load(&LoadRequest {
            family,
            model_name: &spec.model_name,
            init: &init_config,
        })?;
        info!(
            model = %spec.model_name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "model weights loaded"
        );

        Ok(Self {
            family,
            template: family.prompt_template(&spec.model_name),
            model_name: spec.model_name.clone(),
            init_config,
            run_config,
            model,
        })
    }

    /// One response per prompt, in input order.
    pub fn generate<S: AsRef<str>>(&self, prompts: &[S]) -> Result<Vec<String>, BackendError> {
        self.generate_with(prompts, &self.run_config)
    }

    /// Like [`ModelBackend::generate`] but with an explicit run config.
    pub fn generate_with<S: AsRef<str>>(
        &self,
        prompts: &[S],
        run: &RunConfig,
    ) -> Result<Vec<String>, BackendError> {
        if prompts.is_empty() {
            return Ok(Vec::new());
        }

        let start = Instant::now();
        let responses = prompts
            .iter()
            .map(|prompt| {
                let framed = self.template.apply(prompt.as_ref());
                self.model
                    .generate(&framed, run)
                    .map(|text| text.trim().to_string())
            })
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            model = %self.model_name,
            batch = prompts.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "generated responses"
        );
        Ok(responses)
    }

    /// Merges `overrides` into the run config. Weights are not touched.
    pub fn reconfigure(&mut self, overrides: &Map<String, Value>) -> Result<&RunConfig, BackendError> {
        self.run_config = self.run_config.merged(overrides)?;
        info!(
            model = %self.model_name,
            keys = ?overrides.keys().collect::<Vec<_>>(),
            "run config updated"
        );
        Ok(&self.run_config)
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn hub_id(&self) -> String {
        self.family.hub_id(&self.model_name)
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.run_config
    }

    pub fn init_config(&self) -> &InitConfig {
        &self.init_config
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            context_length: self.family.context_length(),
            supports_chat: self.template != PromptTemplate::Plain,
        }
    }

    pub fn metadata(&self) -> ArtifactMetadata {
        self.model.metadata()
    }

    /// Releases the weights now instead of waiting for the owner to drop.
    pub fn dispose(self) {
        info!(model = %self.model_name, "releasing model weights");
        drop(self.model);
    }
}

impl fmt::Debug for ModelBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBackend")
            .field("family", &self.family)
            .field("model_name", &self.model_name)
            .field("init_config", &self.init_config)
            .field("run_config", &self.run_config)
            .finish_non_exhaustive()
    }
}
