use std::fmt;

use serde::Serialize;

use crate::{
    error::BackendError,
    model::settings::{InitConfig, RunConfig},
};

const DOLLY_INTRO: &str = "Below is an instruction that describes a task. \
Write a response that appropriately completes the request.";

const STABLELM_SYSTEM: &str = "<|SYSTEM|># StableLM Tuned (Alpha version)
- StableLM is a helpful and harmless open-source AI language model developed by StabilityAI.
- StableLM is excited to be able to help the user, but will refuse to do anything that could be considered harmful to the user.
- StableLM is more than just an information source, StableLM is also able to write poetry, short stories, and make jokes.
- StableLM will refuse to participate in anything that could harm a human.
";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ModelFamily {
    Dolly,
    Falcon,
    Llama2,
    Mistral,
    Mixtral,
    OpenLlama,
    Phi2,
    StableLm,
}

/// How a raw prompt is framed before it reaches the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptTemplate {
    Plain,
    DollyInstruction,
    StableLmTuned,
    MistralInstruct,
}

impl PromptTemplate {
    pub fn apply(self, prompt: &str) -> String {
        match self {
            PromptTemplate::Plain => prompt.to_string(),
            PromptTemplate::DollyInstruction => {
                format!("{DOLLY_INTRO}\n\n### Instruction:\n{prompt}\n\n### Response:\n")
            }
            PromptTemplate::StableLmTuned => {
                format!("{STABLELM_SYSTEM}<|USER|>{prompt}<|ASSISTANT|>")
            }
            PromptTemplate::MistralInstruct => format!("[INST] {prompt} [/INST]"),
        }
    }
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 8] = [
        ModelFamily::Dolly,
        ModelFamily::Falcon,
        ModelFamily::Llama2,
        ModelFamily::Mistral,
        ModelFamily::Mixtral,
        ModelFamily::OpenLlama,
        ModelFamily::Phi2,
        ModelFamily::StableLm,
    ];

    pub fn registry_key(self) -> &'static str {
        match self {
            ModelFamily::Dolly => "llm.Dolly.v1",
            ModelFamily::Falcon => "llm.Falcon.v1",
            ModelFamily::Llama2 => "llm.Llama2.v1",
            ModelFamily::Mistral => "llm.Mistral.v1",
            ModelFamily::Mixtral => "llm.Mixtral.v1",
            ModelFamily::OpenLlama => "llm.OpenLLaMA.v1",
            ModelFamily::Phi2 => "llm.Phi-2.v1",
            ModelFamily::StableLm => "llm.StableLM.v1",
        }
    }

    pub fn hub_account(self) -> &'static str {
        match self {
            ModelFamily::Dolly => "databricks",
            ModelFamily::Falcon => "tiiuae",
            ModelFamily::Llama2 => "meta-llama",
            ModelFamily::Mistral | ModelFamily::Mixtral => "mistralai",
            ModelFamily::OpenLlama => "openlm-research",
            ModelFamily::Phi2 => "microsoft",
            ModelFamily::StableLm => "stabilityai",
        }
    }

    pub fn model_names(self) -> &'static [&'static str] {
        match self {
            ModelFamily::Dolly => &["dolly-v2-3b", "dolly-v2-7b", "dolly-v2-12b"],
            ModelFamily::Falcon => &[
                "falcon-rw-1b",
                "falcon-7b",
                "falcon-7b-instruct",
                "falcon-40b-instruct",
            ],
            ModelFamily::Llama2 => &["Llama-2-7b-hf", "Llama-2-13b-hf", "Llama-2-70b-hf"],
            ModelFamily::Mistral => &["Mistral-7B-v0.1", "Mistral-7B-Instruct-v0.1"],
            ModelFamily::Mixtral => &["Mixtral-8x7B-v0.1", "Mixtral-8x7B-Instruct-v0.1"],
            ModelFamily::OpenLlama => &[
                "open_llama_3b",
                "open_llama_7b",
                "open_llama_7b_v2",
                "open_llama_13b",
            ],
            ModelFamily::Phi2 => &["phi-2"],
            ModelFamily::StableLm => &[
                "stablelm-base-alpha-3b",
                "stablelm-base-alpha-7b",
                "stablelm-tuned-alpha-3b",
                "stablelm-tuned-alpha-7b",
            ],
        }
    }

    pub fn supports(self, model_name: &str) -> bool {
        self.model_names().contains(&model_name)
    }

    /// Checks `model_name` against the allow-list, naming every permitted value on failure.
    pub fn check_model_name(self, model_name: &str) -> Result<(), BackendError> {
        if self.supports(model_name) {
            Ok(())
        } else {
            Err(BackendError::unexpected_value("name", self.model_names()))
        }
    }

    pub fn for_model_name(model_name: &str) -> Option<ModelFamily> {
        Self::ALL
            .into_iter()
            .find(|family| family.supports(model_name))
    }

    pub fn all_model_names() -> impl Iterator<Item = &'static str> {
        Self::ALL
            .into_iter()
            .flat_map(|family| family.model_names().iter().copied())
    }

    pub fn hub_id(self, model_name: &str) -> String {
        format!("{}/{}", self.hub_account(), model_name)
    }

    pub fn context_length(self) -> usize {
        match self {
            ModelFamily::Dolly | ModelFamily::Falcon | ModelFamily::OpenLlama => 2048,
            ModelFamily::Phi2 => 2048,
            ModelFamily::Llama2 | ModelFamily::StableLm => 4096,
            ModelFamily::Mistral | ModelFamily::Mixtral => 8000,
        }
    }

    pub fn eos_token(self) -> &'static str {
        match self {
            ModelFamily::Llama2
            | ModelFamily::Mistral
            | ModelFamily::Mixtral
            | ModelFamily::OpenLlama => "</s>",
            ModelFamily::Dolly | ModelFamily::Falcon | ModelFamily::Phi2 | ModelFamily::StableLm => {
                "<|endoftext|>"
            }
        }
    }

    pub fn prompt_template(self, model_name: &str) -> PromptTemplate {
        match self {
            ModelFamily::Dolly => PromptTemplate::DollyInstruction,
            ModelFamily::StableLm if model_name.starts_with("stablelm-tuned") => {
                PromptTemplate::StableLmTuned
            }
            ModelFamily::Mistral | ModelFamily::Mixtral if model_name.contains("-Instruct-") => {
                PromptTemplate::MistralInstruct
            }
            _ => PromptTemplate::Plain,
        }
    }

    pub fn default_init_config(self) -> InitConfig {
        InitConfig::default()
    }

    pub fn default_run_config(self) -> RunConfig {
        let base = RunConfig::default();
        match self {
            ModelFamily::Dolly => RunConfig {
                top_k: 0,
                top_p: 0.92,
                ..base
            },
            ModelFamily::Falcon => RunConfig {
                max_new_tokens: 200,
                top_k: 10,
                ..base
            },
            ModelFamily::StableLm => RunConfig {
                max_new_tokens: 64,
                temperature: 0.7,
                ..base
            },
            ModelFamily::Phi2 => RunConfig {
                max_new_tokens: 200,
                do_sample: false,
                ..base
            },
            ModelFamily::Llama2
            | ModelFamily::Mistral
            | ModelFamily::Mixtral
            | ModelFamily::OpenLlama => base,
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelFamily::Dolly => "Dolly",
            ModelFamily::Falcon => "Falcon",
            ModelFamily::Llama2 => "Llama2",
            ModelFamily::Mistral => "Mistral",
            ModelFamily::Mixtral => "Mixtral",
            ModelFamily::OpenLlama => "OpenLLaMA",
            ModelFamily::Phi2 => "Phi-2",
            ModelFamily::StableLm => "StableLM",
        };
        f.write_str(name)
    }
}
