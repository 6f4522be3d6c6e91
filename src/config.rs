use std::{
    env, fs,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::ModelSpec;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub models_dir: PathBuf,
    pub model: ModelConfig,
    pub smoke_prompts_path: Option<PathBuf>,
    pub smoke_on_start: bool,
}

/// Declarative model block: which factory, which model, and its parameter overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    pub factory: String,
    pub name: String,
    #[serde(default)]
    pub config_init: Map<String, Value>,
    #[serde(default)]
    pub config_run: Map<String, Value>,
}

impl ModelConfig {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading model config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing model config {}", path.display()))
    }

    pub fn to_spec(&self) -> ModelSpec {
        ModelSpec::new(&self.factory, &self.name)
            .with_init_config(self.config_init.clone())
            .with_run_config(self.config_run.clone())
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars<F>(var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let listen_addr = var("SERVER_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8080".into())
            .parse()
            .unwrap_or_else(|_| SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080));

        let models_dir = PathBuf::from(var("MODELS_DIR").unwrap_or_else(|| "models".to_string()));

        let model = match var("MODEL_CONFIG_PATH") {
            Some(path) => ModelConfig::from_path(Path::new(&path))?,
            None => ModelConfig {
                factory: var("MODEL_FACTORY").unwrap_or_else(|| "llm.Phi-2.v1".to_string()),
                name: var("MODEL_NAME").unwrap_or_else(|| "phi-2".to_string()),
                config_init: Map::new(),
                config_run: Map::new(),
            },
        };

        let smoke_prompts_path = var("SMOKE_PROMPTS_PATH").map(PathBuf::from);
        let smoke_on_start = var("SMOKE_ON_START")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            listen_addr,
            models_dir,
            model,
            smoke_prompts_path,
            smoke_on_start,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let config = AppConfig::from_vars(vars(&[])).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(config.models_dir, PathBuf::from("models"));
        assert_eq!(config.model.factory, "llm.Phi-2.v1");
        assert_eq!(config.model.name, "phi-2");
        assert!(!config.smoke_on_start);
    }

    #[test]
    fn bad_listen_addr_falls_back() {
        let config = AppConfig::from_vars(vars(&[("SERVER_ADDR", "not-an-addr")])).unwrap();
        assert_eq!(config.listen_addr.port(), 8080);
    }

    #[test]
    fn env_selects_model() {
        let config = AppConfig::from_vars(vars(&[
            ("MODEL_FACTORY", "llm.Dolly.v1"),
            ("MODEL_NAME", "dolly-v2-3b"),
            ("SMOKE_ON_START", "true"),
        ]))
        .unwrap();
        let spec = config.model.to_spec();
        assert_eq!(spec.factory_key, "llm.Dolly.v1");
        assert_eq!(spec.model_name, "dolly-v2-3b");
        assert!(config.smoke_on_start);
    }

    #[test]
    fn model_config_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        fs::write(
            &path,
            json!({
                "factory": "llm.StableLM.v1",
                "name": "stablelm-base-alpha-3b",
                "config_run": {"temperature": 0.3}
            })
            .to_string(),
        )
        .unwrap();

        let config =
            AppConfig::from_vars(vars(&[("MODEL_CONFIG_PATH", path.to_str().unwrap())])).unwrap();
        let spec = config.model.to_spec();
        assert_eq!(spec.model_name, "stablelm-base-alpha-3b");
        assert_eq!(spec.run_config.get("temperature"), Some(&json!(0.3)));
        assert!(spec.init_config.is_empty());
    }

    #[test]
    fn model_config_requires_name() {
        let parsed: Result<ModelConfig, _> =
            serde_json::from_value(json!({"factory": "llm.Phi-2.v1"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn missing_model_config_file_is_an_error() {
        let result = AppConfig::from_vars(vars(&[("MODEL_CONFIG_PATH", "/nope/model.json")]));
        assert!(result.is_err());
    }
}
