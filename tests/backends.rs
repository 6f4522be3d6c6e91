mod common;

use common::ScriptedRuntime;
use hf_llm_backends::{BackendRegistry, HUGGING_FACE_KEY, ModelConfig, ModelFamily, ModelSpec};
use serde_json::json;

fn config(value: serde_json::Value) -> ModelConfig {
    serde_json::from_value(value).unwrap()
}

#[test]
fn phi2_runs_a_simple_prompt() {
    let runtime = ScriptedRuntime::default();
    let spec = ModelSpec::new("llm.Phi-2.v1", "phi-2");
    let backend = BackendRegistry::global().construct(&spec, &runtime).unwrap();

    let responses = backend.generate(&["This is a test."]).unwrap();
    assert_eq!(responses.len(), 1);
    assert_ne!(responses[0], "This is a test.");
    assert!(!responses[0].starts_with("This is a test."));
}

#[test]
fn phi2_with_run_config_from_declarative_config() {
    let runtime = ScriptedRuntime::default();
    let model = config(json!({
        "factory": "llm.Phi-2.v1",
        "name": "phi-2",
        "config_run": {"max_new_tokens": 32}
    }));
    let backend = BackendRegistry::global()
        .construct(&model.to_spec(), &runtime)
        .unwrap();

    assert_eq!(backend.run_config().max_new_tokens, 32);
    let responses = backend.generate(&["This is a test."]).unwrap();
    assert_eq!(responses, vec!["Seen 4 words, budget 32 tokens.".to_string()]);
}

#[test]
fn invalid_model_name_is_rejected() {
    let runtime = ScriptedRuntime::default();
    let model = config(json!({"factory": "llm.Phi-2.v1", "name": "anything-else"}));
    let err = BackendRegistry::global()
        .construct(&model.to_spec(), &runtime)
        .unwrap_err();
    assert!(err.is_validation());
    assert!(err.to_string().contains("unexpected value; permitted"));
    assert_eq!(runtime.loads(), 0);
}

#[test]
fn stablelm_variants_through_generic_key() {
    for name in ["stablelm-base-alpha-3b", "stablelm-tuned-alpha-3b"] {
        let runtime = ScriptedRuntime::default();
        let spec = ModelSpec::new(HUGGING_FACE_KEY, name);
        let backend = BackendRegistry::global().construct(&spec, &runtime).unwrap();
        assert_eq!(backend.family(), ModelFamily::StableLm);

        let responses = backend.generate(&["This is a test."]).unwrap();
        assert!(!responses[0].starts_with("This is a test."));
    }
}

#[test]
fn stablelm_with_temperature_override() {
    let runtime = ScriptedRuntime::default();
    let model = config(json!({
        "factory": HUGGING_FACE_KEY,
        "name": "stablelm-base-alpha-3b",
        "config_run": {"temperature": 0.3}
    }));
    let backend = BackendRegistry::global()
        .construct(&model.to_spec(), &runtime)
        .unwrap();
    assert_eq!(backend.run_config().temperature, 0.3);
    backend.generate(&["This is a test."]).unwrap();
}

#[test]
fn generic_key_rejects_unknown_name() {
    let runtime = ScriptedRuntime::default();
    let spec = ModelSpec::new(HUGGING_FACE_KEY, "anything-else");
    let err = BackendRegistry::global().construct(&spec, &runtime).unwrap_err();
    assert!(err.to_string().contains("unexpected value; permitted:"));
}

#[test]
fn weights_load_once_across_reconfigure_and_generate() {
    let runtime = ScriptedRuntime::default();
    let spec = ModelSpec::new("llm.Llama2.v1", "Llama-2-7b-hf");
    let mut backend = BackendRegistry::global().construct(&spec, &runtime).unwrap();

    for tokens in [8, 16, 24] {
        let overrides = json!({"max_new_tokens": tokens}).as_object().cloned().unwrap();
        backend.reconfigure(&overrides).unwrap();
        let responses = backend.generate(&["one two", "three"]).unwrap();
        assert_eq!(
            responses,
            vec![
                format!("Seen 2 words, budget {tokens} tokens."),
                format!("Seen 1 words, budget {tokens} tokens."),
            ]
        );
    }
    assert_eq!(runtime.loads(), 1);
}

#[test]
fn empty_prompt_list_returns_nothing() {
    let runtime = ScriptedRuntime::default();
    let spec = ModelSpec::new("llm.Falcon.v1", "falcon-7b");
    let backend = BackendRegistry::global().construct(&spec, &runtime).unwrap();
    assert!(backend.generate::<String>(&[]).unwrap().is_empty());
}

#[test]
fn init_config_reaches_the_runtime() {
    let runtime = ScriptedRuntime::default();
    let model = config(json!({
        "factory": "llm.OpenLLaMA.v1",
        "name": "open_llama_3b",
        "config_init": {"load_in_8bit": true}
    }));
    let backend = BackendRegistry::global()
        .construct(&model.to_spec(), &runtime)
        .unwrap();
    let metadata = backend.metadata();
    assert!(metadata.quantized);
    assert_eq!(metadata.name, "openlm-research/open_llama_3b");
}

#[test]
fn unknown_init_key_is_a_validation_error() {
    let runtime = ScriptedRuntime::default();
    let model = config(json!({
        "factory": "llm.Dolly.v1",
        "name": "dolly-v2-3b",
        "config_init": {"load_in_3bit": true}
    }));
    let err = BackendRegistry::global()
        .construct(&model.to_spec(), &runtime)
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(runtime.loads(), 0);
}
