use std::{fs, path::Path, time::Instant};

use serde::Serialize;

use crate::{error::BackendError, model::ModelBackend};

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationSample {
    pub prompt: String,
    pub reference_substring: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleReport {
    pub prompt: String,
    pub response: String,
    pub latency_ms: u128,
    pub echoed: bool,
    pub reference_match: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateMetrics {
    pub avg_latency_ms: f64,
    pub echo_count: usize,
    pub reference_match_rate: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub model: String,
    pub samples: Vec<SampleReport>,
    pub aggregate: AggregateMetrics,
}

impl EvaluationReport {
    pub fn passed(&self) -> bool {
        self.aggregate.echo_count == 0
    }
}

pub fn run_evaluation(
    backend: &ModelBackend,
    samples: Vec<EvaluationSample>,
) -> Result<EvaluationReport, BackendError> {
    if samples.is_empty() {
        return Err(BackendError::BadRequest(
            "at least one evaluation sample is required".into(),
        ));
    }

    let mut reports = Vec::with_capacity(samples.len());

    for sample in samples {
        let start = Instant::now();
        let mut responses = backend.generate(&[sample.prompt.as_str()])?;
        let latency_ms = start.elapsed().as_millis();
        let response = match (responses.pop(), responses.is_empty()) {
            (Some(response), true) => response,
            _ => {
                return Err(BackendError::Inference(
                    "backend returned a different number of responses than prompts".into(),
                ));
            }
        };

        let echoed = is_echo(&sample.prompt, &response);
        let reference_match = sample.reference_substring.as_ref().map(|needle| {
            response.to_lowercase().contains(&needle.to_lowercase())
        });

        reports.push(SampleReport {
            prompt: sample.prompt,
            response,
            latency_ms,
            echoed,
            reference_match,
        });
    }

    let aggregate = summarize(&reports);

    Ok(EvaluationReport {
        model: backend.hub_id(),
        samples: reports,
        aggregate,
    })
}

/// A response that starts with its own prompt made no forward progress.
pub fn is_echo(prompt: &str, response: &str) -> bool {
    response.starts_with(prompt)
}

pub fn load_samples_from_path(path: &Path) -> Result<Vec<EvaluationSample>, BackendError> {
    let raw = fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .map_err(|e| BackendError::BadRequest(format!("invalid evaluation file: {e}")))?;

    match value {
        serde_json::Value::Array(items) => {
            let mut samples = Vec::with_capacity(items.len());
            for (idx, item) in items.into_iter().enumerate() {
                let prompt = item.get("prompt").and_then(|v| v.as_str()).ok_or_else(|| {
                    BackendError::BadRequest(format!(
                        "evaluation item {idx} missing string field 'prompt'"
                    ))
                })?;
                let reference_substring = item
                    .get("reference_substring")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                samples.push(EvaluationSample {
                    prompt: prompt.to_string(),
                    reference_substring,
                });
            }
            Ok(samples)
        }
        _ => Err(BackendError::BadRequest(
            "evaluation file must be a JSON array".into(),
        )),
    }
}

pub fn fallback_samples() -> Vec<EvaluationSample> {
    vec![
        EvaluationSample {
            prompt: "This is a test.".to_string(),
            reference_substring: None,
        },
        EvaluationSample {
            prompt: "Name three primary colors.".to_string(),
            reference_substring: Some("red".to_string()),
        },
        EvaluationSample {
            prompt: "Summarize the plot of Hamlet in one sentence.".to_string(),
            reference_substring: Some("hamlet".to_string()),
        },
    ]
}

fn summarize(reports: &[SampleReport]) -> AggregateMetrics {
    AggregateMetrics {
        avg_latency_ms: mean(reports.iter().map(|r| r.latency_ms as f64)),
        echo_count: reports.iter().filter(|r| r.echoed).count(),
        reference_match_rate: compute_match_rate(reports.iter().filter_map(|r| r.reference_match)),
    }
}

fn mean<I>(values: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let mut count = 0usize;
    let mut acc = 0.0;
    for value in values {
        count += 1;
        acc += value;
    }
    if count == 0 { 0.0 } else { acc / count as f64 }
}

fn compute_match_rate<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = bool>,
{
    let mut count = 0usize;
    let mut matches = 0usize;
    for value in values {
        count += 1;
        if value {
            matches += 1;
        }
    }
    if count == 0 {
        None
    } else {
        Some(matches as f64 / count as f64)
    }
}
