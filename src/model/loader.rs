use std::{path::PathBuf, time::Instant};

use parking_lot::Mutex;
use tch::{Device, IValue, Kind, TchError, Tensor, no_grad};
use tokenizers::Tokenizer;
use tracing::{info, warn};

use crate::{
    error::BackendError,
    hardware::{accelerator_available, artifact_size},
    model::{
        ArtifactMetadata,
        runtime::{LoadRequest, LoadedModel, ModelRuntime},
        settings::{DeviceRequest, Dtype, RunConfig},
    },
};

const MODEL_FILE: &str = "model.ts";
const INT8_MODEL_FILE: &str = "model.int8.ts";
const TOKENIZER_FILE: &str = "tokenizer.json";

/// Loads TorchScript exports from `<models_dir>/<hub account>/<model name>/`.
#[derive(Debug, Clone)]
pub struct TorchRuntime {
    models_dir: PathBuf,
}

pub struct TorchModel {
    name: String,
    quantized: bool,
    kind: Kind,
    device: Device,
    size_bytes: u64,
    full_precision_size_bytes: Option<u64>,
    context_length: usize,
    eos_id: Option<i64>,
    tokenizer: Tokenizer,
    module: Mutex<tch::CModule>,
}

impl TorchRuntime {
    pub fn new(models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
        }
    }

    pub fn model_dir(&self, request: &LoadRequest<'_>) -> PathBuf {
        self.models_dir
            .join(request.family.hub_account())
            .join(request.model_name)
    }
}

impl ModelRuntime for TorchRuntime {
    fn load(&self, request: &LoadRequest<'_>) -> Result<Box<dyn LoadedModel>, BackendError> {
        let dir = self.model_dir(request);
        let tokenizer_path = require(dir.join(TOKENIZER_FILE))?;
        let full_path = dir.join(MODEL_FILE);

        let (module_path, device, kind, full_precision_size_bytes) = if request.init.load_in_8bit {
            let full_size = full_path.exists().then(|| artifact_size(&full_path));
            (require(dir.join(INT8_MODEL_FILE))?, Device::Cpu, Kind::QInt8, full_size)
        } else {
            let device = resolve_device(request.init.device)?;
            (require(full_path)?, device, resolve_kind(request.init.dtype, device), None)
        };

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| BackendError::Tokenizer(e.to_string()))?;
        let eos_id = tokenizer
            .token_to_id(request.family.eos_token())
            .map(i64::from);

        let start = Instant::now();
        // cast on the host first so the accelerator never holds the fp32 weights
        let mut module =
            tch::CModule::load_on_device(&module_path, Device::Cpu).map_err(torch_error)?;
        if !request.init.load_in_8bit && (kind != Kind::Float || device != Device::Cpu) {
            module.f_to(Device::Cpu, kind, false).map_err(torch_error)?;
            module.f_to(device, kind, false).map_err(torch_error)?;
        }
        module.f_set_eval().map_err(torch_error)?;
        let size_bytes = artifact_size(&module_path);
        info!(
            path = %module_path.display(),
            size_bytes,
            device = device_name(device),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "torchscript module loaded"
        );

        Ok(Box::new(TorchModel {
            name: request.hub_id(),
            quantized: request.init.load_in_8bit,
            kind,
            device,
            size_bytes,
            full_precision_size_bytes,
            context_length: request.family.context_length(),
            eos_id,
            tokenizer,
            module: Mutex::new(module),
        }))
    }
}

impl LoadedModel for TorchModel {
    fn generate(&self, prompt: &str, run: &RunConfig) -> Result<String, BackendError> {
        let encoding = self
            .tokenizer
            .encode(prompt, true)
            .map_err(|e| BackendError::Tokenizer(e.to_string()))?;
        let mut input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        if input_ids.is_empty() {
            input_ids.push(self.eos_id.unwrap_or(0));
        }

        let budget = self
            .context_length
            .saturating_sub(run.max_new_tokens)
            .max(1);
        if input_ids.len() > budget {
            let dropped = input_ids.len() - budget;
            warn!(dropped, budget, "prompt exceeds context window, truncating from the left");
            input_ids.drain(..dropped);
        }
        let prompt_token_len = input_ids.len();

        if let Some(seed) = run.seed {
            tch::manual_seed(seed as i64);
        }

        no_grad(|| {
            let module = self.module.lock();

            for _ in 0..run.max_new_tokens {
                let input_tensor = Tensor::f_from_slice(&input_ids)
                    .and_then(|t| t.f_reshape([1, input_ids.len() as i64]))
                    .and_then(|t| t.f_to_device_(self.device, Kind::Int64, false, false))
                    .map_err(torch_error)?;

                let output = module
                    .forward_is(&[IValue::Tensor(input_tensor)])
                    .map_err(torch_error)?;

                // [1, seq_len, vocab] -> [vocab]
                let last_logits = logits_from(output)?
                    .f_select(1, -1)
                    .and_then(|t| t.f_squeeze())
                    .map_err(torch_error)?;
                let next_token_id = next_token(&last_logits, run)?;
                input_ids.push(next_token_id);

                if Some(next_token_id) == self.eos_id {
                    break;
                }
            }

            Ok::<(), BackendError>(())
        })?;

        let generated_ids: Vec<u32> = input_ids[prompt_token_len..]
            .iter()
            .filter(|&&id| Some(id) != self.eos_id)
            .map(|&id| id as u32)
            .collect();

        self.tokenizer
            .decode(&generated_ids, true)
            .map_err(|e| BackendError::Tokenizer(e.to_string()))
    }

    fn metadata(&self) -> ArtifactMetadata {
        ArtifactMetadata {
            name: self.name.clone(),
            quantized: self.quantized,
            dtype: kind_name(self.kind).to_string(),
            device: device_name(self.device),
            size_bytes: self.size_bytes,
            full_precision_size_bytes: self.full_precision_size_bytes,
        }
    }
}

fn require(path: PathBuf) -> Result<PathBuf, BackendError> {
    if path.exists() {
        Ok(path)
    } else {
        Err(BackendError::MissingArtifact(path))
    }
}

fn resolve_device(request: DeviceRequest) -> Result<Device, BackendError> {
    match request {
        DeviceRequest::Cpu => Ok(Device::Cpu),
        DeviceRequest::Auto if accelerator_available() => Ok(Device::Cuda(0)),
        DeviceRequest::Auto => Ok(Device::Cpu),
        DeviceRequest::Cuda(idx) => {
            if accelerator_available() && (idx as i64) < tch::Cuda::device_count() {
                Ok(Device::Cuda(idx))
            } else {
                Err(BackendError::Resource(format!(
                    "CUDA device {idx} requested but not available"
                )))
            }
        }
    }
}

fn resolve_kind(dtype: Dtype, device: Device) -> Kind {
    match dtype {
        Dtype::Auto if device.is_cuda() => Kind::Half,
        Dtype::Auto | Dtype::Float32 => Kind::Float,
        Dtype::Float16 => Kind::Half,
        Dtype::Bfloat16 => Kind::BFloat16,
    }
}

fn logits_from(output: IValue) -> Result<Tensor, BackendError> {
    match output {
        IValue::Tensor(t) => Ok(t),
        IValue::Tuple(ref tuple) if !tuple.is_empty() => match &tuple[0] {
            IValue::Tensor(t) => Ok(t.shallow_clone()),
            _ => Err(BackendError::Inference(
                "expected tensor as first tuple element".into(),
            )),
        },
        _ => Err(BackendError::Inference("unexpected model output format".into())),
    }
}

fn next_token(logits: &Tensor, run: &RunConfig) -> Result<i64, BackendError> {
    sample(logits, run).map_err(torch_error)
}

fn sample(logits: &Tensor, run: &RunConfig) -> Result<i64, TchError> {
    if run.is_greedy() {
        return logits.f_argmax(0, false)?.f_int64_value(&[]);
    }

    let scaled = logits.f_div_scalar(run.temperature)?;
    let vocab = scaled.size().last().copied().unwrap_or(0);
    let k = if run.top_k == 0 {
        vocab
    } else {
        (run.top_k as i64).min(vocab)
    };
    let (values, indices) = scaled.f_topk(k, -1, true, true)?;
    let mut probs = values.f_softmax(-1, Kind::Float)?;

    if run.top_p < 1.0 {
        // keep the smallest prefix whose mass reaches top_p; the first token always survives
        let preceding = probs.f_cumsum(-1, Kind::Float)?.f_sub(&probs)?;
        let keep = preceding.f_lt(run.top_p)?;
        let kept = probs.f_mul(&keep)?;
        probs = kept.f_div(&kept.f_sum(Kind::Float)?)?;
    }

    let choice = probs.f_multinomial(1, false)?.f_int64_value(&[0])?;
    indices.f_int64_value(&[choice])
}

fn torch_error(err: TchError) -> BackendError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("out of memory") || lower.contains("cuda error") || lower.contains("no cuda gpus") {
        BackendError::Resource(message)
    } else {
        BackendError::Inference(message)
    }
}

fn kind_name(kind: Kind) -> &'static str {
    match kind {
        Kind::Half => "float16",
        Kind::BFloat16 => "bfloat16",
        Kind::QInt8 => "int8",
        _ => "float32",
    }
}

fn device_name(device: Device) -> String {
    match device {
        Device::Cuda(idx) => format!("cuda:{idx}"),
        _ => "cpu".to_string(),
    }
}
