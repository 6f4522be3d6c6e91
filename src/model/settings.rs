use std::fmt;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::error::BackendError;

/// Generation-time parameters. Can be swapped on a live backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub max_new_tokens: usize,
    /// 0.0 means greedy decoding.
    pub temperature: f64,
    /// 0 disables top-k filtering.
    pub top_k: usize,
    pub top_p: f64,
    pub do_sample: bool,
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 256,
            temperature: 0.7,
            top_k: 50,
            top_p: 1.0,
            do_sample: true,
            seed: None,
        }
    }
}

impl RunConfig {
    /// Returns a copy with `overrides` applied. `self` is untouched on error.
    pub fn merged(&self, overrides: &Map<String, Value>) -> Result<Self, BackendError> {
        let merged: RunConfig = overlay(self, overrides, "config_run")?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn validate(&self) -> Result<(), BackendError> {
        if self.max_new_tokens == 0 {
            return Err(BackendError::validation(
                "config_run.max_new_tokens",
                "must be at least 1",
            ));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(BackendError::validation(
                "config_run.temperature",
                "must be a finite, non-negative number",
            ));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(BackendError::validation(
                "config_run.top_p",
                "must be in (0, 1]",
            ));
        }
        Ok(())
    }

    pub fn is_greedy(&self) -> bool {
        !self.do_sample || self.temperature == 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    Auto,
    Float32,
    Float16,
    Bfloat16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DeviceRequest {
    Auto,
    Cpu,
    Cuda(usize),
}

impl TryFrom<String> for DeviceRequest {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        let lower = raw.trim().to_lowercase();
        match lower.as_str() {
            "auto" => Ok(DeviceRequest::Auto),
            "cpu" => Ok(DeviceRequest::Cpu),
            "cuda" => Ok(DeviceRequest::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|idx| idx.parse::<usize>().ok())
                .map(DeviceRequest::Cuda)
                .ok_or_else(|| {
                    format!("unexpected value; permitted: 'auto', 'cpu', 'cuda', 'cuda:N' (got '{raw}')")
                }),
        }
    }
}

impl From<DeviceRequest> for String {
    fn from(device: DeviceRequest) -> Self {
        device.to_string()
    }
}

impl fmt::Display for DeviceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceRequest::Auto => write!(f, "auto"),
            DeviceRequest::Cpu => write!(f, "cpu"),
            DeviceRequest::Cuda(idx) => write!(f, "cuda:{idx}"),
        }
    }
}

/// Load-time parameters, fixed once weights are loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitConfig {
    pub device: DeviceRequest,
    pub dtype: Dtype,
    /// Load the pre-quantized int8 artifact instead of the full-precision one.
    pub load_in_8bit: bool,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            device: DeviceRequest::Auto,
            dtype: Dtype::Auto,
            load_in_8bit: false,
        }
    }
}

impl InitConfig {
    pub fn merged(&self, overrides: &Map<String, Value>) -> Result<Self, BackendError> {
        let merged: InitConfig = overlay(self, overrides, "config_init")?;
        if merged.load_in_8bit && matches!(merged.device, DeviceRequest::Cuda(_)) {
            return Err(BackendError::validation(
                "config_init.load_in_8bit",
                "int8 weights run on cpu only",
            ));
        }
        if merged.load_in_8bit && !matches!(merged.dtype, Dtype::Auto) {
            return Err(BackendError::validation(
                "config_init.dtype",
                "dtype cannot be combined with load_in_8bit",
            ));
        }
        Ok(merged)
    }
}

fn overlay<T>(base: &T, overrides: &Map<String, Value>, field: &str) -> Result<T, BackendError>
where
    T: Serialize + DeserializeOwned,
{
    let mut value = serde_json::to_value(base)
        .map_err(|e| BackendError::Other(format!("failed to serialize {field}: {e}")))?;
    let Some(fields) = value.as_object_mut() else {
        return Err(BackendError::Other(format!("{field} is not a mapping")));
    };
    for (key, val) in overrides {
        fields.insert(key.clone(), val.clone());
    }
    serde_json::from_value(value).map_err(|e| BackendError::validation(field, e.to_string()))
}
