pub mod config;
pub mod error;
pub mod evaluation;
pub mod hardware;
pub mod model;
pub mod quantization;
pub mod server;

pub use config::{AppConfig, ModelConfig};
pub use error::BackendError;
pub use evaluation::{EvaluationReport, EvaluationSample};
pub use hardware::accelerator_available;
#[cfg(feature = "tch-backend")]
pub use model::TorchRuntime;
pub use model::{
    BackendRegistry, Capabilities, GenerationRequest, GenerationResponse, HUGGING_FACE_KEY,
    LoadRequest, LoadedModel, ModelBackend, ModelFamily, ModelRuntime, ModelSpec, RunConfig,
};
pub use server::build_router;
