mod backend;
mod families;
mod registry;
pub mod runtime;
pub mod settings;
mod types;

#[cfg(feature = "tch-backend")]
mod loader;
#[cfg(test)]
pub(crate) mod testing;

pub use backend::ModelBackend;
pub use families::{ModelFamily, PromptTemplate};
#[cfg(feature = "tch-backend")]
pub use loader::TorchRuntime;
pub use registry::{BackendFactory, BackendRegistry, HUGGING_FACE_KEY};
pub use runtime::{LoadRequest, LoadedModel, ModelRuntime};
pub use settings::{DeviceRequest, Dtype, InitConfig, RunConfig};
pub use types::{ArtifactMetadata, Capabilities, GenerationRequest, GenerationResponse, ModelSpec};
