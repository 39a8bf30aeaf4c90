pub mod face;
pub mod model;
pub mod pipeline;
pub mod yunet;

// Re-export commonly used types
pub use face::{Detection, Embedding, DEFAULT_L2_THRESHOLD};
pub use model::ModelPaths;
pub use pipeline::Pipeline;
