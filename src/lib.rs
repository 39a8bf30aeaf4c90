pub mod config;
pub mod error;
pub mod extractor;
pub mod matcher;
pub mod report;
pub mod scanner;
pub mod validator;

// Re-export vision types for convenience
pub use facefind_vision::{face, pipeline, Detection, Embedding, ModelPaths, Pipeline};

pub use error::{FaceFindError, Result};
pub use extractor::{EmbeddingExtractor, FaceEmbedder, ImageFaceSet};
pub use matcher::{MatchEngine, MatchPolicy};
pub use report::{MatchVerdict, Report, ReportDriver};
pub use scanner::{DirectoryScanner, ScanResult, SkipList};
