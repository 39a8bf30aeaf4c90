use anyhow::{Context, Result};
#[cfg(any(feature = "openvino", feature = "cuda"))]
use ort::ep::{self, ExecutionProvider};
use ort::session::{
    builder::{GraphOptimizationLevel, SessionBuilder},
    Session,
};
use std::path::{Path, PathBuf};

pub const DETECTOR_MODEL_FILE: &str = "face_detection_yunet_2023mar.onnx";
pub const RECOGNIZER_MODEL_FILE: &str = "face_recognition_sface_2021dec.onnx";

/// Locations of the ONNX model files on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub recognizer: PathBuf,
}

impl ModelPaths {
    /// Both models under `dir` with their upstream file names.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            detector: dir.join(DETECTOR_MODEL_FILE),
            recognizer: dir.join(RECOGNIZER_MODEL_FILE),
        }
    }

    pub fn missing(&self) -> Vec<&Path> {
        [self.detector.as_path(), self.recognizer.as_path()]
            .into_iter()
            .filter(|p| !p.is_file())
            .collect()
    }
}

pub fn session_builder() -> Result<SessionBuilder> {
    #[allow(unused_mut)]
    let mut builder =
        Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

    #[cfg(feature = "openvino")]
    {
        let ep = ep::OpenVINO::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("openvino feature is enabled, onnx runtime not compiled with openvino")
        }
    }

    #[cfg(feature = "cuda")]
    {
        let ep = ep::CUDA::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("cuda feature is enabled, onnx runtime not compiled with cuda")
        }
    }

    Ok(builder)
}

fn load(path: &Path, what: &str) -> Result<Session> {
    log::debug!("loading {} model from {}", what, path.display());
    session_builder()?
        .commit_from_file(path)
        .with_context(|| format!("load {} model {}", what, path.display()))
}

pub fn detector_session(path: &Path) -> Result<Session> {
    load(path, "detector")
}

pub fn recog_session(path: &Path) -> Result<Session> {
    load(path, "recognition")
}
