use anyhow::{Context, Result};
use image::DynamicImage;
use ort::session::Session;

use crate::face::{self, Detection, Embedding, FACE_SIZE};
use crate::model::{self, ModelPaths};

pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.6;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.3;

/// Full pipeline: detect faces → align → encode
pub struct Pipeline {
    pub detector: Session,
    pub encoder: Session,
    pub score_threshold: f32,
    pub nms_threshold: f32,
}

impl Pipeline {
    pub fn new(paths: &ModelPaths) -> Result<Self> {
        let missing = paths.missing();
        if !missing.is_empty() {
            anyhow::bail!("model files not found: {:?}", missing);
        }
        Ok(Self {
            detector: model::detector_session(&paths.detector)?,
            encoder: model::recog_session(&paths.recognizer)?,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
        })
    }

    pub fn with_thresholds(mut self, score_threshold: f32, nms_threshold: f32) -> Self {
        self.score_threshold = score_threshold;
        self.nms_threshold = nms_threshold;
        self
    }

    pub fn detect(&mut self, img: &DynamicImage) -> Result<Vec<Detection>> {
        face::detect_faces(
            &mut self.detector,
            img,
            self.score_threshold,
            self.nms_threshold,
        )
        .context("detecting faces")
    }

    /// Embed every detected face, best detection first.
    ///
    /// Detections whose landmarks cannot be aligned are dropped.
    pub fn embed_faces(&mut self, img: &DynamicImage) -> Result<Vec<(Detection, Embedding)>> {
        let detections = self.detect(img)?;
        let mut faces = Vec::with_capacity(detections.len());

        for detection in detections {
            let aligned = match face::align_face(img, &detection, FACE_SIZE) {
                Ok(aligned) => aligned,
                Err(e) => {
                    log::debug!("skipping detection (score {:.3}): {}", detection.score, e);
                    continue;
                }
            };
            let embedding =
                face::encode_face(&mut self.encoder, &aligned).context("encoding face")?;
            faces.push((detection, embedding));
        }

        Ok(faces)
    }
}
