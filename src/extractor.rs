use image::DynamicImage;
use log::{debug, warn};
use std::path::Path;

use crate::error::Result;
use crate::{validator, Embedding, Pipeline};

/// Embeddings of every face found in one image, in detector order.
pub type ImageFaceSet = Vec<Embedding>;

/// A face detection + recognition model.
pub trait FaceEmbedder {
    /// One embedding per detected face. No face is an empty vector, not an error.
    fn embed(&mut self, image: &DynamicImage) -> anyhow::Result<Vec<Embedding>>;
}

impl FaceEmbedder for Pipeline {
    fn embed(&mut self, image: &DynamicImage) -> anyhow::Result<Vec<Embedding>> {
        Ok(self
            .embed_faces(image)?
            .into_iter()
            .map(|(_, embedding)| embedding)
            .collect())
    }
}

/// Turns image files into face sets, validating before the model runs.
pub struct EmbeddingExtractor<M> {
    model: M,
}

impl<M: FaceEmbedder> EmbeddingExtractor<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    pub fn extract(&mut self, path: &Path) -> Result<ImageFaceSet> {
        if !validator::is_valid_image(path)? {
            return Ok(Vec::new());
        }
        let Some(image) = validator::decode_image(path)? else {
            warn!("skipping {}: image failed to decode", path.display());
            return Ok(Vec::new());
        };

        let faces = self.model.embed(&image)?;
        debug!("{}: {} face(s)", path.display(), faces.len());
        Ok(faces)
    }
}
