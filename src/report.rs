use log::{info, warn};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{FaceFindError, Result};
use crate::extractor::{EmbeddingExtractor, FaceEmbedder};
use crate::matcher::{MatchEngine, MatchPolicy};
use crate::scanner::{DirectoryScanner, ScanResult, SkipList};
use crate::Embedding;

/// Whether the image stored under `key` shows the reference face.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchVerdict {
    pub key: usize,
    pub path: PathBuf,
    pub matched: bool,
    pub distance: f32,
    pub faces: usize,
}

impl fmt::Display for MatchVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let similar = if self.matched { "similar" } else { "not similar" };
        write!(
            f,
            "Face {} is {} to the base image. ({})",
            self.key,
            similar,
            self.path.display()
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub reference: PathBuf,
    /// Faces found in the reference image; only the first is used.
    pub reference_faces: usize,
    pub tolerance: f32,
    pub policy: MatchPolicy,
    /// In key order.
    pub verdicts: Vec<MatchVerdict>,
}

impl Report {
    pub fn matches(&self) -> impl Iterator<Item = &MatchVerdict> {
        self.verdicts.iter().filter(|v| v.matched)
    }
}

/// Drives a whole run: reference face, scan, one verdict per scanned image.
pub struct ReportDriver<M> {
    extractor: EmbeddingExtractor<M>,
    engine: MatchEngine,
}

impl<M: FaceEmbedder> ReportDriver<M> {
    pub fn new(model: M, engine: MatchEngine) -> Self {
        Self {
            extractor: EmbeddingExtractor::new(model),
            engine,
        }
    }

    pub fn extractor(&self) -> &EmbeddingExtractor<M> {
        &self.extractor
    }

    /// First face of the base image, and how many faces it had.
    pub fn reference_embedding(&mut self, base: &Path) -> Result<(Embedding, usize)> {
        let faces = self.extractor.extract(base)?;
        let count = faces.len();
        let Some(reference) = faces.into_iter().next() else {
            return Err(FaceFindError::NoFaceInReference(base.to_path_buf()));
        };
        if count > 1 {
            warn!(
                "{} faces in {}, using the first one",
                count,
                base.display()
            );
        }
        Ok((reference, count))
    }

    pub fn scan(&mut self, target: &Path, skip: &SkipList) -> Result<ScanResult> {
        DirectoryScanner::new(&mut self.extractor).scan(target, skip)
    }

    pub fn verdicts(&self, reference: &Embedding, scanned: &ScanResult) -> Result<Vec<MatchVerdict>> {
        scanned
            .iter()
            .map(|entry| {
                let decision = self.engine.decide(reference, &entry.faces)?;
                Ok(MatchVerdict {
                    key: entry.key,
                    path: entry.path.clone(),
                    matched: decision.matched,
                    distance: decision.distance,
                    faces: entry.faces.len(),
                })
            })
            .collect()
    }

    pub fn run(&mut self, base: &Path, target: &Path, skip: &SkipList) -> Result<Report> {
        let (reference, reference_faces) = self.reference_embedding(base)?;
        let scanned = self.scan(target, skip)?;
        let verdicts = self.verdicts(&reference, &scanned)?;

        info!(
            "{} of {} image(s) match {}",
            verdicts.iter().filter(|v| v.matched).count(),
            verdicts.len(),
            base.display()
        );

        Ok(Report {
            reference: base.to_path_buf(),
            reference_faces,
            tolerance: self.engine.tolerance,
            policy: self.engine.policy,
            verdicts,
        })
    }
}
