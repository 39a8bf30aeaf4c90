use serde::{Deserialize, Serialize};

use crate::error::{FaceFindError, Result};
use crate::Embedding;

/// Largest Euclidean distance between two embeddings of the same person,
/// for embeddings without a model-specific threshold. The CLI takes its
/// default from the recognizer instead.
pub const DEFAULT_TOLERANCE: f32 = 0.6;

/// Which faces of a multi-face image take part in the decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPolicy {
    /// Only the first (best scoring) face is compared; the rest are ignored.
    #[default]
    FirstFace,
    /// Match if any face in the image is within tolerance.
    AnyFace,
}

/// Outcome of comparing one image's faces against the reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub matched: bool,
    /// Distance of the face that decided the outcome.
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchEngine {
    pub tolerance: f32,
    pub policy: MatchPolicy,
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            policy: MatchPolicy::FirstFace,
        }
    }
}

impl MatchEngine {
    pub fn new(tolerance: f32, policy: MatchPolicy) -> Self {
        Self { tolerance, policy }
    }

    pub fn is_match(&self, reference: &Embedding, candidates: &[Embedding]) -> Result<bool> {
        self.decide(reference, candidates).map(|d| d.matched)
    }

    pub fn decide(&self, reference: &Embedding, candidates: &[Embedding]) -> Result<Decision> {
        let considered = match self.policy {
            MatchPolicy::FirstFace => candidates.get(..1).unwrap_or_default(),
            MatchPolicy::AnyFace => candidates,
        };
        if considered.is_empty() {
            return Err(FaceFindError::InvalidInput(
                "candidate face set is empty".into(),
            ));
        }

        let mut closest = f32::INFINITY;
        for candidate in considered {
            if candidate.dim() != reference.dim() {
                return Err(FaceFindError::InvalidInput(format!(
                    "embedding dimension {} does not match reference dimension {}",
                    candidate.dim(),
                    reference.dim()
                )));
            }
            closest = closest.min(reference.distance(candidate));
        }

        Ok(Decision {
            matched: closest <= self.tolerance,
            distance: closest,
        })
    }
}
