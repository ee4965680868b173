use serde::{Deserialize, Serialize};
use strum_macros::Display;
use uuid::Uuid;

/// A single ranked prediction: a class label with a raw confidence in [0, 1].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
}

impl Prediction {
    /// Confidence as a percentage string with fixed two-decimal precision,
    /// e.g. `0.8734` -> `"87.34"`. The same raw score always formats to the
    /// same string.
    pub fn confidence_percentage(&self) -> String {
        format!("{:.2}", self.confidence * 100.0)
    }
}

/// Which stage of a classification attempt failed.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum FailureKind {
    InvalidInput,
    ModelLoad,
    Inference,
}

/// Outcome of classifying one image: the top prediction, or the error that
/// stopped it. A failed item is still an item.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum ClassificationOutcome {
    Classified { label: String, confidence: String },
    Failed { kind: FailureKind, message: String },
}

/// One entry of a batch's result stream, emitted incrementally in submission
/// order. `image_id` refers back to the submitted image; `index` is its
/// position within the batch.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ClassifiedItem {
    pub image_id: Uuid,
    pub index: usize,
    pub outcome: ClassificationOutcome,
}

impl ClassifiedItem {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ClassificationOutcome::Classified { .. })
    }
}
