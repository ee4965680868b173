use std::cmp::Ordering;

use image::DynamicImage;
use shared::{FailureKind, Prediction};

use crate::cache::ModelCache;
use crate::model::{InferenceError, LoadError};

#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("model load failed: {0}")]
    Load(#[from] LoadError),
    #[error("invalid input image: {0}")]
    InvalidInput(String),
    #[error("inference failed: {0}")]
    Inference(String),
}

impl ClassificationError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ClassificationError::Load(_) => FailureKind::ModelLoad,
            ClassificationError::InvalidInput(_) => FailureKind::InvalidInput,
            ClassificationError::Inference(_) => FailureKind::Inference,
        }
    }
}

/// Stateless façade over the model cache: obtains the model, runs inference,
/// and ranks the output by descending confidence.
#[derive(Clone)]
pub struct ImageClassifier {
    cache: ModelCache,
}

impl ImageClassifier {
    pub fn new(cache: ModelCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Classifies one image, returning predictions sorted by descending
    /// confidence. The sort is stable, so tied scores keep the order the
    /// model emitted them in. One attempt per call; retries are the
    /// caller's business.
    pub async fn classify(
        &self,
        image: &DynamicImage,
    ) -> Result<Vec<Prediction>, ClassificationError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ClassificationError::InvalidInput(
                "image has zero pixel area".into(),
            ));
        }

        let model = self.cache.get_or_load().await?;
        let mut predictions = model.predict(image).map_err(|e| match e {
            InferenceError::InvalidInput(msg) => ClassificationError::InvalidInput(msg),
            InferenceError::Runtime(msg) => ClassificationError::Inference(msg),
        })?;

        predictions.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });
        Ok(predictions)
    }
}
