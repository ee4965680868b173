use std::sync::Arc;

use image::DynamicImage;
use shared::Prediction;

/// Loading the model can fail without poisoning the cache; the next access
/// retries from scratch. `Clone` so one failed load can be handed to every
/// caller coalesced onto the same flight.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LoadError {
    #[error("model data unavailable: {0}")]
    Unavailable(String),
    #[error("model failed to initialize: {0}")]
    Init(String),
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("unsupported input: {0}")]
    InvalidInput(String),
    #[error("inference runtime error: {0}")]
    Runtime(String),
}

/// A loaded, ready-to-query model. Predictions carry raw scores in [0, 1]
/// and come back in whatever order the model emits them; ranking is the
/// classifier's job.
pub trait VisionModel: Send + Sync + std::fmt::Debug {
    fn predict(&self, image: &DynamicImage) -> Result<Vec<Prediction>, InferenceError>;
}

/// Constructs the inference model. Expected to be expensive (model
/// deserialization); the call blocks until the model is ready.
pub trait ModelLoader: Send + Sync + 'static {
    fn load(&self) -> Result<Arc<dyn VisionModel>, LoadError>;
}

impl<F> ModelLoader for F
where
    F: Fn() -> Result<Arc<dyn VisionModel>, LoadError> + Send + Sync + 'static,
{
    fn load(&self) -> Result<Arc<dyn VisionModel>, LoadError> {
        self()
    }
}
