//! Image-classification core: a lazily loaded, idle-evicted model cache,
//! a ranking classifier on top of it, and a supersede-on-submit batch
//! processor that publishes results incrementally.

pub mod batch;
pub mod cache;
pub mod classify;
pub mod model;

pub use batch::{BatchImage, BatchProcessor, ResultSink, RunStatus};
pub use cache::{DEFAULT_IDLE_TIMEOUT, ModelCache};
pub use classify::{ClassificationError, ImageClassifier};
pub use model::{InferenceError, LoadError, ModelLoader, VisionModel};
