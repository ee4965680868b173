pub mod processor;

pub use processor::{BatchImage, BatchProcessor, ResultSink, RunStatus};
