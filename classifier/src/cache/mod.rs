pub mod model_cache;

pub use model_cache::{DEFAULT_IDLE_TIMEOUT, ModelCache};
