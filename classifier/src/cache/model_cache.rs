//! Lifecycle of the one expensive inference model instance.
//!
//! The model is loaded lazily, kept while in active use, and released after
//! an idle period so memory is not held across quiet stretches. Every access
//! restarts the idle countdown.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::model::{LoadError, ModelLoader, VisionModel};

/// How long the model survives without being accessed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

type LoadResult = Result<Arc<dyn VisionModel>, LoadError>;

struct CacheState {
    model: Option<Arc<dyn VisionModel>>,
    /// Present while a load is in flight; late callers subscribe instead of
    /// starting a second construction.
    inflight: Option<broadcast::Sender<LoadResult>>,
    /// Bumped on every timer re-arm. A cooldown task that fires with a stale
    /// epoch lost the race to an access and must not evict.
    epoch: u64,
    cooldown: Option<JoinHandle<()>>,
}

struct CacheInner {
    loader: Box<dyn ModelLoader>,
    idle_timeout: Duration,
    state: Mutex<CacheState>,
}

#[derive(Clone)]
pub struct ModelCache {
    inner: Arc<CacheInner>,
}

impl ModelCache {
    pub fn new(loader: impl ModelLoader, idle_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                loader: Box::new(loader),
                idle_timeout,
                state: Mutex::new(CacheState {
                    model: None,
                    inflight: None,
                    epoch: 0,
                    cooldown: None,
                }),
            }),
        }
    }

    /// Returns the cached model, loading it first if necessary.
    ///
    /// Concurrent callers during a cold state are coalesced onto a single
    /// construction and all observe the same model or the same error. A
    /// failed load leaves the cache empty; the next call retries from
    /// scratch. Every successful access restarts the idle countdown.
    pub async fn get_or_load(&self) -> LoadResult {
        let mut rx = {
            let mut state = self.inner.state.lock().unwrap();
            if let Some(model) = &state.model {
                let model = Arc::clone(model);
                self.rearm(&mut state);
                return Ok(model);
            }
            if let Some(inflight) = &state.inflight {
                inflight.subscribe()
            } else {
                let (tx, _) = broadcast::channel(1);
                state.inflight = Some(tx);
                drop(state);
                return self.load_cold();
            }
        };
        match rx.recv().await {
            Ok(result) => result,
            Err(_) => Err(LoadError::Init("model load did not complete".into())),
        }
    }

    /// Kicks off construction in the background so the first real request
    /// does not pay the load cost. Restarts the idle countdown regardless of
    /// the outcome; a warm-up failure is only logged.
    pub fn warm(&self) {
        log::debug!("warming model cache");
        let cache = self.clone();
        tokio::spawn(async move {
            if cache.get_or_load().await.is_err() {
                let mut state = cache.inner.state.lock().unwrap();
                cache.rearm(&mut state);
            }
        });
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.state.lock().unwrap().model.is_some()
    }

    pub fn idle_timeout(&self) -> Duration {
        self.inner.idle_timeout
    }

    /// Runs the loader with the state lock released, so subscribers can keep
    /// registering while construction is in progress. Only ever entered by
    /// the caller that installed the inflight sender.
    fn load_cold(&self) -> LoadResult {
        log::info!("loading inference model");
        let started = Instant::now();
        let result = self.inner.loader.load();

        let mut state = self.inner.state.lock().unwrap();
        let inflight = state.inflight.take();
        match &result {
            Ok(model) => {
                log::info!("inference model loaded in {:?}", started.elapsed());
                state.model = Some(Arc::clone(model));
                self.rearm(&mut state);
            }
            Err(e) => {
                log::error!("inference model failed to load: {e}");
            }
        }
        drop(state);

        if let Some(tx) = inflight {
            let _ = tx.send(result.clone());
        }
        result
    }

    /// Restarts the idle countdown: cancels the pending cooldown task and
    /// spawns a fresh one. At most one cooldown is ever pending. The epoch
    /// check makes reset-or-fire atomic with respect to concurrent accesses.
    fn rearm(&self, state: &mut CacheState) {
        state.epoch += 1;
        let epoch = state.epoch;
        if let Some(previous) = state.cooldown.take() {
            previous.abort();
        }
        let inner = Arc::clone(&self.inner);
        state.cooldown = Some(tokio::spawn(async move {
            tokio::time::sleep(inner.idle_timeout).await;
            let mut state = inner.state.lock().unwrap();
            if state.epoch != epoch {
                return;
            }
            if state.model.take().is_some() {
                log::info!(
                    "inference model released after {:?} idle",
                    inner.idle_timeout
                );
            }
        }));
    }
}
