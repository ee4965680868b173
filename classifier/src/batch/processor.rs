//! Supersede-on-new-request batch orchestration.
//!
//! One run is active at a time. Submitting a new batch flags the old run as
//! cancelled and takes its place; the old run stops at the next item
//! boundary. Results are published to the sink one by one, in submission
//! order, so callers can render incrementally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use image::DynamicImage;
use shared::{ClassificationOutcome, ClassifiedItem, FailureKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::classify::ImageClassifier;

/// Receives classified items as they complete. Invoked on whatever execution
/// context the run happens to be polled on; only ordering is guaranteed.
pub trait ResultSink: Send + Sync + 'static {
    fn publish(&self, item: ClassifiedItem);
}

impl ResultSink for mpsc::UnboundedSender<ClassifiedItem> {
    fn publish(&self, item: ClassifiedItem) {
        // A dropped receiver means nobody is watching anymore.
        let _ = self.send(item);
    }
}

impl<F> ResultSink for F
where
    F: Fn(ClassifiedItem) + Send + Sync + 'static,
{
    fn publish(&self, item: ClassifiedItem) {
        self(item)
    }
}

/// A decoded image tagged with the id the emitted result will carry.
pub struct BatchImage {
    pub id: Uuid,
    pub image: DynamicImage,
}

impl BatchImage {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            id: Uuid::new_v4(),
            image,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Cancelled,
}

struct BatchRun {
    id: Uuid,
    cancelled: Arc<AtomicBool>,
    status: Arc<Mutex<RunStatus>>,
    task: JoinHandle<()>,
}

pub struct BatchProcessor {
    classifier: ImageClassifier,
    sink: Arc<dyn ResultSink>,
    active: Mutex<Option<BatchRun>>,
}

impl BatchProcessor {
    pub fn new(classifier: ImageClassifier, sink: impl ResultSink) -> Self {
        Self {
            classifier,
            sink: Arc::new(sink),
            active: Mutex::new(None),
        }
    }

    /// Starts processing a batch, superseding any run still in flight.
    ///
    /// The superseded run's in-flight item is allowed to finish, but nothing
    /// past it is processed or emitted. The new run waits for the old task
    /// to wind down before touching the classifier, so runs never overlap;
    /// the caller is not blocked by either.
    pub fn submit(&self, images: Vec<BatchImage>) {
        let mut active = self.active.lock().unwrap();

        let previous = active.take().map(|run| {
            run.cancelled.store(true, Ordering::Release);
            log::debug!("superseding batch run {}", run.id);
            run.task
        });

        let run_id = Uuid::new_v4();
        let cancelled = Arc::new(AtomicBool::new(false));
        let status = Arc::new(Mutex::new(RunStatus::Running));
        let task = tokio::spawn(process_batch(
            self.classifier.clone(),
            Arc::clone(&self.sink),
            images,
            run_id,
            Arc::clone(&cancelled),
            Arc::clone(&status),
            previous,
        ));

        *active = Some(BatchRun {
            id: run_id,
            cancelled,
            status,
            task,
        });
    }

    /// Status of the most recently submitted run.
    pub fn run_status(&self) -> Option<RunStatus> {
        self.active
            .lock()
            .unwrap()
            .as_ref()
            .map(|run| *run.status.lock().unwrap())
    }

    pub fn active_run_id(&self) -> Option<Uuid> {
        self.active.lock().unwrap().as_ref().map(|run| run.id)
    }
}

async fn process_batch(
    classifier: ImageClassifier,
    sink: Arc<dyn ResultSink>,
    images: Vec<BatchImage>,
    run_id: Uuid,
    cancelled: Arc<AtomicBool>,
    status: Arc<Mutex<RunStatus>>,
    previous: Option<JoinHandle<()>>,
) {
    // Let the superseded run leave its current item before we start ours.
    if let Some(task) = previous {
        let _ = task.await;
    }

    log::info!("batch {run_id}: processing {} images", images.len());
    for (index, entry) in images.into_iter().enumerate() {
        if cancelled.load(Ordering::Acquire) {
            *status.lock().unwrap() = RunStatus::Cancelled;
            log::info!("batch {run_id}: cancelled before item {index}");
            return;
        }

        let outcome = match classifier.classify(&entry.image).await {
            Ok(predictions) => match predictions.into_iter().next() {
                Some(top) => ClassificationOutcome::Classified {
                    confidence: top.confidence_percentage(),
                    label: top.label,
                },
                None => ClassificationOutcome::Failed {
                    kind: FailureKind::Inference,
                    message: "model produced no predictions".into(),
                },
            },
            Err(e) => {
                log::error!("batch {run_id}: item {index} failed: {e}");
                ClassificationOutcome::Failed {
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        };

        sink.publish(ClassifiedItem {
            image_id: entry.id,
            index,
            outcome,
        });
        tokio::task::yield_now().await;
    }

    *status.lock().unwrap() = RunStatus::Completed;
    log::info!("batch {run_id}: completed");
}
