//! End-to-end flow: warm the cache, submit a batch, read the result stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use classifier::{
    BatchImage, BatchProcessor, ImageClassifier, InferenceError, ModelCache, RunStatus,
    VisionModel,
};
use image::DynamicImage;
use shared::{ClassificationOutcome, ClassifiedItem, Prediction};
use tokio::sync::mpsc;

#[derive(Debug)]
struct LabelingModel;

impl VisionModel for LabelingModel {
    fn predict(&self, image: &DynamicImage) -> Result<Vec<Prediction>, InferenceError> {
        // Wider fixtures read as "landscape", the rest as "portrait".
        let landscape = image.width() > image.height();
        Ok(vec![
            Prediction {
                label: "landscape".into(),
                confidence: if landscape { 0.9 } else { 0.1 },
            },
            Prediction {
                label: "portrait".into(),
                confidence: if landscape { 0.1 } else { 0.9 },
            },
        ])
    }
}

fn pipeline() -> (
    BatchProcessor,
    ModelCache,
    mpsc::UnboundedReceiver<ClassifiedItem>,
    Arc<AtomicUsize>,
) {
    let _ = env_logger::builder().is_test(true).try_init();

    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    let cache = ModelCache::new(
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(LabelingModel) as Arc<dyn VisionModel>)
        },
        Duration::from_secs(300),
    );
    let classifier = ImageClassifier::new(cache.clone());
    let (tx, rx) = mpsc::unbounded_channel();
    (BatchProcessor::new(classifier, tx), cache, rx, loads)
}

async fn wait_for_completion(processor: &BatchProcessor) {
    for _ in 0..400 {
        if processor.run_status() == Some(RunStatus::Completed) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("batch never completed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn warm_then_batch_reuses_one_model_load() {
    let (processor, cache, mut rx, loads) = pipeline();

    // Pre-pay the load cost the way an embedder would at startup.
    cache.warm();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(cache.is_loaded());

    let images = vec![
        BatchImage::new(DynamicImage::new_rgb8(8, 4)),
        BatchImage::new(DynamicImage::new_rgb8(4, 8)),
        BatchImage::new(DynamicImage::new_rgb8(8, 4)),
    ];
    processor.submit(images);

    let mut labels = Vec::new();
    for _ in 0..3 {
        let item = rx.recv().await.unwrap();
        match item.outcome {
            ClassificationOutcome::Classified { label, confidence } => {
                assert_eq!(confidence, "90.00");
                labels.push(label);
            }
            ClassificationOutcome::Failed { kind, message } => {
                panic!("unexpected failure {kind}: {message}")
            }
        }
    }
    assert_eq!(labels, vec!["landscape", "portrait", "landscape"]);

    wait_for_completion(&processor).await;
    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn back_to_back_batches_share_the_cached_model() {
    let (processor, _cache, mut rx, loads) = pipeline();

    processor.submit(vec![BatchImage::new(DynamicImage::new_rgb8(8, 4))]);
    let first = rx.recv().await.unwrap();
    assert!(first.is_success());
    wait_for_completion(&processor).await;

    processor.submit(vec![BatchImage::new(DynamicImage::new_rgb8(4, 8))]);
    let second = rx.recv().await.unwrap();
    assert!(second.is_success());
    wait_for_completion(&processor).await;

    assert_eq!(loads.load(Ordering::SeqCst), 1);
}
