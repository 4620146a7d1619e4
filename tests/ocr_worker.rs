mod common;

use docproc::ocr::{
    EngineFactory, EngineMode, EngineOutput, EngineWord, OcrService, OcrSettings,
    OcrWorkerManager, OcrWorkerState, RecognitionEngine,
};
use docproc::{DocumentHandle, OcrError, PageRaster, RasterError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

/// Shared log of everything the engines were asked to do.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
    fail_next: AtomicBool,
    delay: Mutex<Duration>,
}

impl Recorder {
    fn record(&self, event: String) {
        self.events.lock().push(event);
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

struct RecordingFactory(Arc<Recorder>);

struct RecordingEngine {
    language: String,
    recorder: Arc<Recorder>,
}

impl EngineFactory for RecordingFactory {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn description(&self) -> &'static str {
        "records lifecycle calls"
    }

    fn supported_languages(&self) -> Vec<String> {
        vec!["eng".to_string(), "spa".to_string(), "deu".to_string()]
    }

    fn allocate(
        &self,
        language: &str,
        mode: EngineMode,
    ) -> Result<Box<dyn RecognitionEngine>, OcrError> {
        assert_eq!(mode, EngineMode::default());
        self.0.record(format!("allocate:{}", language));
        Ok(Box::new(RecordingEngine {
            language: language.to_string(),
            recorder: Arc::clone(&self.0),
        }))
    }
}

impl RecognitionEngine for RecordingEngine {
    fn language(&self) -> &str {
        &self.language
    }

    fn recognize(&mut self, raster: &PageRaster) -> Result<EngineOutput, OcrError> {
        let delay = *self.recorder.delay.lock();
        std::thread::sleep(delay);
        self.recorder
            .record(format!("recognize:{}:{}", self.language, raster.page()));

        if self.recorder.fail_next.swap(false, Ordering::SeqCst) {
            return Err(OcrError::EngineFailure("engine crashed".to_string()));
        }

        if raster.page() != 1 {
            return Ok(EngineOutput::default());
        }

        let words = ["Sample", "OCR", "text"]
            .iter()
            .enumerate()
            .map(|(i, text)| EngineWord {
                text: text.to_string(),
                confidence: 90.0 + i as f32,
                x: 10.0 + 60.0 * i as f32,
                y: 20.0,
                width: 50.0,
                height: 12.0,
            })
            .collect();
        Ok(EngineOutput {
            text: "Sample OCR text\n".to_string(),
            mean_confidence: None,
            words,
        })
    }

    fn shutdown(self: Box<Self>) {
        self.recorder.record(format!("shutdown:{}", self.language));
    }
}

fn manager() -> (Arc<OcrWorkerManager>, Arc<Recorder>) {
    let recorder = Arc::new(Recorder::default());
    let settings = OcrSettings {
        scale: 0.5,
        ..OcrSettings::default()
    };
    let manager = OcrWorkerManager::new(Arc::new(RecordingFactory(Arc::clone(&recorder))), settings);
    (Arc::new(manager), recorder)
}

fn scanned(pages: usize) -> DocumentHandle {
    common::load(&common::scanned_pdf(pages))
}

#[test]
fn test_ensure_ready_is_idempotent() {
    let (manager, recorder) = manager();
    manager.ensure_ready("eng").unwrap();
    manager.ensure_ready("eng").unwrap();

    assert_eq!(recorder.events(), ["allocate:eng"]);
    assert_eq!(manager.state(), OcrWorkerState::Ready("eng".to_string()));
}

#[test]
fn test_language_switch_tears_down_before_allocating() {
    let (manager, recorder) = manager();
    manager.ensure_ready("eng").unwrap();
    manager.ensure_ready("spa").unwrap();

    assert_eq!(
        recorder.events(),
        ["allocate:eng", "shutdown:eng", "allocate:spa"]
    );
    assert_eq!(manager.state(), OcrWorkerState::Ready("spa".to_string()));
}

#[test]
fn test_recognize_sample_page() {
    let (manager, _) = manager();
    let doc = scanned(5);

    let result = manager.recognize_page(&doc, 1, "eng").unwrap();
    assert_eq!(result.text, "Sample OCR text");
    assert_eq!(result.language, "eng");
    assert_eq!(result.page_number, 1);
    assert_eq!(result.confidence, 91.0);
    assert_eq!(result.blocks.len(), 3);
    assert_eq!(result.blocks[2].bounds.x, 130.0);

    let blank = manager.recognize_page(&doc, 4, "eng").unwrap();
    assert_eq!(blank.text, "");
    assert_eq!(blank.confidence, 0.0);
    assert!(blank.blocks.is_empty());
}

#[test]
fn test_recognize_in_another_language_switches_engine() {
    let (manager, recorder) = manager();
    let doc = scanned(2);

    manager.recognize_page(&doc, 1, "eng").unwrap();
    let result = manager.recognize_page(&doc, 1, "deu").unwrap();
    assert_eq!(result.language, "deu");
    assert_eq!(
        recorder.events(),
        [
            "allocate:eng",
            "recognize:eng:1",
            "shutdown:eng",
            "allocate:deu",
            "recognize:deu:1"
        ]
    );
}

#[test]
fn test_engine_failure_keeps_worker_ready() {
    let (manager, recorder) = manager();
    let doc = scanned(1);
    recorder.fail_next.store(true, Ordering::SeqCst);

    assert!(matches!(
        manager.recognize_page(&doc, 1, "eng"),
        Err(OcrError::EngineFailure(_))
    ));
    assert_eq!(manager.state(), OcrWorkerState::Ready("eng".to_string()));

    // Retried without reinitialization
    assert_eq!(manager.recognize_page(&doc, 1, "eng").unwrap().text, "Sample OCR text");
    assert_eq!(recorder.count("allocate"), 1);
}

#[test]
fn test_raster_failure_never_reaches_engine() {
    let (manager, recorder) = manager();
    let doc = scanned(2);

    let err = manager.recognize_page(&doc, 9, "eng").unwrap_err();
    assert_eq!(
        err,
        OcrError::SourcePage(RasterError::PageOutOfRange { page: 9, total: 2 })
    );
    assert_eq!(recorder.count("recognize"), 0);
    assert_eq!(manager.state(), OcrWorkerState::Ready("eng".to_string()));
}

#[test]
fn test_unsupported_language_is_rejected_up_front() {
    let (manager, recorder) = manager();
    let doc = scanned(1);

    assert_eq!(
        manager.recognize_page(&doc, 1, "klingon"),
        Err(OcrError::UnsupportedLanguage("klingon".to_string()))
    );
    assert!(recorder.events().is_empty());
    assert_eq!(manager.state(), OcrWorkerState::Uninitialized);
}

#[test]
fn test_terminate_then_reuse() {
    let (manager, recorder) = manager();
    manager.ensure_ready("eng").unwrap();
    manager.terminate();
    manager.terminate();
    assert_eq!(manager.state(), OcrWorkerState::Terminated);

    let doc = scanned(1);
    manager.recognize_page(&doc, 1, "eng").unwrap();
    assert_eq!(
        recorder.events(),
        ["allocate:eng", "shutdown:eng", "allocate:eng", "recognize:eng:1"]
    );
}

#[tokio::test]
async fn test_service_recognizes_page() {
    let (manager, _) = manager();
    let service = OcrService::new(manager, Duration::from_secs(30));

    assert_ok!(service.ensure_ready("eng").await);
    let result = assert_ok!(
        service
            .recognize_page(Arc::new(scanned(5)), 1, "eng")
            .await
    );
    assert_eq!(result.text, "Sample OCR text");
    assert_eq!(service.terminate().await.unwrap(), OcrWorkerState::Terminated);
}

#[tokio::test]
async fn test_service_timeout_is_engine_failure() {
    let (manager, recorder) = manager();
    *recorder.delay.lock() = Duration::from_millis(400);
    let service = OcrService::new(manager, Duration::from_millis(50));

    let err = assert_err!(
        service
            .recognize_page(Arc::new(scanned(1)), 1, "eng")
            .await
    );
    assert!(matches!(err, OcrError::EngineFailure(ref reason) if reason.contains("timed out")));

    // The abandoned call still completes and the worker stays ready
    assert_eq!(service.state(), OcrWorkerState::Ready("eng".to_string()));
    assert_eq!(recorder.count("recognize"), 1);
}

#[tokio::test]
async fn test_dropped_request_leaves_worker_consistent() {
    let (manager, recorder) = manager();
    *recorder.delay.lock() = Duration::from_millis(200);
    let service = OcrService::new(manager, Duration::from_secs(30));
    let doc = Arc::new(scanned(1));

    let abandoned = tokio::time::timeout(
        Duration::from_millis(20),
        service.recognize_page(Arc::clone(&doc), 1, "eng"),
    )
    .await;
    assert!(abandoned.is_err());

    *recorder.delay.lock() = Duration::ZERO;
    let result = assert_ok!(service.recognize_page(doc, 1, "eng").await);
    assert_eq!(result.text, "Sample OCR text");
    assert_eq!(recorder.count("allocate"), 1);
    assert_eq!(recorder.count("recognize"), 2);
}
