//! Async boundary around the worker manager
//!
//! Recognition is synchronous CPU-bound work, so it runs on the blocking pool.
//! Timeouts and dropped futures only abandon the wait: the blocking call
//! finishes under the manager's lock and the worker stays ready.

use super::aggregate::OcrResult;
use super::manager::{OcrWorkerManager, OcrWorkerState};
use crate::document::DocumentHandle;
use crate::error::OcrError;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;

/// Default limit on a single recognition call.
pub const DEFAULT_OCR_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct OcrService {
    manager: Arc<OcrWorkerManager>,
    timeout: Duration,
}

impl OcrService {
    pub fn new(manager: Arc<OcrWorkerManager>, timeout: Duration) -> Self {
        Self { manager, timeout }
    }

    pub fn manager(&self) -> &Arc<OcrWorkerManager> {
        &self.manager
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn state(&self) -> OcrWorkerState {
        self.manager.state()
    }

    /// Recognize one page, failing with `EngineFailure` if it takes longer
    /// than the configured timeout.
    pub async fn recognize_page(
        &self,
        doc: Arc<DocumentHandle>,
        page: u32,
        language: impl Into<String>,
    ) -> Result<OcrResult, OcrError> {
        let manager = Arc::clone(&self.manager);
        let language = language.into();

        let task =
            tokio::task::spawn_blocking(move || manager.recognize_page(&doc, page, &language));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => joined.map_err(task_failed)?,
            Err(_) => {
                tracing::warn!(
                    "OCR of page {} timed out after {}s; worker left running",
                    page,
                    self.timeout.as_secs()
                );
                Err(OcrError::EngineFailure(format!(
                    "Recognition timed out after {} seconds",
                    self.timeout.as_secs()
                )))
            }
        }
    }

    /// Initialize the engine for `language` ahead of the first page.
    pub async fn ensure_ready(&self, language: impl Into<String>) -> Result<(), OcrError> {
        let manager = Arc::clone(&self.manager);
        let language = language.into();
        tokio::task::spawn_blocking(move || manager.ensure_ready(&language))
            .await
            .map_err(task_failed)?
    }

    /// Release the engine and return the resulting state.
    pub async fn terminate(&self) -> Result<OcrWorkerState, OcrError> {
        let manager = Arc::clone(&self.manager);
        tokio::task::spawn_blocking(move || {
            manager.terminate();
            manager.state()
        })
        .await
        .map_err(task_failed)
    }
}

fn task_failed(e: JoinError) -> OcrError {
    OcrError::EngineFailure(format!("OCR task failed: {}", e))
}
