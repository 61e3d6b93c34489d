//! Speech inference collaborator contract and mock.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;

use sotto_core::error::SottoError;

/// Failures the inference collaborator can report.
///
/// `LowConfidence` is a soft failure: it carries the text anyway, and the
/// orchestrator keeps it with the confidence floored rather than aborting.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("speech model is not loaded")]
    ModelNotLoaded,

    #[error("inference produced no text")]
    EmptyResult,

    #[error("low-confidence result: {text:?}")]
    LowConfidence { text: String, language: String },

    #[error("inference backend failure: {0}")]
    Backend(String),
}

impl From<InferenceError> for SottoError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::ModelNotLoaded => {
                SottoError::Model("speech model is not loaded".to_string())
            }
            other => SottoError::Transcription(other.to_string()),
        }
    }
}

/// One transcription produced by the inference engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    /// Language code the model detected ("en", "de", ...).
    pub language: String,
    /// Mean decoding confidence, normalized into [0, 1].
    pub confidence: f64,
}

/// Confidence below this is reported as `LowConfidence` by well-behaved
/// implementations, and floored to this value by the orchestrator when it
/// keeps the text anyway.
pub const CONFIDENCE_FLOOR: f64 = 0.4;

/// Offline speech-to-text engine.
pub trait InferenceService: Send + Sync {
    /// Load (and if necessary download) the model, streaming progress in
    /// [0, 1] to `progress` as it goes.
    fn load(
        &self,
        progress: mpsc::UnboundedSender<f64>,
    ) -> impl Future<Output = Result<(), InferenceError>> + Send;

    /// Transcribe mono 16 kHz PCM samples.
    ///
    /// `prompt_bias` is an optional vocabulary hint favoring known spellings.
    fn transcribe(
        &self,
        samples: &[f32],
        prompt_bias: Option<&str>,
    ) -> impl Future<Output = Result<Utterance, InferenceError>> + Send;

    fn is_loaded(&self) -> bool;
}

// =============================================================================
// Mock implementation
// =============================================================================

/// Scripted inference engine for tests.
///
/// Results are queued with `push_result`; each `transcribe` call pops one.
/// An empty queue yields `EmptyResult`. The prompt bias of the most recent
/// call is retained for assertions.
pub struct MockInferenceService {
    loaded: AtomicBool,
    fail_load: AtomicBool,
    results: Mutex<VecDeque<Result<Utterance, InferenceError>>>,
    last_bias: Arc<Mutex<Option<String>>>,
}

impl Default for MockInferenceService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockInferenceService {
    pub fn new() -> Self {
        Self {
            loaded: AtomicBool::new(false),
            fail_load: AtomicBool::new(false),
            results: Mutex::new(VecDeque::new()),
            last_bias: Arc::new(Mutex::new(None)),
        }
    }

    /// Queue the next `transcribe` outcome.
    pub fn push_result(&self, result: Result<Utterance, InferenceError>) {
        self.results.lock().unwrap().push_back(result);
    }

    /// Queue a plain successful utterance.
    pub fn push_utterance(&self, text: &str, language: &str, confidence: f64) {
        self.push_result(Ok(Utterance {
            text: text.to_string(),
            language: language.to_string(),
            confidence,
        }));
    }

    /// Make the next `load` call fail.
    pub fn fail_next_load(&self) {
        self.fail_load.store(true, Ordering::Relaxed);
    }

    /// Prompt bias passed to the most recent `transcribe` call.
    pub fn last_prompt_bias(&self) -> Option<String> {
        self.last_bias.lock().unwrap().clone()
    }
}

impl InferenceService for MockInferenceService {
    async fn load(&self, progress: mpsc::UnboundedSender<f64>) -> Result<(), InferenceError> {
        if self.fail_load.swap(false, Ordering::Relaxed) {
            return Err(InferenceError::Backend("mock load failure".to_string()));
        }
        let _ = progress.send(0.5);
        let _ = progress.send(1.0);
        self.loaded.store(true, Ordering::Relaxed);
        tracing::info!("Mock inference model loaded");
        Ok(())
    }

    async fn transcribe(
        &self,
        _samples: &[f32],
        prompt_bias: Option<&str>,
    ) -> Result<Utterance, InferenceError> {
        if !self.loaded.load(Ordering::Relaxed) {
            return Err(InferenceError::ModelNotLoaded);
        }
        *self.last_bias.lock().unwrap() = prompt_bias.map(str::to_string);
        match self.results.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Err(InferenceError::EmptyResult),
        }
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Tests
// =============================================================================
