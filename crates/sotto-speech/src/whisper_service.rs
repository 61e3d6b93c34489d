//! Real Whisper inference via whisper-rs (whisper.cpp bindings).
//!
//! Loads a GGML model file and runs speech-to-text on 16 kHz mono PCM.
//! Confidence is the mean token probability across all decoded segments;
//! results under [`CONFIDENCE_FLOOR`](crate::inference::CONFIDENCE_FLOOR)
//! are reported as `LowConfidence` with the text attached.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::inference::{InferenceError, InferenceService, Utterance, CONFIDENCE_FLOOR};

/// Configuration for the whisper.cpp backend.
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    /// Path to the GGML model file.
    pub model_path: PathBuf,
    /// Language code, or "auto" for detection.
    pub language: String,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            language: "auto".to_string(),
        }
    }
}

/// Whisper transcription service backed by whisper.cpp.
///
/// The context is created by `load` and reused across transcription calls.
pub struct WhisperService {
    ctx: Mutex<Option<whisper_rs::WhisperContext>>,
    config: WhisperConfig,
}

impl WhisperService {
    pub fn new(config: WhisperConfig) -> Self {
        Self {
            ctx: Mutex::new(None),
            config,
        }
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }
}

impl InferenceService for WhisperService {
    async fn load(&self, progress: mpsc::UnboundedSender<f64>) -> Result<(), InferenceError> {
        use whisper_rs::{WhisperContext, WhisperContextParameters};

        let model_path = &self.config.model_path;
        if !Path::new(model_path).exists() {
            return Err(InferenceError::Backend(format!(
                "model file not found: {}",
                model_path.display()
            )));
        }

        tracing::info!(model = %model_path.display(), lang = %self.config.language, "Loading Whisper model");
        let _ = progress.send(0.0);

        let params = WhisperContextParameters::default();
        let ctx = WhisperContext::new_with_params(
            model_path.to_str().ok_or_else(|| {
                InferenceError::Backend("model path is not valid UTF-8".to_string())
            })?,
            params,
        )
        .map_err(|e| InferenceError::Backend(format!("failed to load model: {}", e)))?;

        *self.ctx.lock().expect("whisper context mutex poisoned") = Some(ctx);
        let _ = progress.send(1.0);
        tracing::info!("Whisper model loaded");
        Ok(())
    }

    async fn transcribe(
        &self,
        samples: &[f32],
        prompt_bias: Option<&str>,
    ) -> Result<Utterance, InferenceError> {
        use whisper_rs::{FullParams, SamplingStrategy};

        if samples.is_empty() {
            return Err(InferenceError::EmptyResult);
        }

        let guard = self.ctx.lock().expect("whisper context mutex poisoned");
        let ctx = guard.as_ref().ok_or(InferenceError::ModelNotLoaded)?;

        let duration_secs = samples.len() as f32 / 16_000.0;
        tracing::debug!(
            samples = samples.len(),
            duration_secs,
            "Starting Whisper transcription"
        );

        let mut state = ctx
            .create_state()
            .map_err(|e| InferenceError::Backend(format!("failed to create state: {}", e)))?;

        // Greedy sampling: temperature 0, fastest decode.
        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        let lang = if self.config.language == "auto" {
            Some("auto")
        } else {
            Some(self.config.language.as_str())
        };
        params.set_language(lang);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        if let Some(bias) = prompt_bias {
            params.set_initial_prompt(bias);
        }

        state
            .full(params, samples)
            .map_err(|e| InferenceError::Backend(format!("inference failed: {}", e)))?;

        let n_segments = state
            .full_n_segments()
            .map_err(|e| InferenceError::Backend(format!("failed to get segment count: {}", e)))?;

        let mut text = String::new();
        let mut prob_sum = 0.0f64;
        let mut token_count = 0u64;

        for i in 0..n_segments {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| InferenceError::Backend(format!("failed to get segment: {}", e)))?;
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(segment.trim());

            let n_tokens = state
                .full_n_tokens(i)
                .map_err(|e| InferenceError::Backend(format!("failed to get tokens: {}", e)))?;
            for t in 0..n_tokens {
                if let Ok(prob) = state.full_get_token_prob(i, t) {
                    prob_sum += prob as f64;
                    token_count += 1;
                }
            }
        }

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(InferenceError::EmptyResult);
        }

        let confidence = if token_count == 0 {
            0.0
        } else {
            (prob_sum / token_count as f64).clamp(0.0, 1.0)
        };

        let language = whisper_rs::get_lang_str(state.full_lang_id())
            .unwrap_or("en")
            .to_string();

        tracing::info!(
            segments = n_segments,
            text_len = text.len(),
            confidence,
            %language,
            "Transcription complete"
        );

        if confidence < CONFIDENCE_FLOOR {
            return Err(InferenceError::LowConfidence { text, language });
        }

        Ok(Utterance {
            text,
            language,
            confidence,
        })
    }

    fn is_loaded(&self) -> bool {
        self.ctx
            .lock()
            .expect("whisper context mutex poisoned")
            .is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
