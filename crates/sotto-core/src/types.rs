use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Recording state
// =============================================================================

/// Lifecycle state of the dictation pipeline.
///
/// Exactly one state is active at any instant and only the pipeline
/// orchestrator transitions between them (single-writer discipline).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecordingState {
    /// Ready for a capture gesture.
    Idle,
    /// Speech model download/load in progress.
    DownloadingModel { progress: f64 },
    /// Microphone capture running.
    Recording { started_at: DateTime<Utc> },
    /// Inference and text cleanup running on the captured audio.
    Transcribing,
    /// Delivering the final text to the focused application.
    Inserting,
    /// Final text shown briefly before returning to idle.
    ShowingConfirmation { text: String },
    /// Correction panel open, waiting for user submission or dismissal.
    ShowingCorrection,
    /// Failure surfaced to the user; auto-clears.
    Error { message: String },
}

impl RecordingState {
    pub fn is_idle(&self) -> bool {
        matches!(self, RecordingState::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, RecordingState::Recording { .. })
    }

    /// Elapsed recording time, or `None` when not recording.
    pub fn recording_duration(&self) -> Option<chrono::Duration> {
        match self {
            RecordingState::Recording { started_at } => Some(Utc::now() - *started_at),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordingState::Idle => write!(f, "Idle"),
            RecordingState::DownloadingModel { progress } => {
                write!(f, "DownloadingModel({:.0}%)", progress * 100.0)
            }
            RecordingState::Recording { .. } => write!(f, "Recording"),
            RecordingState::Transcribing => write!(f, "Transcribing"),
            RecordingState::Inserting => write!(f, "Inserting"),
            RecordingState::ShowingConfirmation { .. } => write!(f, "ShowingConfirmation"),
            RecordingState::ShowingCorrection => write!(f, "ShowingCorrection"),
            RecordingState::Error { .. } => write!(f, "Error"),
        }
    }
}

// =============================================================================
// Transcription results
// =============================================================================

/// Immutable record of one completed pipeline run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionRecord {
    pub id: Uuid,
    /// Text exactly as the inference engine produced it.
    pub raw_text: String,
    /// Text after grammar cleanup and correction-memory substitution.
    pub corrected_text: String,
    /// BCP-47-ish language code ("en", "de", ...).
    pub language: String,
    /// Inference confidence in [0, 1].
    pub confidence: f64,
    /// Length of the recorded audio in seconds.
    pub duration_secs: f64,
    /// Wall-clock time the processing chain took, in milliseconds.
    pub processing_ms: u64,
    pub created_at: DateTime<Utc>,
    /// `corrected_text` split on whitespace, empties dropped. Feeds the
    /// correction panel's word picker.
    pub words: Vec<String>,
    /// Whether a fallback path produced this result.
    pub used_fallback: bool,
}

impl TranscriptionRecord {
    /// Split text into the word list stored on a record.
    pub fn tokenize(text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_string).collect()
    }
}

// =============================================================================
// Amplitude ring buffer
// =============================================================================

/// Number of amplitude levels retained for the waveform display.
pub const AMPLITUDE_CAPACITY: usize = 120;

/// Bounded sequence of normalized amplitude levels, oldest dropped first.
///
/// Producers normalize to [0, 1] before pushing (the capture side uses
/// RMS * 15, clamped).
#[derive(Clone, Debug, Default)]
pub struct AmplitudeBuffer {
    levels: Vec<f32>,
}

impl AmplitudeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f32) {
        self.levels.push(value);
        if self.levels.len() > AMPLITUDE_CAPACITY {
            let excess = self.levels.len() - AMPLITUDE_CAPACITY;
            self.levels.drain(..excess);
        }
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }

    pub fn levels(&self) -> &[f32] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

// =============================================================================
// Model presets
// =============================================================================

/// A selectable speech model variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelPreset {
    /// Short id used in config ("max", "balanced", "fast", "light").
    pub id: &'static str,
    pub name: &'static str,
    /// Backend model variant identifier.
    pub variant: &'static str,
    pub description: &'static str,
    pub size_label: &'static str,
}

impl ModelPreset {
    /// All selectable presets, best quality first.
    pub fn all() -> &'static [ModelPreset] {
        &[
            ModelPreset {
                id: "max",
                name: "Maximum Accuracy",
                variant: "large-v3",
                description: "Full large model, highest accuracy",
                size_label: "~3 GB",
            },
            ModelPreset {
                id: "balanced",
                name: "Balanced",
                variant: "large-v3-turbo",
                description: "Best accuracy-to-speed ratio",
                size_label: "~630 MB",
            },
            ModelPreset {
                id: "fast",
                name: "Fast",
                variant: "distil-large-v3",
                description: "Several times faster at near-identical accuracy",
                size_label: "~600 MB",
            },
            ModelPreset {
                id: "light",
                name: "Lightweight",
                variant: "small",
                description: "Low memory, decent accuracy",
                size_label: "~220 MB",
            },
        ]
    }

    /// Look up a preset by its config id.
    pub fn by_id(id: &str) -> Option<&'static ModelPreset> {
        Self::all().iter().find(|p| p.id == id)
    }
}
