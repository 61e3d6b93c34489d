//! The orchestrator's inbound message vocabulary.

use sotto_core::error::SottoError;
use sotto_core::types::TranscriptionRecord;
use sotto_speech::audio::{AudioEvent, RecordedAudio};
use sotto_trigger::engine::TriggerSignal;

/// Timers the orchestrator arms. Firings carry the epoch captured at arm
/// time; a firing whose epoch no longer matches is stale and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineTimer {
    /// Auto-clear of the `Error` state.
    ErrorClear,
    /// Auto-dismiss of the confirmation flash.
    ConfirmationDone,
    /// Hard stop of an over-long recording.
    MaxDuration,
}

/// Everything the orchestrator reacts to.
///
/// Host entry points, the trigger engine, the audio device, spawned workers,
/// and timers all funnel through this one enum onto one channel.
#[derive(Debug)]
pub enum PipelineCommand {
    /// A classified hardware gesture.
    Signal(TriggerSignal),
    /// Manual start/stop entry point, equivalent to trigger signals.
    Toggle,
    /// Amplitude or max-duration event from the capture device.
    Audio(AudioEvent),

    /// Model download/load progress in [0, 1].
    ModelProgress(f64),
    ModelLoaded,
    ModelFailed(String),
    /// Host asked for the configured model to be (re)loaded.
    ReloadModel,

    /// The stop worker finished and produced a usable recording.
    CaptureReady(RecordedAudio),
    /// Audio start or stop failed.
    CaptureFailed(String),

    /// The processing worker finished stages 1-7.
    Processed(Result<TranscriptionRecord, SottoError>),
    /// The insertion worker's call returned (success or not).
    Inserted { text: String },

    SubmitCorrection {
        wrong: String,
        correct: String,
        always_replace: bool,
    },
    DismissCorrection,

    TimerElapsed {
        epoch: u64,
        timer: PipelineTimer,
    },
    Shutdown,
}
