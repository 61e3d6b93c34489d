//! Host-facing surface: observable state, history, and entry points.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};

use sotto_core::types::{AmplitudeBuffer, RecordingState, TranscriptionRecord};
use sotto_corrections::CorrectionStore;

use crate::command::PipelineCommand;

/// Result history cap, most-recent-first.
pub const HISTORY_CAP: usize = 50;

/// State the pipeline loop writes and observers read.
///
/// The loop task is the only writer; everything here is read-only for the
/// host shell. `watch` carries the most recently committed state, so
/// observers never see a stale flicker.
pub struct PipelineShared {
    pub(crate) state_tx: watch::Sender<RecordingState>,
    pub(crate) history: Mutex<VecDeque<TranscriptionRecord>>,
    pub(crate) amplitudes: Mutex<AmplitudeBuffer>,
}

impl PipelineShared {
    pub(crate) fn new() -> Self {
        // Starts in DownloadingModel: the pipeline is not ready for capture
        // until the model-load worker reports back.
        let (state_tx, _) = watch::channel(RecordingState::DownloadingModel { progress: 0.0 });
        Self {
            state_tx,
            history: Mutex::new(VecDeque::new()),
            amplitudes: Mutex::new(AmplitudeBuffer::new()),
        }
    }
}

/// Cloneable handle the host shell (menu, panels, settings UI) talks to.
#[derive(Clone)]
pub struct PipelineHandle {
    shared: Arc<PipelineShared>,
    commands: mpsc::UnboundedSender<PipelineCommand>,
    corrections: Arc<CorrectionStore>,
}

impl PipelineHandle {
    pub(crate) fn new(
        shared: Arc<PipelineShared>,
        commands: mpsc::UnboundedSender<PipelineCommand>,
        corrections: Arc<CorrectionStore>,
    ) -> Self {
        Self {
            shared,
            commands,
            corrections,
        }
    }

    /// Most recently committed state.
    pub fn state(&self) -> RecordingState {
        self.shared.state_tx.borrow().clone()
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<RecordingState> {
        self.shared.state_tx.subscribe()
    }

    /// The most recent completed result.
    pub fn last_result(&self) -> Option<TranscriptionRecord> {
        self.shared
            .history
            .lock()
            .expect("history mutex poisoned")
            .front()
            .cloned()
    }

    /// Bounded result history, most-recent-first.
    pub fn history(&self) -> Vec<TranscriptionRecord> {
        self.shared
            .history
            .lock()
            .expect("history mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Current waveform levels.
    pub fn amplitudes(&self) -> Vec<f32> {
        self.shared
            .amplitudes
            .lock()
            .expect("amplitudes mutex poisoned")
            .levels()
            .to_vec()
    }

    /// Correction CRUD pass-through.
    pub fn corrections(&self) -> &CorrectionStore {
        &self.corrections
    }

    /// Manual start/stop, equivalent to the capture gesture.
    pub fn toggle(&self) {
        let _ = self.commands.send(PipelineCommand::Toggle);
    }

    pub fn submit_correction(&self, wrong: &str, correct: &str, always_replace: bool) {
        let _ = self.commands.send(PipelineCommand::SubmitCorrection {
            wrong: wrong.to_string(),
            correct: correct.to_string(),
            always_replace,
        });
    }

    pub fn dismiss_correction(&self) {
        let _ = self.commands.send(PipelineCommand::DismissCorrection);
    }

    /// Reload the configured model (used after a preset switch).
    pub fn reload_model(&self) {
        let _ = self.commands.send(PipelineCommand::ReloadModel);
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(PipelineCommand::Shutdown);
    }
}
