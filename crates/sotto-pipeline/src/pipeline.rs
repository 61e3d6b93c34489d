//! The dictation state machine and its single-consumer command loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use sotto_core::config::SottoConfig;
use sotto_core::error::SottoError;
use sotto_core::types::{RecordingState, TranscriptionRecord};
use sotto_corrections::CorrectionStore;
use sotto_insert::engine::TextDelivery;
use sotto_speech::audio::{AudioCaptureService, AudioEvent, RecordedAudio};
use sotto_speech::grammar::GrammarCorrector;
use sotto_speech::inference::{InferenceError, InferenceService, CONFIDENCE_FLOOR};
use sotto_speech::language::LanguageDetector;
use sotto_trigger::engine::TriggerSignal;

use crate::command::{PipelineCommand, PipelineTimer};
use crate::handle::{PipelineHandle, PipelineShared, HISTORY_CAP};

/// How long the `Error` state stays up before clearing itself.
const ERROR_CLEAR_DELAY: Duration = Duration::from_secs(3);
/// How long the confirmation flash stays up.
const CONFIRMATION_DELAY: Duration = Duration::from_millis(1500);

/// The pipeline orchestrator.
///
/// Owns the `RecordingState` and everything derived from it. All mutation
/// happens inside [`run`](DictationPipeline::run); collaborators and timers
/// communicate exclusively through the command channel.
pub struct DictationPipeline<A, I, L, G, D> {
    config: SottoConfig,
    audio: Arc<A>,
    inference: Arc<I>,
    language: Arc<L>,
    grammar: Arc<G>,
    delivery: Arc<D>,
    corrections: Arc<CorrectionStore>,
    shared: Arc<PipelineShared>,
    commands: mpsc::UnboundedSender<PipelineCommand>,
    rx: Option<mpsc::UnboundedReceiver<PipelineCommand>>,

    state: RecordingState,
    /// Bumped on every committed transition; timer firings carry the value
    /// from when they were armed and are dropped on mismatch.
    epoch: u64,
    model_ready: bool,
    /// Wall-clock anchor of the running capture (virtual-time aware).
    recording_started: Option<tokio::time::Instant>,
}

impl<A, I, L, G, D> DictationPipeline<A, I, L, G, D>
where
    A: AudioCaptureService + 'static,
    I: InferenceService + 'static,
    L: LanguageDetector + 'static,
    G: GrammarCorrector + 'static,
    D: TextDelivery + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SottoConfig,
        audio: Arc<A>,
        inference: Arc<I>,
        language: Arc<L>,
        grammar: Arc<G>,
        delivery: Arc<D>,
        corrections: Arc<CorrectionStore>,
    ) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        Self {
            config,
            audio,
            inference,
            language,
            grammar,
            delivery,
            corrections,
            shared: Arc::new(PipelineShared::new()),
            commands,
            rx: Some(rx),
            state: RecordingState::DownloadingModel { progress: 0.0 },
            epoch: 0,
            model_ready: false,
            recording_started: None,
        }
    }

    /// Host-facing handle. Cloneable, valid for the pipeline's lifetime.
    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle::new(
            Arc::clone(&self.shared),
            self.commands.clone(),
            Arc::clone(&self.corrections),
        )
    }

    /// Sender for wiring producers (trigger engine, audio events).
    pub fn commands(&self) -> mpsc::UnboundedSender<PipelineCommand> {
        self.commands.clone()
    }

    /// Run the command loop until `Shutdown`.
    pub async fn run(mut self) {
        let mut rx = self.rx.take().expect("run may only be called once");
        self.start_model_load();

        while let Some(command) = rx.recv().await {
            if self.dispatch(command).await {
                break;
            }
        }
        tracing::info!("Pipeline loop stopped");
    }

    /// Handle one command. Returns true on shutdown.
    async fn dispatch(&mut self, command: PipelineCommand) -> bool {
        match command {
            PipelineCommand::Signal(TriggerSignal::CaptureStart) => self.capture_start(),
            PipelineCommand::Signal(TriggerSignal::CaptureStop) => self.capture_stop(),
            PipelineCommand::Signal(TriggerSignal::OpenCorrection) => self.open_correction(),
            PipelineCommand::Toggle => {
                if self.state.is_idle() {
                    self.capture_start();
                } else if self.state.is_recording() {
                    self.capture_stop();
                }
            }
            PipelineCommand::Audio(AudioEvent::Amplitude(level)) => {
                self.shared
                    .amplitudes
                    .lock()
                    .expect("amplitudes mutex poisoned")
                    .push(level);
            }
            PipelineCommand::Audio(AudioEvent::MaxDurationReached) => self.capture_stop(),

            PipelineCommand::ModelProgress(progress) => {
                if matches!(self.state, RecordingState::DownloadingModel { .. }) {
                    self.set_state(RecordingState::DownloadingModel { progress });
                }
            }
            PipelineCommand::ModelLoaded => {
                self.model_ready = true;
                if matches!(self.state, RecordingState::DownloadingModel { .. }) {
                    self.set_state(RecordingState::Idle);
                }
                tracing::info!("Speech model ready");
            }
            PipelineCommand::ModelFailed(message) => {
                // A previously loaded model stays usable.
                self.set_state(RecordingState::Error {
                    message: format!("Failed to load model: {}", message),
                });
                self.schedule(PipelineTimer::ErrorClear, ERROR_CLEAR_DELAY);
            }
            PipelineCommand::ReloadModel => {
                if matches!(
                    self.state,
                    RecordingState::Idle
                        | RecordingState::Error { .. }
                        | RecordingState::DownloadingModel { .. }
                ) {
                    self.start_model_load();
                } else {
                    tracing::debug!(state = %self.state, "Ignoring model reload");
                }
            }

            PipelineCommand::CaptureReady(recording) => self.on_capture_ready(recording),
            PipelineCommand::CaptureFailed(message) => {
                if matches!(
                    self.state,
                    RecordingState::Recording { .. } | RecordingState::Transcribing
                ) {
                    self.recording_started = None;
                    self.set_state(RecordingState::Error {
                        message: format!("Microphone error: {}", message),
                    });
                    self.schedule(PipelineTimer::ErrorClear, ERROR_CLEAR_DELAY);
                }
            }

            PipelineCommand::Processed(result) => self.on_processed(result),
            PipelineCommand::Inserted { text } => {
                if self.state == RecordingState::Inserting {
                    self.set_state(RecordingState::ShowingConfirmation { text });
                    self.schedule(PipelineTimer::ConfirmationDone, CONFIRMATION_DELAY);
                }
            }

            PipelineCommand::SubmitCorrection {
                wrong,
                correct,
                always_replace,
            } => {
                if self.state == RecordingState::ShowingCorrection {
                    let language = self
                        .shared
                        .history
                        .lock()
                        .expect("history mutex poisoned")
                        .front()
                        .map(|r| r.language.clone())
                        .unwrap_or_else(|| "en".to_string());
                    self.corrections
                        .add(&wrong, &correct, &language, always_replace);
                    self.set_state(RecordingState::Idle);
                }
            }
            PipelineCommand::DismissCorrection => {
                if self.state == RecordingState::ShowingCorrection {
                    self.set_state(RecordingState::Idle);
                }
            }

            PipelineCommand::TimerElapsed { epoch, timer } => {
                if epoch != self.epoch {
                    tracing::trace!(?timer, "Dropping stale timer");
                } else {
                    self.on_timer(timer);
                }
            }

            PipelineCommand::Shutdown => {
                if self.state.is_recording() {
                    match self.audio.stop().await {
                        Ok(mut recording) => recording.cleanup(),
                        Err(e) => tracing::warn!(error = %e, "Failed to stop capture on shutdown"),
                    }
                }
                return true;
            }
        }
        false
    }

    // -------------------------------------------------------------------------
    // State transitions
    // -------------------------------------------------------------------------

    fn set_state(&mut self, next: RecordingState) {
        tracing::debug!(from = %self.state, to = %next, "State transition");
        self.epoch += 1;
        self.state = next.clone();
        self.shared.state_tx.send_replace(next);
    }

    fn schedule(&self, timer: PipelineTimer, delay: Duration) {
        let tx = self.commands.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(PipelineCommand::TimerElapsed { epoch, timer });
        });
    }

    fn on_timer(&mut self, timer: PipelineTimer) {
        match timer {
            PipelineTimer::ErrorClear => {
                if matches!(self.state, RecordingState::Error { .. }) {
                    self.set_state(RecordingState::Idle);
                }
            }
            PipelineTimer::ConfirmationDone => {
                if matches!(self.state, RecordingState::ShowingConfirmation { .. }) {
                    self.set_state(RecordingState::Idle);
                }
            }
            PipelineTimer::MaxDuration => self.capture_stop(),
        }
    }

    fn start_model_load(&mut self) {
        self.set_state(RecordingState::DownloadingModel { progress: 0.0 });

        let inference = Arc::clone(&self.inference);
        let tx = self.commands.clone();
        tokio::spawn(async move {
            let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
            let forwarder = {
                let tx = tx.clone();
                tokio::spawn(async move {
                    while let Some(progress) = progress_rx.recv().await {
                        let _ = tx.send(PipelineCommand::ModelProgress(progress));
                    }
                })
            };

            let outcome = inference.load(progress_tx).await;
            let _ = forwarder.await;
            let _ = match outcome {
                Ok(()) => tx.send(PipelineCommand::ModelLoaded),
                Err(e) => tx.send(PipelineCommand::ModelFailed(e.to_string())),
            };
        });
    }

    /// `CaptureStart`: only from `Idle`, only with a ready model.
    fn capture_start(&mut self) {
        if !self.state.is_idle() {
            tracing::debug!(state = %self.state, "Ignoring capture start");
            return;
        }
        if !self.model_ready {
            self.set_state(RecordingState::Error {
                message: "Speech model is still loading".to_string(),
            });
            self.schedule(PipelineTimer::ErrorClear, ERROR_CLEAR_DELAY);
            return;
        }

        self.shared
            .amplitudes
            .lock()
            .expect("amplitudes mutex poisoned")
            .clear();
        self.recording_started = Some(tokio::time::Instant::now());
        self.set_state(RecordingState::Recording {
            started_at: Utc::now(),
        });

        let max_secs = self.config.recording.max_recording_secs;
        if max_secs > 0 {
            self.schedule(PipelineTimer::MaxDuration, Duration::from_secs(max_secs));
        }

        let audio = Arc::clone(&self.audio);
        let tx = self.commands.clone();
        tokio::spawn(async move {
            if let Err(e) = audio.start().await {
                let _ = tx.send(PipelineCommand::CaptureFailed(e.to_string()));
            }
        });
    }

    /// `CaptureStop` / max-duration: stop the device; discard short clips.
    fn capture_stop(&mut self) {
        if !self.state.is_recording() {
            tracing::debug!(state = %self.state, "Ignoring capture stop");
            return;
        }

        let elapsed_secs = self
            .recording_started
            .take()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        let audio = Arc::clone(&self.audio);

        if elapsed_secs < self.config.recording.min_duration_secs {
            tracing::info!(elapsed_secs, "Discarding short recording");
            self.set_state(RecordingState::Idle);
            tokio::spawn(async move {
                match audio.stop().await {
                    Ok(mut recording) => recording.cleanup(),
                    Err(e) => tracing::warn!(error = %e, "Failed to stop capture"),
                }
            });
            return;
        }

        let tx = self.commands.clone();
        self.set_state(RecordingState::Transcribing);
        tokio::spawn(async move {
            match audio.stop().await {
                Ok(recording) => {
                    let _ = tx.send(PipelineCommand::CaptureReady(recording));
                }
                Err(e) => {
                    let _ = tx.send(PipelineCommand::CaptureFailed(e.to_string()));
                }
            }
        });
    }

    fn on_capture_ready(&mut self, mut recording: RecordedAudio) {
        if self.state != RecordingState::Transcribing {
            recording.cleanup();
            return;
        }

        let inference = Arc::clone(&self.inference);
        let language = Arc::clone(&self.language);
        let grammar = Arc::clone(&self.grammar);
        let corrections = Arc::clone(&self.corrections);
        let tx = self.commands.clone();
        tokio::spawn(async move {
            let result = process(recording, inference, language, grammar, corrections).await;
            let _ = tx.send(PipelineCommand::Processed(result));
        });
    }

    fn on_processed(&mut self, result: Result<TranscriptionRecord, SottoError>) {
        if self.state != RecordingState::Transcribing {
            return;
        }

        match result {
            Ok(record) => {
                let text = record.corrected_text.clone();
                {
                    let mut history = self.shared.history.lock().expect("history mutex poisoned");
                    history.push_front(record);
                    history.truncate(HISTORY_CAP);
                }
                self.set_state(RecordingState::Inserting);

                let delivery = Arc::clone(&self.delivery);
                let tx = self.commands.clone();
                tokio::spawn(async move {
                    match delivery.deliver(&text).await {
                        Ok(path) => tracing::info!(?path, "Text delivered"),
                        Err(e) => tracing::warn!(error = %e, "Insertion failed"),
                    }
                    let _ = tx.send(PipelineCommand::Inserted { text });
                });
            }
            Err(e) => {
                self.set_state(RecordingState::Error {
                    message: format!("Transcription failed: {}", e),
                });
                self.schedule(PipelineTimer::ErrorClear, ERROR_CLEAR_DELAY);
            }
        }
    }

    fn open_correction(&mut self) {
        let has_result = self
            .shared
            .history
            .lock()
            .expect("history mutex poisoned")
            .front()
            .is_some();
        if self.state.is_idle() && has_result {
            self.set_state(RecordingState::ShowingCorrection);
        }
    }
}

// =============================================================================
// Processing chain (stages 1-7, runs on a worker)
// =============================================================================

/// Prompt bias → inference → language detection → grammar → correction
/// memory → tokenize → record. The temp WAV is deleted on every exit path.
async fn process<I, L, G>(
    mut recording: RecordedAudio,
    inference: Arc<I>,
    language: Arc<L>,
    grammar: Arc<G>,
    corrections: Arc<CorrectionStore>,
) -> Result<TranscriptionRecord, SottoError>
where
    I: InferenceService,
    L: LanguageDetector,
    G: GrammarCorrector,
{
    let started = std::time::Instant::now();
    let duration_secs = recording.duration_secs();

    // 1. Vocabulary bias from the correction memory.
    let bias = corrections.prompt_bias();

    // 2. Inference. Low confidence is a soft failure: keep the text with the
    //    confidence floored.
    let (raw_text, hint, confidence) =
        match inference.transcribe(&recording.samples, bias.as_deref()).await {
            Ok(utterance) => (utterance.text, utterance.language, utterance.confidence),
            Err(InferenceError::LowConfidence { text, language }) => {
                tracing::warn!("Low-confidence transcription, keeping result");
                (text, language, CONFIDENCE_FLOOR)
            }
            Err(e) => {
                recording.cleanup();
                return Err(e.into());
            }
        };

    // 3. Language detection, refined from the model's hint.
    let guess = language.detect(&raw_text, Some(&hint));

    // 4. Grammar cleanup.
    let cleaned = grammar.correct(&raw_text, &guess.code);

    // 5. Correction memory substitutions.
    let final_text = corrections.apply_corrections(&cleaned);

    // 6. Word list for the correction panel.
    let words = TranscriptionRecord::tokenize(&final_text);

    // 7. The immutable record.
    let record = TranscriptionRecord {
        id: Uuid::new_v4(),
        raw_text,
        corrected_text: final_text,
        language: guess.code,
        confidence,
        duration_secs,
        processing_ms: started.elapsed().as_millis() as u64,
        created_at: Utc::now(),
        words,
        used_fallback: false,
    };

    recording.cleanup();
    tracing::info!(
        chars = record.corrected_text.len(),
        language = %record.language,
        processing_ms = record.processing_ms,
        "Processing chain complete"
    );
    Ok(record)
}

// =============================================================================
// Channel wiring helpers
// =============================================================================

/// Forward trigger signals onto the pipeline's command channel.
pub fn forward_trigger_signals(
    mut signals: mpsc::UnboundedReceiver<TriggerSignal>,
    commands: mpsc::UnboundedSender<PipelineCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(signal) = signals.recv().await {
            if commands.send(PipelineCommand::Signal(signal)).is_err() {
                break;
            }
        }
    })
}

/// Forward audio device events onto the pipeline's command channel.
pub fn forward_audio_events(
    mut events: mpsc::UnboundedReceiver<AudioEvent>,
    commands: mpsc::UnboundedSender<PipelineCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if commands.send(PipelineCommand::Audio(event)).is_err() {
                break;
            }
        }
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use sotto_insert::engine::InsertPath;
    use sotto_speech::audio::MockAudioService;
    use sotto_speech::grammar::PunctuationCorrector;
    use sotto_speech::inference::MockInferenceService;
    use sotto_speech::language::HeuristicLanguageDetector;

    /// Delivery recorder: captures every text handed to the insertion stage.
    #[derive(Default)]
    struct RecordingDelivery {
        texts: Mutex<Vec<String>>,
        fail_next: AtomicBool,
    }

    impl RecordingDelivery {
        fn delivered(&self) -> Vec<String> {
            self.texts.lock().unwrap().clone()
        }

        fn fail_next(&self) {
            self.fail_next.store(true, Ordering::Relaxed);
        }
    }

    impl TextDelivery for RecordingDelivery {
        async fn deliver(&self, text: &str) -> Result<InsertPath, SottoError> {
            self.texts.lock().unwrap().push(text.to_string());
            if self.fail_next.swap(false, Ordering::Relaxed) {
                Err(SottoError::Insertion("mock delivery failure".to_string()))
            } else {
                Ok(InsertPath::Element)
            }
        }
    }

    struct Rig {
        audio: Arc<MockAudioService>,
        inference: Arc<MockInferenceService>,
        delivery: Arc<RecordingDelivery>,
        corrections: Arc<CorrectionStore>,
        handle: PipelineHandle,
        commands: mpsc::UnboundedSender<PipelineCommand>,
    }

    async fn build_rig(config: SottoConfig, fail_first_load: bool) -> Rig {
        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        let audio = Arc::new(MockAudioService::new(audio_tx));
        let inference = Arc::new(MockInferenceService::new());
        if fail_first_load {
            inference.fail_next_load();
        }
        let delivery = Arc::new(RecordingDelivery::default());
        let corrections = Arc::new(CorrectionStore::in_memory());

        let pipeline = DictationPipeline::new(
            config,
            Arc::clone(&audio),
            Arc::clone(&inference),
            Arc::new(HeuristicLanguageDetector::new()),
            Arc::new(PunctuationCorrector::new()),
            Arc::clone(&delivery),
            Arc::clone(&corrections),
        );
        let handle = pipeline.handle();
        let commands = pipeline.commands();
        let _ = forward_audio_events(audio_rx, commands.clone());
        let _ = tokio::spawn(pipeline.run());

        // Model load resolves (or fails and auto-clears) before tests drive.
        wait_state(&handle, |s| s.is_idle()).await;

        Rig {
            audio,
            inference,
            delivery,
            corrections,
            handle,
            commands,
        }
    }

    async fn rig() -> Rig {
        build_rig(SottoConfig::default(), false).await
    }

    async fn wait_state(
        handle: &PipelineHandle,
        pred: impl Fn(&RecordingState) -> bool,
    ) -> RecordingState {
        let mut rx = handle.subscribe();
        let state = tokio::time::timeout(Duration::from_secs(120), rx.wait_for(|s| pred(s)))
            .await
            .expect("timed out waiting for state")
            .expect("pipeline dropped")
            .clone();
        state
    }

    fn send(rig: &Rig, command: PipelineCommand) {
        rig.commands.send(command).expect("pipeline alive");
    }

    /// Drive one full dictation of `duration_secs` via trigger signals.
    async fn dictate(rig: &Rig, duration_secs: f64) {
        rig.audio.set_next_duration(duration_secs);
        send(rig, PipelineCommand::Signal(TriggerSignal::CaptureStart));
        wait_state(&rig.handle, |s| s.is_recording()).await;
        tokio::time::sleep(Duration::from_secs_f64(duration_secs)).await;
        send(rig, PipelineCommand::Signal(TriggerSignal::CaptureStop));
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_dictation_cycle() {
        let rig = rig().await;
        rig.corrections.add("helo", "Hello", "en", true);
        rig.inference.push_utterance("helo wrld", "en", 0.9);

        dictate(&rig, 1.2).await;

        let confirmed = wait_state(&rig.handle, |s| {
            matches!(s, RecordingState::ShowingConfirmation { .. })
        })
        .await;
        assert_eq!(
            confirmed,
            RecordingState::ShowingConfirmation {
                text: "Hello wrld.".to_string()
            }
        );

        // The insertion engine was invoked with the final text.
        assert_eq!(rig.delivery.delivered(), vec!["Hello wrld."]);

        // Confirmation auto-dismisses after 1.5 s.
        wait_state(&rig.handle, |s| s.is_idle()).await;

        let record = rig.handle.last_result().unwrap();
        assert_eq!(record.raw_text, "helo wrld");
        assert_eq!(record.corrected_text, "Hello wrld.");
        assert_eq!(record.language, "en");
        assert!((record.confidence - 0.9).abs() < 1e-9);
        assert!((record.duration_secs - 1.2).abs() < 1e-6);
        assert_eq!(record.words, vec!["Hello", "wrld."]);
        assert!(!record.used_fallback);
        assert_eq!(rig.handle.history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prompt_bias_reaches_inference() {
        let rig = rig().await;
        rig.corrections.add("teh", "the", "en", true);
        rig.inference.push_utterance("hello", "en", 0.9);

        dictate(&rig, 1.0).await;
        wait_state(&rig.handle, |s| {
            matches!(s, RecordingState::ShowingConfirmation { .. })
        })
        .await;

        assert_eq!(
            rig.inference.last_prompt_bias().as_deref(),
            Some("Vocabulary: the")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_start_ignored_while_not_idle() {
        let rig = rig().await;
        rig.inference.push_utterance("hello there", "en", 0.9);
        rig.audio.set_next_duration(1.0);

        send(&rig, PipelineCommand::Signal(TriggerSignal::CaptureStart));
        wait_state(&rig.handle, |s| s.is_recording()).await;

        // A second start while recording is ignored: no double audio start,
        // no state change.
        send(&rig, PipelineCommand::Signal(TriggerSignal::CaptureStart));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rig.handle.state().is_recording());

        // The in-flight cycle still completes normally.
        send(&rig, PipelineCommand::Signal(TriggerSignal::CaptureStop));
        wait_state(&rig.handle, |s| {
            matches!(s, RecordingState::ShowingConfirmation { .. })
        })
        .await;
        wait_state(&rig.handle, |s| s.is_idle()).await;
        assert_eq!(rig.handle.history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_before_model_ready_surfaces_error() {
        let rig = build_rig(SottoConfig::default(), true).await;

        send(&rig, PipelineCommand::Signal(TriggerSignal::CaptureStart));
        let error = wait_state(&rig.handle, |s| {
            matches!(s, RecordingState::Error { .. })
        })
        .await;
        match error {
            RecordingState::Error { message } => assert!(message.contains("still loading")),
            other => panic!("expected error state, got {}", other),
        }

        // Error auto-clears after 3 s.
        wait_state(&rig.handle, |s| s.is_idle()).await;
        assert!(rig.handle.history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_recording_discarded_without_transcription() {
        let rig = rig().await;

        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("clip.wav");
        std::fs::write(&wav, b"RIFF").unwrap();
        rig.audio.set_next_recording(RecordedAudio {
            wav_path: Some(wav.clone()),
            samples: vec![0.0; 3200],
            sample_rate: 16_000,
        });

        send(&rig, PipelineCommand::Signal(TriggerSignal::CaptureStart));
        wait_state(&rig.handle, |s| s.is_recording()).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        send(&rig, PipelineCommand::Signal(TriggerSignal::CaptureStop));

        wait_state(&rig.handle, |s| s.is_idle()).await;

        // The temp file is deleted by the discard worker.
        for _ in 0..50 {
            if !wav.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!wav.exists());

        // Nothing reached the downstream stages.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rig.handle.history().is_empty());
        assert!(rig.delivery.delivered().is_empty());
        assert!(rig.handle.state().is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inference_failure_surfaces_error_and_clears() {
        let rig = rig().await;
        // Queue nothing: the mock reports EmptyResult.

        dictate(&rig, 1.0).await;

        let error = wait_state(&rig.handle, |s| {
            matches!(s, RecordingState::Error { .. })
        })
        .await;
        match error {
            RecordingState::Error { message } => {
                assert!(message.contains("Transcription failed"));
            }
            other => panic!("expected error state, got {}", other),
        }

        wait_state(&rig.handle, |s| s.is_idle()).await;
        assert!(rig.handle.history().is_empty());
        assert!(rig.delivery.delivered().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_confidence_keeps_text_with_floor() {
        let rig = rig().await;
        rig.inference
            .push_result(Err(InferenceError::LowConfidence {
                text: "helo wrld".to_string(),
                language: "en".to_string(),
            }));

        dictate(&rig, 1.0).await;

        let confirmed = wait_state(&rig.handle, |s| {
            matches!(s, RecordingState::ShowingConfirmation { .. })
        })
        .await;
        assert_eq!(
            confirmed,
            RecordingState::ShowingConfirmation {
                text: "Helo wrld.".to_string()
            }
        );

        wait_state(&rig.handle, |s| s.is_idle()).await;
        let record = rig.handle.last_result().unwrap();
        assert!((record.confidence - CONFIDENCE_FLOOR).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_duration_stops_recording() {
        let mut config = SottoConfig::default();
        config.recording.max_recording_secs = 2;
        let rig = build_rig(config, false).await;

        rig.inference.push_utterance("went long", "en", 0.9);
        rig.audio.set_next_duration(2.0);

        send(&rig, PipelineCommand::Signal(TriggerSignal::CaptureStart));
        wait_state(&rig.handle, |s| s.is_recording()).await;

        // No stop signal: the max-duration timer fires at 2 s.
        let confirmed = wait_state(&rig.handle, |s| {
            matches!(s, RecordingState::ShowingConfirmation { .. })
        })
        .await;
        assert_eq!(
            confirmed,
            RecordingState::ShowingConfirmation {
                text: "Went long.".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_audio_start_failure_surfaces_device_error() {
        let rig = rig().await;
        rig.audio.fail_next_start();

        send(&rig, PipelineCommand::Signal(TriggerSignal::CaptureStart));
        let error = wait_state(&rig.handle, |s| {
            matches!(s, RecordingState::Error { .. })
        })
        .await;
        match error {
            RecordingState::Error { message } => assert!(message.contains("Microphone error")),
            other => panic!("expected error state, got {}", other),
        }
        wait_state(&rig.handle, |s| s.is_idle()).await;

        // Retriggering works once the device recovers.
        rig.inference.push_utterance("recovered", "en", 0.9);
        dictate(&rig, 1.0).await;
        wait_state(&rig.handle, |s| {
            matches!(s, RecordingState::ShowingConfirmation { .. })
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_insertion_failure_still_reaches_confirmation() {
        let rig = rig().await;
        rig.inference.push_utterance("hello", "en", 0.9);
        rig.delivery.fail_next();

        dictate(&rig, 1.0).await;

        // Insertion failures are logged, never surfaced.
        wait_state(&rig.handle, |s| {
            matches!(s, RecordingState::ShowingConfirmation { .. })
        })
        .await;
        wait_state(&rig.handle, |s| s.is_idle()).await;
        assert_eq!(rig.handle.history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_correction_requires_prior_result() {
        let rig = rig().await;

        send(&rig, PipelineCommand::Signal(TriggerSignal::OpenCorrection));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rig.handle.state().is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_correction_flow_uses_result_language() {
        let rig = rig().await;
        rig.inference
            .push_utterance("der hund ist nicht mit der katze", "de", 0.9);

        dictate(&rig, 1.0).await;
        wait_state(&rig.handle, |s| {
            matches!(s, RecordingState::ShowingConfirmation { .. })
        })
        .await;
        wait_state(&rig.handle, |s| s.is_idle()).await;

        send(&rig, PipelineCommand::Signal(TriggerSignal::OpenCorrection));
        wait_state(&rig.handle, |s| *s == RecordingState::ShowingCorrection).await;

        rig.handle.submit_correction("hund", "Hund", true);
        wait_state(&rig.handle, |s| s.is_idle()).await;

        let entries = rig.corrections.all();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].wrong_text, "hund");
        assert_eq!(entries[0].language, "de");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_correction_returns_to_idle() {
        let rig = rig().await;
        rig.inference.push_utterance("hello", "en", 0.9);
        dictate(&rig, 1.0).await;
        wait_state(&rig.handle, |s| {
            matches!(s, RecordingState::ShowingConfirmation { .. })
        })
        .await;
        wait_state(&rig.handle, |s| s.is_idle()).await;

        send(&rig, PipelineCommand::Signal(TriggerSignal::OpenCorrection));
        wait_state(&rig.handle, |s| *s == RecordingState::ShowingCorrection).await;

        rig.handle.dismiss_correction();
        wait_state(&rig.handle, |s| s.is_idle()).await;
        assert!(rig.corrections.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_firing_is_noop() {
        let rig = build_rig(SottoConfig::default(), true).await;

        // Error A: capture start with no model. Its clear timer is armed for
        // t+3 s.
        send(&rig, PipelineCommand::Signal(TriggerSignal::CaptureStart));
        wait_state(&rig.handle, |s| matches!(s, RecordingState::Error { .. })).await;

        // 1 s later, error B replaces it with a fresh timer for t+4 s.
        tokio::time::sleep(Duration::from_secs(1)).await;
        send(&rig, PipelineCommand::ModelFailed("switch failed".to_string()));
        tokio::time::sleep(Duration::from_millis(100)).await;

        // At t+3.1 s timer A has fired with a stale epoch: still Error.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(matches!(rig.handle.state(), RecordingState::Error { .. }));

        // Timer B clears it at t+4 s.
        wait_state(&rig.handle, |s| s.is_idle()).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_amplitudes_stream_and_reset_on_new_recording() {
        let rig = rig().await;

        rig.audio.emit_amplitude(0.4);
        rig.audio.emit_amplitude(0.8);
        for _ in 0..50 {
            if rig.handle.amplitudes().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(rig.handle.amplitudes(), vec![0.4, 0.8]);

        // Starting a capture clears the waveform.
        rig.audio.set_next_duration(1.0);
        send(&rig, PipelineCommand::Signal(TriggerSignal::CaptureStart));
        wait_state(&rig.handle, |s| s.is_recording()).await;
        assert!(rig.handle.amplitudes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_reload_after_failure() {
        let rig = build_rig(SottoConfig::default(), true).await;

        // The first load failed; recording is refused.
        send(&rig, PipelineCommand::Signal(TriggerSignal::CaptureStart));
        wait_state(&rig.handle, |s| matches!(s, RecordingState::Error { .. })).await;
        wait_state(&rig.handle, |s| s.is_idle()).await;

        // Reload succeeds and dictation works. Subscribe before sending so
        // the load completing first cannot be missed.
        let mut rx = rig.handle.subscribe();
        rig.handle.reload_model();
        loop {
            tokio::time::timeout(Duration::from_secs(30), rx.changed())
                .await
                .expect("timed out waiting for reload")
                .expect("pipeline dropped");
            if rx.borrow_and_update().is_idle() {
                break;
            }
        }

        rig.inference.push_utterance("now it works", "en", 0.9);
        dictate(&rig, 1.0).await;
        wait_state(&rig.handle, |s| {
            matches!(s, RecordingState::ShowingConfirmation { .. })
        })
        .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_drives_start_and_stop() {
        let rig = rig().await;
        rig.inference.push_utterance("toggled", "en", 0.9);
        rig.audio.set_next_duration(1.0);

        rig.handle.toggle();
        wait_state(&rig.handle, |s| s.is_recording()).await;

        tokio::time::sleep(Duration::from_secs(1)).await;
        rig.handle.toggle();
        let confirmed = wait_state(&rig.handle, |s| {
            matches!(s, RecordingState::ShowingConfirmation { .. })
        })
        .await;
        assert_eq!(
            confirmed,
            RecordingState::ShowingConfirmation {
                text: "Toggled.".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_history_capped_most_recent_first() {
        let rig = rig().await;

        for i in 0..(HISTORY_CAP + 2) {
            rig.inference
                .push_utterance(&format!("utterance number {}", i), "en", 0.9);
            dictate(&rig, 1.0).await;
            wait_state(&rig.handle, |s| {
                matches!(s, RecordingState::ShowingConfirmation { .. })
            })
            .await;
            wait_state(&rig.handle, |s| s.is_idle()).await;
        }

        let history = rig.handle.history();
        assert_eq!(history.len(), HISTORY_CAP);
        // Most recent first; the two oldest runs fell off.
        assert_eq!(
            history[0].raw_text,
            format!("utterance number {}", HISTORY_CAP + 1)
        );
        assert_eq!(history[HISTORY_CAP - 1].raw_text, "utterance number 2");
    }
}
