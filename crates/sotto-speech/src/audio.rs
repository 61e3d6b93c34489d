//! Audio capture collaborator contract and mock.
//!
//! The capture device is external to the pipeline core: the orchestrator only
//! starts it, stops it, and consumes what it produced. Amplitude levels and
//! the max-duration signal travel as messages on a channel handed to the
//! implementation at construction, never as direct calls into the pipeline.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use sotto_core::error::SottoError;

/// Events a capture implementation emits while recording.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioEvent {
    /// Normalized level in [0, 1] for the waveform display. Producers
    /// normalize before sending (RMS * 15, clamped to 1.0).
    Amplitude(f32),
    /// The configured maximum recording duration elapsed.
    MaxDurationReached,
}

/// What a finished capture hands back to the pipeline.
#[derive(Debug, Clone, Default)]
pub struct RecordedAudio {
    /// Temp WAV file, if the implementation wrote one. The consumer deletes
    /// it on every exit path.
    pub wav_path: Option<PathBuf>,
    /// Decoded mono PCM samples.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl RecordedAudio {
    /// Measured duration of the capture, derived from the sample count.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Delete the temp WAV file if present. Idempotent, best-effort.
    pub fn cleanup(&mut self) {
        if let Some(path) = self.wav_path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                tracing::debug!(path = %path.display(), error = %e, "Temp audio already gone");
            }
        }
    }
}

/// Service for managing microphone capture.
pub trait AudioCaptureService: Send + Sync {
    /// Start capturing. Fails with `SottoError::Device` on driver failure.
    fn start(&self) -> impl Future<Output = Result<(), SottoError>> + Send;

    /// Stop capturing and return the recorded audio.
    fn stop(&self) -> impl Future<Output = Result<RecordedAudio, SottoError>> + Send;

    /// Whether a capture is currently running.
    fn is_active(&self) -> bool;
}

// =============================================================================
// Mock implementation
// =============================================================================

/// Mock audio capture for tests: no hardware, scripted output.
///
/// Tests can push amplitude/max-duration events through the channel given at
/// construction and choose what `stop` returns.
#[derive(Clone)]
pub struct MockAudioService {
    active: Arc<AtomicBool>,
    fail_start: Arc<AtomicBool>,
    next_recording: Arc<Mutex<RecordedAudio>>,
    events: mpsc::UnboundedSender<AudioEvent>,
}

impl MockAudioService {
    pub fn new(events: mpsc::UnboundedSender<AudioEvent>) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(false)),
            fail_start: Arc::new(AtomicBool::new(false)),
            next_recording: Arc::new(Mutex::new(RecordedAudio::default())),
            events,
        }
    }

    /// Script what the next `stop` call returns.
    pub fn set_next_recording(&self, recording: RecordedAudio) {
        *self.next_recording.lock().unwrap() = recording;
    }

    /// Script a recording of `duration_secs` of silence at 16 kHz.
    pub fn set_next_duration(&self, duration_secs: f64) {
        let samples = vec![0.0f32; (duration_secs * 16_000.0) as usize];
        self.set_next_recording(RecordedAudio {
            wav_path: None,
            samples,
            sample_rate: 16_000,
        });
    }

    /// Make the next `start` call fail with a device error.
    pub fn fail_next_start(&self) {
        self.fail_start.store(true, Ordering::Relaxed);
    }

    /// Emit an amplitude event as the real device would.
    pub fn emit_amplitude(&self, level: f32) {
        let _ = self.events.send(AudioEvent::Amplitude(level));
    }

    /// Emit the max-duration signal as the real device would.
    pub fn emit_max_duration(&self) {
        let _ = self.events.send(AudioEvent::MaxDurationReached);
    }
}

impl AudioCaptureService for MockAudioService {
    async fn start(&self) -> Result<(), SottoError> {
        if self.fail_start.swap(false, Ordering::Relaxed) {
            return Err(SottoError::Device("mock device failure".to_string()));
        }
        if self.active.swap(true, Ordering::Relaxed) {
            return Err(SottoError::Device("capture already active".to_string()));
        }
        tracing::info!("Mock audio capture started");
        Ok(())
    }

    async fn stop(&self) -> Result<RecordedAudio, SottoError> {
        if !self.active.swap(false, Ordering::Relaxed) {
            return Err(SottoError::Device("capture not active".to_string()));
        }
        tracing::info!("Mock audio capture stopped");
        Ok(self.next_recording.lock().unwrap().clone())
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_from_sample_count() {
        let recording = RecordedAudio {
            wav_path: None,
            samples: vec![0.0; 19_200],
            sample_rate: 16_000,
        };
        assert!((recording.duration_secs() - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_duration_with_zero_rate() {
        let recording = RecordedAudio {
            wav_path: None,
            samples: vec![0.0; 100],
            sample_rate: 0,
        };
        assert_eq!(recording.duration_secs(), 0.0);
    }

    #[test]
    fn test_cleanup_removes_file_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        let mut recording = RecordedAudio {
            wav_path: Some(path.clone()),
            samples: Vec::new(),
            sample_rate: 16_000,
        };
        recording.cleanup();
        assert!(!path.exists());
        recording.cleanup(); // no-op
    }

    #[tokio::test]
    async fn test_mock_start_stop_cycle() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let audio = MockAudioService::new(tx);
        assert!(!audio.is_active());

        audio.start().await.unwrap();
        assert!(audio.is_active());

        audio.set_next_duration(1.2);
        let recording = audio.stop().await.unwrap();
        assert!(!audio.is_active());
        assert!((recording.duration_secs() - 1.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_mock_double_start_fails() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let audio = MockAudioService::new(tx);
        audio.start().await.unwrap();
        assert!(audio.start().await.is_err());
    }

    #[tokio::test]
    async fn test_mock_stop_without_start_fails() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let audio = MockAudioService::new(tx);
        assert!(audio.stop().await.is_err());
    }

    #[tokio::test]
    async fn test_mock_scripted_start_failure() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let audio = MockAudioService::new(tx);
        audio.fail_next_start();
        let err = audio.start().await.unwrap_err();
        assert!(matches!(err, SottoError::Device(_)));
        // The failure is one-shot.
        audio.start().await.unwrap();
    }

    #[tokio::test]
    async fn test_mock_emits_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let audio = MockAudioService::new(tx);
        audio.emit_amplitude(0.4);
        audio.emit_max_duration();
        assert_eq!(rx.recv().await, Some(AudioEvent::Amplitude(0.4)));
        assert_eq!(rx.recv().await, Some(AudioEvent::MaxDurationReached));
    }
}
