//! Sotto speech crate - collaborator contracts for the dictation pipeline.
//!
//! Defines trait-based abstractions for the four external collaborators the
//! orchestrator drives: audio capture, speech inference, language detection,
//! and grammar cleanup. Mock implementations live alongside the traits so the
//! pipeline can be exercised without hardware or model files.
//!
//! The real whisper.cpp backend is available behind the `whisper` feature.

pub mod audio;
#[cfg(feature = "capture")]
pub mod cpal_audio;
pub mod grammar;
pub mod inference;
pub mod language;
#[cfg(feature = "whisper")]
pub mod whisper_service;

pub use audio::{AudioCaptureService, AudioEvent, MockAudioService, RecordedAudio};
pub use grammar::{GrammarCorrector, PunctuationCorrector};
pub use inference::{InferenceError, InferenceService, MockInferenceService, Utterance};
pub use language::{HeuristicLanguageDetector, LanguageDetector, LanguageGuess};
