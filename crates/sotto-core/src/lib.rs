//! Sotto core crate - shared error type, configuration, and domain types.
//!
//! Everything here is consumed by the other Sotto crates: the top-level
//! `SottoError`, the TOML-backed `SottoConfig`, and the domain value types
//! (`RecordingState`, `TranscriptionRecord`, `AmplitudeBuffer`).

pub mod config;
pub mod error;
pub mod types;

pub use config::SottoConfig;
pub use error::{Result, SottoError};
pub use types::*;
