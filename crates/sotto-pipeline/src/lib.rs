//! Sotto pipeline crate - the orchestrator tying everything together.
//!
//! One task owns the `RecordingState` and consumes a single command channel;
//! trigger signals, audio events, timer firings, and worker completions all
//! arrive as [`PipelineCommand`]s. Collaborator calls that can block (audio
//! start/stop, inference, insertion) run as spawned workers that report back
//! through the same channel, so the control loop never blocks and the
//! single-writer discipline on state holds by construction.

pub mod command;
pub mod handle;
pub mod pipeline;

pub use command::{PipelineCommand, PipelineTimer};
pub use handle::{PipelineHandle, PipelineShared};
pub use pipeline::{forward_audio_events, forward_trigger_signals, DictationPipeline};
