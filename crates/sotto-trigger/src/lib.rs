//! Sotto trigger crate - turns raw key/modifier events into capture signals.
//!
//! No single key event carries unambiguous intent: the engine classifies a
//! stream of modifier changes and key-downs into three application signals
//! (`CaptureStart`, `CaptureStop`, `OpenCorrection`) using a
//! double-press-and-hold gesture and an exact-match correction chord.
//!
//! OS delivery threads call into the engine directly; signals leave through a
//! channel owned by the pipeline, never through direct calls.

pub mod engine;
pub mod listener;
pub mod permission;

pub use engine::{
    KeyEvent, ModifierEvent, ModifierKey, ModifierMask, TriggerBindings, TriggerEngine,
    TriggerSignal,
};
pub use listener::TriggerListener;
pub use permission::{InputPermission, MockPermission, PermissionState, SystemInputPermission};
