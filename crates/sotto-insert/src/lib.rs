//! Sotto insert crate - delivers finished text into the focused application.
//!
//! Delivery is a strict two-tier protocol: write through the focused
//! element's value first, and only when that fails fall back to clipboard
//! simulation (save clipboard, paste keystroke, restore). Both tiers sit
//! behind capability traits so the whole chain is testable with fakes.

pub mod capability;
pub mod engine;
pub mod system;

pub use capability::{
    ClipboardAccess, FocusSnapshot, FocusTarget, InsertError, ModifierProbe, PasteSynthesizer,
};
pub use engine::{InsertPath, InsertionEngine, TextDelivery};
pub use system::{KeystrokePaste, NativeFocusTarget, SystemClipboard, SystemModifierProbe};
