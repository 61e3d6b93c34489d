//! Trigger classification: double-press-and-hold gesture and correction chord.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use sotto_core::config::TriggerConfig;
use sotto_core::error::SottoError;

/// The orchestrator's only inbound vocabulary from hardware input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSignal {
    CaptureStart,
    CaptureStop,
    OpenCorrection,
}

// =============================================================================
// Modifier representation
// =============================================================================

/// Bitmask of modifier state at the time of an event.
///
/// The low bits are the device-independent semantic modifiers; everything
/// above them (caps lock, key-repeat, vendor flags) is noise that
/// [`device_independent`](ModifierMask::device_independent) strips before any
/// comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModifierMask(pub u32);

impl ModifierMask {
    pub const SHIFT: ModifierMask = ModifierMask(1 << 0);
    pub const CONTROL: ModifierMask = ModifierMask(1 << 1);
    pub const ALT: ModifierMask = ModifierMask(1 << 2);
    pub const SUPER: ModifierMask = ModifierMask(1 << 3);
    /// Caps lock, num lock, key-repeat and other noise.
    pub const CAPS_LOCK: ModifierMask = ModifierMask(1 << 8);

    pub const EMPTY: ModifierMask = ModifierMask(0);

    const DEVICE_INDEPENDENT: u32 = 0b1111;

    /// Strip everything but the four semantic modifier bits.
    pub fn device_independent(self) -> ModifierMask {
        ModifierMask(self.0 & Self::DEVICE_INDEPENDENT)
    }

    pub fn contains(self, other: ModifierMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Parse a config modifier name ("shift", "ctrl", "alt", "super").
    pub fn from_name(name: &str) -> Option<ModifierMask> {
        match name {
            "shift" => Some(Self::SHIFT),
            "ctrl" | "control" => Some(Self::CONTROL),
            "alt" | "option" => Some(Self::ALT),
            "super" | "cmd" | "win" => Some(Self::SUPER),
            _ => None,
        }
    }
}

impl std::ops::BitOr for ModifierMask {
    type Output = ModifierMask;
    fn bitor(self, rhs: ModifierMask) -> ModifierMask {
        ModifierMask(self.0 | rhs.0)
    }
}

/// A physical modifier key, side-specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierKey {
    LeftShift,
    RightShift,
    LeftCtrl,
    RightCtrl,
    LeftAlt,
    RightAlt,
    LeftSuper,
    RightSuper,
}

impl ModifierKey {
    /// The device-independent mask bit this key contributes.
    pub fn mask_bit(self) -> ModifierMask {
        match self {
            ModifierKey::LeftShift | ModifierKey::RightShift => ModifierMask::SHIFT,
            ModifierKey::LeftCtrl | ModifierKey::RightCtrl => ModifierMask::CONTROL,
            ModifierKey::LeftAlt | ModifierKey::RightAlt => ModifierMask::ALT,
            ModifierKey::LeftSuper | ModifierKey::RightSuper => ModifierMask::SUPER,
        }
    }

    /// Parse a config key name ("right_alt", "left_ctrl", ...).
    pub fn from_name(name: &str) -> Option<ModifierKey> {
        match name {
            "left_shift" => Some(ModifierKey::LeftShift),
            "right_shift" => Some(ModifierKey::RightShift),
            "left_ctrl" => Some(ModifierKey::LeftCtrl),
            "right_ctrl" => Some(ModifierKey::RightCtrl),
            "left_alt" => Some(ModifierKey::LeftAlt),
            "right_alt" => Some(ModifierKey::RightAlt),
            "left_super" => Some(ModifierKey::LeftSuper),
            "right_super" => Some(ModifierKey::RightSuper),
            _ => None,
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// One change in modifier-key state, as delivered by the OS.
///
/// Events carry their own timestamp so the window logic is deterministic
/// under test.
#[derive(Debug, Clone, Copy)]
pub struct ModifierEvent {
    pub key: ModifierKey,
    /// Whether the key transitioned to pressed.
    pub pressed: bool,
    /// Full modifier state after this change.
    pub mask: ModifierMask,
    pub at: Instant,
}

/// A key-down with its resolved modifier mask.
#[derive(Debug, Clone, Copy)]
pub struct KeyEvent {
    pub code: u16,
    pub mask: ModifierMask,
    pub at: Instant,
}

// =============================================================================
// Bindings
// =============================================================================

/// Active trigger configuration: gesture key, window, correction chord.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerBindings {
    pub trigger_modifier: ModifierKey,
    pub double_press_window: Duration,
    pub correction_key_code: u16,
    pub correction_mask: ModifierMask,
}

impl TriggerBindings {
    /// Build bindings from the config section.
    pub fn from_config(config: &TriggerConfig) -> Result<Self, SottoError> {
        let trigger_modifier = ModifierKey::from_name(&config.trigger_modifier).ok_or_else(|| {
            SottoError::Trigger(format!(
                "unknown trigger modifier '{}'",
                config.trigger_modifier
            ))
        })?;

        let mut correction_mask = ModifierMask::EMPTY;
        for name in &config.correction_modifiers {
            let bit = ModifierMask::from_name(name).ok_or_else(|| {
                SottoError::Trigger(format!("unknown correction modifier '{}'", name))
            })?;
            correction_mask = correction_mask | bit;
        }

        Ok(Self {
            trigger_modifier,
            double_press_window: Duration::from_millis(config.double_press_window_ms),
            correction_key_code: config.correction_key_code,
            correction_mask,
        })
    }
}

impl Default for TriggerBindings {
    fn default() -> Self {
        Self::from_config(&TriggerConfig::default()).expect("default config is valid")
    }
}

// =============================================================================
// Engine
// =============================================================================

struct EngineState {
    bindings: TriggerBindings,
    /// Between a recognized press gesture and the matching release.
    hold_active: bool,
    /// Most recent pressed-alone edge of the trigger modifier.
    last_press_at: Option<Instant>,
}

/// Classifies raw input events into [`TriggerSignal`]s.
///
/// Callbacks arrive on whatever thread the OS uses; all state lives behind
/// one lock, which also makes `reconfigure` atomic — an event is processed
/// wholly under the old bindings or wholly under the new ones.
pub struct TriggerEngine {
    inner: Mutex<EngineState>,
    signals: mpsc::UnboundedSender<TriggerSignal>,
}

impl TriggerEngine {
    pub fn new(bindings: TriggerBindings, signals: mpsc::UnboundedSender<TriggerSignal>) -> Self {
        Self {
            inner: Mutex::new(EngineState {
                bindings,
                hold_active: false,
                last_press_at: None,
            }),
            signals,
        }
    }

    fn emit(&self, signal: TriggerSignal) {
        tracing::debug!(?signal, "Trigger signal");
        let _ = self.signals.send(signal);
    }

    /// Feed one modifier-state change.
    ///
    /// Two pressed-alone edges of the trigger modifier within the window
    /// start a hold; the first release observation while holding ends it.
    /// Presses while already holding are ignored.
    pub fn on_modifier_change(&self, event: ModifierEvent) {
        let signal = {
            let mut state = self.inner.lock().expect("trigger mutex poisoned");
            let trigger_bit = state.bindings.trigger_modifier.mask_bit();

            if state.hold_active && !event.mask.device_independent().contains(trigger_bit) {
                // Release of the held modifier, however it was reported.
                state.hold_active = false;
                Some(TriggerSignal::CaptureStop)
            } else if event.key == state.bindings.trigger_modifier
                && event.pressed
                && event.mask.device_independent() == trigger_bit
            {
                // Pressed-alone edge.
                let window = state.bindings.double_press_window;
                let doubled = state
                    .last_press_at
                    .is_some_and(|prev| event.at.duration_since(prev) <= window);
                state.last_press_at = Some(event.at);

                if doubled && !state.hold_active {
                    state.hold_active = true;
                    Some(TriggerSignal::CaptureStart)
                } else {
                    None
                }
            } else {
                None
            }
        };

        if let Some(signal) = signal {
            self.emit(signal);
        }
    }

    /// Feed one key-down. Emits `OpenCorrection` on an exact chord match.
    pub fn on_key_down(&self, event: KeyEvent) {
        let matched = {
            let state = self.inner.lock().expect("trigger mutex poisoned");
            event.code == state.bindings.correction_key_code
                && event.mask.device_independent()
                    == state.bindings.correction_mask.device_independent()
        };
        if matched {
            self.emit(TriggerSignal::OpenCorrection);
        }
    }

    /// Atomically replace the active bindings.
    ///
    /// Any in-progress gesture is abandoned; if a hold was active the
    /// orchestrator's max-duration timer recovers the recording.
    pub fn reconfigure(&self, new_bindings: TriggerBindings) {
        let mut state = self.inner.lock().expect("trigger mutex poisoned");
        if state.hold_active {
            tracing::warn!("Rebinding while hold active; abandoning gesture");
        }
        state.bindings = new_bindings;
        state.hold_active = false;
        state.last_press_at = None;
        tracing::info!("Trigger bindings replaced");
    }

    /// Snapshot of the active bindings.
    pub fn bindings(&self) -> TriggerBindings {
        self.inner
            .lock()
            .expect("trigger mutex poisoned")
            .bindings
            .clone()
    }
}

// =============================================================================
// Tests
// =============================================================================
