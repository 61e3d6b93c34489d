//! OS key-state listener feeding the trigger engine.
//!
//! On Windows, polls the async key state for the bound modifier and the
//! correction key, converts edges into [`ModifierEvent`]/[`KeyEvent`]s, and
//! feeds them to the engine. Polling at 10 ms is far inside the 400 ms
//! gesture window.
//!
//! On non-Windows, provides a stub that logs and returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::engine::TriggerEngine;

/// Poll period for key-state sampling.
#[cfg(target_os = "windows")]
const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(10);

/// Blocking poll loop that translates OS key state into trigger events.
pub struct TriggerListener {
    engine: Arc<TriggerEngine>,
    shutdown: Arc<AtomicBool>,
}

impl TriggerListener {
    pub fn new(engine: Arc<TriggerEngine>) -> Self {
        Self {
            engine,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for stopping the loop from another thread.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Run until stopped. Blocking; callers use `tokio::task::spawn_blocking`.
    #[cfg(target_os = "windows")]
    pub fn run(&self) {
        use std::time::Instant;

        use windows_sys::Win32::UI::Input::KeyboardAndMouse::GetAsyncKeyState;

        use crate::engine::{KeyEvent, ModifierEvent, ModifierKey, ModifierMask};

        fn key_down(vk: i32) -> bool {
            // High bit set = currently down.
            unsafe { GetAsyncKeyState(vk) as u16 & 0x8000 != 0 }
        }

        fn vk_of(key: ModifierKey) -> i32 {
            match key {
                ModifierKey::LeftShift => 0xA0,
                ModifierKey::RightShift => 0xA1,
                ModifierKey::LeftCtrl => 0xA2,
                ModifierKey::RightCtrl => 0xA3,
                ModifierKey::LeftAlt => 0xA4,
                ModifierKey::RightAlt => 0xA5,
                ModifierKey::LeftSuper => 0x5B,
                ModifierKey::RightSuper => 0x5C,
            }
        }

        fn current_mask() -> ModifierMask {
            let mut mask = ModifierMask::EMPTY;
            if key_down(0x10) {
                mask = mask | ModifierMask::SHIFT;
            }
            if key_down(0x11) {
                mask = mask | ModifierMask::CONTROL;
            }
            if key_down(0x12) {
                mask = mask | ModifierMask::ALT;
            }
            if key_down(0x5B) || key_down(0x5C) {
                mask = mask | ModifierMask::SUPER;
            }
            mask
        }

        tracing::info!("Trigger listener started");

        let mut modifier_was_down = false;
        let mut correction_was_down = false;

        while !self.shutdown.load(Ordering::Relaxed) {
            let bindings = self.engine.bindings();
            let trigger_key = bindings.trigger_modifier;

            let modifier_down = key_down(vk_of(trigger_key));
            if modifier_down != modifier_was_down {
                modifier_was_down = modifier_down;
                self.engine.on_modifier_change(ModifierEvent {
                    key: trigger_key,
                    pressed: modifier_down,
                    mask: current_mask(),
                    at: Instant::now(),
                });
            }

            let correction_down = key_down(bindings.correction_key_code as i32);
            if correction_down && !correction_was_down {
                self.engine.on_key_down(KeyEvent {
                    code: bindings.correction_key_code,
                    mask: current_mask(),
                    at: Instant::now(),
                });
            }
            correction_was_down = correction_down;

            std::thread::sleep(POLL_INTERVAL);
        }

        tracing::info!("Trigger listener stopped");
    }

    /// Stub: global key observation is only wired up on Windows.
    #[cfg(not(target_os = "windows"))]
    pub fn run(&self) {
        let _ = &self.engine;
        tracing::warn!("Trigger listener is only available on Windows");
    }
}
