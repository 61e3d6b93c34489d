//! The two-tier insertion protocol.

use std::time::Duration;

use sotto_core::config::InsertionConfig;
use sotto_core::error::SottoError;

use crate::capability::{
    ClipboardAccess, FocusTarget, InsertError, ModifierProbe, PasteSynthesizer,
};

/// Which tier delivered the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPath {
    /// Direct write through the focused element.
    Element,
    /// Clipboard-and-paste simulation.
    Clipboard,
}

/// The pipeline-facing face of text delivery.
///
/// Implemented by [`InsertionEngine`]; tests substitute recorders.
pub trait TextDelivery: Send + Sync {
    fn deliver(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<InsertPath, SottoError>> + Send;
}

impl<F, C, P, M> TextDelivery for InsertionEngine<F, C, P, M>
where
    F: FocusTarget,
    C: ClipboardAccess,
    P: PasteSynthesizer,
    M: ModifierProbe,
{
    async fn deliver(&self, text: &str) -> Result<InsertPath, SottoError> {
        self.insert(text).await
    }
}

/// Delivers text into whatever application holds input focus.
///
/// The clipboard tier is destructive to clipboard state and visibly
/// intrusive, so it is never attempted first; the prior clipboard content is
/// restored on every exit path.
pub struct InsertionEngine<F, C, P, M> {
    focus: F,
    clipboard: C,
    paste: P,
    modifiers: M,
    config: InsertionConfig,
}

impl<F, C, P, M> InsertionEngine<F, C, P, M>
where
    F: FocusTarget,
    C: ClipboardAccess,
    P: PasteSynthesizer,
    M: ModifierProbe,
{
    pub fn new(focus: F, clipboard: C, paste: P, modifiers: M, config: InsertionConfig) -> Self {
        Self {
            focus,
            clipboard,
            paste,
            modifiers,
            config,
        }
    }

    /// Insert `text` at the focused application's cursor.
    ///
    /// Returns which tier delivered it. An error means even the clipboard
    /// tier failed; callers treat that as logged-and-done, never user-facing.
    pub async fn insert(&self, text: &str) -> Result<InsertPath, SottoError> {
        tracing::info!(text_len = text.len(), "Insertion requested");

        self.wait_for_modifier_release().await;
        tokio::time::sleep(Duration::from_millis(self.config.pre_insert_delay_ms)).await;

        match self.insert_via_focus(text) {
            Ok(()) => {
                tracing::info!("Inserted via focused element");
                Ok(InsertPath::Element)
            }
            Err(e) => {
                tracing::info!(error = %e, "Focused-element write failed, using clipboard fallback");
                self.insert_via_clipboard(text).await?;
                tracing::info!("Inserted via clipboard simulation");
                Ok(InsertPath::Clipboard)
            }
        }
    }

    /// Poll for all modifiers released, bounded. Inserting while a chord is
    /// held can corrupt the synthesized paste, but waiting forever would
    /// wedge the pipeline, so after the cap we proceed regardless.
    async fn wait_for_modifier_release(&self) {
        for _ in 0..self.config.modifier_wait_retries {
            if !self.modifiers.any_pressed() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(self.config.modifier_wait_interval_ms)).await;
        }
        tracing::debug!("Modifier keys still held; inserting anyway");
    }

    /// Primary tier: splice into the element's value at the caret, or replace
    /// the selection when no settable value is exposed.
    fn insert_via_focus(&self, text: &str) -> Result<(), InsertError> {
        let snapshot = self.focus.snapshot()?;

        if let Some(current) = snapshot.text {
            let char_count = current.chars().count();
            // Caret beyond the end means append.
            let caret = snapshot.caret.min(char_count);
            let byte_idx = current
                .char_indices()
                .nth(caret)
                .map(|(i, _)| i)
                .unwrap_or(current.len());

            let new_value = format!("{}{}{}", &current[..byte_idx], text, &current[byte_idx..]);
            let new_caret = caret + text.chars().count();

            tracing::debug!(
                caret,
                prefix_chars = caret,
                suffix_chars = char_count - caret,
                "Writing focused element value"
            );

            match self.focus.replace_value(&new_value, new_caret) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::debug!(error = %e, "Value write refused, trying selection write");
                }
            }
        }

        self.focus.replace_selection(text)
    }

    /// Fallback tier: clipboard swap around a synthesized paste.
    async fn insert_via_clipboard(&self, text: &str) -> Result<(), SottoError> {
        let saved = self.clipboard.get_text();
        tracing::debug!(had_prior = saved.is_some(), "Saving clipboard");

        if let Err(e) = self.clipboard.set_text(text) {
            // The clipboard may already be clobbered; restore before bailing.
            self.restore_clipboard(&saved);
            return Err(e.into());
        }

        let paste_result = self.paste.send_paste();
        if paste_result.is_ok() {
            // Give the target application time to consume the paste.
            tokio::time::sleep(Duration::from_millis(self.config.paste_grace_ms)).await;
        }

        self.restore_clipboard(&saved);
        paste_result.map_err(SottoError::from)
    }

    fn restore_clipboard(&self, saved: &Option<String>) {
        let result = match saved {
            Some(old) => self.clipboard.set_text(old),
            None => self.clipboard.clear(),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to restore clipboard");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
