//! Capability traits the insertion engine is built on, plus in-memory fakes.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use sotto_core::error::SottoError;

/// Failures inside the insertion capabilities.
#[derive(Debug, Error)]
pub enum InsertError {
    #[error("no focused element")]
    NoFocus,

    #[error("focused element value is not settable")]
    NotSettable,

    #[error("clipboard failure: {0}")]
    Clipboard(String),

    #[error("paste synthesis failure: {0}")]
    Paste(String),

    #[error("platform failure: {0}")]
    Platform(String),
}

impl From<InsertError> for SottoError {
    fn from(err: InsertError) -> Self {
        SottoError::Insertion(err.to_string())
    }
}

/// What the focused element looks like right now.
#[derive(Debug, Clone, Default)]
pub struct FocusSnapshot {
    /// Current text value, or `None` when the element does not expose one.
    pub text: Option<String>,
    /// Caret position in characters from the start of `text`.
    pub caret: usize,
    /// Length of the active selection (0 = plain caret).
    pub selection_len: usize,
}

/// Access to the system-wide focused UI element.
pub trait FocusTarget: Send + Sync {
    fn snapshot(&self) -> Result<FocusSnapshot, InsertError>;

    /// Replace the element's whole value and park the caret at `caret`.
    fn replace_value(&self, text: &str, caret: usize) -> Result<(), InsertError>;

    /// Replace just the current selection with `text`.
    fn replace_selection(&self, text: &str) -> Result<(), InsertError>;
}

/// Access to the system clipboard string.
pub trait ClipboardAccess: Send + Sync {
    fn get_text(&self) -> Option<String>;
    fn set_text(&self, text: &str) -> Result<(), InsertError>;
    fn clear(&self) -> Result<(), InsertError>;
}

/// Synthesizes the platform's standard paste chord (down then up).
pub trait PasteSynthesizer: Send + Sync {
    fn send_paste(&self) -> Result<(), InsertError>;
}

/// Live modifier-key state, polled before insertion.
pub trait ModifierProbe: Send + Sync {
    fn any_pressed(&self) -> bool;
}

// Shared-ownership passthroughs so capabilities can be cloned into tasks.
impl<T: FocusTarget> FocusTarget for Arc<T> {
    fn snapshot(&self) -> Result<FocusSnapshot, InsertError> {
        (**self).snapshot()
    }
    fn replace_value(&self, text: &str, caret: usize) -> Result<(), InsertError> {
        (**self).replace_value(text, caret)
    }
    fn replace_selection(&self, text: &str) -> Result<(), InsertError> {
        (**self).replace_selection(text)
    }
}

impl<T: ClipboardAccess> ClipboardAccess for Arc<T> {
    fn get_text(&self) -> Option<String> {
        (**self).get_text()
    }
    fn set_text(&self, text: &str) -> Result<(), InsertError> {
        (**self).set_text(text)
    }
    fn clear(&self) -> Result<(), InsertError> {
        (**self).clear()
    }
}

impl<T: PasteSynthesizer> PasteSynthesizer for Arc<T> {
    fn send_paste(&self) -> Result<(), InsertError> {
        (**self).send_paste()
    }
}

impl<T: ModifierProbe> ModifierProbe for Arc<T> {
    fn any_pressed(&self) -> bool {
        (**self).any_pressed()
    }
}

// =============================================================================
// Fakes
// =============================================================================

/// Scripted focused element for tests.
///
/// Holds an editable value and caret; records every write. Can be told to
/// fail snapshots, value writes, or selection writes.
#[derive(Default)]
pub struct FakeFocusTarget {
    state: Mutex<FakeFocusState>,
}

#[derive(Default)]
struct FakeFocusState {
    text: Option<String>,
    caret: usize,
    selection_len: usize,
    fail_snapshot: bool,
    fail_value_write: bool,
    fail_selection_write: bool,
    selection_writes: Vec<String>,
}

impl FakeFocusTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// An editable element with the given value and caret.
    pub fn with_text(text: &str, caret: usize) -> Self {
        let fake = Self::new();
        {
            let mut state = fake.state.lock().unwrap();
            state.text = Some(text.to_string());
            state.caret = caret;
        }
        fake
    }

    /// An element that exposes no settable value (selection writes only).
    pub fn without_value() -> Self {
        Self::new()
    }

    pub fn fail_snapshot(&self) {
        self.state.lock().unwrap().fail_snapshot = true;
    }

    pub fn fail_value_write(&self) {
        self.state.lock().unwrap().fail_value_write = true;
    }

    pub fn fail_selection_write(&self) {
        self.state.lock().unwrap().fail_selection_write = true;
    }

    /// Current value as last written.
    pub fn text(&self) -> Option<String> {
        self.state.lock().unwrap().text.clone()
    }

    pub fn caret(&self) -> usize {
        self.state.lock().unwrap().caret
    }

    /// Everything delivered through `replace_selection`.
    pub fn selection_writes(&self) -> Vec<String> {
        self.state.lock().unwrap().selection_writes.clone()
    }
}

impl FocusTarget for FakeFocusTarget {
    fn snapshot(&self) -> Result<FocusSnapshot, InsertError> {
        let state = self.state.lock().unwrap();
        if state.fail_snapshot {
            return Err(InsertError::NoFocus);
        }
        Ok(FocusSnapshot {
            text: state.text.clone(),
            caret: state.caret,
            selection_len: state.selection_len,
        })
    }

    fn replace_value(&self, text: &str, caret: usize) -> Result<(), InsertError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_value_write || state.text.is_none() {
            return Err(InsertError::NotSettable);
        }
        state.text = Some(text.to_string());
        state.caret = caret;
        Ok(())
    }

    fn replace_selection(&self, text: &str) -> Result<(), InsertError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_selection_write {
            return Err(InsertError::NotSettable);
        }
        state.selection_writes.push(text.to_string());
        Ok(())
    }
}

/// In-memory clipboard for tests.
#[derive(Default)]
pub struct MemoryClipboard {
    content: Mutex<Option<String>>,
    fail_set: AtomicBool,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_content(text: &str) -> Self {
        let clipboard = Self::new();
        *clipboard.content.lock().unwrap() = Some(text.to_string());
        clipboard
    }

    pub fn fail_next_set(&self) {
        self.fail_set.store(true, Ordering::Relaxed);
    }
}

impl ClipboardAccess for MemoryClipboard {
    fn get_text(&self) -> Option<String> {
        self.content.lock().unwrap().clone()
    }

    fn set_text(&self, text: &str) -> Result<(), InsertError> {
        if self.fail_set.swap(false, Ordering::Relaxed) {
            return Err(InsertError::Clipboard("mock set failure".to_string()));
        }
        *self.content.lock().unwrap() = Some(text.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), InsertError> {
        *self.content.lock().unwrap() = None;
        Ok(())
    }
}

/// Paste recorder: captures what the clipboard held at paste time.
pub struct RecordingPaste {
    clipboard: Arc<MemoryClipboard>,
    seen: Mutex<Vec<Option<String>>>,
    fail: AtomicBool,
}

impl RecordingPaste {
    pub fn new(clipboard: Arc<MemoryClipboard>) -> Self {
        Self {
            clipboard,
            seen: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn fail_next(&self) {
        self.fail.store(true, Ordering::Relaxed);
    }

    /// Clipboard contents observed at each synthesized paste.
    pub fn pasted(&self) -> Vec<Option<String>> {
        self.seen.lock().unwrap().clone()
    }
}

impl PasteSynthesizer for RecordingPaste {
    fn send_paste(&self) -> Result<(), InsertError> {
        if self.fail.swap(false, Ordering::Relaxed) {
            return Err(InsertError::Paste("mock paste failure".to_string()));
        }
        self.seen.lock().unwrap().push(self.clipboard.get_text());
        Ok(())
    }
}

/// Modifier probe returning a fixed answer, counting polls.
pub struct StaticModifiers {
    pressed: AtomicBool,
    polls: AtomicU32,
}

impl StaticModifiers {
    pub fn released() -> Self {
        Self {
            pressed: AtomicBool::new(false),
            polls: AtomicU32::new(0),
        }
    }

    pub fn held() -> Self {
        Self {
            pressed: AtomicBool::new(true),
            polls: AtomicU32::new(0),
        }
    }

    /// Simulate the user letting go.
    pub fn release(&self) {
        self.pressed.store(false, Ordering::Relaxed);
    }

    pub fn poll_count(&self) -> u32 {
        self.polls.load(Ordering::Relaxed)
    }
}

impl ModifierProbe for StaticModifiers {
    fn any_pressed(&self) -> bool {
        self.polls.fetch_add(1, Ordering::Relaxed);
        self.pressed.load(Ordering::Relaxed)
    }
}
