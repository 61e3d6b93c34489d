//! Real capability implementations: system clipboard, paste synthesis, and
//! best-effort focused-element access.
//!
//! Focused-element access is inherently platform-specific. On Windows it
//! talks to the focused control with classic edit-control messages
//! (`WM_GETTEXT` / `EM_GETSEL` / `EM_REPLACESEL`), which works for standard
//! text fields and fails cleanly for everything else — at which point the
//! engine's clipboard tier takes over. On other platforms the primary tier
//! always reports failure and delivery goes through the clipboard.

use arboard::Clipboard;
use enigo::{Direction, Enigo, Key, Keyboard, Settings};

use crate::capability::{
    ClipboardAccess, FocusSnapshot, FocusTarget, InsertError, ModifierProbe, PasteSynthesizer,
};

// =============================================================================
// Clipboard
// =============================================================================

/// System clipboard via arboard.
///
/// A fresh handle is opened per operation; arboard handles are not shareable
/// across threads.
#[derive(Debug, Clone, Default)]
pub struct SystemClipboard;

impl SystemClipboard {
    pub fn new() -> Self {
        Self
    }

    fn open() -> Result<Clipboard, InsertError> {
        Clipboard::new().map_err(|e| InsertError::Clipboard(format!("failed to open: {}", e)))
    }
}

impl ClipboardAccess for SystemClipboard {
    fn get_text(&self) -> Option<String> {
        Self::open().ok()?.get_text().ok()
    }

    fn set_text(&self, text: &str) -> Result<(), InsertError> {
        Self::open()?
            .set_text(text)
            .map_err(|e| InsertError::Clipboard(format!("failed to set text: {}", e)))
    }

    fn clear(&self) -> Result<(), InsertError> {
        Self::open()?
            .clear()
            .map_err(|e| InsertError::Clipboard(format!("failed to clear: {}", e)))
    }
}

// =============================================================================
// Paste synthesis
// =============================================================================

/// Synthesizes the platform paste chord with enigo.
#[derive(Debug, Clone, Default)]
pub struct KeystrokePaste;

impl KeystrokePaste {
    pub fn new() -> Self {
        Self
    }
}

impl PasteSynthesizer for KeystrokePaste {
    #[cfg(target_os = "windows")]
    fn send_paste(&self) -> Result<(), InsertError> {
        let mut enigo = Enigo::new(&Settings::default())
            .map_err(|e| InsertError::Paste(format!("failed to create enigo: {}", e)))?;

        // Raw virtual key codes: Key::Unicode can fail on some layouts.
        // VK_CONTROL = 0x11, VK_V = 0x56.
        let chord = [
            (Key::Other(0x11), Direction::Press),
            (Key::Other(0x56), Direction::Press),
            (Key::Other(0x56), Direction::Release),
            (Key::Other(0x11), Direction::Release),
        ];
        for (key, direction) in chord {
            enigo
                .key(key, direction)
                .map_err(|e| InsertError::Paste(format!("key event failed: {}", e)))?;
        }
        Ok(())
    }

    #[cfg(not(target_os = "windows"))]
    fn send_paste(&self) -> Result<(), InsertError> {
        let mut enigo = Enigo::new(&Settings::default())
            .map_err(|e| InsertError::Paste(format!("failed to create enigo: {}", e)))?;

        let chord = [
            (Key::Control, Direction::Press),
            (Key::Unicode('v'), Direction::Press),
            (Key::Unicode('v'), Direction::Release),
            (Key::Control, Direction::Release),
        ];
        for (key, direction) in chord {
            enigo
                .key(key, direction)
                .map_err(|e| InsertError::Paste(format!("key event failed: {}", e)))?;
        }
        Ok(())
    }
}

// =============================================================================
// Modifier probe
// =============================================================================

/// Polls live modifier-key state.
#[derive(Debug, Clone, Default)]
pub struct SystemModifierProbe;

impl SystemModifierProbe {
    pub fn new() -> Self {
        Self
    }
}

impl ModifierProbe for SystemModifierProbe {
    #[cfg(target_os = "windows")]
    fn any_pressed(&self) -> bool {
        use windows_sys::Win32::UI::Input::KeyboardAndMouse::GetAsyncKeyState;

        // VK_SHIFT, VK_CONTROL, VK_MENU, VK_LWIN, VK_RWIN
        [0x10, 0x11, 0x12, 0x5B, 0x5C]
            .iter()
            .any(|&vk| unsafe { GetAsyncKeyState(vk) as u16 & 0x8000 != 0 })
    }

    #[cfg(not(target_os = "windows"))]
    fn any_pressed(&self) -> bool {
        false
    }
}

// =============================================================================
// Focused element
// =============================================================================

/// Best-effort access to the focused text control.
#[derive(Debug, Clone, Default)]
pub struct NativeFocusTarget;

impl NativeFocusTarget {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "windows")]
mod win_focus {
    use windows_sys::Win32::Foundation::HWND;
    use windows_sys::Win32::UI::WindowsAndMessaging::{
        GetGUIThreadInfo, SendMessageW, EM_GETSEL, EM_REPLACESEL, EM_SETSEL, GUITHREADINFO,
        WM_GETTEXT, WM_GETTEXTLENGTH, WM_SETTEXT,
    };

    use super::InsertError;

    /// Window handle of the control with keyboard focus, if any.
    pub fn focused_hwnd() -> Result<HWND, InsertError> {
        let mut info: GUITHREADINFO = unsafe { std::mem::zeroed() };
        info.cbSize = std::mem::size_of::<GUITHREADINFO>() as u32;
        let ok = unsafe { GetGUIThreadInfo(0, &mut info) };
        if ok == 0 || info.hwndFocus == 0 {
            return Err(InsertError::NoFocus);
        }
        Ok(info.hwndFocus)
    }

    pub fn read_text(hwnd: HWND) -> Option<String> {
        let len = unsafe { SendMessageW(hwnd, WM_GETTEXTLENGTH, 0, 0) };
        if len < 0 {
            return None;
        }
        let mut buf = vec![0u16; len as usize + 1];
        let copied =
            unsafe { SendMessageW(hwnd, WM_GETTEXT, buf.len(), buf.as_mut_ptr() as isize) };
        if copied < 0 {
            return None;
        }
        buf.truncate(copied as usize);
        Some(String::from_utf16_lossy(&buf))
    }

    /// (selection start, selection end) in UTF-16 units.
    pub fn selection(hwnd: HWND) -> (usize, usize) {
        let mut start: u32 = 0;
        let mut end: u32 = 0;
        unsafe {
            SendMessageW(
                hwnd,
                EM_GETSEL,
                &mut start as *mut u32 as usize,
                &mut end as *mut u32 as isize,
            );
        }
        (start as usize, end as usize)
    }

    pub fn set_text(hwnd: HWND, text: &str) -> Result<(), InsertError> {
        let wide: Vec<u16> = text.encode_utf16().chain(std::iter::once(0)).collect();
        let ok = unsafe { SendMessageW(hwnd, WM_SETTEXT, 0, wide.as_ptr() as isize) };
        if ok == 0 {
            return Err(InsertError::NotSettable);
        }
        Ok(())
    }

    pub fn set_caret(hwnd: HWND, caret: usize) {
        unsafe {
            SendMessageW(hwnd, EM_SETSEL, caret, caret as isize);
        }
    }

    pub fn replace_selection(hwnd: HWND, text: &str) -> Result<(), InsertError> {
        let wide: Vec<u16> = text.encode_utf16().chain(std::iter::once(0)).collect();
        unsafe {
            // wParam = TRUE: the edit control allows undo.
            SendMessageW(hwnd, EM_REPLACESEL, 1, wide.as_ptr() as isize);
        }
        Ok(())
    }
}

#[cfg(target_os = "windows")]
impl FocusTarget for NativeFocusTarget {
    fn snapshot(&self) -> Result<FocusSnapshot, InsertError> {
        let hwnd = win_focus::focused_hwnd()?;
        let text = win_focus::read_text(hwnd);
        let (start, end) = win_focus::selection(hwnd);
        Ok(FocusSnapshot {
            text,
            caret: start,
            selection_len: end.saturating_sub(start),
        })
    }

    fn replace_value(&self, text: &str, caret: usize) -> Result<(), InsertError> {
        let hwnd = win_focus::focused_hwnd()?;
        win_focus::set_text(hwnd, text)?;
        win_focus::set_caret(hwnd, caret);
        Ok(())
    }

    fn replace_selection(&self, text: &str) -> Result<(), InsertError> {
        let hwnd = win_focus::focused_hwnd()?;
        win_focus::replace_selection(hwnd, text)
    }
}

#[cfg(not(target_os = "windows"))]
impl FocusTarget for NativeFocusTarget {
    fn snapshot(&self) -> Result<FocusSnapshot, InsertError> {
        Err(InsertError::Platform(
            "focused-element access is only available on Windows".to_string(),
        ))
    }

    fn replace_value(&self, _text: &str, _caret: usize) -> Result<(), InsertError> {
        Err(InsertError::Platform(
            "focused-element access is only available on Windows".to_string(),
        ))
    }

    fn replace_selection(&self, _text: &str) -> Result<(), InsertError> {
        Err(InsertError::Platform(
            "focused-element access is only available on Windows".to_string(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_native_focus_target_errors_off_windows() {
        let target = NativeFocusTarget::new();
        assert!(target.snapshot().is_err());
        assert!(target.replace_value("x", 0).is_err());
        assert!(target.replace_selection("x").is_err());
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_modifier_probe_off_windows() {
        assert!(!SystemModifierProbe::new().any_pressed());
    }
}
