//! OS capability gate for observing global key events.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// Grant state of the global-input capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    /// The user has not been asked yet.
    Undetermined,
}

/// Capability query/request for global key observation.
///
/// `request` is idempotent and must not block indefinitely: it triggers the
/// OS prompt at most once and reports the grant state known right now.
pub trait InputPermission: Send + Sync {
    fn request(&self) -> PermissionState;
    fn state(&self) -> PermissionState;
}

/// Platform implementation.
///
/// Windows needs no separate grant for low-level keyboard observation, so
/// both calls report `Granted`. Other platforms report `Denied` (the
/// listener is Windows-only, mirroring the rest of the platform layer).
#[derive(Debug, Clone, Default)]
pub struct SystemInputPermission;

impl SystemInputPermission {
    pub fn new() -> Self {
        Self
    }
}

impl InputPermission for SystemInputPermission {
    #[cfg(target_os = "windows")]
    fn request(&self) -> PermissionState {
        PermissionState::Granted
    }

    #[cfg(not(target_os = "windows"))]
    fn request(&self) -> PermissionState {
        tracing::warn!("Global input observation is only available on Windows");
        PermissionState::Denied
    }

    #[cfg(target_os = "windows")]
    fn state(&self) -> PermissionState {
        PermissionState::Granted
    }

    #[cfg(not(target_os = "windows"))]
    fn state(&self) -> PermissionState {
        PermissionState::Denied
    }
}

/// Scripted permission gate for tests.
pub struct MockPermission {
    state: Mutex<PermissionState>,
    requests: AtomicU32,
}

impl MockPermission {
    pub fn new(state: PermissionState) -> Self {
        Self {
            state: Mutex::new(state),
            requests: AtomicU32::new(0),
        }
    }

    /// Grant state reported after the next `request`.
    pub fn set_state(&self, state: PermissionState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn request_count(&self) -> u32 {
        self.requests.load(Ordering::Relaxed)
    }
}

impl InputPermission for MockPermission {
    fn request(&self) -> PermissionState {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock().unwrap();
        // Asking resolves Undetermined one way or the other; the mock grants.
        if *state == PermissionState::Undetermined {
            *state = PermissionState::Granted;
        }
        *state
    }

    fn state(&self) -> PermissionState {
        *self.state.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_request_is_idempotent() {
        let permission = MockPermission::new(PermissionState::Undetermined);
        assert_eq!(permission.state(), PermissionState::Undetermined);

        assert_eq!(permission.request(), PermissionState::Granted);
        assert_eq!(permission.request(), PermissionState::Granted);
        assert_eq!(permission.request_count(), 2);
        assert_eq!(permission.state(), PermissionState::Granted);
    }

    #[test]
    fn test_mock_denied_stays_denied() {
        let permission = MockPermission::new(PermissionState::Denied);
        assert_eq!(permission.request(), PermissionState::Denied);
        assert_eq!(permission.state(), PermissionState::Denied);
    }

    #[cfg(not(target_os = "windows"))]
    #[test]
    fn test_system_permission_denied_off_windows() {
        let permission = SystemInputPermission::new();
        assert_eq!(permission.request(), PermissionState::Denied);
        assert_eq!(permission.state(), PermissionState::Denied);
    }
}
