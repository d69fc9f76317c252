//! Operator-visible status line.
//!
//! CHANGELOG:
//! - 10/12/2026 - Initial implementation

use crate::host::{HostRuntime, StatusId};

/// Coarse state of the add-in, used only to drive the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Initializing,
    Idle,
    Processing,
    Housekeeping,
    Terminating,
}

impl ServiceState {
    /// Text shown on the host status line for this state.
    pub fn status_text(self) -> &'static str {
        match self {
            ServiceState::Initializing => "Initialization in progress...",
            ServiceState::Idle => "Idle",
            ServiceState::Processing => "Processing Command",
            ServiceState::Housekeeping => "Doing Daily Stuff",
            ServiceState::Terminating => "Terminating...",
        }
    }
}

/// Owns one host status line for its whole lifetime.
///
/// The line is deleted exactly once: either by [`StatusReporter::delete`] or
/// when the reporter is dropped.
pub struct StatusReporter<'h, H: HostRuntime + ?Sized> {
    host: &'h H,
    id: Option<StatusId>,
    state: ServiceState,
}

impl<'h, H: HostRuntime + ?Sized> StatusReporter<'h, H> {
    /// Create the status line and show the initializing text.
    pub fn create(host: &'h H, name: &str) -> Self {
        let id = host.create_status_handle(name);
        let mut reporter = Self {
            host,
            id: Some(id),
            state: ServiceState::Initializing,
        };
        reporter.set(ServiceState::Initializing);
        reporter
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Whether the host status line is still held.
    pub fn is_active(&self) -> bool {
        self.id.is_some()
    }

    /// Move to a new state and show its text.
    pub fn set(&mut self, state: ServiceState) {
        self.state = state;
        self.set_text(state.status_text());
    }

    /// Show arbitrary text without changing the tracked state.
    pub fn set_text(&self, text: &str) {
        if let Some(id) = self.id {
            self.host.set_status_text(id, text);
        }
    }

    /// Release the status line. Returns `false` if it was already released.
    pub fn delete(&mut self) -> bool {
        match self.id.take() {
            Some(id) => {
                self.host.delete_status_handle(id);
                true
            }
            None => false,
        }
    }
}

impl<H: HostRuntime + ?Sized> Drop for StatusReporter<'_, H> {
    fn drop(&mut self) {
        self.delete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeHost {
        events: Mutex<Vec<String>>,
    }

    impl HostRuntime for FakeHost {
        fn create_status_handle(&self, name: &str) -> StatusId {
            self.events.lock().push(format!("create {}", name));
            StatusId(7)
        }
        fn set_status_text(&self, _id: StatusId, text: &str) {
            self.events.lock().push(format!("set {}", text));
        }
        fn delete_status_handle(&self, _id: StatusId) {
            self.events.lock().push("delete".to_string());
        }
        fn log_text(&self, _text: &str) {}
        fn is_running(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_create_shows_initializing() {
        let host = FakeHost::default();
        let reporter = StatusReporter::create(&host, "Addin Server");
        assert_eq!(reporter.state(), ServiceState::Initializing);
        drop(reporter);
        assert_eq!(
            *host.events.lock(),
            vec![
                "create Addin Server",
                "set Initialization in progress...",
                "delete"
            ]
        );
    }

    #[test]
    fn test_delete_is_idempotent() {
        let host = FakeHost::default();
        let mut reporter = StatusReporter::create(&host, "x");
        assert!(reporter.delete());
        assert!(!reporter.delete());
        reporter.set(ServiceState::Idle);
        drop(reporter);

        let deletes = host.events.lock().iter().filter(|e| *e == "delete").count();
        assert_eq!(deletes, 1);
        assert!(!host.events.lock().contains(&"set Idle".to_string()));
    }
}
