//! Host runtime capability.
//!
//! The add-in never talks to host bindings directly; everything it needs from
//! the host (status lines, console output, the keep-running signal) goes
//! through [`HostRuntime`].
//!
//! CHANGELOG:
//! - 10/12/2026 - Initial implementation

pub mod console;

/// Identifier of a status line created on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusId(pub u32);

/// Operations the service loop needs from the process hosting it.
///
/// All methods take `&self`: the loop, the status reporter and the teardown
/// path share one host reference.
pub trait HostRuntime {
    /// Register a named status line and return its handle.
    fn create_status_handle(&self, name: &str) -> StatusId;

    /// Replace the text shown for a status line.
    fn set_status_text(&self, id: StatusId, text: &str);

    /// Release a status line. Called at most once per handle.
    fn delete_status_handle(&self, id: StatusId);

    /// Write one line to the operator console.
    fn log_text(&self, text: &str);

    /// Whether the host still wants the add-in to run.
    fn is_running(&self) -> bool;

    /// Cooperative scheduling point, called once per loop iteration.
    fn yield_now(&self) {}
}

impl<H: HostRuntime + ?Sized> HostRuntime for &H {
    fn create_status_handle(&self, name: &str) -> StatusId {
        (**self).create_status_handle(name)
    }

    fn set_status_text(&self, id: StatusId, text: &str) {
        (**self).set_status_text(id, text)
    }

    fn delete_status_handle(&self, id: StatusId) {
        (**self).delete_status_handle(id)
    }

    fn log_text(&self, text: &str) {
        (**self).log_text(text)
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }

    fn yield_now(&self) {
        (**self).yield_now()
    }
}
