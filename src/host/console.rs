//! Console host for running the add-in as a standalone process.
//!
//! Status lines are kept in memory and mirrored to the trace log, and
//! console text goes to stdout with a timestamp. Each host has its own stop
//! flag; a host built with [`ConsoleHost::with_stop_signals`] also stops on
//! SIGINT/SIGTERM.
//!
//! CHANGELOG:
//! - 10/26/2026 - Per-host stop flag, signal handlers opt-in
//! - 10/12/2026 - Initial implementation

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Once;

use super::{HostRuntime, StatusId};

static SIGNALLED: AtomicBool = AtomicBool::new(false);
static INSTALL_HANDLERS: Once = Once::new();

extern "C" fn handle_stop_signal(_signal: libc::c_int) {
    SIGNALLED.store(true, Ordering::SeqCst);
}

/// Format one console line the way a server console shows it.
pub fn format_console_line(at: DateTime<Local>, text: &str) -> String {
    format!("{}   {}", at.format("%m/%d/%Y %H:%M:%S"), text)
}

/// Host backed by the current process.
pub struct ConsoleHost {
    next_id: AtomicU32,
    status_lines: Mutex<HashMap<StatusId, (String, String)>>,
    stop_requested: AtomicBool,
    watch_signals: bool,
}

impl ConsoleHost {
    /// Console host that only stops through [`ConsoleHost::request_stop`].
    pub fn new() -> Self {
        Self {
            next_id: AtomicU32::new(1),
            status_lines: Mutex::new(HashMap::new()),
            stop_requested: AtomicBool::new(false),
            watch_signals: false,
        }
    }

    /// Console host that also stops on SIGINT or SIGTERM. The handlers are
    /// installed once per process.
    pub fn with_stop_signals() -> Self {
        INSTALL_HANDLERS.call_once(install_signal_handlers);
        Self {
            watch_signals: true,
            ..Self::new()
        }
    }

    /// Current text of a status line, if it still exists.
    pub fn status_text(&self, id: StatusId) -> Option<String> {
        self.status_lines
            .lock()
            .get(&id)
            .map(|(_, text)| text.clone())
    }

    /// Ask this host to stop, as a signal would.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }
}

impl Default for ConsoleHost {
    fn default() -> Self {
        Self::new()
    }
}

impl HostRuntime for ConsoleHost {
    fn create_status_handle(&self, name: &str) -> StatusId {
        let id = StatusId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.status_lines
            .lock()
            .insert(id, (name.to_string(), String::new()));
        id
    }

    fn set_status_text(&self, id: StatusId, text: &str) {
        if let Some((name, current)) = self.status_lines.lock().get_mut(&id) {
            tracing::debug!(status = %name, text, "status line updated");
            *current = text.to_string();
        }
    }

    fn delete_status_handle(&self, id: StatusId) {
        if self.status_lines.lock().remove(&id).is_none() {
            tracing::warn!(?id, "status line deleted twice");
        }
    }

    fn log_text(&self, text: &str) {
        println!("{}", format_console_line(Local::now(), text));
    }

    fn is_running(&self) -> bool {
        if self.stop_requested.load(Ordering::SeqCst) {
            return false;
        }
        !(self.watch_signals && SIGNALLED.load(Ordering::SeqCst))
    }

    fn yield_now(&self) {
        std::thread::yield_now();
    }
}

fn install_signal_handlers() {
    let handler = handle_stop_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
    unsafe {
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGTERM, handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_console_line() {
        let at = Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(
            format_console_line(at, "Addin Server has terminated."),
            "03/04/2026 05:06:07   Addin Server has terminated."
        );
    }

    #[test]
    fn test_status_lines_lifecycle() {
        let host = ConsoleHost::new();
        let id = host.create_status_handle("Addin Server");
        assert_eq!(host.status_text(id).as_deref(), Some(""));

        host.set_status_text(id, "Idle");
        assert_eq!(host.status_text(id).as_deref(), Some("Idle"));

        host.delete_status_handle(id);
        assert_eq!(host.status_text(id), None);
    }

    #[test]
    fn test_stop_is_per_host() {
        let stopped = ConsoleHost::new();
        let other = ConsoleHost::new();
        assert!(stopped.is_running());

        stopped.request_stop();
        assert!(!stopped.is_running());
        assert!(other.is_running());
    }

    #[test]
    fn test_handles_are_distinct() {
        let host = ConsoleHost::new();
        let a = host.create_status_handle("a");
        let b = host.create_status_handle("b");
        assert_ne!(a, b);
    }
}
