//! addin-server library
//!
//! A host-resident add-in: registers a status line with its host, polls a
//! named message queue for operator commands, dispatches them, and runs
//! periodic housekeeping between messages.
//!
//! CHANGELOG:
//! - 10/19/2026 - Socket queue and operator client binary
//! - 10/12/2026 - Initial library structure

pub mod channel;
pub mod config;
pub mod daemon;
pub mod db;
pub mod host;
pub mod logging;
pub mod status;

pub use channel::{ChannelError, ChannelHandle, MessageChannel};
pub use daemon::protocol::{Command, HandlerError, HandlerResult};
pub use daemon::scheduler::PeriodicScheduler;
pub use daemon::server::{ExitReason, LoopPhase, RunSummary, ServiceLoop};
pub use daemon::service::CommandRegistry;
pub use host::{HostRuntime, StatusId};
pub use status::{ServiceState, StatusReporter};
