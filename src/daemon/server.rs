//! Service loop: owns the add-in lifecycle.
//!
//! Init creates and opens the queue, Running alternates a bounded receive
//! with a timer tick, and Draining releases the status line and the queue in
//! a fixed order. Startup failures skip Running entirely.
//!
//! CHANGELOG:
//! - 10/26/2026 - Standard timers start from the loop clock
//! - 10/19/2026 - Idempotent teardown guard
//! - 10/12/2026 - Initial implementation

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::channel::{AcquireError, ChannelError, ChannelHandle, MessageChannel};
use crate::config::AddinConfig;
use crate::daemon::protocol::Command;
use crate::daemon::scheduler::{PeriodicScheduler, TimerKind};
use crate::daemon::service::CommandRegistry;
use crate::host::HostRuntime;
use crate::status::{ServiceState, StatusReporter};

/// Lifecycle phases, in the order they can occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Init,
    Ready,
    Running,
    Draining,
    Stopped,
}

/// Why the loop stopped.
#[derive(Debug)]
pub enum ExitReason {
    /// The host stopped asking us to run.
    HostStopped,
    /// The queue reported that the host is shutting down.
    Quitting,
    /// The queue could not be created, usually because another instance holds it.
    CreateFailed(ChannelError),
    OpenFailed(ChannelError),
    /// A receive failed with something other than a timeout or quit.
    ChannelFailed(ChannelError),
}

/// What happened during one run.
#[derive(Debug)]
pub struct RunSummary {
    pub phases: Vec<LoopPhase>,
    pub exit: ExitReason,
    pub commands_processed: usize,
    pub commands_failed: usize,
    pub timers_fired: usize,
}

impl RunSummary {
    pub fn entered_running(&self) -> bool {
        self.phases.contains(&LoopPhase::Running)
    }

    /// Stopped by the host rather than by a failure.
    pub fn is_clean(&self) -> bool {
        matches!(self.exit, ExitReason::HostStopped | ExitReason::Quitting)
    }
}

/// Resources released on the way out, at most once each.
///
/// [`Teardown::drain`] may be called any number of times; only the first call
/// does anything. Dropping the guard drains it.
pub struct Teardown<'h, H: HostRuntime + ?Sized, C: MessageChannel> {
    host: &'h H,
    display_name: String,
    status: Option<StatusReporter<'h, H>>,
    channel: Option<ChannelHandle<C>>,
    drained: bool,
}

impl<'h, H: HostRuntime + ?Sized, C: MessageChannel> Teardown<'h, H, C> {
    pub fn new(host: &'h H, display_name: impl Into<String>) -> Self {
        Self {
            host,
            display_name: display_name.into(),
            status: None,
            channel: None,
            drained: false,
        }
    }

    pub fn hold_status(&mut self, status: StatusReporter<'h, H>) {
        self.status = Some(status);
    }

    pub fn hold_channel(&mut self, channel: ChannelHandle<C>) {
        self.channel = Some(channel);
    }

    pub fn set_state(&mut self, state: ServiceState) {
        if let Some(status) = self.status.as_mut() {
            status.set(state);
        }
    }

    fn channel_mut(&mut self) -> Option<&mut ChannelHandle<C>> {
        self.channel.as_mut()
    }

    /// Release everything. Returns `false` if already drained.
    pub fn drain(&mut self) -> bool {
        if self.drained {
            return false;
        }
        self.drained = true;

        self.set_state(ServiceState::Terminating);
        self.host
            .log_text(&format!("Stopping {}...", self.display_name));

        if let Some(mut status) = self.status.take() {
            status.delete();
        }
        if let Some(channel) = self.channel.take() {
            channel.close();
        }

        self.host
            .log_text(&format!("{} has terminated.", self.display_name));
        tracing::info!(addin = %self.display_name, "add-in terminated");
        true
    }
}

impl<H: HostRuntime + ?Sized, C: MessageChannel> Drop for Teardown<'_, H, C> {
    fn drop(&mut self) {
        self.drain();
    }
}

type Clock = Box<dyn FnMut() -> DateTime<Utc>>;

/// The add-in's main loop, bound to one host and one queue backend.
pub struct ServiceLoop<H: HostRuntime, C: MessageChannel> {
    host: H,
    channel: C,
    registry: CommandRegistry,
    scheduler: PeriodicScheduler,
    /// Restart the timers from the clock when the loop starts running.
    restart_timers: bool,
    clock: Clock,
    program_name: String,
    display_name: String,
    queue_name: String,
    max_message_size: usize,
    receive_timeout: Duration,
}

impl<H: HostRuntime, C: MessageChannel> ServiceLoop<H, C> {
    pub fn new(host: H, channel: C, registry: CommandRegistry, config: &AddinConfig) -> Self {
        let scheduler = PeriodicScheduler::from_config(&config.timers, &config.program_name, Utc::now())
            .with_local_days();

        Self {
            host,
            channel,
            registry,
            scheduler,
            restart_timers: true,
            clock: Box::new(Utc::now),
            program_name: config.program_name.clone(),
            display_name: config.display_name.clone(),
            queue_name: config.queue_name(),
            max_message_size: config.max_message_size,
            receive_timeout: config.receive_timeout(),
        }
    }

    /// Replace the timer set. Its timers keep the start time they were built with.
    pub fn with_scheduler(mut self, scheduler: PeriodicScheduler) -> Self {
        self.scheduler = scheduler;
        self.restart_timers = false;
        self
    }

    /// Replace the wall clock used for timer ticks.
    pub fn with_clock(mut self, clock: impl FnMut() -> DateTime<Utc> + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Run until the host stops us, the queue quits, or the queue fails.
    pub fn run(self) -> RunSummary {
        let ServiceLoop {
            host,
            channel,
            registry,
            mut scheduler,
            restart_timers,
            mut clock,
            program_name,
            display_name,
            queue_name,
            max_message_size,
            receive_timeout,
        } = self;

        let mut summary = RunSummary {
            phases: vec![LoopPhase::Init],
            exit: ExitReason::HostStopped,
            commands_processed: 0,
            commands_failed: 0,
            timers_fired: 0,
        };

        let mut teardown: Teardown<'_, H, C> = Teardown::new(&host, display_name.as_str());
        teardown.hold_status(StatusReporter::create(&host, &display_name));

        tracing::info!(queue = %queue_name, "starting add-in");
        match ChannelHandle::acquire(channel, &queue_name, max_message_size) {
            Ok(handle) => teardown.hold_channel(handle),
            Err(AcquireError::Create(e)) => {
                // Most likely another instance already holds the queue
                tracing::error!(queue = %queue_name, error = %e, "cannot create message queue");
                host.log_text("Error creating the Message Queue. Exiting...");
                summary.exit = ExitReason::CreateFailed(e);
                return finish(summary, teardown);
            }
            Err(AcquireError::Open(e)) => {
                tracing::error!(queue = %queue_name, error = %e, "cannot open message queue");
                host.log_text("Error opening the Message Queue. Exiting...");
                summary.exit = ExitReason::OpenFailed(e);
                return finish(summary, teardown);
            }
        }

        summary.phases.push(LoopPhase::Ready);
        teardown.set_state(ServiceState::Idle);
        if restart_timers {
            scheduler.restart(clock());
        }
        summary.phases.push(LoopPhase::Running);

        while host.is_running() {
            host.yield_now();

            let received = match teardown.channel_mut() {
                Some(handle) => handle.receive(receive_timeout),
                None => Err(ChannelError::Other("message queue released early".to_string())),
            };

            match received {
                Ok(Some(message)) => {
                    teardown.set_state(ServiceState::Processing);
                    let command = Command::from_message(&message);
                    tracing::debug!(tokens = ?command.tokens(), "processing command");

                    let result = registry.dispatch(&command);
                    for line in &result.lines {
                        host.log_text(line);
                    }
                    summary.commands_processed += 1;
                    if !result.success {
                        summary.commands_failed += 1;
                    }
                    teardown.set_state(ServiceState::Idle);
                }
                Ok(None) => {}
                Err(ChannelError::Quitting) => {
                    tracing::info!("message queue is quitting");
                    summary.exit = ExitReason::Quitting;
                    break;
                }
                Err(e) => {
                    tracing::error!(error = %e, "message queue failed");
                    host.log_text(&format!(
                        "{}: Error reading the Message Queue: {}. Exiting...",
                        program_name, e
                    ));
                    summary.exit = ExitReason::ChannelFailed(e);
                    break;
                }
            }

            for fired in scheduler.tick(clock()) {
                tracing::debug!(timer = %fired.name, "timer fired");
                summary.timers_fired += 1;
                if fired.kind == TimerKind::DayBoundary {
                    teardown.set_state(ServiceState::Housekeeping);
                    host.log_text(&fired.notice);
                    teardown.set_state(ServiceState::Idle);
                } else {
                    host.log_text(&fired.notice);
                }
            }
        }

        finish(summary, teardown)
    }
}

fn finish<H: HostRuntime + ?Sized, C: MessageChannel>(
    mut summary: RunSummary,
    mut teardown: Teardown<'_, H, C>,
) -> RunSummary {
    summary.phases.push(LoopPhase::Draining);
    teardown.drain();
    drop(teardown);
    summary.phases.push(LoopPhase::Stopped);
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::StatusId;
    use parking_lot::Mutex;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Default)]
    struct CountingHost {
        console: Mutex<Vec<String>>,
        deletes: Mutex<usize>,
    }

    impl HostRuntime for CountingHost {
        fn create_status_handle(&self, _name: &str) -> StatusId {
            StatusId(1)
        }
        fn set_status_text(&self, _id: StatusId, _text: &str) {}
        fn delete_status_handle(&self, _id: StatusId) {
            *self.deletes.lock() += 1;
        }
        fn log_text(&self, text: &str) {
            self.console.lock().push(text.to_string());
        }
        fn is_running(&self) -> bool {
            true
        }
    }

    struct CountingChannel {
        closes: Rc<Cell<usize>>,
    }

    impl MessageChannel for CountingChannel {
        fn create(&mut self, _name: &str, _max: usize) -> Result<(), ChannelError> {
            Ok(())
        }
        fn open(&mut self, _name: &str) -> Result<(), ChannelError> {
            Ok(())
        }
        fn receive(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>, ChannelError> {
            Err(ChannelError::Quitting)
        }
        fn close(&mut self) {
            self.closes.set(self.closes.get() + 1);
        }
    }

    #[test]
    fn test_teardown_drains_once_under_retries() {
        let host = CountingHost::default();
        let closes = Rc::new(Cell::new(0));
        {
            let mut teardown = Teardown::new(&host, "Addin Server");
            teardown.hold_status(StatusReporter::create(&host, "Addin Server"));
            teardown.hold_channel(
                ChannelHandle::acquire(CountingChannel { closes: closes.clone() }, "Q", 256).unwrap(),
            );
            assert!(teardown.drain());
            assert!(!teardown.drain());
            assert!(!teardown.drain());
        }
        assert_eq!(closes.get(), 1);
        assert_eq!(*host.deletes.lock(), 1);
        assert_eq!(
            *host.console.lock(),
            vec!["Stopping Addin Server...", "Addin Server has terminated."]
        );
    }

    #[test]
    fn test_quitting_closes_once() {
        let host = CountingHost::default();
        let closes = Rc::new(Cell::new(0));
        let registry = CommandRegistry::new("AddinServer", "Addin Server");
        let summary = ServiceLoop::new(
            &host,
            CountingChannel { closes: closes.clone() },
            registry,
            &AddinConfig::default(),
        )
        .run();

        assert!(matches!(summary.exit, ExitReason::Quitting));
        assert!(summary.is_clean());
        assert_eq!(
            summary.phases,
            vec![
                LoopPhase::Init,
                LoopPhase::Ready,
                LoopPhase::Running,
                LoopPhase::Draining,
                LoopPhase::Stopped
            ]
        );
        assert_eq!(closes.get(), 1);
        assert_eq!(*host.deletes.lock(), 1);
    }
}
