//! Named, bounded, blocking-with-timeout message queues.
//!
//! A queue name is registered once per host: creating a name that is already
//! held fails with [`ChannelError::AlreadyExists`], which is how a second
//! instance of the add-in notices the first one.
//!
//! Messages longer than the configured maximum size are truncated to that many
//! bytes on receive.
//!
//! CHANGELOG:
//! - 10/19/2026 - Added socket queue backend
//! - 10/12/2026 - Initial implementation

pub mod local;
pub mod socket;

use std::time::Duration;
use thiserror::Error;

/// Errors raised by queue operations. A receive timeout is not an error.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("message queue {0} already exists")]
    AlreadyExists(String),

    #[error("message queue {0} does not exist")]
    NotFound(String),

    #[error("message queue is quitting")]
    Quitting,

    #[error("message queue {0} is full")]
    Full(String),

    #[error("message queue I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("message queue error: {0}")]
    Other(String),
}

/// Largest message a queue accepts, the size of one datagram buffer.
pub const MAX_MESSAGE_LIMIT: usize = 64 * 1024;

/// Queue names are case-insensitive and stored uppercase.
pub fn normalize_queue_name(name: &str) -> String {
    name.trim().to_uppercase()
}

/// Cut a message down to the queue's maximum size.
pub(crate) fn truncate_message(mut message: Vec<u8>, max_message_size: usize) -> Vec<u8> {
    message.truncate(max_message_size);
    message
}

/// Backend contract for a message queue owned by one reader.
pub trait MessageChannel {
    /// Register the queue name for this process.
    fn create(&mut self, name: &str, max_message_size: usize) -> Result<(), ChannelError>;

    /// Attach as the reader of a registered queue.
    fn open(&mut self, name: &str) -> Result<(), ChannelError>;

    /// Wait up to `timeout` for a message. `Ok(None)` means the wait timed out.
    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, ChannelError>;

    /// Release the queue. Only ever called once, through [`ChannelHandle`].
    fn close(&mut self);
}

/// Single owner of an opened queue.
///
/// The queue is closed exactly once: by [`ChannelHandle::close`], which
/// consumes the handle, or on drop.
pub struct ChannelHandle<C: MessageChannel> {
    channel: Option<C>,
    name: String,
}

impl<C: MessageChannel> ChannelHandle<C> {
    /// Create and open `name` on `channel`.
    ///
    /// On failure the error is returned together with the stage that failed;
    /// the channel is dropped without `close`, which releases any partial
    /// registration.
    pub fn acquire(
        mut channel: C,
        name: &str,
        max_message_size: usize,
    ) -> Result<Self, AcquireError> {
        channel
            .create(name, max_message_size)
            .map_err(AcquireError::Create)?;
        channel.open(name).map_err(AcquireError::Open)?;
        Ok(Self {
            channel: Some(channel),
            name: normalize_queue_name(name),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, ChannelError> {
        match self.channel.as_mut() {
            Some(channel) => channel.receive(timeout),
            None => Err(ChannelError::Other(format!("{} is closed", self.name))),
        }
    }

    /// Close the queue and give up the handle.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
            tracing::debug!(queue = %self.name, "message queue closed");
        }
    }
}

impl<C: MessageChannel> Drop for ChannelHandle<C> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Which startup step of [`ChannelHandle::acquire`] failed.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("creating the message queue failed: {0}")]
    Create(ChannelError),

    #[error("opening the message queue failed: {0}")]
    Open(ChannelError),
}
