//! In-process message queues.
//!
//! Queue names live in one process-wide registry, so two add-ins in the same
//! process cannot hold the same name. Producers post with
//! [`LocalChannel::post`] and the host stops a reader with
//! [`LocalChannel::signal_quit`].
//!
//! CHANGELOG:
//! - 10/12/2026 - Initial implementation

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use super::{normalize_queue_name, truncate_message, ChannelError, MessageChannel};

pub const DEFAULT_CAPACITY: usize = 64;

struct Slot {
    owner: u64,
    sender: Sender<Vec<u8>>,
    receiver: Receiver<Vec<u8>>,
    quitting: Arc<AtomicBool>,
}

fn registry() -> &'static Mutex<HashMap<String, Slot>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Slot>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn next_owner() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

struct Reader {
    receiver: Receiver<Vec<u8>>,
    quitting: Arc<AtomicBool>,
}

/// Reader side of an in-process queue.
pub struct LocalChannel {
    owner: u64,
    capacity: usize,
    max_message_size: usize,
    created: Option<String>,
    reader: Option<Reader>,
}

impl LocalChannel {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Queue that holds at most `capacity` pending messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            owner: next_owner(),
            capacity: capacity.max(1),
            max_message_size: usize::MAX,
            created: None,
            reader: None,
        }
    }

    /// Whether a queue with this name is currently registered.
    pub fn exists(name: &str) -> bool {
        registry().lock().contains_key(&normalize_queue_name(name))
    }

    /// Post one message to a registered queue without blocking.
    pub fn post(name: &str, message: &str) -> Result<(), ChannelError> {
        let name = normalize_queue_name(name);
        let registry = registry().lock();
        let slot = registry
            .get(&name)
            .ok_or_else(|| ChannelError::NotFound(name.clone()))?;
        slot.sender
            .try_send(message.as_bytes().to_vec())
            .map_err(|e| match e {
                TrySendError::Full(_) => ChannelError::Full(name.clone()),
                TrySendError::Disconnected(_) => ChannelError::NotFound(name.clone()),
            })
    }

    /// Tell the reader of `name` that the host is shutting down.
    pub fn signal_quit(name: &str) -> Result<(), ChannelError> {
        let name = normalize_queue_name(name);
        let registry = registry().lock();
        let slot = registry
            .get(&name)
            .ok_or_else(|| ChannelError::NotFound(name.clone()))?;
        slot.quitting.store(true, Ordering::SeqCst);
        // Wake a blocked reader; a full queue already wakes it.
        let _ = slot.sender.try_send(Vec::new());
        Ok(())
    }

    fn release(&mut self) {
        self.reader = None;
        if let Some(name) = self.created.take() {
            let mut registry = registry().lock();
            if registry.get(&name).is_some_and(|slot| slot.owner == self.owner) {
                registry.remove(&name);
            }
        }
    }
}

impl Default for LocalChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageChannel for LocalChannel {
    fn create(&mut self, name: &str, max_message_size: usize) -> Result<(), ChannelError> {
        let name = normalize_queue_name(name);
        let mut registry = registry().lock();
        if registry.contains_key(&name) {
            return Err(ChannelError::AlreadyExists(name));
        }

        let (sender, receiver) = bounded(self.capacity);
        registry.insert(
            name.clone(),
            Slot {
                owner: self.owner,
                sender,
                receiver,
                quitting: Arc::new(AtomicBool::new(false)),
            },
        );
        self.max_message_size = max_message_size;
        self.created = Some(name);
        Ok(())
    }

    fn open(&mut self, name: &str) -> Result<(), ChannelError> {
        let name = normalize_queue_name(name);
        let registry = registry().lock();
        let slot = registry
            .get(&name)
            .ok_or_else(|| ChannelError::NotFound(name.clone()))?;
        self.reader = Some(Reader {
            receiver: slot.receiver.clone(),
            quitting: slot.quitting.clone(),
        });
        Ok(())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, ChannelError> {
        let reader = self
            .reader
            .as_ref()
            .ok_or_else(|| ChannelError::Other("queue is not open".to_string()))?;

        if reader.quitting.load(Ordering::SeqCst) {
            return Err(ChannelError::Quitting);
        }

        match reader.receiver.recv_timeout(timeout) {
            Ok(_) if reader.quitting.load(Ordering::SeqCst) => Err(ChannelError::Quitting),
            Ok(message) => Ok(Some(truncate_message(message, self.max_message_size))),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(ChannelError::Quitting),
        }
    }

    fn close(&mut self) {
        self.release();
    }
}

impl Drop for LocalChannel {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(name: &str, max: usize) -> LocalChannel {
        let mut channel = LocalChannel::new();
        channel.create(name, max).unwrap();
        channel.open(name).unwrap();
        channel
    }

    #[test]
    fn test_second_create_already_exists() {
        let _first = created("local-test-dup", 256);
        let mut second = LocalChannel::new();
        let err = second.create("LOCAL-TEST-DUP", 256).unwrap_err();
        assert!(matches!(err, ChannelError::AlreadyExists(name) if name == "LOCAL-TEST-DUP"));
    }

    #[test]
    fn test_open_missing_queue() {
        let mut channel = LocalChannel::new();
        let err = channel.open("local-test-missing").unwrap_err();
        assert!(matches!(err, ChannelError::NotFound(_)));
    }

    #[test]
    fn test_receive_times_out_with_none() {
        let mut channel = created("local-test-timeout", 256);
        let got = channel.receive(Duration::from_millis(10)).unwrap();
        assert!(got.is_none());
    }

    #[test]
    fn test_post_and_receive() {
        let mut channel = created("local-test-post", 256);
        LocalChannel::post("local-test-post", "ver").unwrap();
        let got = channel.receive(Duration::from_millis(100)).unwrap();
        assert_eq!(got.as_deref(), Some(&b"ver"[..]));
    }

    #[test]
    fn test_oversized_message_is_truncated() {
        let mut channel = created("local-test-trunc", 8);
        LocalChannel::post("local-test-trunc", "dbsize averylongname.db").unwrap();
        let got = channel.receive(Duration::from_millis(100)).unwrap().unwrap();
        assert_eq!(got, b"dbsize a");
    }

    #[test]
    fn test_quit_signal_while_waiting() {
        let mut channel = created("local-test-quit", 256);
        let poster = std::thread::spawn(|| {
            std::thread::sleep(Duration::from_millis(20));
            LocalChannel::signal_quit("local-test-quit").unwrap();
        });
        let err = channel.receive(Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, ChannelError::Quitting));
        poster.join().unwrap();
    }

    #[test]
    fn test_full_queue() {
        let mut channel = LocalChannel::with_capacity(1);
        channel.create("local-test-full", 256).unwrap();
        LocalChannel::post("local-test-full", "one").unwrap();
        let err = LocalChannel::post("local-test-full", "two").unwrap_err();
        assert!(matches!(err, ChannelError::Full(_)));
    }

    #[test]
    fn test_close_releases_name() {
        let mut channel = created("local-test-close", 256);
        channel.close();
        assert!(!LocalChannel::exists("local-test-close"));
        assert!(LocalChannel::post("local-test-close", "ver").is_err());
    }

    #[test]
    fn test_drop_after_create_releases_name() {
        {
            let mut channel = LocalChannel::new();
            channel.create("local-test-drop", 256).unwrap();
            assert!(LocalChannel::exists("local-test-drop"));
        }
        assert!(!LocalChannel::exists("local-test-drop"));
    }
}
