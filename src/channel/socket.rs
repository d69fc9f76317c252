//! Inter-process message queues over UNIX datagram sockets.
//!
//! Each queue is a socket file `<runtime_dir>/<NAME>.sock`. One datagram is
//! one message. A live socket file means an instance already holds the name;
//! a socket nobody is bound to is stale and gets replaced.
//!
//! The queue stands in for the host's own queue manager, so a QUIT or EXIT
//! line is surfaced as [`ChannelError::Quitting`] instead of a message.
//!
//! CHANGELOG:
//! - 10/26/2026 - Receive buffer sized from queue capacity, reused buffer
//! - 10/19/2026 - Initial implementation

use std::io::{self, ErrorKind};
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixDatagram;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{normalize_queue_name, ChannelError, MessageChannel, MAX_MESSAGE_LIMIT};

/// Rough per-datagram bookkeeping the kernel charges against the receive buffer.
const DATAGRAM_OVERHEAD: usize = 512;

/// Socket file used for a queue name.
pub fn queue_path(runtime_dir: &Path, name: &str) -> PathBuf {
    runtime_dir.join(format!("{}.sock", normalize_queue_name(name)))
}

/// Whether an instance is currently bound to the queue.
pub fn is_loaded(runtime_dir: &Path, name: &str) -> bool {
    probe(&queue_path(runtime_dir, name))
}

/// Deliver one line to a running instance.
pub fn send(runtime_dir: &Path, name: &str, message: &str) -> Result<(), ChannelError> {
    let path = queue_path(runtime_dir, name);
    if !path.exists() {
        return Err(ChannelError::NotFound(normalize_queue_name(name)));
    }

    let socket = UnixDatagram::unbound()?;
    match socket.send_to(message.as_bytes(), &path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
            Err(ChannelError::NotFound(normalize_queue_name(name)))
        }
        Err(e) if e.kind() == ErrorKind::WouldBlock => {
            Err(ChannelError::Full(normalize_queue_name(name)))
        }
        Err(e) => Err(e.into()),
    }
}

fn probe(path: &Path) -> bool {
    UnixDatagram::unbound()
        .and_then(|socket| socket.connect(path))
        .is_ok()
}

/// Bind `path`, then run `restrict` on the new socket file. The file is
/// removed again if `restrict` fails.
fn bind_with(
    path: &Path,
    restrict: impl FnOnce(&Path) -> io::Result<()>,
) -> io::Result<UnixDatagram> {
    let socket = UnixDatagram::bind(path)?;
    if let Err(e) = restrict(path) {
        drop(socket);
        let _ = std::fs::remove_file(path);
        return Err(e);
    }
    Ok(socket)
}

fn owner_only(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

fn set_receive_buffer(socket: &UnixDatagram, bytes: usize) -> io::Result<()> {
    let value = libc::c_int::try_from(bytes).unwrap_or(libc::c_int::MAX);
    // SAFETY: the fd is owned by `socket` for the duration of the call and
    // `value` outlives it.
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_RCVBUF,
            &value as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

fn is_quit_line(message: &[u8]) -> bool {
    String::from_utf8_lossy(message)
        .split_whitespace()
        .next()
        .is_some_and(|word| word.eq_ignore_ascii_case("QUIT") || word.eq_ignore_ascii_case("EXIT"))
}

/// Reader side of a socket queue.
pub struct SocketChannel {
    runtime_dir: PathBuf,
    socket: Option<UnixDatagram>,
    path: Option<PathBuf>,
    capacity: Option<usize>,
    buffer: Vec<u8>,
    opened: bool,
}

impl SocketChannel {
    pub fn new(runtime_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime_dir: runtime_dir.into(),
            socket: None,
            path: None,
            capacity: None,
            buffer: Vec::new(),
            opened: false,
        }
    }

    /// Size the kernel receive buffer for about `capacity` pending messages.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    fn release(&mut self) {
        self.opened = false;
        self.socket = None;
        self.buffer = Vec::new();
        if let Some(path) = self.path.take() {
            let _ = std::fs::remove_file(&path);
        }
    }
}

impl MessageChannel for SocketChannel {
    fn create(&mut self, name: &str, max_message_size: usize) -> Result<(), ChannelError> {
        if max_message_size == 0 || max_message_size > MAX_MESSAGE_LIMIT {
            return Err(ChannelError::Other(format!(
                "message size {} outside 1..={}",
                max_message_size, MAX_MESSAGE_LIMIT
            )));
        }
        std::fs::create_dir_all(&self.runtime_dir)?;
        let path = queue_path(&self.runtime_dir, name);

        if path.exists() {
            if probe(&path) {
                return Err(ChannelError::AlreadyExists(normalize_queue_name(name)));
            }
            tracing::info!(path = %path.display(), "removing stale queue socket");
            std::fs::remove_file(&path)?;
        }

        let socket = bind_with(&path, owner_only)?;

        if let Some(capacity) = self.capacity {
            let bytes = capacity.saturating_mul(max_message_size + DATAGRAM_OVERHEAD);
            if let Err(e) = set_receive_buffer(&socket, bytes) {
                tracing::warn!(error = %e, bytes, "could not size queue receive buffer");
            }
        }

        self.socket = Some(socket);
        self.path = Some(path);
        self.buffer = vec![0u8; max_message_size];
        Ok(())
    }

    fn open(&mut self, name: &str) -> Result<(), ChannelError> {
        let path = queue_path(&self.runtime_dir, name);
        match (&self.socket, &self.path) {
            (Some(_), Some(created)) if *created == path => {
                self.opened = true;
                Ok(())
            }
            _ => Err(ChannelError::NotFound(normalize_queue_name(name))),
        }
    }

    fn receive(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>, ChannelError> {
        let socket = match (&self.socket, self.opened) {
            (Some(socket), true) => socket,
            _ => return Err(ChannelError::Other("queue is not open".to_string())),
        };

        // A zero read timeout is rejected by the OS
        socket.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;

        // Datagrams longer than the buffer are cut to its length
        match socket.recv(&mut self.buffer) {
            Ok(len) => {
                let message = &self.buffer[..len];
                if is_quit_line(message) {
                    return Err(ChannelError::Quitting);
                }
                Ok(Some(message.to_vec()))
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) {
        self.release();
    }
}

impl Drop for SocketChannel {
    fn drop(&mut self) {
        self.release();
    }
}
