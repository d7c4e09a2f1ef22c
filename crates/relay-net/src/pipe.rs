use std::{
    collections::VecDeque,
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use relay_proto::TransportKind;

use crate::{connection::Connection, ConnState};

struct Endpoint {
    inbox: Mutex<VecDeque<u8>>,
    closed: AtomicBool,
}

impl Endpoint {
    fn new() -> Self {
        Self { inbox: Mutex::new(VecDeque::new()), closed: AtomicBool::new(false) }
    }
}

/// In-process, full-duplex connection (component 4.I), used for
/// intra-process node links so tests and single-host topologies don't have
/// to pay for a loopback socket.
pub struct PipeConnection {
    /// Bytes written to this end land here for the peer to read.
    outbox: Arc<Endpoint>,
    /// The peer's outbox: bytes the peer wrote that this end reads.
    inbox: Arc<Endpoint>,
}

impl PipeConnection {
    /// Builds a pair of endpoints wired to each other.
    pub fn pair() -> (Self, Self) {
        let a = Arc::new(Endpoint::new());
        let b = Arc::new(Endpoint::new());
        (
            Self { outbox: a.clone(), inbox: b.clone() },
            Self { outbox: b, inbox: a },
        )
    }
}

impl Connection for PipeConnection {
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inbox = self.inbox.inbox.lock().unwrap();
        if inbox.is_empty() {
            if self.inbox.closed.load(Ordering::Acquire) {
                return Ok(0);
            }
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        }
        let n = buf.len().min(inbox.len());
        for slot in buf.iter_mut().take(n) {
            *slot = inbox.pop_front().expect("checked len above");
        }
        Ok(n)
    }

    fn write_nonblocking(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.outbox.closed.load(Ordering::Acquire) {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        let mut outbox = self.outbox.inbox.lock().unwrap();
        outbox.extend(buf.iter().copied());
        Ok(buf.len())
    }

    fn state(&self) -> ConnState {
        if self.inbox.closed.load(Ordering::Acquire) && self.outbox.closed.load(Ordering::Acquire) {
            ConnState::Closed
        } else {
            ConnState::Connected
        }
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Pipe
    }

    fn close(&mut self) {
        self.outbox.closed.store(true, Ordering::Release);
    }
}
