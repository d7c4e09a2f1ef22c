use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use relay_proto::TransportKind;

use crate::{connection::Connection, ConnState};

/// A connection that carries no payload, only a single pending/not-pending
/// signal (component 4.H). Used to wake a node's receiver thread out of its
/// poll loop for out-of-band events such as "a new object was registered" or
/// "shut down now" without routing them through the command queues.
pub struct EventConnection {
    set: Arc<AtomicBool>,
    waker: Option<Arc<mio::Waker>>,
    closed: bool,
}

/// A cloneable handle that signals the paired [`EventConnection`] from any
/// thread.
#[derive(Clone)]
pub struct EventHandle {
    set: Arc<AtomicBool>,
    waker: Option<Arc<mio::Waker>>,
}

impl EventHandle {
    /// Sets the event and, if registered with a poll loop, wakes it.
    pub fn signal(&self) -> io::Result<()> {
        self.set.store(true, Ordering::Release);
        if let Some(waker) = &self.waker {
            waker.wake()?;
        }
        Ok(())
    }
}

impl EventConnection {
    /// Creates an event connection with no associated `mio::Poll` waker;
    /// `read_nonblocking` must then be polled explicitly rather than relying
    /// on a wakeup.
    pub fn new() -> (Self, EventHandle) {
        let set = Arc::new(AtomicBool::new(false));
        let conn = Self { set: set.clone(), waker: None, closed: false };
        let handle = EventHandle { set, waker: None };
        (conn, handle)
    }

    /// Registers the event with a `mio::Poll` so [`EventHandle::signal`]
    /// wakes the thread blocked on that poll.
    pub fn with_waker(registry: &mio::Registry, token: mio::Token) -> io::Result<(Self, EventHandle)> {
        let waker = Arc::new(mio::Waker::new(registry, token)?);
        let set = Arc::new(AtomicBool::new(false));
        let conn = Self { set: set.clone(), waker: Some(waker.clone()), closed: false };
        let handle = EventHandle { set, waker: Some(waker) };
        Ok((conn, handle))
    }

    pub fn handle(&self) -> EventHandle {
        EventHandle { set: self.set.clone(), waker: self.waker.clone() }
    }

    /// Returns whether the event is currently set, without clearing it.
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }
}

impl Connection for EventConnection {
    /// Events carry no bytes; a pending signal reads as a single `1` byte
    /// and clears the flag, mirroring `read_nonblocking`'s "data available"
    /// convention so `FrameChannel` can treat it like any other transport
    /// if a caller chooses to frame events.
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.set.swap(false, Ordering::AcqRel) {
            buf[0] = 1;
            Ok(1)
        } else {
            Err(io::Error::from(io::ErrorKind::WouldBlock))
        }
    }

    fn write_nonblocking(&mut self, _buf: &[u8]) -> io::Result<usize> {
        self.set.store(true, Ordering::Release);
        if let Some(waker) = &self.waker {
            waker.wake()?;
        }
        Ok(1)
    }

    fn state(&self) -> ConnState {
        if self.closed {
            ConnState::Closed
        } else {
            ConnState::Connected
        }
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Event
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_then_read_clears_the_flag() {
        let (mut conn, handle) = EventConnection::new();
        let mut buf = [0u8; 1];
        assert_eq!(conn.read_nonblocking(&mut buf).unwrap_err().kind(), io::ErrorKind::WouldBlock);
        handle.signal().unwrap();
        assert_eq!(conn.read_nonblocking(&mut buf).unwrap(), 1);
        assert_eq!(conn.read_nonblocking(&mut buf).unwrap_err().kind(), io::ErrorKind::WouldBlock);
    }
}
