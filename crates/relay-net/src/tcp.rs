use std::{
    io::{self, Read, Write},
    net::SocketAddr,
};

use relay_proto::TransportKind;
use relay_timing::Duration;
use tracing::warn;

use crate::{connection::Connection, error::ConnError, ConnState};

/// Backoff used by the one-shot reconnect retry on initial connect failure
/// (see REDESIGN FLAGS: replaces the reference implementation's busy loop
/// with an actual sleep).
const RECONNECT_BACKOFF: Duration = Duration::MILLIS_10;

pub struct TcpConnection {
    stream: mio::net::TcpStream,
    peer_addr: SocketAddr,
    state: ConnState,
}

impl TcpConnection {
    pub(crate) fn from_stream(stream: mio::net::TcpStream, peer_addr: SocketAddr) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self { stream, peer_addr, state: ConnState::Connected })
    }

    /// Connects to `addr`, retrying exactly once after a short sleep if the
    /// first attempt fails outright (refused, unreachable, etc).
    pub fn connect(addr: SocketAddr) -> Result<Self, ConnError> {
        match Self::try_connect_once(addr) {
            Ok(conn) => Ok(conn),
            Err(first_err) => {
                warn!(%addr, error = %first_err, "initial connect failed, retrying once");
                std::thread::sleep(std::time::Duration::from(RECONNECT_BACKOFF));
                Self::try_connect_once(addr).map_err(|_| ConnError::Connect(addr, first_err))
            }
        }
    }

    fn try_connect_once(addr: SocketAddr) -> io::Result<Self> {
        let stream = mio::net::TcpStream::connect(addr)?;
        // mio connects are always non-blocking at the syscall level; give
        // the kernel a moment to complete the handshake before surfacing
        // errors via take_error() the way the caller's poll loop would.
        if let Some(err) = stream.take_error()? {
            return Err(err);
        }
        Self::from_stream(stream, addr)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub(crate) fn register(
        &mut self,
        registry: &mio::Registry,
        token: mio::Token,
        interest: mio::Interest,
    ) -> io::Result<()> {
        registry.register(&mut self.stream, token, interest)
    }

    pub(crate) fn reregister(
        &mut self,
        registry: &mio::Registry,
        token: mio::Token,
        interest: mio::Interest,
    ) -> io::Result<()> {
        registry.reregister(&mut self.stream, token, interest)
    }

    pub(crate) fn deregister(&mut self, registry: &mio::Registry) -> io::Result<()> {
        registry.deregister(&mut self.stream)
    }
}

impl Connection for TcpConnection {
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    fn write_nonblocking(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn state(&self) -> ConnState {
        self.state
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn close(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
        self.state = ConnState::Closed;
    }
}
