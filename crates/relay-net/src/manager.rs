use std::{
    collections::HashMap,
    io,
    net::SocketAddr,
    time::Duration as StdDuration,
};

use mio::{net::TcpListener, Events, Interest, Poll, Token};
use relay_buffers::BufferPool;
use relay_proto::ICommand;
use tracing::{debug, warn};

use crate::{
    error::ConnError,
    event::EventConnection,
    framing::{FrameChannel, ReadOutcome},
    pipe::PipeConnection,
    tcp::TcpConnection,
};

const LISTENER_TOKEN: Token = Token(0);
const FIRST_CONN_TOKEN: usize = 1;

/// One outcome of a single [`ConnectionManager::poll`] call.
pub enum PollEvent {
    Accept(ConnectionHandle, SocketAddr),
    Disconnect(ConnectionHandle),
    Command(ConnectionHandle, ICommand),
}

/// A reference to a connection owned by the manager, stable across polls.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(Token);

enum ManagedConnection {
    Tcp(FrameChannel<TcpConnection>),
    Pipe(FrameChannel<PipeConnection>),
    Event(FrameChannel<EventConnection>),
}

impl ManagedConnection {
    fn read_frame(&mut self) -> ReadOutcome {
        match self {
            ManagedConnection::Tcp(c) => c.read_frame(),
            ManagedConnection::Pipe(c) => c.read_frame(),
            ManagedConnection::Event(c) => c.read_frame(),
        }
    }

    fn drain_backlog(&mut self) -> Result<(), ConnError> {
        match self {
            ManagedConnection::Tcp(c) => c.drain_backlog().map(|_| ()),
            ManagedConnection::Pipe(c) => c.drain_backlog().map(|_| ()),
            ManagedConnection::Event(c) => c.drain_backlog().map(|_| ()),
        }
    }

    fn send(&mut self, kind: u32, command: u32, payload: &[u8]) -> Result<(), ConnError> {
        match self {
            ManagedConnection::Tcp(c) => c.send(kind, command, payload),
            ManagedConnection::Pipe(c) => c.send(kind, command, payload),
            ManagedConnection::Event(c) => c.send(kind, command, payload),
        }
    }

    fn close(&mut self) {
        match self {
            ManagedConnection::Tcp(c) => c.close(),
            ManagedConnection::Pipe(c) => c.close(),
            ManagedConnection::Event(c) => c.close(),
        }
    }

    /// Pipe and plain event connections aren't backed by a pollable file
    /// descriptor, so the manager has to check them on every tick rather
    /// than waiting for `mio` to wake it.
    fn needs_eager_poll(&self) -> bool {
        !matches!(self, ManagedConnection::Tcp(_))
    }
}

/// Drives every transport kind (TCP, in-process pipe, in-process event)
/// through a single `mio`-based poll loop and assembles complete commands
/// out of them (component 4.B + 4.C).
pub struct ConnectionManager {
    poll: Poll,
    events: Events,
    listener: Option<TcpListener>,
    conns: HashMap<Token, ManagedConnection>,
    next_token: usize,
    pool: BufferPool,
}

impl ConnectionManager {
    pub fn new(pool: BufferPool) -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(256),
            listener: None,
            conns: HashMap::new(),
            next_token: FIRST_CONN_TOKEN,
            pool,
        })
    }

    /// Binds a listening TCP socket. Incoming connections surface as
    /// [`PollEvent::Accept`]; the caller is expected to call
    /// [`Self::adopt_tcp_stream`] (or drop the connection) in response.
    pub fn listen(&mut self, addr: SocketAddr) -> Result<SocketAddr, ConnError> {
        let mut listener = TcpListener::bind(addr).map_err(|e| ConnError::Bind(addr, e))?;
        let local_addr = listener.local_addr().map_err(|e| ConnError::Bind(addr, e))?;
        self.poll
            .registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(|e| ConnError::Bind(addr, e))?;
        self.listener = Some(listener);
        Ok(local_addr)
    }

    fn next_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    /// Registers an already-established outbound TCP connection.
    pub fn add_tcp(&mut self, mut conn: TcpConnection) -> Result<ConnectionHandle, ConnError> {
        let token = self.next_token();
        conn.register(self.poll.registry(), token, Interest::READABLE | Interest::WRITABLE)?;
        self.conns.insert(token, ManagedConnection::Tcp(FrameChannel::new(conn, self.pool.clone())));
        Ok(ConnectionHandle(token))
    }

    pub fn add_pipe(&mut self, conn: PipeConnection) -> ConnectionHandle {
        let token = self.next_token();
        self.conns.insert(token, ManagedConnection::Pipe(FrameChannel::new(conn, self.pool.clone())));
        ConnectionHandle(token)
    }

    pub fn add_event(&mut self, conn: EventConnection) -> ConnectionHandle {
        let token = self.next_token();
        self.conns.insert(token, ManagedConnection::Event(FrameChannel::new(conn, self.pool.clone())));
        ConnectionHandle(token)
    }

    /// Registers an event connection bound to a real `mio::Waker`, so that
    /// signalling the returned handle interrupts a blocked [`Self::poll`]
    /// immediately instead of waiting for the next eager-poll tick.
    pub fn add_self_event(&mut self) -> io::Result<(ConnectionHandle, crate::event::EventHandle)> {
        let token = self.next_token();
        let (conn, handle) = EventConnection::with_waker(self.poll.registry(), token)?;
        self.conns.insert(token, ManagedConnection::Event(FrameChannel::new(conn, self.pool.clone())));
        Ok((ConnectionHandle(token), handle))
    }

    pub fn send(&mut self, handle: ConnectionHandle, kind: u32, command: u32, payload: &[u8]) -> Result<(), ConnError> {
        let conn = self.conns.get_mut(&handle.0).ok_or(ConnError::ConnectionReset)?;
        conn.send(kind, command, payload)
    }

    pub fn close(&mut self, handle: ConnectionHandle) {
        if let Some(conn) = self.conns.get_mut(&handle.0) {
            conn.close();
        }
        self.conns.remove(&handle.0);
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Blocks for at most `timeout` waiting for I/O readiness, then drains
    /// every connection that has data, returning the resulting events in
    /// arrival order. A `None` timeout blocks indefinitely.
    pub fn poll(&mut self, timeout: Option<StdDuration>) -> Result<Vec<PollEvent>, ConnError> {
        self.poll.poll(&mut self.events, timeout).map_err(ConnError::Io)?;

        let mut out = Vec::new();
        let mut disconnected = Vec::new();

        if self.listener.is_some() {
            let readable = self.events.iter().any(|e| e.token() == LISTENER_TOKEN);
            if readable {
                self.accept_all(&mut out);
            }
        }

        let readable_tokens: Vec<Token> = self
            .events
            .iter()
            .filter(|e| e.token() != LISTENER_TOKEN)
            .map(|e| e.token())
            .collect();

        // mio only tells us about TCP readiness; pipes and bare event
        // connections are polled on every tick regardless.
        let eager_tokens: Vec<Token> = self
            .conns
            .iter()
            .filter(|(_, c)| c.needs_eager_poll())
            .map(|(t, _)| *t)
            .collect();

        for token in readable_tokens.into_iter().chain(eager_tokens) {
            let Some(conn) = self.conns.get_mut(&token) else { continue };
            if let Err(e) = conn.drain_backlog() {
                warn!(?token, error = %e, "connection write failed, dropping");
                disconnected.push(token);
                continue;
            }
            loop {
                match conn.read_frame() {
                    ReadOutcome::Frame(cmd) => out.push(PollEvent::Command(ConnectionHandle(token), cmd)),
                    ReadOutcome::WouldBlock => break,
                    ReadOutcome::Disconnected => {
                        disconnected.push(token);
                        break;
                    }
                }
            }
        }

        for token in disconnected {
            if let Some(mut conn) = self.conns.remove(&token) {
                conn.close();
            }
            out.push(PollEvent::Disconnect(ConnectionHandle(token)));
        }

        Ok(out)
    }

    fn accept_all(&mut self, out: &mut Vec<PollEvent>) {
        loop {
            let accepted = match self.listener.as_mut().expect("checked by caller").accept() {
                Ok(pair) => pair,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    debug!(error = %e, "accept failed");
                    break;
                }
            };
            let (stream, peer_addr) = accepted;
            let conn = match TcpConnection::from_stream(stream, peer_addr) {
                Ok(c) => c,
                Err(e) => {
                    debug!(%peer_addr, error = %e, "failed to adopt accepted stream");
                    continue;
                }
            };
            match self.add_tcp(conn) {
                Ok(handle) => out.push(PollEvent::Accept(handle, peer_addr)),
                Err(e) => warn!(%peer_addr, error = %e, "failed to register accepted stream"),
            }
        }
    }
}
