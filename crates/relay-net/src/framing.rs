use std::collections::VecDeque;

use relay_buffers::{Buffer, BufferPool};
use relay_proto::{FrameHeader, ICommand, encode_frame, HEADER_SIZE};

use crate::{connection::Connection, error::ConnError, ConnState};

enum RxState {
    Header { buf: [u8; HEADER_SIZE], have: usize },
    Payload { header: FrameHeader, buf: Buffer, offset: usize },
}

/// Outcome of one [`FrameChannel::read_frame`] call.
pub enum ReadOutcome {
    Frame(ICommand),
    WouldBlock,
    Disconnected,
}

/// Drives the two-stage header-then-payload read protocol (component 4.C)
/// over any [`Connection`], pooling payload storage through a
/// [`BufferPool`] (component 4.A).
///
/// This is transport-agnostic: the same state machine assembles frames
/// whether `C` is a TCP socket, an in-process pipe, or (trivially, since it
/// carries no payload) an event connection.
pub struct FrameChannel<C> {
    conn: C,
    pool: BufferPool,
    rx_state: RxState,
    send_backlog: VecDeque<Vec<u8>>,
}

impl<C: Connection> FrameChannel<C> {
    pub fn new(conn: C, pool: BufferPool) -> Self {
        Self {
            conn,
            pool,
            rx_state: RxState::Header { buf: [0; HEADER_SIZE], have: 0 },
            send_backlog: VecDeque::new(),
        }
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    pub fn has_backlog(&self) -> bool {
        !self.send_backlog.is_empty()
    }

    /// Frames and sends (or backlogs, on backpressure) one command.
    pub fn send(&mut self, kind: u32, command: u32, payload: &[u8]) -> Result<(), ConnError> {
        let mut framed = Vec::with_capacity(HEADER_SIZE + payload.len());
        encode_frame(kind, command, payload, &mut framed);
        self.write_or_enqueue(framed)
    }

    fn write_or_enqueue(&mut self, mut data: Vec<u8>) -> Result<(), ConnError> {
        if !self.send_backlog.is_empty() {
            self.send_backlog.push_back(data);
            return Ok(());
        }
        match self.conn.write_nonblocking(&data) {
            Ok(n) if n == data.len() => Ok(()),
            Ok(n) => {
                data.drain(..n);
                self.send_backlog.push_back(data);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                self.send_backlog.push_back(data);
                Ok(())
            }
            Err(e) => Err(ConnError::Io(e)),
        }
    }

    /// Flushes as much of the backlog as the connection accepts without
    /// blocking. Call this when the connection's notifier reports
    /// writability.
    pub fn drain_backlog(&mut self) -> Result<ConnState, ConnError> {
        while let Some(front) = self.send_backlog.front_mut() {
            match self.conn.write_nonblocking(front) {
                Ok(0) => return Ok(ConnState::Closed),
                Ok(n) if n == front.len() => {
                    self.send_backlog.pop_front();
                }
                Ok(n) => {
                    front.drain(..n);
                    break;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(ConnError::Io(e)),
            }
        }
        Ok(ConnState::Connected)
    }

    /// Reads and assembles at most one complete frame.
    pub fn read_frame(&mut self) -> ReadOutcome {
        loop {
            let state = std::mem::replace(
                &mut self.rx_state,
                RxState::Header { buf: [0; HEADER_SIZE], have: 0 },
            );
            match state {
                RxState::Header { mut buf, mut have } => loop {
                    if have == HEADER_SIZE {
                        let header = match FrameHeader::decode(&buf) {
                            Ok(h) => h,
                            Err(_) => return ReadOutcome::Disconnected,
                        };
                        if (header.total_size as usize) < HEADER_SIZE {
                            return ReadOutcome::Disconnected;
                        }
                        let mut payload_buf = self.pool.acquire(header.total_size as usize);
                        payload_buf.as_mut_slice().unwrap()[..HEADER_SIZE].copy_from_slice(&buf);
                        self.rx_state =
                            RxState::Payload { header, buf: payload_buf, offset: HEADER_SIZE };
                        break;
                    }
                    match self.conn.read_nonblocking(&mut buf[have..]) {
                        Ok(0) => return ReadOutcome::Disconnected,
                        Ok(n) => have += n,
                        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                            self.rx_state = RxState::Header { buf, have };
                            return ReadOutcome::WouldBlock;
                        }
                        Err(_) => return ReadOutcome::Disconnected,
                    }
                },
                RxState::Payload { header, mut buf, mut offset } => {
                    let total = header.total_size as usize;
                    loop {
                        if offset == total {
                            self.rx_state = RxState::Header { buf: [0; HEADER_SIZE], have: 0 };
                            return match ICommand::parse(buf) {
                                Ok(cmd) => ReadOutcome::Frame(cmd),
                                Err(_) => ReadOutcome::Disconnected,
                            };
                        }
                        let slice =
                            buf.as_mut_slice().expect("payload buffer uniquely owned while filling");
                        match self.conn.read_nonblocking(&mut slice[offset..total]) {
                            Ok(0) => return ReadOutcome::Disconnected,
                            Ok(n) => offset += n,
                            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                                self.rx_state = RxState::Payload { header, buf, offset };
                                return ReadOutcome::WouldBlock;
                            }
                            Err(_) => return ReadOutcome::Disconnected,
                        }
                    }
                }
            }
        }
    }

    pub fn close(&mut self) {
        self.conn.close();
    }
}
