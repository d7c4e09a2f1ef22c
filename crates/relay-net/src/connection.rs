use std::io;

use relay_proto::TransportKind;

/// `Closed -> Connecting -> {Connected | Listening} -> Closed`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnState {
    Closed,
    Connecting,
    Connected,
    Listening,
}

/// Capability interface shared by every transport variant.
///
/// This is the one place in the runtime where dispatch happens through a
/// trait object rather than a `match` on a tagged enum — the rest of the
/// system (framing, handshake, dispatch) only ever talks to a `dyn
/// Connection` and never needs to know whether bytes are crossing a real
/// socket or an in-process channel.
///
/// Reads and writes follow the non-blocking convention used throughout the
/// reference implementation's split read-prepare / read-complete protocol:
/// `Ok(0)` means end-of-stream, `Err(io::ErrorKind::WouldBlock)` means "no
/// data/backpressure right now, the notifier will tell you when to retry".
pub trait Connection: Send {
    /// Non-blocking read into `buf`. Returns the number of bytes read, `0`
    /// on EOF, or an `io::ErrorKind::WouldBlock` error if nothing is
    /// available yet.
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Non-blocking write of `buf`. Returns the number of bytes accepted;
    /// callers are responsible for retrying the remainder, which is the
    /// same contract `std::io::Write` gives for a non-blocking descriptor.
    fn write_nonblocking(&mut self, buf: &[u8]) -> io::Result<usize>;

    fn state(&self) -> ConnState;

    fn kind(&self) -> TransportKind;

    fn close(&mut self);
}
