use relay_buffers::Buffer;

use crate::error::FrameError;

/// `u64 total-size | u32 type | u32 command`, little-endian.
pub const HEADER_SIZE: usize = 16;

/// Decoded form of a frame's fixed header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub total_size: u64,
    pub kind: u32,
    pub command: u32,
}

impl FrameHeader {
    pub fn new(kind: u32, command: u32, payload_len: usize) -> Self {
        Self { total_size: (HEADER_SIZE + payload_len) as u64, kind, command }
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..8].copy_from_slice(&self.total_size.to_le_bytes());
        out[8..12].copy_from_slice(&self.kind.to_le_bytes());
        out[12..16].copy_from_slice(&self.command.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FrameError::Truncated(bytes.len()));
        }
        let total_size = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let kind = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let command = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
        Ok(Self { total_size, kind, command })
    }
}

/// A non-owning, typed view over a fully-received [`Buffer`]: the fixed
/// header plus a cursor into the payload for sequential field extraction.
///
/// Mirrors `co::ICommand`, minus the polymorphic dispatch table: handlers
/// match on `kind()`/`command()` instead of virtual calls.
pub struct ICommand {
    buffer: Buffer,
    header: FrameHeader,
    cursor: usize,
}

impl ICommand {
    /// Validates and wraps a buffer that the caller believes holds exactly
    /// one complete frame (header + payload).
    pub fn parse(buffer: Buffer) -> Result<Self, FrameError> {
        let header = FrameHeader::decode(buffer.as_slice())?;
        if header.total_size as usize != buffer.len() {
            return Err(FrameError::SizeMismatch {
                declared: header.total_size,
                actual: buffer.len(),
            });
        }
        Ok(Self { buffer, header, cursor: HEADER_SIZE })
    }

    pub fn header(&self) -> FrameHeader {
        self.header
    }

    pub fn kind(&self) -> crate::command::CommandKind {
        crate::command::CommandKind::from_type_field(self.header.kind)
    }

    pub fn command(&self) -> u32 {
        self.header.command
    }

    /// The payload, excluding the fixed header.
    pub fn payload(&self) -> &[u8] {
        &self.buffer.as_slice()[HEADER_SIZE..]
    }

    /// Remaining unread payload bytes starting at the cursor.
    pub fn remaining(&self) -> &[u8] {
        &self.buffer.as_slice()[self.cursor..]
    }

    pub fn advance(&mut self, n: usize) {
        self.cursor = (self.cursor + n).min(self.buffer.len());
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }
}

/// Serialises `payload` into a fresh frame: header followed by payload
/// bytes, ready to be handed to a connection's writer.
pub fn encode_frame(kind: u32, command: u32, payload: &[u8], out: &mut Vec<u8>) {
    let header = FrameHeader::new(kind, command, payload.len());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(payload);
}
