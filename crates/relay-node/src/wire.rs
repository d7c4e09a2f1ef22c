//! Manual payload (de)serialization for the control commands this crate
//! handles directly (handshake, keep-alive). Follows §6's encoding rules
//! verbatim: primitives verbatim, 128-bit identifiers as two little-endian
//! `u64`s, strings as `u64` length + bytes, sequences as `u64` count +
//! items.

use std::str::FromStr;

use relay_proto::{ConnectionDescription, NodeId, Version};

use crate::error::NodeError;

pub fn write_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub fn write_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub fn write_node_id(buf: &mut Vec<u8>, id: NodeId) {
    let (low, high) = id.to_le_parts();
    buf.extend_from_slice(&low.to_le_bytes());
    buf.extend_from_slice(&high.to_le_bytes());
}

pub fn write_version(buf: &mut Vec<u8>, version: Version) {
    let (counter, tag) = version.to_le_parts();
    buf.extend_from_slice(&counter.to_le_bytes());
    buf.extend_from_slice(&tag.to_le_bytes());
}

pub fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u64).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

pub fn write_descriptions(buf: &mut Vec<u8>, descs: &[ConnectionDescription]) {
    buf.extend_from_slice(&(descs.len() as u64).to_le_bytes());
    for desc in descs {
        write_string(buf, &desc.to_string());
    }
}

pub fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u64).to_le_bytes());
    buf.extend_from_slice(bytes);
}

/// A sequential cursor over a received command's payload.
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], NodeError> {
        let end = self.pos + n;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or_else(|| NodeError::Protocol("payload truncated".into()))?;
        self.pos = end;
        Ok(slice)
    }

    pub fn read_u32(&mut self) -> Result<u32, NodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> Result<u64, NodeError> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_node_id(&mut self) -> Result<NodeId, NodeError> {
        let low = self.read_u64()?;
        let high = self.read_u64()?;
        Ok(NodeId::from_le_parts(low, high))
    }

    pub fn read_version(&mut self) -> Result<Version, NodeError> {
        let counter = self.read_u64()?;
        let tag = self.read_u64()?;
        Ok(Version::from_le_parts(counter, tag))
    }

    pub fn read_string(&mut self) -> Result<String, NodeError> {
        let len = self.read_u64()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| NodeError::Protocol(e.to_string()))
    }

    pub fn read_descriptions(&mut self) -> Result<Vec<ConnectionDescription>, NodeError> {
        let count = self.read_u64()?;
        (0..count)
            .map(|_| {
                let s = self.read_string()?;
                ConnectionDescription::from_str(&s).map_err(|e| NodeError::Protocol(e.to_string()))
            })
            .collect()
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, NodeError> {
        let len = self.read_u64()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

/// Handshake payload shared by `ConnectReq` and `ConnectReply`.
pub struct HelloPayload {
    pub id: NodeId,
    pub kind: u32,
    pub descriptions: Vec<ConnectionDescription>,
}

impl HelloPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_node_id(&mut buf, self.id);
        write_u32(&mut buf, self.kind);
        write_descriptions(&mut buf, &self.descriptions);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, NodeError> {
        let mut reader = Reader::new(bytes);
        let id = reader.read_node_id()?;
        let kind = reader.read_u32()?;
        let descriptions = reader.read_descriptions()?;
        Ok(Self { id, kind, descriptions })
    }
}

/// `CMD_BARRIER_ENTER` payload: requested version and the entrant's
/// incarnation counter for this round. The destination object id is not
/// part of this payload — it's the leading 16 bytes of every object
/// command's frame, stripped generically before this is decoded (see
/// `node::read_object_id`).
pub struct BarrierEnterPayload {
    pub version: Version,
    pub incarnation: u32,
}

impl BarrierEnterPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_version(&mut buf, self.version);
        write_u32(&mut buf, self.incarnation);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, NodeError> {
        let mut reader = Reader::new(bytes);
        let version = reader.read_version()?;
        let incarnation = reader.read_u32()?;
        Ok(Self { version, incarnation })
    }
}

/// `CMD_BARRIER_ENTER_REPLY` payload: the version that was reached.
pub struct BarrierEnterReplyPayload {
    pub version: Version,
}

impl BarrierEnterReplyPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_version(&mut buf, self.version);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, NodeError> {
        let mut reader = Reader::new(bytes);
        let version = reader.read_version()?;
        Ok(Self { version })
    }
}

/// `CMD_MAP_OBJ` payload: the requester's desired version and a concrete
/// instance slot (mirrors `map_object`'s `instance_id` parameter).
pub struct MapObjReqPayload {
    pub requested: Version,
    pub instance_id: u32,
}

impl MapObjReqPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_version(&mut buf, self.requested);
        write_u32(&mut buf, self.instance_id);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, NodeError> {
        let mut reader = Reader::new(bytes);
        let requested = reader.read_version()?;
        let instance_id = reader.read_u32()?;
        Ok(Self { requested, instance_id })
    }
}

/// `CMD_MAP_OBJ_REPLY` payload: the resolved version and its instance data,
/// or [`Version::INVALID`] with an empty payload when the master denies the
/// map (unknown object, or the requested version will never exist).
pub struct MapObjReplyPayload {
    pub version: Version,
    pub data: Vec<u8>,
}

impl MapObjReplyPayload {
    pub fn denied() -> Self {
        Self { version: Version::INVALID, data: Vec::new() }
    }

    pub fn is_denied(&self) -> bool {
        self.version == Version::INVALID
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_version(&mut buf, self.version);
        write_bytes(&mut buf, &self.data);
        buf
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, NodeError> {
        let mut reader = Reader::new(bytes);
        let version = reader.read_version()?;
        let data = reader.read_bytes()?;
        Ok(Self { version, data })
    }
}
