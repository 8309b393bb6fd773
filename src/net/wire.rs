// Typed request envelope and the small set of request payloads that travel
// inside it. Same tag + length-prefixed style as `primitives::block`, kept
// in its own module since these are transport-facing, not chain data.

use thiserror::Error;

use crate::codec::{self, DecodeError, DecodeResult, Reader};
use crate::net::framing::MAX_FRAME;
use crate::primitives::Block;

/// The boundary error type for everything in this module: a malformed
/// record, an oversized embedded record, or a byte that doesn't name a
/// known `RequestType`.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("record length {0} exceeds the {MAX_FRAME} byte ceiling")]
    FrameTooLarge(usize),
    #[error("unknown request type {0:#x}")]
    UnknownRequestType(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RequestType {
    Blob = 0,
    Discovery = 1,
    MinedBlock = 2,
    Resolution = 3,
    BlockResolution = 4,
}

impl RequestType {
    fn from_u8(v: u8) -> Result<Self, WireError> {
        match v {
            0 => Ok(RequestType::Blob),
            1 => Ok(RequestType::Discovery),
            2 => Ok(RequestType::MinedBlock),
            3 => Ok(RequestType::Resolution),
            4 => Ok(RequestType::BlockResolution),
            other => Err(WireError::UnknownRequestType(other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Request {
    pub request_type: RequestType,
    pub request_message: Vec<u8>,
}

impl Request {
    pub fn new(request_type: RequestType, request_message: Vec<u8>) -> Self {
        Request {
            request_type,
            request_message,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(self.request_type as u8);
        codec::write_bytes(&mut buf, &self.request_message);
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(data);
        let request_type = RequestType::from_u8(r.read_u8()?)?;
        let request_message = r.read_bytes()?.to_vec();
        if request_message.len() > MAX_FRAME {
            return Err(WireError::FrameTooLarge(request_message.len()));
        }
        Ok(Request {
            request_type,
            request_message,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiscoveryMessage {
    pub node_id: u32,
}

impl DiscoveryMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        codec::write_u32(&mut buf, self.node_id);
        buf
    }

    pub fn decode(data: &[u8]) -> DecodeResult<Self> {
        let mut r = Reader::new(data);
        Ok(DiscoveryMessage {
            node_id: r.read_u32()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct MinedBlockMessage {
    pub chain_cost: u64,
    pub block: Block,
}

impl MinedBlockMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        codec::write_u64(&mut buf, self.chain_cost);
        codec::write_bytes(&mut buf, &self.block.encode(true));
        buf
    }

    pub fn decode(data: &[u8]) -> DecodeResult<Self> {
        let mut r = Reader::new(data);
        let chain_cost = r.read_u64()?;
        let block = Block::decode(r.read_bytes()?)?;
        Ok(MinedBlockMessage { chain_cost, block })
    }
}

#[derive(Debug, Clone)]
pub struct BlockResolutionMessage {
    pub indices: Vec<u32>,
}

impl BlockResolutionMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        codec::write_u32(&mut buf, self.indices.len() as u32);
        for idx in &self.indices {
            codec::write_u32(&mut buf, *idx);
        }
        buf
    }

    pub fn decode(data: &[u8]) -> DecodeResult<Self> {
        let mut r = Reader::new(data);
        let count = r.read_u32()?;
        let mut indices = Vec::with_capacity(count as usize);
        for _ in 0..count {
            indices.push(r.read_u32()?);
        }
        Ok(BlockResolutionMessage { indices })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::BlockBody;

    #[test]
    fn test_request_roundtrip() {
        let req = Request::new(RequestType::Discovery, DiscoveryMessage { node_id: 99 }.encode());
        let encoded = req.encode();
        let decoded = Request::decode(&encoded).unwrap();
        assert_eq!(decoded.request_type, RequestType::Discovery);
        let discovery = DiscoveryMessage::decode(&decoded.request_message).unwrap();
        assert_eq!(discovery.node_id, 99);
    }

    #[test]
    fn test_mined_block_roundtrip() {
        let block = Block::new([1u8; 32], 4, BlockBody::empty(), 1.0, 0, 5);
        let msg = MinedBlockMessage {
            chain_cost: 4_194_320,
            block: block.clone(),
        };
        let decoded = MinedBlockMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded.chain_cost, 4_194_320);
        assert_eq!(decoded.block, block);
    }

    #[test]
    fn test_block_resolution_roundtrip() {
        let msg = BlockResolutionMessage {
            indices: vec![2, 3, 4],
        };
        let decoded = BlockResolutionMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded.indices, vec![2, 3, 4]);
    }

    #[test]
    fn test_unknown_request_type_rejected() {
        let mut buf = Vec::new();
        buf.push(9u8);
        codec::write_bytes(&mut buf, b"");
        assert!(Request::decode(&buf).is_err());
    }
}
