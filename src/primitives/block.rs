// Block entity: header + body bound by SHA-256 commitment, nonce search
// primitive, and the difficulty predicate. Mirrors the teacher's
// `primitives::block::Block` shape but the hash algorithm, the link-hash
// formula, and the equality semantics are this protocol's own.

use crate::codec::{self, DecodeError, DecodeResult, Reader};
use crate::crypto::hash::{sha256, sha256_concat3};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("body does not hash to the header's body_hash")]
    BodyHashMismatch,
    #[error("block already has a body")]
    BodyAlreadySet,
}

/// A client-submitted payload, wrapped with its admission timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobMessage {
    pub timestamp: f64,
    pub blob: Vec<u8>,
}

impl BlobMessage {
    pub fn new(timestamp: f64, blob: Vec<u8>) -> Self {
        BlobMessage { timestamp, blob }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        codec::write_f64(&mut buf, self.timestamp);
        codec::write_bytes(&mut buf, &self.blob);
        buf
    }

    pub fn decode(data: &[u8]) -> DecodeResult<Self> {
        let mut r = Reader::new(data);
        let timestamp = r.read_f64()?;
        let blob = r.read_bytes()?.to_vec();
        Ok(BlobMessage { timestamp, blob })
    }
}

/// An ordered sequence of encoded `BlobMessage`s. May be absent on a block
/// that has only been delivered header-first during resolution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockBody {
    pub blobs: Vec<Vec<u8>>,
}

impl BlockBody {
    pub fn empty() -> Self {
        BlockBody { blobs: Vec::new() }
    }

    pub fn new(blobs: Vec<Vec<u8>>) -> Self {
        BlockBody { blobs }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        codec::write_u32(&mut buf, self.blobs.len() as u32);
        for b in &self.blobs {
            codec::write_bytes(&mut buf, b);
        }
        buf
    }

    pub fn decode(data: &[u8]) -> DecodeResult<Self> {
        let mut r = Reader::new(data);
        let count = r.read_u32()?;
        let mut blobs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            blobs.push(r.read_bytes()?.to_vec());
        }
        Ok(BlockBody { blobs })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockHeader {
    pub entropy: u32,
    pub timestamp: f64,
    pub difficulty: u32,
    pub body_hash: [u8; 32],
}

impl BlockHeader {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        codec::write_u32(&mut buf, self.entropy);
        codec::write_f64(&mut buf, self.timestamp);
        codec::write_u32(&mut buf, self.difficulty);
        buf.extend_from_slice(&self.body_hash);
        buf
    }

    pub fn decode(data: &[u8]) -> DecodeResult<Self> {
        let mut r = Reader::new(data);
        let entropy = r.read_u32()?;
        let timestamp = r.read_f64()?;
        let difficulty = r.read_u32()?;
        let body_hash = r.read_array32()?;
        Ok(BlockHeader {
            entropy,
            timestamp,
            difficulty,
            body_hash,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub prev_hash: [u8; 32],
    pub header: BlockHeader,
    pub body: Option<BlockBody>,
    pub nonce: u64,
    pub cur_hash: [u8; 32],
}

impl PartialEq for Block {
    /// Two blocks are equal iff they share `(cur_hash, nonce)`. `prev_hash`
    /// is deliberately excluded: the same mined block reattached under a
    /// different predecessor during resolution still compares equal.
    fn eq(&self, other: &Self) -> bool {
        self.cur_hash == other.cur_hash && self.nonce == other.nonce
    }
}
impl Eq for Block {}

impl Block {
    /// Construct a block with its body present; `header.body_hash` is
    /// derived from `body`.
    pub fn new(
        prev_hash: [u8; 32],
        difficulty: u32,
        body: BlockBody,
        timestamp: f64,
        entropy: u32,
        nonce: u64,
    ) -> Self {
        let body_hash = sha256(&body.encode());
        Self::from_parts(prev_hash, difficulty, Some(body), timestamp, entropy, nonce, body_hash)
    }

    /// Construct a header-only block: no body, caller supplies `body_hash`
    /// directly (used by resolution-chain decoding and genesis).
    pub fn new_header_only(
        prev_hash: [u8; 32],
        difficulty: u32,
        body_hash: [u8; 32],
        timestamp: f64,
        entropy: u32,
        nonce: u64,
    ) -> Self {
        Self::from_parts(prev_hash, difficulty, None, timestamp, entropy, nonce, body_hash)
    }

    fn from_parts(
        prev_hash: [u8; 32],
        difficulty: u32,
        body: Option<BlockBody>,
        timestamp: f64,
        entropy: u32,
        nonce: u64,
        body_hash: [u8; 32],
    ) -> Self {
        let header = BlockHeader {
            entropy,
            timestamp,
            difficulty,
            body_hash,
        };
        let cur_hash = sha256(&header.encode());
        Block {
            prev_hash,
            header,
            body,
            nonce,
            cur_hash,
        }
    }

    /// Reattach this block under a different predecessor. Used during
    /// chain-resolution splicing; does not affect `cur_hash`.
    pub fn set_previous_hash(&mut self, prev_hash: [u8; 32]) {
        self.prev_hash = prev_hash;
    }

    /// Bind a body to a header-only block. Fails if the body does not hash
    /// to `header.body_hash`, or if a body is already present.
    pub fn set_body(&mut self, body: BlockBody) -> Result<(), BlockError> {
        if self.body.is_some() {
            return Err(BlockError::BodyAlreadySet);
        }
        if sha256(&body.encode()) != self.header.body_hash {
            return Err(BlockError::BodyHashMismatch);
        }
        self.body = Some(body);
        Ok(())
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// `SHA256(cur_hash || prev_hash || ascii_decimal(nonce))`. `prev_hash`
    /// may be overridden to test linkage under a hypothetical predecessor.
    pub fn link_hash(&self, prev_hash_override: Option<&[u8; 32]>) -> [u8; 32] {
        let prev = prev_hash_override.unwrap_or(&self.prev_hash);
        let nonce_ascii = self.nonce.to_string();
        sha256_concat3(&self.cur_hash, prev, nonce_ascii.as_bytes())
    }

    /// Leading `difficulty` bits of the link hash must all be zero, tested
    /// MSB-first within each byte.
    pub fn is_valid(&self, prev_hash_override: Option<&[u8; 32]>) -> bool {
        let hash = self.link_hash(prev_hash_override);
        let difficulty = self.header.difficulty as usize;
        for i in 0..difficulty {
            let byte = hash[i / 8];
            let mask = 0x80u8 >> (i % 8);
            if byte & mask != 0 {
                return false;
            }
        }
        true
    }

    /// Advance the nonce by exactly one. No skipping, no batching: the
    /// deterministic walk is load-bearing for the mining-termination test.
    pub fn mine_step(&mut self) {
        self.nonce += 1;
    }

    pub fn encode(&self, include_body: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        codec::write_u64(&mut buf, self.nonce);
        buf.extend_from_slice(&self.prev_hash);
        codec::write_bytes(&mut buf, &self.header.encode());
        if include_body {
            match &self.body {
                Some(body) => {
                    buf.push(1);
                    codec::write_bytes(&mut buf, &body.encode());
                }
                None => buf.push(0),
            }
        } else {
            buf.push(0);
        }
        buf
    }

    pub fn decode(data: &[u8]) -> DecodeResult<Self> {
        let mut r = Reader::new(data);
        let nonce = r.read_u64()?;
        let prev_hash = r.read_array32()?;
        let header = BlockHeader::decode(r.read_bytes()?)?;
        let has_body = r.read_u8()?;
        let body = match has_body {
            0 => None,
            1 => Some(BlockBody::decode(r.read_bytes()?)?),
            other => return Err(DecodeError::UnknownTag(other)),
        };
        let cur_hash = sha256(&header.encode());
        Ok(Block {
            prev_hash,
            header,
            body,
            nonce,
            cur_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> Block {
        let body = BlockBody::new(vec![BlobMessage::new(1.0, b"hello".to_vec()).encode()]);
        Block::new([0u8; 32], 4, body, 1_600_000_000.0, 7, 0)
    }

    #[test]
    fn test_header_stability() {
        let block = sample_block();
        let encoded = block.encode(true);
        let decoded = Block::decode(&encoded).unwrap();
        assert_eq!(decoded, block);
        assert_eq!(decoded.cur_hash, block.cur_hash);
        assert_eq!(decoded.nonce, block.nonce);
    }

    #[test]
    fn test_equality_ignores_prev_hash() {
        let mut a = sample_block();
        let mut b = sample_block();
        a.set_previous_hash([1u8; 32]);
        b.set_previous_hash([2u8; 32]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_body_binding_rejects_mismatch() {
        let mut block = Block::new_header_only(
            [0u8; 32],
            4,
            sha256(&BlockBody::empty().encode()),
            1.0,
            0,
            0,
        );
        let wrong_body = BlockBody::new(vec![b"nope".to_vec()]);
        assert_eq!(
            block.set_body(wrong_body),
            Err(BlockError::BodyHashMismatch)
        );
        assert!(!block.has_body());

        let right_body = BlockBody::empty();
        assert!(block.set_body(right_body).is_ok());
        assert!(block.has_body());
    }

    #[test]
    fn test_mining_termination_small_difficulty() {
        let mut block = Block::new([0u8; 32], 4, BlockBody::empty(), 1.0, 0, 0);
        let mut steps = 0;
        while !block.is_valid(None) {
            block.mine_step();
            steps += 1;
            assert!(steps < 10_000_000, "nonce search did not terminate");
        }
        assert!(block.is_valid(None));
    }

    #[test]
    fn test_include_body_false_omits_body_on_wire() {
        let block = sample_block();
        let encoded = block.encode(false);
        let decoded = Block::decode(&encoded).unwrap();
        assert!(!decoded.has_body());
        assert_eq!(decoded.header.body_hash, block.header.body_hash);
    }
}
