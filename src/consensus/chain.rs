// Ordered block list anchored at genesis, with cumulative cost and a
// mined-blobs index for O(1) containment checks. Mirrors the teacher's
// `consensus::chain::Chain` structure, generalized to header-only splicing
// for the resolution protocol.

use std::collections::{HashMap, HashSet};

use crate::codec::{self, DecodeResult, Reader};
use crate::consensus::genesis::genesis_block;
use crate::crypto::hash::sha256;
use crate::primitives::Block;

/// Key into `mined_blobs`: the SHA-256 of an encoded BlobMessage.
pub type BlobHash = [u8; 32];

#[derive(Debug, Clone)]
pub struct Chain {
    pub blocks: Vec<Block>,
    pub cost: u64,
    pub mined_blobs: HashMap<BlobHash, HashSet<(usize, usize)>>,
}

impl Chain {
    /// A fresh chain always starts at genesis, index 0.
    pub fn new() -> Self {
        let genesis = genesis_block();
        let cost = 1u64 << genesis.header.difficulty;
        let mut chain = Chain {
            blocks: vec![genesis],
            cost: 0,
            mined_blobs: HashMap::new(),
        };
        chain.cost = cost;
        chain.index_block_blobs(0);
        chain
    }

    /// An empty floating chain with no genesis, used while reconstructing a
    /// peer's announced chain during resolution.
    pub fn empty() -> Self {
        Chain {
            blocks: Vec::new(),
            cost: 0,
            mined_blobs: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn head(&self) -> Option<&Block> {
        self.blocks.last()
    }

    fn index_block_blobs(&mut self, index: usize) {
        if let Some(body) = self.blocks[index].body.clone() {
            for (blob_index, blob) in body.blobs.iter().enumerate() {
                let hash = sha256(blob);
                self.mined_blobs
                    .entry(hash)
                    .or_default()
                    .insert((index, blob_index));
            }
        }
    }

    /// Index a block's blobs against `index` before it's spliced in. Mirrors
    /// the original's `__add_mined_blobs(idx, block)`, which indexes against
    /// the insertion position as given and never re-indexes blocks that get
    /// shifted by a later insert.
    fn index_new_block_blobs(&mut self, index: usize, block: &Block) {
        if let Some(body) = &block.body {
            for (blob_index, blob) in body.blobs.iter().enumerate() {
                let hash = sha256(blob);
                self.mined_blobs.entry(hash).or_default().insert((index, blob_index));
            }
        }
    }

    /// Append a block. Updates cumulative cost and, if a body is present,
    /// indexes its blobs.
    pub fn add(&mut self, block: Block) {
        self.cost += 1u64 << block.header.difficulty;
        let idx = self.blocks.len();
        self.index_new_block_blobs(idx, &block);
        self.blocks.push(block);
    }

    /// Positional insert, used to splice known-good blocks from the current
    /// chain into a reconstructed floating chain during resolution.
    pub fn insert(&mut self, index: usize, block: Block) {
        self.cost += 1u64 << block.header.difficulty;
        self.index_new_block_blobs(index.min(self.blocks.len()), &block);
        if index >= self.blocks.len() {
            self.blocks.push(block);
        } else {
            self.blocks.insert(index, block);
        }
    }

    /// Replace the (possibly body-less) block at `index` with `block`,
    /// requiring `0 < index < len` and that the two compare equal by
    /// `(cur_hash, nonce)`. Returns whether the swap took place.
    pub fn replace(&mut self, index: usize, block: Block) -> bool {
        if index == 0 || index >= self.blocks.len() {
            return false;
        }
        if self.blocks[index] != block {
            return false;
        }
        self.blocks[index] = block;
        self.index_block_blobs(index);
        true
    }

    /// Genesis must be valid; for each subsequent block, its `prev_hash`
    /// must match the predecessor's link hash and it must satisfy its own
    /// difficulty predicate.
    pub fn is_valid(&self) -> bool {
        if self.blocks.is_empty() {
            return false;
        }
        if !self.blocks[0].is_valid(None) {
            return false;
        }
        for i in 1..self.blocks.len() {
            let expected_prev = self.blocks[i - 1].link_hash(None);
            if self.blocks[i].prev_hash != expected_prev {
                return false;
            }
            if !self.blocks[i].is_valid(None) {
                return false;
            }
        }
        true
    }

    pub fn is_complete(&self) -> bool {
        self.is_valid() && self.blocks.iter().all(|b| b.has_body())
    }

    /// Indices of blocks whose body is absent.
    pub fn bodiless_indices(&self) -> Vec<usize> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.has_body())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn encode(&self, include_bodies: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        codec::write_u32(&mut buf, self.blocks.len() as u32);
        for block in &self.blocks {
            codec::write_bytes(&mut buf, &block.encode(include_bodies));
        }
        buf
    }

    pub fn decode(data: &[u8]) -> DecodeResult<Self> {
        let mut r = Reader::new(data);
        let count = r.read_u32()?;
        let mut chain = Chain::empty();
        for _ in 0..count {
            let block = Block::decode(r.read_bytes()?)?;
            chain.add(block);
        }
        Ok(chain)
    }
}

impl Default for Chain {
    fn default() -> Self {
        Chain::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::BlockBody;

    fn extend(chain: &Chain, difficulty: u32) -> Block {
        let head = chain.head().unwrap();
        let mut block = Block::new(
            head.link_hash(None),
            difficulty,
            BlockBody::empty(),
            1_600_000_000.0,
            0,
            0,
        );
        while !block.is_valid(None) {
            block.mine_step();
        }
        block
    }

    #[test]
    fn test_genesis_chain_is_valid() {
        let chain = Chain::new();
        assert_eq!(chain.len(), 1);
        assert!(chain.is_valid());
        assert!(chain.is_complete());
        assert_eq!(chain.cost, 4_194_304);
    }

    #[test]
    fn test_cost_monotonicity_under_add() {
        let mut chain = Chain::new();
        let before = chain.cost;
        let block = extend(&chain, 4);
        let difficulty = block.header.difficulty;
        chain.add(block);
        assert_eq!(chain.cost, before + (1u64 << difficulty));
    }

    #[test]
    fn test_chain_linkage_detects_break() {
        let mut chain = Chain::new();
        let block = extend(&chain, 4);
        chain.add(block);
        assert!(chain.is_valid());

        chain.blocks[1].set_previous_hash([9u8; 32]);
        assert!(!chain.is_valid());
    }

    #[test]
    fn test_replace_requires_equal_block() {
        let mut chain = Chain::new();
        let block = extend(&chain, 4);
        chain.add(block.clone());

        let mut other = Block::new([0u8; 32], 4, BlockBody::empty(), 2.0, 9, 0);
        while !other.is_valid(None) {
            other.mine_step();
        }
        assert!(!chain.replace(1, other));

        let mut headerless = block.clone();
        headerless.body = None;
        assert!(chain.replace(1, headerless));
    }

    #[test]
    fn test_bodiless_indices() {
        let mut chain = Chain::new();
        let mut block = extend(&chain, 4);
        let body_hash = block.header.body_hash;
        block.body = None;
        chain.insert(1, Block::new_header_only(
            block.prev_hash,
            block.header.difficulty,
            body_hash,
            block.header.timestamp,
            block.header.entropy,
            block.nonce,
        ));
        assert_eq!(chain.bodiless_indices(), vec![1]);
    }
}
