// Mining loop, difficulty controller, current chain + floating chains. The
// nonce search is pure CPU and never suspends, so it runs on a blocking
// thread (`tokio::task::spawn_blocking`) guarded by plain `std::sync`
// mutexes rather than the teacher's `tokio::sync::Mutex` — there is no
// await point inside the critical sections here.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::consensus::genesis::GENESIS_DIFFICULTY;
use crate::consensus::Chain;
use crate::primitives::{Block, BlockBody};

const TARGET_BLOCK_SECONDS: f64 = 15.0;
const MIN_DELTA_SECONDS: f64 = 0.001;

pub type MineHandler = Box<dyn Fn(&Block, u64) + Send + Sync>;

struct ChainState {
    current: Chain,
    floating_chains: Vec<Chain>,
}

#[derive(Default)]
struct PendingBlobs {
    order: Vec<Vec<u8>>,
    set: HashSet<Vec<u8>>,
}

impl PendingBlobs {
    fn insert(&mut self, blob: Vec<u8>) -> bool {
        if self.set.insert(blob.clone()) {
            self.order.push(blob);
            true
        } else {
            false
        }
    }

    fn remove(&mut self, blob: &[u8]) {
        if self.set.remove(blob) {
            self.order.retain(|b| b != blob);
        }
    }

    fn snapshot(&self) -> Vec<Vec<u8>> {
        self.order.clone()
    }
}

pub struct Miner {
    chain_lock: Mutex<ChainState>,
    pending_blobs_lock: Mutex<PendingBlobs>,
    dirty: AtomicBool,
    handlers: Mutex<Vec<MineHandler>>,
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

fn random_entropy() -> u32 {
    let mut buf = [0u8; 4];
    getrandom::getrandom(&mut buf).expect("system RNG unavailable");
    u32::from_le_bytes(buf)
}

fn block_blob_hashes(block: &Block) -> Vec<Vec<u8>> {
    block
        .body
        .as_ref()
        .map(|b| b.blobs.clone())
        .unwrap_or_default()
}

/// A stable identity for a floating chain across the resolution protocol:
/// the head block's `(cur_hash, nonce)`. During resolution-chain merge,
/// missing ancestors are always spliced in *before* the head (see
/// `receive_resolution_chain`), so the head never moves — unlike the
/// chain's first block, which is the shared genesis for every floating
/// chain and so cannot distinguish between them.
fn head_key(chain: &Chain) -> Option<([u8; 32], u64)> {
    chain.head().map(|b| (b.cur_hash, b.nonce))
}

impl Miner {
    pub fn new() -> Self {
        Miner {
            chain_lock: Mutex::new(ChainState {
                current: Chain::new(),
                floating_chains: Vec::new(),
            }),
            pending_blobs_lock: Mutex::new(PendingBlobs::default()),
            dirty: AtomicBool::new(true),
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn on_mined(&self, handler: impl Fn(&Block, u64) + Send + Sync + 'static) {
        self.handlers.lock().unwrap().push(Box::new(handler));
    }

    /// Admit a pending blob. Dedup is by exact encoded bytes.
    pub fn add(&self, blob_encoded: Vec<u8>) -> bool {
        self.pending_blobs_lock.lock().unwrap().insert(blob_encoded)
    }

    pub fn current_cost(&self) -> u64 {
        self.chain_lock.lock().unwrap().current.cost
    }

    pub fn current_len(&self) -> usize {
        self.chain_lock.lock().unwrap().current.len()
    }

    pub fn get_block(&self, idx: usize) -> Option<Block> {
        self.chain_lock.lock().unwrap().current.blocks.get(idx).cloned()
    }

    pub fn get_resolution_chain(&self) -> Vec<u8> {
        self.chain_lock.lock().unwrap().current.encode(false)
    }

    pub fn get_resolution_block(&self, idx: usize) -> Option<Vec<u8>> {
        self.chain_lock
            .lock()
            .unwrap()
            .current
            .blocks
            .get(idx)
            .map(|b| b.encode(true))
    }

    pub fn get_resolution_block_indices(&self, floating: &Chain) -> Vec<usize> {
        floating.bodiless_indices()
    }

    /// Block the calling OS thread forever driving the mining loop. Run via
    /// `tokio::task::spawn_blocking`, never as a plain async task.
    pub fn run_sync(&self) -> ! {
        let mut candidate = self.build_candidate();

        loop {
            if !self.dirty.load(Ordering::SeqCst) {
                if candidate.is_valid(None) {
                    self.on_candidate_found(candidate);
                    candidate = self.build_candidate();
                    continue;
                }
                candidate.mine_step();
                continue;
            }

            // dirty: a concurrently accepted block invalidated this
            // candidate's predecessor. Discard the in-flight search.
            candidate = self.build_candidate();
        }
    }

    fn on_candidate_found(&self, block: Block) {
        let chain_cost;
        {
            let mut state = self.chain_lock.lock().unwrap();
            if self.dirty.load(Ordering::SeqCst) {
                // the chain moved under us between the validity check and
                // taking the lock; drop this candidate, the outer loop
                // rebuilds against the new head.
                return;
            }
            for blob in block_blob_hashes(&block) {
                self.pending_blobs_lock.lock().unwrap().remove(&blob);
            }
            state.current.add(block.clone());
            chain_cost = state.current.cost;
        }
        for handler in self.handlers.lock().unwrap().iter() {
            handler(&block, chain_cost);
        }
    }

    /// Build the next candidate against the current head. Holds
    /// `chain_lock` for the whole operation, including the final
    /// `dirty`-clear, so a `receive_block` racing in between sees either
    /// the old head with `dirty` still set, or the new candidate with
    /// `dirty` already cleared — never a candidate built from a head that
    /// a concurrent mutation then silently un-dirties.
    fn build_candidate(&self) -> Block {
        let state = self.chain_lock.lock().unwrap();
        let head = state.current.head().expect("chain always has genesis").clone();
        let now = now_secs();
        let difficulty = next_difficulty(&head, state.current.len(), now);
        let pending = self.pending_blobs_lock.lock().unwrap().snapshot();
        self.dirty.store(false, Ordering::SeqCst);
        drop(state);

        let body = BlockBody::new(pending);
        Block::new(head.link_hash(None), difficulty, body, now, random_entropy(), 0)
    }

    /// Process a peer-mined block. Returns a freshly created floating chain
    /// iff one was spawned; the caller must then drive resolution against
    /// the announcing peer.
    pub fn receive_block(&self, mut block: Block, advertised_cost: u64) -> Option<Chain> {
        let mut state = self.chain_lock.lock().unwrap();
        let my_head = state.current.head().cloned().expect("chain always has genesis");

        if block == my_head {
            return None;
        }

        let cur_cost = state.current.cost;
        if advertised_cost > cur_cost {
            let link = my_head.link_hash(None);
            if block.is_valid(Some(&link)) {
                block.set_previous_hash(link);
                state.current.add(block);
                self.dirty.store(true, Ordering::SeqCst);
                return None;
            }
            return attach_or_spawn_floating(&mut state, block, &self.dirty);
        }

        if advertised_cost == cur_cost {
            return attach_or_spawn_floating(&mut state, block, &self.dirty);
        }

        None
    }

    /// Merge a peer's header-only chain into `floating`, reusing bodies
    /// already present in the current chain where the blocks coincide.
    pub fn receive_resolution_chain(&self, floating: &mut Chain, res: &Chain) -> bool {
        let accept = {
            let state = self.chain_lock.lock().unwrap();
            let current = &state.current;
            let mut i = 1;
            while i < res.len() && (i >= floating.len() || floating.blocks[i] != res.blocks[i]) {
                if i < current.len() && current.blocks[i] == res.blocks[i] {
                    floating.insert(i, current.blocks[i].clone());
                } else {
                    let mut b = res.blocks[i].clone();
                    b.body = None;
                    floating.insert(i, b);
                }
                i += 1;
            }
            floating.is_valid() && floating.cost >= current.cost
        };
        if !accept {
            self.remove_floating_chain(floating);
        }
        accept
    }

    /// Supply the body for `floating.blocks[idx]`.
    pub fn receive_resolution_block(&self, mut block: Block, idx: usize, floating: &mut Chain) -> bool {
        if idx == 0 || idx >= floating.len() {
            self.remove_floating_chain(floating);
            return false;
        }
        let prev_link = floating.blocks[idx - 1].link_hash(None);
        if !block.is_valid(Some(&prev_link)) {
            self.remove_floating_chain(floating);
            return false;
        }
        block.set_previous_hash(prev_link);
        let ok = floating.replace(idx, block);
        if !ok {
            self.remove_floating_chain(floating);
        }
        ok
    }

    /// Promote a completed floating chain to current if its cost still
    /// exceeds current's; reconcile `pending` either way and drop the
    /// candidate from `floating_chains`.
    pub fn receive_complete_chain(&self, candidate: Chain) {
        let key = head_key(&candidate);
        let mut state = self.chain_lock.lock().unwrap();

        if candidate.cost > state.current.cost {
            let displaced = std::mem::replace(&mut state.current, candidate);
            self.dirty.store(true, Ordering::SeqCst);

            let mut pending = self.pending_blobs_lock.lock().unwrap();
            for block in &displaced.blocks {
                for blob in block_blob_hashes(block) {
                    pending.insert(blob);
                }
            }
            for block in &state.current.blocks {
                for blob in block_blob_hashes(block) {
                    pending.remove(&blob);
                }
            }
        }

        if let Some(key) = key {
            state.floating_chains.retain(|fc| head_key(fc) != Some(key));
        }
    }

    pub fn remove_floating_chain(&self, floating: &Chain) {
        if let Some(key) = head_key(floating) {
            let mut state = self.chain_lock.lock().unwrap();
            state.floating_chains.retain(|fc| head_key(fc) != Some(key));
        }
    }
}

impl Default for Miner {
    fn default() -> Self {
        Miner::new()
    }
}

/// Iterate existing floating candidates; extend one whose head the block
/// extends, dropping duplicates; else start a new floating chain.
fn attach_or_spawn_floating(state: &mut ChainState, block: Block, dirty: &AtomicBool) -> Option<Chain> {
    for i in 0..state.floating_chains.len() {
        if state.floating_chains[i].blocks.iter().any(|b| *b == block) {
            return None;
        }
        let head = state.floating_chains[i].head().unwrap().clone();
        let link = head.link_hash(None);
        if block.is_valid(Some(&link)) {
            let mut b = block;
            b.set_previous_hash(link);
            state.floating_chains[i].add(b);
            if state.floating_chains[i].is_complete() {
                let candidate = state.floating_chains[i].clone();
                promote_locked(state, candidate, dirty);
            }
            return None;
        }
    }

    // A fresh floating chain starts from genesis, same as the current
    // chain, so its cost is directly comparable to `current.cost` and the
    // merge loop below can align indices against both `current` and `res`.
    let mut new_chain = Chain::new();
    new_chain.add(block);
    state.floating_chains.push(new_chain.clone());
    Some(new_chain)
}

fn promote_locked(state: &mut ChainState, candidate: Chain, dirty: &AtomicBool) {
    let key = head_key(&candidate);
    if candidate.cost > state.current.cost {
        state.current = candidate;
        dirty.store(true, Ordering::SeqCst);
    }
    if let Some(key) = key {
        state.floating_chains.retain(|fc| head_key(fc) != Some(key));
    }
}

/// `next = round(prev.difficulty + 0.1 * log2(TARGET / delta))`, clamped
/// below by 1. Genesis-only chains reuse the genesis difficulty.
fn next_difficulty(last: &Block, chain_len: usize, now: f64) -> u32 {
    if chain_len <= 1 {
        return GENESIS_DIFFICULTY;
    }
    let delta = (now - last.header.timestamp).max(MIN_DELTA_SECONDS);
    let adjustment = 0.1 * (TARGET_BLOCK_SECONDS / delta).log2();
    let next = (last.header.difficulty as f64 + adjustment).round();
    if next < 1.0 {
        1
    } else {
        next as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mined_block(prev_hash: [u8; 32], difficulty: u32, nonce_seed: u64) -> Block {
        let mut block = Block::new(prev_hash, difficulty, BlockBody::empty(), now_secs(), 0, nonce_seed);
        while !block.is_valid(None) {
            block.mine_step();
        }
        block
    }

    #[test]
    fn test_blob_admission_idempotence() {
        let miner = Miner::new();
        assert!(miner.add(b"x".to_vec()));
        assert!(!miner.add(b"x".to_vec()));
    }

    #[test]
    fn test_receive_block_simple_extension() {
        let miner = Miner::new();
        let head = miner.get_block(0).unwrap();
        let link = head.link_hash(None);
        let block = mined_block(link, 4, 0);
        let cost_before = miner.current_cost();

        let spawned = miner.receive_block(block, cost_before + (1u64 << 4));
        assert!(spawned.is_none());
        assert_eq!(miner.current_len(), 2);
    }

    #[test]
    fn test_receive_block_duplicate_is_ignored() {
        let miner = Miner::new();
        let head = miner.get_block(0).unwrap();
        let link = head.link_hash(None);
        let block = mined_block(link, 4, 0);
        let cost = miner.current_cost() + (1u64 << 4);

        miner.receive_block(block.clone(), cost);
        let spawned_again = miner.receive_block(block, cost);
        assert!(spawned_again.is_none());
        assert_eq!(miner.current_len(), 2);
    }

    #[test]
    fn test_receive_block_spawns_floating_chain_on_fork() {
        let miner = Miner::new();
        let genesis = miner.get_block(0).unwrap();
        let unrelated = mined_block([7u8; 32], 4, 0);
        let spawned = miner.receive_block(unrelated, genesis.header.difficulty as u64 * 2 + 10_000_000);
        assert!(spawned.is_some());
        assert_eq!(miner.current_len(), 1);
    }

    #[test]
    fn test_difficulty_controller_reuses_genesis_at_len_one() {
        let genesis = Block::new([0u8; 32], GENESIS_DIFFICULTY, BlockBody::empty(), 0.0, 0, 0);
        assert_eq!(next_difficulty(&genesis, 1, 100.0), GENESIS_DIFFICULTY);
    }

    #[test]
    fn test_difficulty_controller_clamps_floor() {
        let mut block = Block::new([0u8; 32], 1, BlockBody::empty(), 1000.0, 0, 0);
        block.header.difficulty = 1;
        // now <= last timestamp: delta would be <= 0 without the floor clamp
        let next = next_difficulty(&block, 2, 1000.0);
        assert!(next >= 1);
    }
}
