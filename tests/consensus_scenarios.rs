// End-to-end scenarios exercised purely through the Miner/Chain API —
// no sockets involved, since these are the consensus-level behaviors the
// protocol demands regardless of transport.

use floatchain::consensus::Chain;
use floatchain::miner::Miner;
use floatchain::primitives::{Block, BlockBody, BlobMessage};

fn mine_to_valid(mut block: Block) -> Block {
    while !block.is_valid(None) {
        block.mine_step();
    }
    block
}

#[test]
fn genesis_scenario() {
    let chain = Chain::new();
    assert_eq!(chain.len(), 1);
    assert!(chain.is_valid());
    assert_eq!(chain.cost, 4_194_304);
}

#[test]
fn mine_one_block_at_difficulty_four() {
    let miner = Miner::new();
    assert!(miner.add(BlobMessage::new(1.0, b"hello".to_vec()).encode()));

    let genesis = miner.get_block(0).unwrap();
    let link = genesis.link_hash(None);
    let pending = vec![BlobMessage::new(1.0, b"hello".to_vec()).encode()];
    let block = mine_to_valid(Block::new(link, 4, BlockBody::new(pending), 2.0, 0, 0));

    let cost_before = miner.current_cost();
    let spawned = miner.receive_block(block, cost_before + (1u64 << 4));
    assert!(spawned.is_none());
    assert_eq!(miner.current_cost(), cost_before + 16);

    let mined = miner.get_block(1).unwrap();
    let body = mined.body.as_ref().unwrap();
    assert_eq!(body.blobs.len(), 1);
    let blob = BlobMessage::decode(&body.blobs[0]).unwrap();
    assert_eq!(blob.blob, b"hello");
}

#[test]
fn gossip_dedup_produces_no_change() {
    let miner = Miner::new();
    let genesis = miner.get_block(0).unwrap();
    let link = genesis.link_hash(None);
    let block = mine_to_valid(Block::new(link, 4, BlockBody::empty(), 1.0, 0, 0));
    let advertised = miner.current_cost() + (1u64 << 4);

    assert!(miner.receive_block(block.clone(), advertised).is_none());
    let len_after_first = miner.current_len();

    assert!(miner.receive_block(block, advertised).is_none());
    assert_eq!(miner.current_len(), len_after_first);
}

#[test]
fn simple_extension_sets_no_floating_chain() {
    let miner = Miner::new();
    let genesis = miner.get_block(0).unwrap();
    let link = genesis.link_hash(None);
    let block = mine_to_valid(Block::new(link, 4, BlockBody::empty(), 1.0, 0, 0));
    let advertised = miner.current_cost() + (1u64 << 4);

    let spawned = miner.receive_block(block, advertised);
    assert!(spawned.is_none());
    assert_eq!(miner.current_len(), 2);
}

#[test]
fn chain_resolution_happy_path() {
    // Build a 4-block reference chain the way peer A would have it.
    let mut reference = Chain::new();
    for i in 0..3 {
        let head = reference.head().unwrap();
        let link = head.link_hash(None);
        let block = mine_to_valid(Block::new(link, 4, BlockBody::empty(), 10.0 + i as f64, 0, 0));
        reference.add(block);
    }
    assert_eq!(reference.len(), 4);

    // B only has genesis + one block.
    let b = Miner::new();
    let b_head = b.get_block(0).unwrap();
    let b_link = b_head.link_hash(None);
    let b_block = mine_to_valid(Block::new(b_link, 4, BlockBody::empty(), 10.0, 0, 0));
    b.receive_block(b_block, b.current_cost() + 16);
    assert_eq!(b.current_len(), 2);

    // A's block 4 (index 3) arrives with higher advertised cost, spawning
    // a floating chain on B since it doesn't extend B's head.
    let a_block_3 = reference.blocks[3].clone();
    let spawned = b.receive_block(a_block_3, reference.cost);
    let mut floating = spawned.expect("fork should spawn a floating chain");

    // Resolution: A's header-only chain drives the merge.
    let res = Chain::decode(&reference.encode(false)).unwrap();
    assert!(b.receive_resolution_chain(&mut floating, &res));

    let indices = b.get_resolution_block_indices(&floating);
    for idx in indices {
        let encoded = reference.blocks[idx].encode(true);
        let full_block = Block::decode(&encoded).unwrap();
        assert!(b.receive_resolution_block(full_block, idx, &mut floating));
    }

    b.receive_complete_chain(floating);
    assert_eq!(b.current_len(), reference.len());
    assert_eq!(b.current_cost(), reference.cost);
}

#[test]
fn resolution_abort_on_missing_body_removes_floating_chain() {
    let mut reference = Chain::new();
    for i in 0..3 {
        let head = reference.head().unwrap();
        let link = head.link_hash(None);
        let block = mine_to_valid(Block::new(link, 4, BlockBody::empty(), 20.0 + i as f64, 0, 0));
        reference.add(block);
    }

    let b = Miner::new();
    let a_block_3 = reference.blocks[3].clone();
    let spawned = b.receive_block(a_block_3, reference.cost);
    let mut floating = spawned.expect("fork should spawn a floating chain");

    let res = Chain::decode(&reference.encode(false)).unwrap();
    assert!(b.receive_resolution_chain(&mut floating, &res));

    // Peer "closes the socket" before the first segment arrives: simulate
    // with an out-of-range index, the same deterministic abort condition
    // `handle_block_resolution` triggers on a bad request.
    let out_of_range = floating.len();
    let bogus = mine_to_valid(Block::new([9u8; 32], 20, BlockBody::empty(), 0.0, 0, 0));
    assert!(!b.receive_resolution_block(bogus, out_of_range, &mut floating));

    // current chain is unchanged.
    assert_eq!(b.current_len(), 1);
}
