pub mod miner;

pub use miner::{MineHandler, Miner};
