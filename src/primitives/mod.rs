pub mod block;

pub use block::{BlobMessage, Block, BlockBody, BlockHeader};
