pub mod framing;
pub mod heartbeat;
pub mod listeners;
pub mod peerpool;
pub mod router;
pub mod wire;

pub use peerpool::PeerPool;
pub use router::Router;
