// Glue: wires Miner, PeerPool, Heartbeat, Router and listeners together and
// drives the two-phase chain-resolution protocol from the initiator side.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream, UdpSocket};

use crate::config::NodeConfig;
use crate::consensus::genesis::verify_genesis;
use crate::consensus::Chain;
use crate::log;
use crate::miner::Miner;
use crate::net::framing;
use crate::net::heartbeat::{enable_broadcast, Heartbeat};
use crate::net::listeners;
use crate::net::router::Router;
use crate::net::wire::{BlockResolutionMessage, DiscoveryMessage, MinedBlockMessage, Request, RequestType};
use crate::net::PeerPool;
use crate::primitives::{BlobMessage, Block};

const TAG: &str = "node";

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("protocol violation: {0}")]
    Protocol(&'static str),
}

pub struct Node {
    pub node_id: u32,
    pub config: NodeConfig,
    pub miner: Arc<Miner>,
    pub peer_pool: Arc<PeerPool>,
    /// The UDP socket used for both heartbeat broadcast and gossip
    /// multicast; bound once in `run` (sockets can't be created outside
    /// an async/tokio context) and installed here for handlers to share.
    gossip_socket: OnceLock<Arc<UdpSocket>>,
    /// Handle onto the tokio runtime `run` was called from. The mining
    /// loop's mine-event callback fires from a plain OS thread (outside
    /// any runtime), so it needs this to spawn the gossip task.
    runtime: tokio::runtime::Handle,
}

impl Node {
    pub fn new(config: NodeConfig) -> Arc<Node> {
        let mut id_buf = [0u8; 4];
        getrandom::getrandom(&mut id_buf).expect("system RNG unavailable");
        let node_id = u32::from_le_bytes(id_buf);

        let node = Arc::new(Node {
            node_id,
            config,
            miner: Arc::new(Miner::new()),
            peer_pool: Arc::new(PeerPool::new(node_id)),
            gossip_socket: OnceLock::new(),
            runtime: tokio::runtime::Handle::current(),
        });

        let mined_node = node.clone();
        node.miner.on_mined(move |block, chain_cost| {
            let node = mined_node.clone();
            let block = block.clone();
            node.runtime.spawn(async move {
                node.block_mined(block, chain_cost).await;
            });
        });

        node
    }

    /// Render a block's body the way the readback port answers a query:
    /// `"<node_id> : " + to_ascii(body)`.
    pub fn to_ascii(&self, block: &Block) -> String {
        let body_text = match &block.body {
            None => "{}\n".to_string(),
            Some(body) if body.blobs.is_empty() => "{}\n".to_string(),
            Some(body) => {
                let mut s = String::from("{\n");
                for encoded in &body.blobs {
                    if let Ok(msg) = BlobMessage::decode(encoded) {
                        let decoded = String::from_utf8_lossy(&msg.blob);
                        s.push_str(&format!("\ttimestamp: {} blob: {}\n", msg.timestamp, decoded));
                    }
                }
                s.push_str("}\n");
                s
            }
        };
        format!("{} : {}", self.node_id, body_text)
    }

    /// Fired after a locally mined block has been appended to the current
    /// chain: encode and multicast it to every known peer.
    async fn block_mined(&self, block: Block, chain_cost: u64) {
        log::info(TAG, format!("mined block at cost {chain_cost}"));
        let msg = MinedBlockMessage { chain_cost, block };
        let request = Request::new(RequestType::MinedBlock, msg.encode());
        self.gossip(&request).await;
    }

    async fn gossip(&self, request: &Request) {
        if let Some(socket) = self.gossip_socket.get() {
            let framed = framing::encode_frame(&request.encode());
            self.peer_pool.multicast(socket, &framed, self.config.request_port).await;
        }
    }

    /// Admit an externally-submitted blob (ingest port) and gossip it.
    pub async fn ingest_blob(&self, timestamp: f64, blob: Vec<u8>) {
        let encoded = BlobMessage::new(timestamp, blob).encode();
        self.admit_and_gossip(encoded).await;
    }

    /// `handle_blob`: admit a peer-gossiped blob; re-gossip iff newly
    /// admitted (gossip terminates once every peer has already seen it).
    pub async fn handle_blob(&self, data: &[u8]) {
        self.admit_and_gossip(data.to_vec()).await;
    }

    async fn admit_and_gossip(&self, encoded: Vec<u8>) {
        if self.miner.add(encoded.clone()) {
            let request = Request::new(RequestType::Blob, encoded);
            self.gossip(&request).await;
        }
    }

    /// `handle_discovery`: record the announcing peer.
    pub async fn handle_discovery(&self, data: &[u8], client_addr: SocketAddr) {
        match DiscoveryMessage::decode(data) {
            Ok(msg) => self.peer_pool.add(msg.node_id, client_addr).await,
            Err(e) => log::warn(TAG, format!("bad discovery message from {client_addr}: {e}")),
        }
    }

    /// `handle_mined_block`: hand the block to the miner; if a new floating
    /// chain was spawned, drive resolution against the announcer.
    pub async fn handle_mined_block(self: &Arc<Self>, data: &[u8], client_addr: SocketAddr) {
        let msg = match MinedBlockMessage::decode(data) {
            Ok(m) => m,
            Err(e) => {
                log::warn(TAG, format!("bad mined-block message from {client_addr}: {e}"));
                return;
            }
        };
        if let Some(floating) = self.miner.receive_block(msg.block, msg.chain_cost) {
            let node = self.clone();
            tokio::spawn(async move {
                node.drive_resolution(floating, client_addr).await;
            });
        }
    }

    /// `handle_resolution`: respond with the current chain's headers-only
    /// snapshot, then keep serving BLOCK_RESOLUTION requests on the same
    /// connection.
    pub async fn handle_resolution(&self, mut stream: TcpStream, client_addr: SocketAddr) {
        let resolution_chain = self.miner.get_resolution_chain();
        if let Err(e) = framing::write_frame(&mut stream, &resolution_chain).await {
            log::warn(TAG, format!("resolution response to {client_addr} failed: {e}"));
            return;
        }

        loop {
            let data = match framing::read_frame(&mut stream).await {
                Ok(Some(d)) => d,
                Ok(None) => return,
                Err(e) => {
                    log::warn(TAG, format!("resolution stream from {client_addr} failed: {e}"));
                    return;
                }
            };
            let request = match Request::decode(&data) {
                Ok(r) if r.request_type == RequestType::BlockResolution => r,
                Ok(_) => {
                    log::warn(TAG, format!("{client_addr} sent a non-BLOCK_RESOLUTION frame mid-resolution"));
                    return;
                }
                Err(e) => {
                    log::warn(TAG, format!("bad resolution frame from {client_addr}: {e}"));
                    return;
                }
            };
            if !self.respond_to_block_resolution(&mut stream, &request.request_message).await {
                return;
            }
        }
    }

    /// `handle_block_resolution`: send each requested block's full
    /// encoding in order; an out-of-range index closes the connection
    /// mid-stream.
    async fn respond_to_block_resolution(&self, stream: &mut TcpStream, data: &[u8]) -> bool {
        let msg = match BlockResolutionMessage::decode(data) {
            Ok(m) => m,
            Err(e) => {
                log::warn(TAG, format!("bad BLOCK_RESOLUTION payload: {e}"));
                return false;
            }
        };
        for idx in msg.indices {
            let Some(encoded) = self.miner.get_resolution_block(idx as usize) else {
                return false;
            };
            if framing::write_frame(stream, &encoded).await.is_err() {
                return false;
            }
        }
        true
    }

    /// Resolution driver (initiator side): fetch the peer's header-only
    /// chain, merge it, then fetch bodies for the indices still missing.
    async fn drive_resolution(self: Arc<Self>, mut floating: Chain, peer_addr: SocketAddr) {
        let mut target = peer_addr;
        target.set_port(self.config.request_port);

        let mut stream = match TcpStream::connect(target).await {
            Ok(s) => s,
            Err(e) => {
                log::warn(TAG, format!("resolution connect to {target} failed: {e}"));
                self.miner.remove_floating_chain(&floating);
                return;
            }
        };

        let req = Request::new(RequestType::Resolution, Vec::new());
        if framing::write_frame(&mut stream, &req.encode()).await.is_err() {
            self.miner.remove_floating_chain(&floating);
            return;
        }

        let res_data = match framing::read_frame(&mut stream).await {
            Ok(Some(d)) => d,
            _ => {
                self.miner.remove_floating_chain(&floating);
                return;
            }
        };
        let res = match Chain::decode(&res_data) {
            Ok(c) => c,
            Err(e) => {
                log::warn(TAG, format!("bad resolution chain from {target}: {e}"));
                self.miner.remove_floating_chain(&floating);
                return;
            }
        };

        if !self.miner.receive_resolution_chain(&mut floating, &res) {
            return; // removed internally
        }

        let indices = self.miner.get_resolution_block_indices(&floating);
        if indices.is_empty() {
            self.miner.receive_complete_chain(floating);
            return;
        }

        let block_req = Request::new(
            RequestType::BlockResolution,
            BlockResolutionMessage {
                indices: indices.iter().map(|i| *i as u32).collect(),
            }
            .encode(),
        );
        if framing::write_frame(&mut stream, &block_req.encode()).await.is_err() {
            self.miner.remove_floating_chain(&floating);
            return;
        }

        for idx in indices {
            let data = match framing::read_frame(&mut stream).await {
                Ok(Some(d)) => d,
                _ => {
                    self.miner.remove_floating_chain(&floating);
                    return;
                }
            };
            let block = match Block::decode(&data) {
                Ok(b) => b,
                Err(e) => {
                    log::warn(TAG, format!("bad resolution block from {target}: {e}"));
                    self.miner.remove_floating_chain(&floating);
                    return;
                }
            };
            if !self.miner.receive_resolution_block(block, idx, &mut floating) {
                return; // removed internally
            }
        }

        self.miner.receive_complete_chain(floating);
    }
}

/// Bind every listener named by the external interfaces section, verify
/// genesis, and spawn every background task the concurrency model
/// requires. Returns once every task is spawned; the returned handles
/// stay alive for the process lifetime.
pub async fn run(config: NodeConfig) -> Result<Arc<Node>, NodeError> {
    if !verify_genesis() {
        panic!("genesis block failed its own difficulty predicate: configuration bug");
    }

    let node = Node::new(config.clone());

    let request_tcp = TcpListener::bind(("0.0.0.0", config.request_port)).await?;
    let request_udp = UdpSocket::bind(("0.0.0.0", config.request_port)).await?;
    enable_broadcast(&request_udp)?;
    let request_udp = Arc::new(request_udp);

    let ingest_tcp = TcpListener::bind(("0.0.0.0", config.ingest_port)).await?;
    let readback_tcp = TcpListener::bind(("0.0.0.0", config.readback_port)).await?;

    node.gossip_socket
        .set(request_udp.clone())
        .unwrap_or_else(|_| panic!("gossip socket already initialised"));

    let router = Arc::new(Router::new(node.clone()));

    {
        let miner = node.miner.clone();
        std::thread::Builder::new()
            .name("miner".into())
            .spawn(move || miner.run_sync())
            .expect("failed to spawn mining thread");
    }

    tokio::spawn(listeners::run_tcp_accept_loop(request_tcp, router.clone()));
    tokio::spawn(listeners::run_udp_receive_loop(request_udp.clone(), router));
    tokio::spawn(listeners::run_ingest_listener(ingest_tcp, node.clone()));
    tokio::spawn(listeners::run_readback_listener(readback_tcp, node.clone()));

    {
        let peer_pool = node.peer_pool.clone();
        let interval = std::time::Duration::from_secs(config.peer_cleanup_interval_secs);
        let timeout = std::time::Duration::from_secs(config.peer_timeout_secs);
        tokio::spawn(async move {
            peer_pool.run_janitor(interval, timeout).await;
        });
    }

    {
        let heartbeat = Heartbeat::new(node.node_id, node.config.request_port);
        let socket = request_udp;
        let interval = std::time::Duration::from_secs(node.config.heartbeat_interval_secs);
        tokio::spawn(async move {
            heartbeat.run(&socket, interval).await;
        });
    }

    Ok(node)
}
