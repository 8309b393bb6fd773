// Soft-state peer membership. Entries are refreshed by discovery heartbeats
// and purged by a janitor; there is no hard peer list, just a last-seen
// timestamp per (node_id, address) pair.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::Mutex;

use crate::log;

const TAG: &str = "peerpool";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerKey {
    pub node_id: u32,
    pub address: SocketAddr,
}

pub struct PeerPool {
    self_node_id: u32,
    peers: Mutex<HashMap<PeerKey, Instant>>,
}

impl PeerPool {
    pub fn new(self_node_id: u32) -> Self {
        PeerPool {
            self_node_id,
            peers: Mutex::new(HashMap::new()),
        }
    }

    pub async fn add(&self, node_id: u32, address: SocketAddr) {
        if node_id == self.self_node_id {
            return;
        }
        let key = PeerKey { node_id, address };
        self.peers.lock().await.insert(key, Instant::now());
    }

    pub async fn len(&self) -> usize {
        self.peers.lock().await.len()
    }

    /// Send `data` as a UDP datagram to every known peer's `port`.
    pub async fn multicast(&self, socket: &UdpSocket, data: &[u8], port: u16) {
        let peers = self.peers.lock().await;
        for key in peers.keys() {
            let mut target = key.address;
            target.set_port(port);
            if let Err(e) = socket.send_to(data, target).await {
                log::warn(TAG, format!("multicast to {target} failed: {e}"));
            }
        }
    }

    /// Evict entries not seen within `timeout`. Intended to be called
    /// periodically by a dedicated janitor task.
    pub async fn cleanup(&self, timeout: Duration) {
        let mut peers = self.peers.lock().await;
        let before = peers.len();
        peers.retain(|_, last_seen| last_seen.elapsed() < timeout);
        let evicted = before - peers.len();
        if evicted > 0 {
            log::info(TAG, format!("evicted {evicted} stale peer(s)"));
        }
    }

    /// Run the cleanup loop forever. One conforming task per node, per the
    /// concurrency model's `(e) a PeerPool janitor` requirement.
    pub async fn run_janitor(self: Arc<Self>, interval: Duration, timeout: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.cleanup(timeout).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_self_add_is_noop() {
        let pool = PeerPool::new(42);
        pool.add(42, "127.0.0.1:10000".parse().unwrap()).await;
        assert_eq!(pool.len().await, 0);
    }

    #[tokio::test]
    async fn test_add_and_cleanup() {
        let pool = PeerPool::new(1);
        pool.add(2, "127.0.0.1:10000".parse().unwrap()).await;
        assert_eq!(pool.len().await, 1);

        pool.cleanup(Duration::from_secs(0)).await;
        assert_eq!(pool.len().await, 0);
    }
}
