// Periodic UDP broadcast announcing node identity, so other nodes' discovery
// handlers can add this node to their PeerPool.

use std::time::Duration;

use tokio::net::UdpSocket;

use crate::log;
use crate::net::framing::encode_frame;
use crate::net::wire::{DiscoveryMessage, Request, RequestType};

const TAG: &str = "heartbeat";
const BROADCAST_ADDR: &str = "255.255.255.255";

pub struct Heartbeat {
    node_id: u32,
    port: u16,
}

impl Heartbeat {
    pub fn new(node_id: u32, port: u16) -> Self {
        Heartbeat { node_id, port }
    }

    fn announcement(&self) -> Vec<u8> {
        let req = Request::new(
            RequestType::Discovery,
            DiscoveryMessage { node_id: self.node_id }.encode(),
        );
        encode_frame(&req.encode())
    }

    /// Broadcast once. Caller owns the socket (shared with the framed UDP
    /// listener) so broadcast stays enabled for the socket's whole lifetime.
    pub async fn announce_once(&self, socket: &UdpSocket) {
        let target = format!("{BROADCAST_ADDR}:{}", self.port);
        if let Err(e) = socket.send_to(&self.announcement(), target).await {
            log::warn(TAG, format!("broadcast failed: {e}"));
        }
    }

    /// Run forever, broadcasting every `interval`. One conforming task per
    /// node, per the concurrency model's `(d) a heartbeat broadcaster`.
    pub async fn run(&self, socket: &UdpSocket, interval: Duration) -> ! {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            self.announce_once(socket).await;
        }
    }
}

/// Enable broadcast on a freshly bound socket. Must be set once, before any
/// broadcast send, matching the original prototype's socket setup.
pub fn enable_broadcast(socket: &UdpSocket) -> std::io::Result<()> {
    socket.set_broadcast(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_announcement_is_a_framed_discovery_request() {
        let hb = Heartbeat::new(7, 10000);
        let framed = hb.announcement();
        let payload = crate::net::framing::decode_datagram(&framed).unwrap();
        let req = Request::decode(payload).unwrap();
        assert_eq!(req.request_type, RequestType::Discovery);
        let discovery = DiscoveryMessage::decode(&req.request_message).unwrap();
        assert_eq!(discovery.node_id, 7);
    }
}
