// Typed dispatch of incoming requests. The original jump-table-by-string
// becomes a plain match over `RequestType` — no runtime type inspection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;

use crate::log;
use crate::net::framing;
use crate::net::wire::{Request, RequestType};
use crate::node::Node;

const TAG: &str = "router";

pub struct Router {
    node: Arc<Node>,
}

impl Router {
    pub fn new(node: Arc<Node>) -> Self {
        Router { node }
    }

    fn decode(data: &[u8], client_addr: SocketAddr) -> Option<Request> {
        match Request::decode(data) {
            Ok(r) => Some(r),
            Err(e) => {
                log::warn(TAG, format!("decode failure from {client_addr}: {e}"));
                None
            }
        }
    }

    /// Dispatch a single complete frame arriving over UDP. RESOLUTION and
    /// BLOCK_RESOLUTION require a stateful TCP connection and are rejected
    /// here.
    pub async fn route_datagram(&self, data: &[u8], client_addr: SocketAddr) {
        let Some(request) = Self::decode(data, client_addr) else {
            return;
        };
        match request.request_type {
            RequestType::Blob => self.node.handle_blob(&request.request_message).await,
            RequestType::Discovery => {
                self.node.handle_discovery(&request.request_message, client_addr).await
            }
            RequestType::MinedBlock => {
                self.node
                    .handle_mined_block(&request.request_message, client_addr)
                    .await
            }
            RequestType::Resolution | RequestType::BlockResolution => {
                log::warn(TAG, format!("{client_addr} sent a resolution request over UDP, dropping"));
            }
        }
    }

    /// Dispatch the first frame of a fresh TCP connection. A RESOLUTION
    /// request hands the connection off to the multi-frame resolution
    /// responder; everything else is a single request/response.
    pub async fn route_connection(&self, mut stream: TcpStream, client_addr: SocketAddr) {
        let data = match framing::read_frame(&mut stream).await {
            Ok(Some(d)) => d,
            Ok(None) => return,
            Err(e) => {
                log::warn(TAG, format!("frame read from {client_addr} failed: {e}"));
                return;
            }
        };
        let Some(request) = Self::decode(&data, client_addr) else {
            return;
        };
        match request.request_type {
            RequestType::Blob => self.node.handle_blob(&request.request_message).await,
            RequestType::Discovery => {
                self.node.handle_discovery(&request.request_message, client_addr).await
            }
            RequestType::MinedBlock => {
                self.node
                    .handle_mined_block(&request.request_message, client_addr)
                    .await
            }
            RequestType::Resolution => self.node.handle_resolution(stream, client_addr).await,
            RequestType::BlockResolution => {
                log::warn(
                    TAG,
                    format!("{client_addr} sent BLOCK_RESOLUTION without a prior RESOLUTION, dropping"),
                );
            }
        }
    }
}
