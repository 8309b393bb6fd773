// TCP/UDP accept loops. Framed peer traffic (TCP connections, UDP
// datagrams) is routed through `Router`; the ingest and readback ports are
// boundary collaborators with external clients — thin glue, specified only
// by their external line-oriented contract (see spec's external interfaces).

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, UdpSocket};

use crate::log;
use crate::net::framing;
use crate::net::router::Router;
use crate::node::Node;

const TAG: &str = "listeners";

/// Accept loop for framed peer TCP: one task per connection, per the
/// concurrency model's requirement (b).
pub async fn run_tcp_accept_loop(listener: TcpListener, router: Arc<Router>) -> ! {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let router = router.clone();
                tokio::spawn(async move {
                    router.route_connection(stream, addr).await;
                });
            }
            Err(e) => log::warn(TAG, format!("tcp accept failed: {e}")),
        }
    }
}

/// Receive loop for framed peer UDP: one task per datagram, per the
/// concurrency model's requirement (c).
pub async fn run_udp_receive_loop(socket: Arc<UdpSocket>, router: Arc<Router>) -> ! {
    let mut buf = vec![0u8; framing::MAX_FRAME + 4];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((n, addr)) => {
                let Some(payload) = framing::decode_datagram(&buf[..n]) else {
                    log::warn(TAG, format!("malformed datagram from {addr}"));
                    continue;
                };
                let payload = payload.to_vec();
                let router = router.clone();
                tokio::spawn(async move {
                    router.route_datagram(&payload, addr).await;
                });
            }
            Err(e) => log::warn(TAG, format!("udp recv failed: {e}")),
        }
    }
}

/// Ingest port: newline-terminated binary blobs from external clients.
/// Out of the core's engineering scope; specified only by this contract.
pub async fn run_ingest_listener(listener: TcpListener, node: Arc<Node>) -> ! {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let node = node.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_ingest_connection(stream, &node).await {
                        log::warn(TAG, format!("ingest connection {addr} ended: {e}"));
                    }
                });
            }
            Err(e) => log::warn(TAG, format!("ingest accept failed: {e}")),
        }
    }
}

async fn serve_ingest_connection(stream: tokio::net::TcpStream, node: &Arc<Node>) -> std::io::Result<()> {
    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        node.ingest_blob(timestamp, line.into_bytes()).await;
    }
    Ok(())
}

/// Readback port: newline-terminated decimal block index, answered with an
/// ASCII dump of that block's body.
pub async fn run_readback_listener(listener: TcpListener, node: Arc<Node>) -> ! {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let node = node.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_readback_connection(stream, &node).await {
                        log::warn(TAG, format!("readback connection {addr} ended: {e}"));
                    }
                });
            }
            Err(e) => log::warn(TAG, format!("readback accept failed: {e}")),
        }
    }
}

async fn serve_readback_connection(stream: tokio::net::TcpStream, node: &Arc<Node>) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    while let Some(line) = lines.next_line().await? {
        let response = match line.trim().parse::<usize>() {
            Ok(idx) => match node.miner.get_block(idx) {
                Some(block) => node.to_ascii(&block),
                None => "Index out of bounds.\n".to_string(),
            },
            Err(_) => "Error: Expected an integer.\n".to_string(),
        };
        write_half.write_all(response.as_bytes()).await?;
    }
    Ok(())
}
