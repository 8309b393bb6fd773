// Node configuration: compiled-in defaults overridable by environment
// variables, mirroring the teacher's `NetworkConfig` / `KNOTCOIN_*` overrides.

/// Port used for both framed peer TCP and peer UDP heartbeats.
pub const REQUEST_PORT: u16 = 10000;

/// Ingest port: newline-terminated binary blobs from external clients.
pub const INGEST_PORT: u16 = 9999;

/// Readback port: newline-terminated block-index queries.
pub const READBACK_PORT: u16 = 9998;

/// Seconds between PeerPool janitor sweeps.
pub const PEER_CLEANUP_INTERVAL_SECS: u64 = 30;

/// Seconds of silence before a peer is evicted (~3 missed heartbeats).
pub const PEER_TIMEOUT_SECS: u64 = 105;

/// Seconds between heartbeat broadcasts.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub request_port: u16,
    pub ingest_port: u16,
    pub readback_port: u16,
    pub heartbeat_interval_secs: u64,
    pub peer_timeout_secs: u64,
    pub peer_cleanup_interval_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            request_port: REQUEST_PORT,
            ingest_port: INGEST_PORT,
            readback_port: READBACK_PORT,
            heartbeat_interval_secs: HEARTBEAT_INTERVAL_SECS,
            peer_timeout_secs: PEER_TIMEOUT_SECS,
            peer_cleanup_interval_secs: PEER_CLEANUP_INTERVAL_SECS,
        }
    }
}

impl NodeConfig {
    /// Build a config from compiled-in defaults, applying `FLOATCHAIN_*`
    /// environment overrides the way the teacher's `knotcoind` applies
    /// `KNOTCOIN_RPC_PORT` / `KNOTCOIN_P2P_PORT`.
    pub fn from_env() -> Self {
        let mut cfg = NodeConfig::default();

        if let Some(v) = env_u16("FLOATCHAIN_REQUEST_PORT") {
            cfg.request_port = v;
        }
        if let Some(v) = env_u16("FLOATCHAIN_INGEST_PORT") {
            cfg.ingest_port = v;
        }
        if let Some(v) = env_u16("FLOATCHAIN_READBACK_PORT") {
            cfg.readback_port = v;
        }
        if let Some(v) = env_u64("FLOATCHAIN_HEARTBEAT_INTERVAL_SECS") {
            cfg.heartbeat_interval_secs = v;
        }

        cfg
    }
}

fn env_u16(key: &str) -> Option<u16> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
