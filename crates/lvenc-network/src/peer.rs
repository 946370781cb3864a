// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LVENC - PEER SESSION
//
// One TCP connection to one peer: newline-delimited JSON frames, the
// handshake state machine with version gating, and per-session counters.
// Messages from a single peer are processed strictly in arrival order;
// nothing here ever touches chain state directly.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::wire::{Handshake, Message, VersionReject};
use lvenc_core::params::{MIN_PROTOCOL_VERSION, PEER_TIMEOUT_SECS, PROTOCOL_VERSION};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

#[derive(Debug, Error)]
pub enum NetError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed frame: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("peer timed out")]
    Timeout,
    #[error("peer closed the connection")]
    Closed,
    #[error("peer is on a different chain")]
    ChainMismatch,
    #[error("peer has a different genesis block")]
    GenesisMismatch,
    #[error("peer rejected our protocol version: {0}")]
    RejectedByPeer(String),
    #[error("peer protocol too old: {0}")]
    PeerTooOld(u32),
    #[error("local protocol outdated and grace window expired")]
    LocalOutdated,
    #[error("expected HANDSHAKE, got something else")]
    BadHandshake,
}

/// Local identity advertised in our HANDSHAKE.
#[derive(Debug, Clone)]
pub struct HandshakeConfig {
    pub node_id: String,
    pub chain_id: String,
    pub genesis_hash: String,
    pub node_version: String,
    pub block_height: u64,
    pub reward_address: String,
    pub grace_until_block: u64,
}

impl HandshakeConfig {
    pub fn to_handshake(&self) -> Handshake {
        Handshake {
            node_id: self.node_id.clone(),
            protocol_version: PROTOCOL_VERSION,
            min_protocol_version: MIN_PROTOCOL_VERSION,
            grace_until_block: self.grace_until_block,
            chain_id: self.chain_id.clone(),
            genesis_hash: self.genesis_hash.clone(),
            node_version: self.node_version.clone(),
            block_height: self.block_height,
            reward_address: self.reward_address.clone(),
        }
    }
}

/// Outcome of comparing the two handshakes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeVerdict {
    Accept,
    /// Legacy peer admitted because our grace window is still open.
    AcceptLegacy,
    /// Peer must be told to upgrade, then disconnected.
    Reject(VersionReject),
    /// Hard mismatch (chain/genesis) — disconnect without ceremony.
    Incompatible(&'static str),
}

/// Pure handshake gating logic, kept free of I/O so every
/// branch is unit-testable.
pub fn evaluate_handshake(ours: &Handshake, theirs: &Handshake) -> HandshakeVerdict {
    if theirs.chain_id != ours.chain_id {
        return HandshakeVerdict::Incompatible("chainId mismatch");
    }
    if theirs.genesis_hash != ours.genesis_hash {
        return HandshakeVerdict::Incompatible("genesis mismatch");
    }

    if theirs.protocol_version < ours.min_protocol_version {
        if ours.block_height < ours.grace_until_block {
            return HandshakeVerdict::AcceptLegacy;
        }
        return HandshakeVerdict::Reject(VersionReject {
            error_code: "PROTOCOL_TOO_OLD".to_string(),
            current_version: theirs.protocol_version,
            required_version: ours.min_protocol_version,
            grace_until_block: ours.grace_until_block,
            recommended_action: "upgrade the node software".to_string(),
        });
    }

    // We are the outdated side: once our own grace expires, refuse to talk.
    if ours.protocol_version < theirs.min_protocol_version
        && ours.block_height >= ours.grace_until_block
    {
        return HandshakeVerdict::Incompatible("local protocol outdated");
    }

    HandshakeVerdict::Accept
}

#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub established_at: u64,
    pub last_activity: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub struct PeerSession {
    pub addr: String,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    pub stats: SessionStats,
    /// Peer identity, populated once the handshake succeeds.
    pub remote: Option<Handshake>,
    line_buf: String,
}

impl PeerSession {
    pub async fn connect(addr: &str) -> Result<Self, NetError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream, addr.to_string()))
    }

    pub fn from_stream(stream: TcpStream, addr: String) -> Self {
        let (read_half, write_half) = stream.into_split();
        PeerSession {
            addr,
            reader: BufReader::new(read_half),
            writer: write_half,
            stats: SessionStats {
                established_at: now_secs(),
                last_activity: now_secs(),
                ..Default::default()
            },
            remote: None,
            line_buf: String::new(),
        }
    }

    pub fn peer_id(&self) -> Option<&str> {
        self.remote.as_ref().map(|h| h.node_id.as_str())
    }

    pub async fn send(&mut self, msg: &Message) -> Result<(), NetError> {
        let frame = msg.to_frame()?;
        self.writer.write_all(frame.as_bytes()).await?;
        self.writer.flush().await?;
        self.stats.messages_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;
        self.stats.last_activity = now_secs();
        Ok(())
    }

    /// Read one frame. `Ok(None)` means the peer closed cleanly.
    pub async fn recv(&mut self) -> Result<Option<Message>, NetError> {
        self.line_buf.clear();
        let n = self.reader.read_line(&mut self.line_buf).await?;
        if n == 0 {
            return Ok(None);
        }
        self.stats.messages_received += 1;
        self.stats.bytes_received += n as u64;
        self.stats.last_activity = now_secs();
        Ok(Some(Message::from_line(&self.line_buf)?))
    }

    /// Read one frame within the protocol timeout window.
    pub async fn recv_timeout(&mut self) -> Result<Option<Message>, NetError> {
        tokio::time::timeout(Duration::from_secs(PEER_TIMEOUT_SECS), self.recv())
            .await
            .map_err(|_| NetError::Timeout)?
    }

    /// Run the handshake: send ours, read theirs, gate versions.
    /// Returns the peer handshake and whether it was a legacy admit.
    pub async fn handshake(&mut self, cfg: &HandshakeConfig) -> Result<(Handshake, bool), NetError> {
        let ours = cfg.to_handshake();
        self.send(&Message::Handshake(ours.clone())).await?;

        let theirs = match self.recv_timeout().await? {
            None => return Err(NetError::Closed),
            Some(Message::Handshake(h)) => h,
            Some(Message::VersionReject(vr)) => {
                return Err(NetError::RejectedByPeer(vr.error_code));
            }
            Some(_) => return Err(NetError::BadHandshake),
        };

        match evaluate_handshake(&ours, &theirs) {
            HandshakeVerdict::Accept => {
                self.remote = Some(theirs.clone());
                Ok((theirs, false))
            }
            HandshakeVerdict::AcceptLegacy => {
                log::info!(
                    "admitting legacy peer {} (v{}) under grace window",
                    theirs.node_id,
                    theirs.protocol_version
                );
                self.remote = Some(theirs.clone());
                Ok((theirs, true))
            }
            HandshakeVerdict::Reject(reject) => {
                let version = reject.current_version;
                let _ = self.send(&Message::VersionReject(reject)).await;
                Err(NetError::PeerTooOld(version))
            }
            HandshakeVerdict::Incompatible("chainId mismatch") => Err(NetError::ChainMismatch),
            HandshakeVerdict::Incompatible("genesis mismatch") => Err(NetError::GenesisMismatch),
            HandshakeVerdict::Incompatible(_) => Err(NetError::LocalOutdated),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// PEER REGISTRY (deprioritization)
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerRecord {
    pub address: String,
    pub timeouts: u32,
    pub deprioritized: bool,
    pub last_seen: u64,
}

/// Known peers, ordered for dialing: responsive peers first, deprioritized
/// (timed-out) peers last.
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    peers: BTreeMap<String, PeerRecord>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, address: &str) {
        self.peers
            .entry(address.to_string())
            .or_insert_with(|| PeerRecord {
                address: address.to_string(),
                ..Default::default()
            });
    }

    pub fn note_success(&mut self, address: &str) {
        let record = self
            .peers
            .entry(address.to_string())
            .or_insert_with(|| PeerRecord {
                address: address.to_string(),
                ..Default::default()
            });
        record.timeouts = 0;
        record.deprioritized = false;
        record.last_seen = now_secs();
    }

    pub fn note_timeout(&mut self, address: &str) {
        let record = self
            .peers
            .entry(address.to_string())
            .or_insert_with(|| PeerRecord {
                address: address.to_string(),
                ..Default::default()
            });
        record.timeouts += 1;
        record.deprioritized = true;
    }

    pub fn is_deprioritized(&self, address: &str) -> bool {
        self.peers.get(address).is_some_and(|r| r.deprioritized)
    }

    /// Dial order: healthy peers first, then deprioritized ones.
    pub fn dial_order(&self) -> Vec<String> {
        let mut healthy: Vec<String> = Vec::new();
        let mut penalized: Vec<String> = Vec::new();
        for record in self.peers.values() {
            if record.deprioritized {
                penalized.push(record.address.clone());
            } else {
                healthy.push(record.address.clone());
            }
        }
        healthy.extend(penalized);
        healthy
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lvenc_core::params::chain_id;
    use lvenc_core::Network;
    use tokio::net::TcpListener;

    fn config(height: u64, grace: u64) -> HandshakeConfig {
        HandshakeConfig {
            node_id: "tLVEaa00000000000000000000000000000000000001".to_string(),
            chain_id: chain_id(Network::Testnet).to_string(),
            genesis_hash: "genesis-hash".to_string(),
            node_version: "1.0.0".to_string(),
            block_height: height,
            reward_address: "tLVEaa00000000000000000000000000000000000001".to_string(),
            grace_until_block: grace,
        }
    }

    #[test]
    fn test_handshake_accepts_same_version() {
        let ours = config(10, 100).to_handshake();
        let theirs = config(12, 100).to_handshake();
        assert_eq!(evaluate_handshake(&ours, &theirs), HandshakeVerdict::Accept);
    }

    #[test]
    fn test_handshake_rejects_wrong_chain() {
        let ours = config(10, 100).to_handshake();
        let mut theirs = config(10, 100).to_handshake();
        theirs.chain_id = chain_id(Network::Mainnet).to_string();
        assert_eq!(
            evaluate_handshake(&ours, &theirs),
            HandshakeVerdict::Incompatible("chainId mismatch")
        );
    }

    #[test]
    fn test_handshake_rejects_wrong_genesis() {
        let ours = config(10, 100).to_handshake();
        let mut theirs = config(10, 100).to_handshake();
        theirs.genesis_hash = "other".to_string();
        assert_eq!(
            evaluate_handshake(&ours, &theirs),
            HandshakeVerdict::Incompatible("genesis mismatch")
        );
    }

    #[test]
    fn test_handshake_legacy_peer_grace_window() {
        let ours = config(10, 100).to_handshake();
        let mut theirs = config(10, 100).to_handshake();
        theirs.protocol_version = 0; // older than MIN_PROTOCOL_VERSION

        // Inside the grace window: admit and log
        assert_eq!(
            evaluate_handshake(&ours, &theirs),
            HandshakeVerdict::AcceptLegacy
        );

        // Grace expired: structured rejection
        let ours_expired = config(100, 100).to_handshake();
        match evaluate_handshake(&ours_expired, &theirs) {
            HandshakeVerdict::Reject(vr) => {
                assert_eq!(vr.error_code, "PROTOCOL_TOO_OLD");
                assert_eq!(vr.required_version, MIN_PROTOCOL_VERSION);
            }
            other => panic!("expected Reject, got {:?}", other),
        }
    }

    #[test]
    fn test_handshake_local_outdated_refuses_after_grace() {
        let ours = config(200, 100).to_handshake();
        let mut theirs = config(200, 100).to_handshake();
        theirs.min_protocol_version = PROTOCOL_VERSION + 1;
        assert_eq!(
            evaluate_handshake(&ours, &theirs),
            HandshakeVerdict::Incompatible("local protocol outdated")
        );

        // Inside grace we still talk (the peer decides whether to keep us)
        let ours_grace = config(10, 100).to_handshake();
        assert_eq!(
            evaluate_handshake(&ours_grace, &theirs),
            HandshakeVerdict::Accept
        );
    }

    #[tokio::test]
    async fn test_loopback_handshake_and_framing() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_cfg = config(5, 100);
        let client_cfg = config(3, 100);

        let server = tokio::spawn(async move {
            let (stream, peer_addr) = listener.accept().await.unwrap();
            let mut session = PeerSession::from_stream(stream, peer_addr.to_string());
            let (remote, legacy) = session.handshake(&server_cfg).await.unwrap();
            assert!(!legacy);
            assert_eq!(remote.block_height, 3);

            // Serve one query to exercise framing both ways
            match session.recv_timeout().await.unwrap() {
                Some(Message::QueryLatest) => {}
                other => panic!("expected QUERY_LATEST, got {:?}", other),
            }
            session
                .send(&Message::QueryBlocksFrom {
                    start_index: 1,
                    limit: 10,
                })
                .await
                .unwrap();
        });

        let mut client = PeerSession::connect(&addr.to_string()).await.unwrap();
        let (remote, legacy) = client.handshake(&client_cfg).await.unwrap();
        assert!(!legacy);
        assert_eq!(remote.block_height, 5);
        assert_eq!(client.peer_id(), Some(remote.node_id.as_str()));

        client.send(&Message::QueryLatest).await.unwrap();
        match client.recv_timeout().await.unwrap() {
            Some(Message::QueryBlocksFrom { start_index, limit }) => {
                assert_eq!((start_index, limit), (1, 10));
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(client.stats.messages_sent >= 2);
        assert!(client.stats.bytes_received > 0);
        server.await.unwrap();
    }

    #[test]
    fn test_registry_deprioritizes_timeouts() {
        let mut registry = PeerRegistry::new();
        registry.add("10.0.0.1:9000");
        registry.add("10.0.0.2:9000");
        registry.note_timeout("10.0.0.1:9000");

        assert!(registry.is_deprioritized("10.0.0.1:9000"));
        assert_eq!(
            registry.dial_order(),
            vec!["10.0.0.2:9000".to_string(), "10.0.0.1:9000".to_string()]
        );

        registry.note_success("10.0.0.1:9000");
        assert!(!registry.is_deprioritized("10.0.0.1:9000"));
    }
}
