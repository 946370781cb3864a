// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LVENC - NETWORK MODULE
//
// Peer-to-peer block propagation and synchronization.
// - framed ndjson wire protocol ({type, data} per line)
// - per-connection PeerSession with handshake and version gating
// - gossip/sync engine: latest announcements, chunked backfill,
//   chain replace with stateful replay
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod peer;
pub mod sync;
pub mod wire;

pub use peer::{
    evaluate_handshake, HandshakeConfig, HandshakeVerdict, NetError, PeerRegistry, PeerSession,
    SessionStats,
};
pub use sync::{plan_sync, GossipContext, SyncAction};
pub use wire::{Handshake, Message, VersionReject};
