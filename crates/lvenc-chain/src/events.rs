// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LVENC - NODE EVENTS
//
// Bounded broadcast channel replacing ad-hoc callbacks. Observers that fall
// behind lose the OLDEST events (tokio broadcast lag semantics) — consensus
// never blocks on a slow subscriber.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use tokio::sync::broadcast;

/// Channel capacity. Beyond this, lagging receivers start dropping oldest.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    BlockAppended { index: u64, hash: String },
    ChainReplaced { new_height: u64 },
    TransactionAdded { id: String, from: String },
    StakingChanged,
}

/// Create the shared event channel.
pub fn channel() -> (broadcast::Sender<NodeEvent>, broadcast::Receiver<NodeEvent>) {
    broadcast::channel(EVENT_CHANNEL_CAPACITY)
}
