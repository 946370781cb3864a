// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LVENC - GOSSIP & SYNC ENGINE
//
// Decides how to react to peer announcements and serves sync queries.
// Policy on a higher latest block:
// - direct successor        → validate and append
// - gap > CHUNK_SIZE        → chunked backfill via QUERY_BLOCKS_FROM
// - small multi-block gap   → full chain replace (stateful replay)
// All chain mutations happen under the single chain mutex — the
// chain-mutation token of the concurrency model.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::wire::Message;
use lvenc_chain::Chain;
use lvenc_core::params::{chain_id, CHUNK_SIZE, MAX_BLOCKS_PER_REQUEST};
use lvenc_core::{Block, Transaction};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// What to do about a peer's (higher) latest block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Not ahead of us — nothing to do.
    Ignore,
    /// Direct successor of our tip: validate and append.
    AppendDirect,
    /// Peer is far ahead: fetch chunks starting at our height + 1.
    ChunkedBackfill { start: u64 },
    /// Small multi-block gap: request the full chain and replace.
    ReplaceChain,
}

/// Pure sync policy — free of I/O and locks for testability.
pub fn plan_sync(local_height: u64, local_tip_hash: &str, incoming: &Block) -> SyncAction {
    if incoming.index <= local_height {
        return SyncAction::Ignore;
    }
    if incoming.index == local_height + 1 && incoming.previous_hash == local_tip_hash {
        return SyncAction::AppendDirect;
    }
    if incoming.index - local_height > CHUNK_SIZE {
        return SyncAction::ChunkedBackfill {
            start: local_height + 1,
        };
    }
    SyncAction::ReplaceChain
}

/// Shared context every peer task dispatches into.
#[derive(Clone)]
pub struct GossipContext {
    pub chain: Arc<Mutex<Chain>>,
    /// Set once backfill reaches the network tip; the producer only runs
    /// on a synced node.
    pub synced: Arc<AtomicBool>,
    /// Incoming NEW_TX frames are handed to mempool admission.
    pub tx_sink: mpsc::Sender<Transaction>,
}

impl GossipContext {
    pub fn new(
        chain: Arc<Mutex<Chain>>,
        synced: Arc<AtomicBool>,
        tx_sink: mpsc::Sender<Transaction>,
    ) -> Self {
        GossipContext {
            chain,
            synced,
            tx_sink,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }

    /// Handle one inbound frame and return the frames to send back on the
    /// same connection. Protocol errors never propagate into chain state —
    /// they are logged and the offending message dropped.
    pub async fn handle_message(&self, msg: Message) -> Vec<Message> {
        match msg {
            Message::QueryLatest => {
                let chain = self.chain.lock().await;
                vec![Message::ResponseLatest {
                    block: chain.tip().clone(),
                }]
            }
            Message::QueryAll => {
                let chain = self.chain.lock().await;
                vec![Message::ResponseChain {
                    blocks: chain.blocks().to_vec(),
                }]
            }
            Message::QueryBlocksFrom { start_index, limit } => {
                let chain = self.chain.lock().await;
                let served = limit.min(MAX_BLOCKS_PER_REQUEST);
                let (blocks, has_more, total_blocks) = chain.blocks_from(start_index, served);
                vec![Message::ResponseBlocks {
                    blocks,
                    has_more,
                    total_blocks,
                }]
            }
            Message::ResponseLatest { block } | Message::NewBlock { block } => {
                self.on_latest_block(block).await
            }
            Message::ResponseBlocks {
                blocks,
                has_more,
                total_blocks: _,
            } => self.on_backfill_chunk(blocks, has_more).await,
            Message::ResponseChain { blocks } => {
                self.on_full_chain(blocks).await;
                Vec::new()
            }
            Message::NewTx { tx } => {
                // Drop-on-backpressure: gossip must never stall on a slow
                // mempool.
                if let Err(e) = self.tx_sink.try_send(tx) {
                    log::debug!("dropping gossiped tx: {}", e);
                }
                Vec::new()
            }
            // Session setup frames are handled by PeerSession::handshake.
            Message::Handshake(_) | Message::VersionReject(_) => Vec::new(),
        }
    }

    async fn on_latest_block(&self, block: Block) -> Vec<Message> {
        let mut chain = self.chain.lock().await;

        // Double-sign evidence: only signatures that actually verify count,
        // otherwise a malicious peer could frame any validator.
        let registered_key = chain
            .staking()
            .validator(&block.validator)
            .and_then(|info| hex::decode(&info.public_key).ok());
        if let Some(pk) = registered_key {
            if block
                .verify_producer_signature(&pk, chain_id(chain.network()))
                .is_ok()
            {
                chain.note_foreign_block(&block.validator, block.index, &block.hash);
            }
        }

        let tip_hash = chain.tip().hash.clone();
        let action = plan_sync(chain.height(), &tip_hash, &block);
        match action {
            SyncAction::Ignore => Vec::new(),
            SyncAction::AppendDirect => {
                match chain.append_block(block) {
                    Ok(()) => Vec::new(),
                    Err(e) => {
                        log::warn!("rejected announced block: {}", e);
                        Vec::new()
                    }
                }
            }
            SyncAction::ChunkedBackfill { start } => {
                self.synced.store(false, Ordering::SeqCst);
                vec![Message::QueryBlocksFrom {
                    start_index: start,
                    limit: CHUNK_SIZE,
                }]
            }
            SyncAction::ReplaceChain => {
                self.synced.store(false, Ordering::SeqCst);
                vec![Message::QueryAll]
            }
        }
    }

    async fn on_backfill_chunk(&self, blocks: Vec<Block>, has_more: bool) -> Vec<Message> {
        let mut chain = self.chain.lock().await;
        for block in blocks {
            if block.index <= chain.height() {
                continue;
            }
            if let Err(e) = chain.append_block(block) {
                log::warn!("backfill chunk rejected: {}", e);
                // Linear backfill failed — fall back to stateful replace.
                return vec![Message::QueryAll];
            }
        }

        if has_more {
            vec![Message::QueryBlocksFrom {
                start_index: chain.height() + 1,
                limit: CHUNK_SIZE,
            }]
        } else {
            self.synced.store(true, Ordering::SeqCst);
            log::info!("sync complete at height {}", chain.height());
            Vec::new()
        }
    }

    async fn on_full_chain(&self, blocks: Vec<Block>) {
        let mut chain = self.chain.lock().await;
        match chain.replace_chain(blocks) {
            Ok(()) => {
                self.synced.store(true, Ordering::SeqCst);
                log::info!("chain replaced, new height {}", chain.height());
            }
            Err(e) => {
                // Protocol-level failure: local chain untouched.
                log::warn!("chain replace refused: {}", e);
            }
        }
    }
}
