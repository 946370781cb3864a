// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LVENC - BLOCK PRODUCER
//
// Slot scheduler: every SLOT_DURATION_MS a deterministic validator is
// entitled to produce. This node produces only when (1) it is that
// validator, (2) it believes itself synced, and (3) its self-stake meets
// the minimum. A missed slot needs no action here — receiving nodes detect
// the gap and dock the absentee's liveness window.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::mempool::Mempool;
use lvenc_chain::Chain;
use lvenc_core::params::{slot_for_time, MIN_VALIDATOR_SELF_STAKE, SLOT_DURATION_MS};
use lvenc_core::{Block, Transaction};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Assemble the next block from already-selected user transactions:
/// coinbase first (fees + inflation on boundaries), then the fee-sorted
/// user transactions, stamped with the slot start time.
pub fn assemble_block(chain: &Chain, user_txs: Vec<Transaction>, validator: &str, slot: u64) -> Block {
    let fees = user_txs.iter().fold(0u128, |a, t| a.saturating_add(t.fee));
    let timestamp = chain.genesis_time_ms() + slot * SLOT_DURATION_MS;
    let coinbase = Transaction::coinbase(
        validator,
        chain.expected_coinbase_amount(fees),
        timestamp,
        chain.chain_id(),
    );

    let mut transactions = vec![coinbase];
    transactions.extend(user_txs);

    Block::new(
        chain.height() + 1,
        timestamp,
        chain.tip().hash.clone(),
        transactions,
        validator.to_string(),
    )
}

pub struct BlockProducer {
    pub chain: Arc<Mutex<Chain>>,
    pub mempool: Arc<Mempool>,
    pub synced: Arc<AtomicBool>,
    pub address: String,
    pub secret_key: Vec<u8>,
}

impl BlockProducer {
    /// Run the slot loop until `shutdown` flips.
    pub async fn run(self, shutdown: Arc<AtomicBool>) {
        let mut last_slot_handled = 0u64;

        loop {
            if shutdown.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(SLOT_DURATION_MS / 15)).await;

            let genesis_time = { self.chain.lock().await.genesis_time_ms() };
            let slot = slot_for_time(now_ms(), genesis_time);
            if slot == 0 || slot <= last_slot_handled {
                continue;
            }
            last_slot_handled = slot;

            if !self.synced.load(Ordering::SeqCst) {
                continue;
            }
            if let Err(e) = self.try_produce(slot).await {
                log::warn!("slot {}: production failed: {}", slot, e);
            }
        }
    }

    /// Produce at `slot` if this node is the deterministic pick.
    async fn try_produce(&self, slot: u64) -> Result<(), String> {
        let mut chain = self.chain.lock().await;

        let picked = chain.staking().select_producer(&chain.tip().hash, slot);
        if picked.as_deref() != Some(self.address.as_str()) {
            return Ok(());
        }
        if chain.staking().self_stake(&self.address) < MIN_VALIDATOR_SELF_STAKE {
            return Ok(());
        }
        // A block for this slot may already have arrived over gossip.
        let tip_slot = slot_for_time(chain.tip().timestamp, chain.genesis_time_ms());
        if chain.tip().index > 0 && tip_slot >= slot {
            return Ok(());
        }

        let user_txs = self.mempool.take_for_block();
        let mut block = assemble_block(&chain, user_txs, &self.address, slot);

        // Ed25519 work runs on the blocking pool; the chain token stays
        // held so no competing append can interleave.
        let secret = self.secret_key.clone();
        let chain_id = chain.chain_id();
        block = tokio::task::spawn_blocking(move || {
            block.sign(&secret, chain_id).map(|_| block)
        })
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())?;

        // Append emits BlockAppended; the node's event loop relays the
        // block as NEW_BLOCK to every connected peer.
        chain.append_block(block.clone()).map_err(|e| e.to_string())?;
        self.mempool.remove_confirmed(&block, &chain);
        drop(chain);

        log::info!(
            "produced block {} at slot {} with {} tx",
            block.index,
            slot,
            block.transactions.len()
        );
        Ok(())
    }
}
