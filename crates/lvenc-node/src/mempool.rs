// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LVENC - TRANSACTION MEMPOOL
//
// Pending transactions between admission and block inclusion.
// Admission runs a fixed-order pipeline, serialized per sender by
// an async per-address lock — two racing spends from one address can never
// both pass the balance/nonce checks.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use lvenc_chain::{Chain, NodeEvent};
use lvenc_core::params::{MAX_NONCE_GAP, MAX_PENDING_TX, MAX_TX_PER_BLOCK, MIN_FEE};
use lvenc_core::transaction::meets_min_fee;
use lvenc_core::{Amount, Block, Transaction, TxType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex as AsyncMutex};

/// Pending transactions expire after 24 hours.
const TX_EXPIRATION_SECS: u64 = 86_400;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("mempool is full")]
    PoolFull,
    #[error("fee below protocol minimum")]
    FeeTooLow,
    #[error("transaction is missing sender or recipient")]
    MissingField,
    #[error("signature verification failed: {0}")]
    InvalidSignature(&'static str),
    #[error("nonce is stale or too far ahead")]
    StaleNonce,
    #[error("duplicate transaction")]
    DuplicateTx,
    #[error("insufficient available balance")]
    InsufficientBalance,
    #[error("delegation target is not a registered validator")]
    ValidatorUnknown,
    #[error("transaction violates type rules: {0}")]
    TypeRule(&'static str),
}

impl AdmissionError {
    pub const fn code(&self) -> &'static str {
        match self {
            AdmissionError::PoolFull => "POOL_FULL",
            AdmissionError::FeeTooLow => "FEE_TOO_LOW",
            AdmissionError::MissingField => "MISSING_FIELD",
            AdmissionError::InvalidSignature(_) => "INVALID_SIGNATURE",
            AdmissionError::StaleNonce => "STALE_NONCE",
            AdmissionError::DuplicateTx => "DUPLICATE_TX",
            AdmissionError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            AdmissionError::ValidatorUnknown => "VALIDATOR_UNKNOWN",
            AdmissionError::TypeRule(code) => code,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTx {
    pub tx: Transaction,
    pub received_at: u64,
}

#[derive(Debug, Default)]
struct MempoolState {
    /// canonical hash → pending entry
    by_hash: BTreeMap<String, PendingTx>,
    /// sender → canonical hashes
    by_sender: BTreeMap<String, Vec<String>>,
    /// sender → reserved nonces (released on confirmation or expiry)
    reserved_nonces: BTreeMap<String, BTreeSet<u64>>,
    /// sender → Σ reserved outgoing spend (amount + fee of admitted tx)
    reserved_spend: BTreeMap<String, Amount>,
    total_received: u64,
    total_accepted: u64,
    total_rejected: u64,
    total_expired: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MempoolStats {
    pub size: usize,
    pub total_received: u64,
    pub total_accepted: u64,
    pub total_rejected: u64,
    pub total_expired: u64,
    pub unique_senders: usize,
}

pub struct Mempool {
    state: StdMutex<MempoolState>,
    /// Per-address admission locks (acquired before the first check,
    /// released on exit).
    sender_locks: AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    events: Option<broadcast::Sender<NodeEvent>>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl Mempool {
    pub fn new(events: Option<broadcast::Sender<NodeEvent>>) -> Self {
        Mempool {
            state: StdMutex::new(MempoolState::default()),
            sender_locks: AsyncMutex::new(HashMap::new()),
            events,
        }
    }

    async fn sender_lock(&self, sender: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.sender_locks.lock().await;
        locks
            .entry(sender.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MempoolState> {
        // A panic while holding this lock is a bug; recover the data
        // rather than cascading poisoned-lock panics.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Admission pipeline — checks run in a fixed order. Atomic per sender.
    pub async fn admit(
        &self,
        tx: Transaction,
        chain: &AsyncMutex<Chain>,
    ) -> Result<String, AdmissionError> {
        // Step 3 first only to learn WHICH address to lock; the check is
        // repeated in order below.
        let sender = tx
            .from_address
            .clone()
            .ok_or(AdmissionError::MissingField)?;
        let lock = self.sender_lock(&sender).await;
        let _guard = lock.lock().await;

        let result = self.admit_locked(&tx, &sender, chain).await;
        {
            let mut state = self.lock_state();
            state.total_received += 1;
            match &result {
                Ok(_) => state.total_accepted += 1,
                Err(_) => state.total_rejected += 1,
            }
        }

        if result.is_ok() {
            if let Some(events) = &self.events {
                let _ = events.send(NodeEvent::TransactionAdded {
                    id: tx.id.clone(),
                    from: sender,
                });
            }
        }
        result
    }

    async fn admit_locked(
        &self,
        tx: &Transaction,
        sender: &str,
        chain: &AsyncMutex<Chain>,
    ) -> Result<String, AdmissionError> {
        // 1. capacity
        if self.len() >= MAX_PENDING_TX {
            return Err(AdmissionError::PoolFull);
        }

        // 2. minimum fee (staking tx are fee-exempt by protocol)
        if !meets_min_fee(tx) {
            debug_assert!(tx.fee < MIN_FEE);
            return Err(AdmissionError::FeeTooLow);
        }

        // 3. both endpoints present; system tx never enter via admission
        if tx.to_address.is_empty() || tx.is_system() {
            return Err(AdmissionError::MissingField);
        }

        let hash = tx.canonical_hash();

        // Snapshot chain-derived facts under the chain token.
        let (network, last_nonce, balance, delegate_target_known) = {
            let chain = chain.lock().await;
            let network = chain.network();
            let last_nonce = chain.last_confirmed_nonce(sender);
            let balance = chain.balance_of(sender);
            let known = match (tx.tx_type, tx.data.as_deref()) {
                (TxType::Delegate, Some(validator)) => chain.staking().is_registered(validator),
                (TxType::Delegate, None) => false,
                _ => true,
            };
            (network, last_nonce, balance, known)
        };

        // 4. full verification
        tx.verify(network)
            .map_err(|e| AdmissionError::InvalidSignature(e.code()))?;
        tx.validate_type_rules()
            .map_err(|e| AdmissionError::TypeRule(e.code()))?;

        let mut state = self.lock_state();

        if state.by_hash.contains_key(&hash) {
            return Err(AdmissionError::DuplicateTx);
        }

        // 5. per-sender nonce: fresh, unreserved, within the gap window
        if tx.nonce <= last_nonce || tx.nonce - last_nonce > MAX_NONCE_GAP {
            return Err(AdmissionError::StaleNonce);
        }
        if state
            .reserved_nonces
            .get(sender)
            .is_some_and(|set| set.contains(&tx.nonce))
        {
            return Err(AdmissionError::DuplicateTx);
        }

        // 6. at most one pending STAKE per sender
        if tx.tx_type == TxType::Stake {
            let has_pending_stake = state
                .by_sender
                .get(sender)
                .map(|hashes| {
                    hashes.iter().any(|h| {
                        state
                            .by_hash
                            .get(h)
                            .is_some_and(|p| p.tx.tx_type == TxType::Stake)
                    })
                })
                .unwrap_or(false);
            if has_pending_stake {
                return Err(AdmissionError::DuplicateTx);
            }
        }

        if !delegate_target_known {
            return Err(AdmissionError::ValidatorUnknown);
        }

        // 7. available balance covers this spend plus everything already
        //    reserved by pending transactions from the same sender
        let reserved = state.reserved_spend.get(sender).copied().unwrap_or(0);
        let required = tx.spend_amount();
        if balance.saturating_sub(reserved) < required {
            return Err(AdmissionError::InsufficientBalance);
        }

        // 8. append, reserve
        state
            .reserved_nonces
            .entry(sender.to_string())
            .or_default()
            .insert(tx.nonce);
        *state.reserved_spend.entry(sender.to_string()).or_insert(0) += required;
        state
            .by_sender
            .entry(sender.to_string())
            .or_default()
            .push(hash.clone());
        state.by_hash.insert(
            hash.clone(),
            PendingTx {
                tx: tx.clone(),
                received_at: now_secs(),
            },
        );

        Ok(hash)
    }

    /// Select transactions for the next block: fee-descending, capped at
    /// MAX_TX_PER_BLOCK, per-sender nonces in ascending order so the block
    /// passes chain validation.
    pub fn take_for_block(&self) -> Vec<Transaction> {
        let state = self.lock_state();

        let mut candidates: Vec<&PendingTx> = state.by_hash.values().collect();
        candidates.sort_by(|a, b| {
            b.tx.fee
                .cmp(&a.tx.fee)
                .then_with(|| a.tx.nonce.cmp(&b.tx.nonce))
                .then_with(|| a.received_at.cmp(&b.received_at))
        });

        let mut selected: Vec<Transaction> = Vec::new();
        let mut selected_hashes: BTreeSet<String> = BTreeSet::new();

        // Fee-greedy with a nonce constraint: a tx is eligible once it has
        // the smallest unselected nonce of its sender. Repeat passes until
        // the cap is reached or nothing changes.
        loop {
            let mut progressed = false;
            for pending in &candidates {
                if selected.len() >= MAX_TX_PER_BLOCK {
                    break;
                }
                let hash = pending.tx.canonical_hash();
                if selected_hashes.contains(&hash) {
                    continue;
                }
                let sender = pending.tx.from_address.as_deref().unwrap_or("");
                let min_unselected = candidates
                    .iter()
                    .filter(|p| {
                        p.tx.from_address.as_deref() == Some(sender)
                            && !selected_hashes.contains(&p.tx.canonical_hash())
                    })
                    .map(|p| p.tx.nonce)
                    .min();
                if min_unselected == Some(pending.tx.nonce) {
                    selected.push(pending.tx.clone());
                    selected_hashes.insert(hash);
                    progressed = true;
                }
            }
            if !progressed || selected.len() >= MAX_TX_PER_BLOCK {
                break;
            }
        }
        selected
    }

    /// Drop transactions confirmed by `block` and release their
    /// reservations, plus anything whose nonce the chain has overtaken.
    pub fn remove_confirmed(&self, block: &Block, chain: &Chain) {
        let mut state = self.lock_state();

        let confirmed: BTreeSet<String> = block
            .transactions
            .iter()
            .filter(|tx| !tx.is_system())
            .map(|tx| tx.canonical_hash())
            .collect();

        let stale: Vec<String> = state
            .by_hash
            .iter()
            .filter(|(hash, pending)| {
                if confirmed.contains(*hash) {
                    return true;
                }
                pending
                    .tx
                    .from_address
                    .as_deref()
                    .map(|from| pending.tx.nonce <= chain.last_confirmed_nonce(from))
                    .unwrap_or(true)
            })
            .map(|(hash, _)| hash.clone())
            .collect();

        for hash in stale {
            Self::remove_entry(&mut state, &hash);
        }
    }

    /// Evict transactions older than the TTL. Returns the evicted count.
    pub fn expire_old(&self) -> usize {
        let cutoff = now_secs().saturating_sub(TX_EXPIRATION_SECS);
        let mut state = self.lock_state();
        let expired: Vec<String> = state
            .by_hash
            .iter()
            .filter(|(_, p)| p.received_at < cutoff)
            .map(|(h, _)| h.clone())
            .collect();
        let count = expired.len();
        for hash in expired {
            Self::remove_entry(&mut state, &hash);
        }
        state.total_expired += count as u64;
        count
    }

    fn remove_entry(state: &mut MempoolState, hash: &str) {
        let Some(pending) = state.by_hash.remove(hash) else {
            return;
        };
        let Some(sender) = pending.tx.from_address.as_deref() else {
            return;
        };

        if let Some(hashes) = state.by_sender.get_mut(sender) {
            hashes.retain(|h| h != hash);
            if hashes.is_empty() {
                state.by_sender.remove(sender);
            }
        }
        if let Some(nonces) = state.reserved_nonces.get_mut(sender) {
            nonces.remove(&pending.tx.nonce);
            if nonces.is_empty() {
                state.reserved_nonces.remove(sender);
            }
        }
        if let Some(spend) = state.reserved_spend.get_mut(sender) {
            *spend = spend.saturating_sub(pending.tx.spend_amount());
            if *spend == 0 {
                state.reserved_spend.remove(sender);
            }
        }
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.lock_state().by_hash.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.lock_state().by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending(&self) -> Vec<Transaction> {
        self.lock_state()
            .by_hash
            .values()
            .map(|p| p.tx.clone())
            .collect()
    }

    pub fn stats(&self) -> MempoolStats {
        let state = self.lock_state();
        MempoolStats {
            size: state.by_hash.len(),
            total_received: state.total_received,
            total_accepted: state.total_accepted,
            total_rejected: state.total_rejected,
            total_expired: state.total_expired,
            unique_senders: state.by_sender.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lvenc_core::genesis::GenesisConfig;
    use lvenc_core::params::PRECISION;
    use lvenc_core::Network;
    use lvenc_crypto::{generate_keypair, public_key_to_address, KeyPair};
    use std::sync::Arc;

    const RECIPIENT: &str = "tLVEaa00000000000000000000000000000000000001";

    fn faucet_chain() -> (Arc<AsyncMutex<Chain>>, KeyPair) {
        let keys = generate_keypair();
        let faucet = public_key_to_address(&keys.public_key, Network::Testnet);
        let chain = Chain::new(
            Network::Testnet,
            GenesisConfig {
                faucet_address: faucet,
                faucet_public_key: Some(hex::encode(&keys.public_key)),
                timestamp: 1_700_000_000_000,
            },
        );
        (Arc::new(AsyncMutex::new(chain)), keys)
    }

    fn transfer(keys: &KeyPair, amount: Amount, fee: Amount, nonce: u64) -> Transaction {
        let from = public_key_to_address(&keys.public_key, Network::Testnet);
        let mut tx = Transaction::new(
            TxType::Transfer,
            Some(from),
            RECIPIENT.to_string(),
            amount,
            fee,
            nonce,
            0,
            "lvenc-testnet-1".to_string(),
            None,
        );
        tx.sign(&keys.secret_key, Network::Testnet).unwrap();
        tx
    }

    #[tokio::test]
    async fn test_admit_valid_transfer() {
        let (chain, keys) = faucet_chain();
        let mempool = Mempool::new(None);
        let hash = mempool
            .admit(transfer(&keys, PRECISION, MIN_FEE, 2), &chain)
            .await
            .unwrap();
        assert!(mempool.contains(&hash));
        assert_eq!(mempool.stats().total_accepted, 1);
    }

    #[tokio::test]
    async fn test_fee_too_low_rejected() {
        let (chain, keys) = faucet_chain();
        let mempool = Mempool::new(None);
        let err = mempool
            .admit(transfer(&keys, PRECISION, MIN_FEE - 1, 2), &chain)
            .await
            .unwrap_err();
        assert_eq!(err, AdmissionError::FeeTooLow);
        assert_eq!(err.code(), "FEE_TOO_LOW");
    }

    #[tokio::test]
    async fn test_invalid_signature_rejected() {
        let (chain, keys) = faucet_chain();
        let mempool = Mempool::new(None);
        let mut tx = transfer(&keys, PRECISION, MIN_FEE, 2);
        tx.amount += 1;
        let err = mempool.admit(tx, &chain).await.unwrap_err();
        assert!(matches!(err, AdmissionError::InvalidSignature(_)));
    }

    #[tokio::test]
    async fn test_stale_and_gapped_nonces_rejected() {
        let (chain, keys) = faucet_chain();
        let mempool = Mempool::new(None);

        // Genesis bootstrap stake consumed nonce 1
        let err = mempool
            .admit(transfer(&keys, PRECISION, MIN_FEE, 1), &chain)
            .await
            .unwrap_err();
        assert_eq!(err, AdmissionError::StaleNonce);

        // Gap of more than MAX_NONCE_GAP
        let err = mempool
            .admit(transfer(&keys, PRECISION, MIN_FEE, 1 + MAX_NONCE_GAP + 1), &chain)
            .await
            .unwrap_err();
        assert_eq!(err, AdmissionError::StaleNonce);
    }

    #[tokio::test]
    async fn test_double_spend_race_admits_exactly_one() {
        // Same sender, same nonce, different recipients,
        // submitted concurrently. Exactly one wins.
        let (chain, keys) = faucet_chain();
        let mempool = Arc::new(Mempool::new(None));

        let tx_a = transfer(&keys, PRECISION, MIN_FEE, 2);
        let mut tx_b = transfer(&keys, 2 * PRECISION, MIN_FEE, 2);
        tx_b.to_address = "tLVEbb00000000000000000000000000000000000002".to_string();
        tx_b.sign(&keys.secret_key, Network::Testnet).unwrap();

        let (m1, c1, t1) = (mempool.clone(), chain.clone(), tx_a);
        let (m2, c2, t2) = (mempool.clone(), chain.clone(), tx_b);
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { m1.admit(t1, &c1).await }),
            tokio::spawn(async move { m2.admit(t2, &c2).await }),
        );
        let results = [r1.unwrap(), r2.unwrap()];

        let ok = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok, 1, "exactly one racing spend must win");
        let err = results.iter().find(|r| r.is_err()).unwrap().as_ref().unwrap_err();
        assert!(
            matches!(err, AdmissionError::StaleNonce | AdmissionError::DuplicateTx),
            "loser fails with STALE_NONCE or DUPLICATE_TX, got {:?}",
            err
        );
        assert_eq!(mempool.len(), 1);
    }

    #[tokio::test]
    async fn test_insufficient_balance_accounts_for_reservations() {
        let (chain, keys) = faucet_chain();
        let mempool = Mempool::new(None);
        let balance = {
            let guard = chain.lock().await;
            let faucet = public_key_to_address(&keys.public_key, Network::Testnet);
            guard.balance_of(&faucet)
        };

        // First spend reserves nearly the whole balance
        mempool
            .admit(transfer(&keys, balance - MIN_FEE, MIN_FEE, 2), &chain)
            .await
            .unwrap();

        // Second spend no longer fits even though the chain balance alone
        // would cover it
        let err = mempool
            .admit(transfer(&keys, PRECISION, MIN_FEE, 3), &chain)
            .await
            .unwrap_err();
        assert_eq!(err, AdmissionError::InsufficientBalance);
    }

    #[tokio::test]
    async fn test_duplicate_pending_stake_rejected() {
        let (chain, keys) = faucet_chain();
        let mempool = Mempool::new(None);
        let from = public_key_to_address(&keys.public_key, Network::Testnet);

        let stake = |nonce: u64| {
            let mut tx = Transaction::new(
                TxType::Stake,
                Some(from.clone()),
                lvenc_core::STAKE_POOL_ADDRESS.to_string(),
                100 * PRECISION,
                0,
                nonce,
                0,
                "lvenc-testnet-1".to_string(),
                None,
            );
            tx.sign(&keys.secret_key, Network::Testnet).unwrap();
            tx
        };

        mempool.admit(stake(2), &chain).await.unwrap();
        let err = mempool.admit(stake(3), &chain).await.unwrap_err();
        assert_eq!(err, AdmissionError::DuplicateTx);
    }

    #[tokio::test]
    async fn test_delegate_to_unknown_validator_rejected() {
        let (chain, keys) = faucet_chain();
        let mempool = Mempool::new(None);
        let from = public_key_to_address(&keys.public_key, Network::Testnet);

        let mut tx = Transaction::new(
            TxType::Delegate,
            Some(from),
            lvenc_core::STAKE_POOL_ADDRESS.to_string(),
            10 * PRECISION,
            0,
            2,
            0,
            "lvenc-testnet-1".to_string(),
            Some("tLVEdd00000000000000000000000000000000000004".to_string()),
        );
        tx.sign(&keys.secret_key, Network::Testnet).unwrap();
        let err = mempool.admit(tx, &chain).await.unwrap_err();
        assert_eq!(err, AdmissionError::ValidatorUnknown);
    }

    #[tokio::test]
    async fn test_take_for_block_fee_descending_with_nonce_order() {
        let (chain, keys) = faucet_chain();
        let mempool = Mempool::new(None);

        // Same sender: nonces 2,3,4 with fees 1.0, 0.5, 2.0
        mempool
            .admit(transfer(&keys, PRECISION, PRECISION, 2), &chain)
            .await
            .unwrap();
        mempool
            .admit(transfer(&keys, PRECISION, PRECISION / 2, 3), &chain)
            .await
            .unwrap();
        mempool
            .admit(transfer(&keys, PRECISION, 2 * PRECISION, 4), &chain)
            .await
            .unwrap();

        let selected = mempool.take_for_block();
        assert_eq!(selected.len(), 3);
        // Nonces must be ascending for the single sender
        let nonces: Vec<u64> = selected.iter().map(|t| t.nonce).collect();
        assert_eq!(nonces, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_take_for_block_caps_at_limit() {
        let (chain, keys) = faucet_chain();
        let mempool = Mempool::new(None);
        for nonce in 2..(MAX_TX_PER_BLOCK as u64 + 10) {
            mempool
                .admit(transfer(&keys, PRECISION, MIN_FEE, nonce), &chain)
                .await
                .unwrap();
        }
        assert_eq!(mempool.take_for_block().len(), MAX_TX_PER_BLOCK);
    }

    #[tokio::test]
    async fn test_remove_confirmed_releases_reservations() {
        let (chain, keys) = faucet_chain();
        let mempool = Mempool::new(None);
        let tx = transfer(&keys, PRECISION, MIN_FEE, 2);
        mempool.admit(tx.clone(), &chain).await.unwrap();

        let block = Block::new(
            1,
            0,
            "prev".to_string(),
            vec![tx],
            "validator".to_string(),
        );
        {
            let guard = chain.lock().await;
            mempool.remove_confirmed(&block, &guard);
        }
        assert!(mempool.is_empty());

        // Nonce 2 is free again from the mempool's perspective (the chain
        // decides staleness from here on)
        let state = mempool.lock_state();
        assert!(state.reserved_nonces.is_empty());
        assert!(state.reserved_spend.is_empty());
    }
}
