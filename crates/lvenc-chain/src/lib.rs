// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LVENC - CHAIN
//
// Append-only block sequence with:
// - full stateful validation (hashes, coinbase amount, nonces, producer
//   registration and signature at the historical moment of signing)
// - finality depth: blocks at height ≤ tip − FINALITY_DEPTH are irreversible
// - epoch inflation minted exactly once per boundary via the coinbase
// - replaceChain with deep-reorg protection and sandbox staking replay
// - per-address balance map maintained in lockstep with the block sequence
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use lvenc_core::genesis::{genesis_block, GenesisConfig};
use lvenc_core::params::{
    chain_id, epoch_inflation, is_epoch_boundary, FINALITY_DEPTH, GENESIS_AMOUNT,
    MAX_TX_PER_BLOCK,
};
use lvenc_core::{Amount, Block, Network, Transaction, TxType, STAKE_POOL_ADDRESS};
use lvenc_staking::slashing::DoubleSignDetector;
use lvenc_staking::StakingPool;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::broadcast;

pub mod events;
pub use events::{channel, NodeEvent};
pub use lvenc_amm::PoolStateManager;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("block index {got} does not extend tip {expected}")]
    NotSequential { expected: u64, got: u64 },
    #[error("previousHash does not link to the local tip")]
    BrokenLink,
    #[error("stored block hash does not match recomputed hash")]
    HashMismatch,
    #[error("block exceeds the transaction cap")]
    TooManyTransactions,
    #[error("first transaction must be the epoch-reward coinbase")]
    MissingCoinbase,
    #[error("coinbase amount {got} does not match expected {expected}")]
    BadCoinbase { expected: Amount, got: Amount },
    #[error("transaction {id} invalid: {code}")]
    InvalidTransaction { id: String, code: &'static str },
    #[error("nonce {nonce} out of order for {address}")]
    NonceOutOfOrder { address: String, nonce: u64 },
    #[error("sender {address} cannot cover the spend")]
    InsufficientFunds { address: String },
    #[error("producer {0} is not a registered validator")]
    UnknownValidator(String),
    #[error("producer {0} is jailed or banned at this epoch")]
    JailedValidator(String),
    #[error("producer signature invalid")]
    InvalidBlockSignature,
    #[error("incoming chain is not longer than the local chain")]
    NotLonger,
    #[error("incoming chain rewrites finalized block at index {index}")]
    FinalityViolation { index: u64 },
    #[error("incoming chain has a different genesis block")]
    WrongGenesis,
    #[error("incoming chain is empty")]
    EmptyChain,
}

impl ChainError {
    pub const fn code(&self) -> &'static str {
        match self {
            ChainError::InsufficientFunds { .. } => "INSUFFICIENT_BALANCE",
            ChainError::NotSequential { .. } => "NOT_SEQUENTIAL",
            ChainError::BrokenLink => "BROKEN_LINK",
            ChainError::HashMismatch => "HASH_MISMATCH",
            ChainError::TooManyTransactions => "TOO_MANY_TX",
            ChainError::MissingCoinbase => "MISSING_COINBASE",
            ChainError::BadCoinbase { .. } => "BAD_COINBASE",
            ChainError::InvalidTransaction { .. } => "INVALID_TX",
            ChainError::NonceOutOfOrder { .. } => "STALE_NONCE",
            ChainError::UnknownValidator(_) => "VALIDATOR_UNKNOWN",
            ChainError::JailedValidator(_) => "VALIDATOR_JAILED",
            ChainError::InvalidBlockSignature => "INVALID_BLOCK_SIGNATURE",
            ChainError::NotLonger => "NOT_LONGER",
            ChainError::FinalityViolation { .. } => "DEEP_REORG",
            ChainError::WrongGenesis => "WRONG_GENESIS",
            ChainError::EmptyChain => "EMPTY_CHAIN",
        }
    }
}

/// Append checkpoint — one per accepted block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkpoint {
    pub index: u64,
    pub hash: String,
}

/// Validation context threaded through both the live chain and the sandbox
/// used by replaceChain. Holding it separate from Chain is what makes the
/// stateful replay reusable.
struct ReplayState {
    staking: StakingPool,
    nonces: BTreeMap<String, u64>,
    balances: BTreeMap<String, Amount>,
    total_supply: Amount,
}

impl ReplayState {
    fn genesis(network: Network, genesis: &Block) -> Self {
        let mut state = ReplayState {
            staking: StakingPool::new(network),
            nonces: BTreeMap::new(),
            balances: BTreeMap::new(),
            total_supply: GENESIS_AMOUNT,
        };
        state.staking.apply_block(genesis);
        record_nonces(&mut state.nonces, genesis);
        apply_block_balances(&mut state.balances, genesis);
        state
    }

    /// Advance past `block`, assuming it was already validated.
    fn advance(&mut self, prev: &Block, block: &Block, genesis_time_ms: u64) {
        let prev_slot = StakingPool::slot_of(prev.timestamp, genesis_time_ms);
        let new_slot = StakingPool::slot_of(block.timestamp, genesis_time_ms);
        self.staking
            .observe_block_liveness(&prev.hash, prev_slot, new_slot, &block.validator);
        for (id, err) in self.staking.apply_block(block) {
            log::debug!("staking tx {} skipped: {}", id, err);
        }
        record_nonces(&mut self.nonces, block);
        apply_block_balances(&mut self.balances, block);
        if is_epoch_boundary(block.index) {
            self.total_supply = self
                .total_supply
                .saturating_add(epoch_inflation(self.total_supply));
        }
    }
}

fn record_nonces(nonces: &mut BTreeMap<String, u64>, block: &Block) {
    for tx in &block.transactions {
        if tx.is_system() {
            continue;
        }
        if let Some(from) = &tx.from_address {
            nonces.insert(from.clone(), tx.nonce);
        }
    }
}

/// Balance effect of a single transaction. Shared by the live chain, the
/// replay sandbox, and (through the overlay) block validation — the three
/// must never disagree.
fn apply_tx_balance(balances: &mut BTreeMap<String, Amount>, tx: &Transaction) {
    if let Some(from) = tx.from_address.as_deref() {
        if !tx.is_system() {
            let entry = balances.entry(from.to_string()).or_insert(0);
            *entry = entry.saturating_sub(tx.spend_amount());
        }
    }

    match tx.tx_type {
        TxType::Transfer | TxType::Stake | TxType::Delegate => {
            *balances.entry(tx.to_address.clone()).or_insert(0) += tx.amount;
        }
        TxType::Claim => {
            *balances.entry(tx.to_address.clone()).or_insert(0) += tx.amount;
            let pool = balances.entry(STAKE_POOL_ADDRESS.to_string()).or_insert(0);
            *pool = pool.saturating_sub(tx.amount);
        }
        TxType::Unstake | TxType::Undelegate | TxType::Commission => {}
    }
}

fn apply_block_balances(balances: &mut BTreeMap<String, Amount>, block: &Block) {
    for tx in &block.transactions {
        apply_tx_balance(balances, tx);
    }
    balances.retain(|_, amount| *amount > 0);
}

/// Validate `block` as the next block after `prev` against a staking view.
/// The staking view must reflect the chain state at the parent — this is
/// what makes replay catch producers that were not validators at the time.
fn validate_block_against(
    block: &Block,
    prev: &Block,
    staking: &StakingPool,
    nonces: &BTreeMap<String, u64>,
    balances: &BTreeMap<String, Amount>,
    total_supply: Amount,
    network: Network,
) -> Result<(), ChainError> {
    if block.index != prev.index + 1 {
        return Err(ChainError::NotSequential {
            expected: prev.index + 1,
            got: block.index,
        });
    }
    if block.previous_hash != prev.hash {
        return Err(ChainError::BrokenLink);
    }
    if block.calculate_hash() != block.hash {
        return Err(ChainError::HashMismatch);
    }
    if block.transactions.len() > 1 + MAX_TX_PER_BLOCK {
        return Err(ChainError::TooManyTransactions);
    }

    // Coinbase: present, system-issued, and worth exactly fees + inflation.
    let coinbase = block.transactions.first().ok_or(ChainError::MissingCoinbase)?;
    if !coinbase.is_system() || coinbase.from_address.is_some() {
        return Err(ChainError::MissingCoinbase);
    }
    let mut expected = block.total_fees();
    if is_epoch_boundary(block.index) {
        expected = expected.saturating_add(epoch_inflation(total_supply));
    }
    if coinbase.amount != expected {
        return Err(ChainError::BadCoinbase {
            expected,
            got: coinbase.amount,
        });
    }

    // Every transaction individually valid, nonces strictly monotone per
    // sender (including within the block itself), and every spend covered.
    // The overlay applies the block sequentially so an earlier credit can
    // fund a later spend, exactly like the post-acceptance application.
    let mut block_nonces: BTreeMap<&str, u64> = BTreeMap::new();
    let mut overlay: BTreeMap<String, Amount> = BTreeMap::new();
    let balance_of = |overlay: &BTreeMap<String, Amount>, addr: &str| {
        overlay
            .get(addr)
            .copied()
            .or_else(|| balances.get(addr).copied())
            .unwrap_or(0)
    };
    // The coinbase credit may fund spends later in the same block.
    overlay.insert(
        coinbase.to_address.clone(),
        balance_of(&overlay, &coinbase.to_address).saturating_add(coinbase.amount),
    );

    for tx in block.transactions.iter().skip(1) {
        // Only the leading coinbase may be system-issued; anything else
        // claiming a null or sentinel sender could mint out of thin air.
        if tx.is_system() {
            return Err(ChainError::InvalidTransaction {
                id: tx.id.clone(),
                code: "UNEXPECTED_SYSTEM_TX",
            });
        }
        tx.verify(network).map_err(|e| ChainError::InvalidTransaction {
            id: tx.id.clone(),
            code: e.code(),
        })?;
        tx.validate_type_rules()
            .map_err(|e| ChainError::InvalidTransaction {
                id: tx.id.clone(),
                code: e.code(),
            })?;

        if let Some(from) = tx.from_address.as_deref() {
            let floor = block_nonces
                .get(from)
                .copied()
                .or_else(|| nonces.get(from).copied());
            if let Some(floor) = floor {
                if tx.nonce <= floor {
                    return Err(ChainError::NonceOutOfOrder {
                        address: from.to_string(),
                        nonce: tx.nonce,
                    });
                }
            }
            block_nonces.insert(from, tx.nonce);

            // Spend check against the running overlay
            let available = balance_of(&overlay, from);
            let spend = tx.spend_amount();
            if available < spend {
                return Err(ChainError::InsufficientFunds {
                    address: from.to_string(),
                });
            }
            overlay.insert(from.to_string(), available - spend);

            // Credits visible to the rest of the block
            match tx.tx_type {
                TxType::Transfer | TxType::Stake | TxType::Delegate | TxType::Claim => {
                    let credited = balance_of(&overlay, &tx.to_address).saturating_add(tx.amount);
                    overlay.insert(tx.to_address.clone(), credited);
                }
                TxType::Unstake | TxType::Undelegate | TxType::Commission => {}
            }
        }
    }

    // Producer must be a registered, active validator right now — and the
    // signature must verify against the key registered at staking time.
    let validator = staking
        .validator(&block.validator)
        .ok_or_else(|| ChainError::UnknownValidator(block.validator.clone()))?;
    if !staking.is_active_validator(&block.validator) {
        return Err(ChainError::JailedValidator(block.validator.clone()));
    }
    let pubkey = hex::decode(&validator.public_key)
        .map_err(|_| ChainError::InvalidBlockSignature)?;
    block
        .verify_producer_signature(&pubkey, chain_id(network))
        .map_err(|_| ChainError::InvalidBlockSignature)?;

    Ok(())
}

#[derive(Clone)]
pub struct Chain {
    network: Network,
    genesis_config: GenesisConfig,
    blocks: Vec<Block>,
    staking: StakingPool,
    amm: PoolStateManager,
    detector: DoubleSignDetector,
    nonces: BTreeMap<String, u64>,
    /// Per-address balances maintained incrementally on every append and
    /// rebuilt wholesale on replace — always consistent with `blocks`.
    balances: BTreeMap<String, Amount>,
    checkpoints: Vec<Checkpoint>,
    last_finalized_index: u64,
    total_supply: Amount,
    events: Option<broadcast::Sender<NodeEvent>>,
}

impl Chain {
    /// Fresh chain: build and apply the deterministic genesis block.
    pub fn new(network: Network, genesis_config: GenesisConfig) -> Self {
        let genesis = genesis_block(&genesis_config, network);
        let mut staking = StakingPool::new(network);
        staking.apply_block(&genesis);

        let mut nonces = BTreeMap::new();
        record_nonces(&mut nonces, &genesis);
        let mut balances = BTreeMap::new();
        apply_block_balances(&mut balances, &genesis);

        let checkpoints = vec![Checkpoint {
            index: 0,
            hash: genesis.hash.clone(),
        }];

        Chain {
            network,
            genesis_config,
            blocks: vec![genesis],
            staking,
            amm: PoolStateManager::new(),
            detector: DoubleSignDetector::new(),
            nonces,
            balances,
            checkpoints,
            last_finalized_index: 0,
            total_supply: GENESIS_AMOUNT,
            events: None,
        }
    }

    /// Rebuild a chain from persisted blocks. The block sequence is
    /// re-validated structurally (hash links) and all derived state —
    /// staking, AMM, nonces, supply — is reconstructed by replay.
    pub fn from_blocks(
        network: Network,
        genesis_config: GenesisConfig,
        blocks: Vec<Block>,
    ) -> Result<Self, ChainError> {
        let mut chain = Chain::new(network, genesis_config);
        if blocks.is_empty() {
            return Err(ChainError::EmptyChain);
        }
        if blocks[0].hash != chain.blocks[0].hash {
            return Err(ChainError::WrongGenesis);
        }
        for block in blocks.into_iter().skip(1) {
            chain.append_block(block)?;
        }
        Ok(chain)
    }

    pub fn set_event_sender(&mut self, sender: broadcast::Sender<NodeEvent>) {
        self.events = Some(sender);
    }

    fn emit(&self, event: NodeEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    // ─────────────────────────────────────────────────────────────────
    // ACCESSORS
    // ─────────────────────────────────────────────────────────────────

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn chain_id(&self) -> &'static str {
        chain_id(self.network)
    }

    pub fn height(&self) -> u64 {
        (self.blocks.len() as u64).saturating_sub(1)
    }

    pub fn tip(&self) -> &Block {
        // Invariant: blocks is never empty (genesis always present)
        self.blocks.last().expect("chain always has genesis")
    }

    pub fn genesis_hash(&self) -> &str {
        &self.blocks[0].hash
    }

    pub fn genesis_time_ms(&self) -> u64 {
        self.genesis_config.timestamp
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block_at(&self, index: u64) -> Option<&Block> {
        self.blocks.get(index as usize)
    }

    pub fn last_finalized_index(&self) -> u64 {
        self.last_finalized_index
    }

    pub fn total_supply(&self) -> Amount {
        self.total_supply
    }

    pub fn staking(&self) -> &StakingPool {
        &self.staking
    }

    pub fn amm(&self) -> &PoolStateManager {
        &self.amm
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn last_confirmed_nonce(&self, address: &str) -> u64 {
        self.nonces.get(address).copied().unwrap_or(0)
    }

    /// Serve a chunk for QUERY_BLOCKS_FROM: (blocks, hasMore, totalBlocks).
    pub fn blocks_from(&self, start_index: u64, limit: u64) -> (Vec<Block>, bool, u64) {
        let total = self.blocks.len() as u64;
        if start_index >= total {
            return (Vec::new(), false, total);
        }
        let end = start_index.saturating_add(limit).min(total);
        let chunk = self.blocks[start_index as usize..end as usize].to_vec();
        (chunk, end < total, total)
    }

    /// Coinbase amount the producer of the next block must mint.
    pub fn expected_coinbase_amount(&self, user_tx_fees: Amount) -> Amount {
        let next_index = self.height() + 1;
        let mut amount = user_tx_fees;
        if is_epoch_boundary(next_index) {
            amount = amount.saturating_add(epoch_inflation(self.total_supply));
        }
        amount
    }

    // ─────────────────────────────────────────────────────────────────
    // BALANCES
    // ─────────────────────────────────────────────────────────────────

    /// Balance of `addr` from the maintained per-address map.
    pub fn balance_of(&self, addr: &str) -> Amount {
        self.balances.get(addr).copied().unwrap_or(0)
    }

    /// Recompute a balance from the raw block sequence — the slow path
    /// the maintained map must always agree with. Diagnostic and tests.
    pub fn compute_balance(&self, addr: &str) -> Amount {
        let mut balances = BTreeMap::new();
        for block in &self.blocks {
            apply_block_balances(&mut balances, block);
        }
        balances.get(addr).copied().unwrap_or(0)
    }

    /// Deterministic digest over every address balance. Diagnostic:
    /// two nodes on the same chain must produce the same root.
    pub fn state_root(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        for (addr, balance) in &self.balances {
            hasher.update(addr.as_bytes());
            hasher.update(balance.to_le_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Supply audit: the sum of all balances must equal genesis supply plus
    /// minted inflation, and the stake pool must cover all bonded stake.
    /// A failure indicates a consensus bug, not a user error.
    pub fn audit_supply(&self) -> Result<(), String> {
        let balance_sum: Amount = self
            .balances
            .values()
            .fold(0u128, |acc, v| acc.saturating_add(*v));

        // Fees debited from senders are re-minted by the same block's
        // coinbase, so the books close exactly at every height.
        if balance_sum != self.total_supply {
            return Err(format!(
                "supply audit FAILED: balances {} != total supply {}",
                balance_sum, self.total_supply
            ));
        }

        let pool_balance = self.balance_of(STAKE_POOL_ADDRESS);
        let bonded = self.staking.total_bonded();
        if pool_balance < bonded.saturating_sub(self.staking.total_burned) {
            return Err(format!(
                "supply audit FAILED: stake pool {} cannot cover bonded {}",
                pool_balance, bonded
            ));
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────
    // APPEND PATH
    // ─────────────────────────────────────────────────────────────────

    /// Validate `block` against the current state without mutating.
    pub fn validate_new_block(&self, block: &Block) -> Result<(), ChainError> {
        validate_block_against(
            block,
            self.tip(),
            &self.staking,
            &self.nonces,
            &self.balances,
            self.total_supply,
            self.network,
        )
    }

    /// Append path: validate → checkpoint → staking → AMM → balances →
    /// finality advance → event.
    pub fn append_block(&mut self, block: Block) -> Result<(), ChainError> {
        self.validate_new_block(&block)?;

        let prev = self.tip().clone();
        let genesis_time = self.genesis_time_ms();

        self.checkpoints.push(Checkpoint {
            index: block.index,
            hash: block.hash.clone(),
        });

        // Double-sign bookkeeping (local record-keeping only).
        if let Some(conflict) = self
            .detector
            .record(&block.validator, block.index, &block.hash)
        {
            log::error!(
                "double-sign by {} at height {} ({} vs {})",
                block.validator,
                block.index,
                conflict,
                block.hash
            );
            if let Ok(burned) = self.staking.slash_double_sign(&block.validator) {
                log::warn!("slashed {} from {}", burned, block.validator);
            }
        }

        let prev_slot = StakingPool::slot_of(prev.timestamp, genesis_time);
        let new_slot = StakingPool::slot_of(block.timestamp, genesis_time);
        self.staking
            .observe_block_liveness(&prev.hash, prev_slot, new_slot, &block.validator);
        for (id, err) in self.staking.apply_block(&block) {
            log::warn!("staking tx {} skipped: {}", id, err);
        }

        for (id, err) in self
            .amm
            .process_block_pool_operations(&block.transactions, block.index)
        {
            if err.is_invariant_violation() {
                log::error!("CRITICAL pool invariant violation in tx {}: {}", id, err);
            } else {
                log::debug!("pool tx {} skipped: {}", id, err);
            }
        }

        record_nonces(&mut self.nonces, &block);
        apply_block_balances(&mut self.balances, &block);
        if is_epoch_boundary(block.index) {
            self.total_supply = self
                .total_supply
                .saturating_add(epoch_inflation(self.total_supply));
        }

        let index = block.index;
        let hash = block.hash.clone();
        self.blocks.push(block);

        self.last_finalized_index = self
            .height()
            .saturating_sub(FINALITY_DEPTH)
            .max(self.last_finalized_index);

        self.emit(NodeEvent::BlockAppended { index, hash });
        Ok(())
    }

    /// Double-sign evidence from gossip: a block signed by `validator` at a
    /// height where we already saw a different hash from them.
    pub fn note_foreign_block(&mut self, validator: &str, index: u64, hash: &str) {
        if let Some(conflict) = self.detector.record(validator, index, hash) {
            log::error!(
                "double-sign evidence for {} at height {} ({} vs {})",
                validator,
                index,
                conflict,
                hash
            );
            if let Ok(burned) = self.staking.slash_double_sign(validator) {
                log::warn!("slashed {} from {}", burned, validator);
                self.emit(NodeEvent::StakingChanged);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────
    // REORG PATH
    // ─────────────────────────────────────────────────────────────────

    /// Replace the local chain with a longer incoming one.
    ///
    /// 1. must be strictly longer,
    /// 2. must not rewrite anything at or below `lastFinalizedIndex`,
    /// 3. every block is replayed against a sandbox staking pool seeded
    ///    from genesis, so each producer is checked against the validator
    ///    set AT THE MOMENT it signed.
    ///
    /// On success all derived state is rebuilt from the new chain.
    pub fn replace_chain(&mut self, incoming: Vec<Block>) -> Result<(), ChainError> {
        if incoming.is_empty() {
            return Err(ChainError::EmptyChain);
        }
        if incoming.len() <= self.blocks.len() {
            return Err(ChainError::NotLonger);
        }
        if incoming[0].hash != self.blocks[0].hash
            || incoming[0].calculate_hash() != incoming[0].hash
        {
            return Err(ChainError::WrongGenesis);
        }

        // Deep-reorg protection: finalized prefix must be byte-identical.
        for index in 0..=self.last_finalized_index {
            let local = &self.blocks[index as usize];
            let foreign = &incoming[index as usize];
            if local.hash != foreign.hash {
                return Err(ChainError::FinalityViolation { index });
            }
        }

        // Stateful replay in a sandbox seeded from the genesis block.
        let genesis_time = self.genesis_time_ms();
        let mut sandbox = ReplayState::genesis(self.network, &incoming[0]);
        for i in 1..incoming.len() {
            let (prev, block) = (&incoming[i - 1], &incoming[i]);
            validate_block_against(
                block,
                prev,
                &sandbox.staking,
                &sandbox.nonces,
                &sandbox.balances,
                sandbox.total_supply,
                self.network,
            )?;
            sandbox.advance(prev, block, genesis_time);
        }

        // Accepted: swap in the new chain and rebuild every derivation.
        log::info!(
            "replacing chain: height {} → {}",
            self.height(),
            incoming.len() as u64 - 1
        );
        self.blocks = incoming;
        self.staking = sandbox.staking;
        self.nonces = sandbox.nonces;
        self.balances = sandbox.balances;
        self.total_supply = sandbox.total_supply;

        // Signature records from the abandoned fork would read as
        // equivocation for every producer on the new one; start fresh.
        self.detector = DoubleSignDetector::new();
        for block in &self.blocks {
            self.detector
                .record(&block.validator, block.index, &block.hash);
        }

        self.amm = PoolStateManager::new();
        for block in &self.blocks {
            self.amm
                .process_block_pool_operations(&block.transactions, block.index);
        }

        self.checkpoints = self
            .blocks
            .iter()
            .map(|b| Checkpoint {
                index: b.index,
                hash: b.hash.clone(),
            })
            .collect();

        self.last_finalized_index = self
            .height()
            .saturating_sub(FINALITY_DEPTH)
            .max(self.last_finalized_index);

        let new_height = self.height();
        self.emit(NodeEvent::ChainReplaced { new_height });
        self.emit(NodeEvent::StakingChanged);
        Ok(())
    }
}
