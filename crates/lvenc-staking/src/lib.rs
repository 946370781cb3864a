// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LVENC - STAKING POOL
//
// Deterministic staking state machine. The pool is a pure function of the
// block sequence: applying the same blocks in the same order always yields
// bit-identical state, which is what makes chain replace verifiable.
// - STAKE/DELEGATE accumulate as pending, promote at epoch boundaries
// - UNSTAKE/UNDELEGATE queue unbonding entries, mature after N epochs
// - liveness window per validator, jailing, lifetime ban
// - double-sign slashing into a burn sink
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use lvenc_core::params::{
    self, epoch_of_height, is_epoch_boundary, jail_duration_epochs, unbonding_epochs,
    DEFAULT_COMMISSION_PCT, MAX_COMMISSION_PCT, MAX_JAIL_COUNT, MIN_COMMISSION_PCT,
    MIN_VALIDATOR_SELF_STAKE, SLOT_DURATION_MS,
};
use lvenc_core::{Amount, Block, Transaction, TxType};
use lvenc_crypto::Network;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub mod liveness;
pub mod selection;
pub mod slashing;

pub use liveness::LivenessWindow;
pub use slashing::{SlashEvent, SlashReason};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StakingError {
    #[error("validator {0} is not registered")]
    UnknownValidator(String),
    #[error("validator {0} is permanently banned")]
    Banned(String),
    #[error("insufficient bonded stake for this operation")]
    InsufficientStake,
    #[error("insufficient delegation to {0}")]
    InsufficientDelegation(String),
    #[error("no matured unbonding balance to claim")]
    NothingToClaim,
    #[error("delegation target missing from transaction data")]
    MissingValidatorData,
}

impl StakingError {
    pub const fn code(&self) -> &'static str {
        match self {
            StakingError::UnknownValidator(_) => "VALIDATOR_UNKNOWN",
            StakingError::Banned(_) => "VALIDATOR_BANNED",
            StakingError::InsufficientStake => "INSUFFICIENT_BALANCE",
            StakingError::InsufficientDelegation(_) => "INSUFFICIENT_BALANCE",
            StakingError::NothingToClaim => "NOTHING_TO_CLAIM",
            StakingError::MissingValidatorData => "VALIDATOR_UNKNOWN",
        }
    }
}

/// Registered validator record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidatorInfo {
    pub address: String,
    /// Ed25519 public key (hex) registered with the first STAKE.
    pub public_key: String,
    pub self_stake: Amount,
    pub delegated_stake: Amount,
    pub commission_pct: u8,
    /// Commission change staged for the next epoch boundary.
    pub pending_commission_pct: Option<u8>,
    pub is_jailed: bool,
    /// First epoch at which the jail expires.
    pub jailed_until_epoch: u64,
    pub jail_count: u32,
    pub banned: bool,
    pub blocks_produced: u64,
    pub liveness: LivenessWindow,
}

impl ValidatorInfo {
    fn new(address: String, public_key: String) -> Self {
        ValidatorInfo {
            address,
            public_key,
            self_stake: 0,
            delegated_stake: 0,
            commission_pct: DEFAULT_COMMISSION_PCT,
            pending_commission_pct: None,
            is_jailed: false,
            jailed_until_epoch: 0,
            jail_count: 0,
            banned: false,
            blocks_produced: 0,
            liveness: LivenessWindow::new(),
        }
    }

    pub fn total_stake(&self) -> Amount {
        self.self_stake.saturating_add(self.delegated_stake)
    }
}

/// A stake waiting for the next epoch boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingStake {
    pub amount: Amount,
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingDelegation {
    pub delegator: String,
    pub validator: String,
    pub amount: Amount,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UnbondKind {
    SelfStake,
    Delegation,
}

/// Queued UNSTAKE/UNDELEGATE. Stake keeps earning selection weight until the
/// effective epoch; funds become claimable once the entry matures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnbondingEntry {
    pub address: String,
    /// Delegation target for UNDELEGATE; same as `address` for UNSTAKE.
    pub validator: String,
    pub amount: Amount,
    pub effective_epoch: u64,
    pub kind: UnbondKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StakingPool {
    network: Network,
    /// Registered validators, keyed by address. BTreeMap keeps every
    /// iteration (and snapshot) deterministic across nodes.
    validators: BTreeMap<String, ValidatorInfo>,
    /// Self-stake waiting for promotion, keyed by staker address.
    pending_stakes: BTreeMap<String, PendingStake>,
    pending_delegations: Vec<PendingDelegation>,
    /// delegator → validator → bonded amount
    delegations: BTreeMap<String, BTreeMap<String, Amount>>,
    unbonding: Vec<UnbondingEntry>,
    /// Matured unbonded funds awaiting a CLAIM transaction.
    claimable: BTreeMap<String, Amount>,
    pub epoch: u64,
    pub epoch_start_block: u64,
    /// Validator set recorded at the last epoch boundary.
    validator_set: Vec<String>,
    slash_events: Vec<SlashEvent>,
    /// Sum of stake permanently removed via slashing.
    pub total_burned: Amount,
}

impl StakingPool {
    pub fn new(network: Network) -> Self {
        StakingPool {
            network,
            validators: BTreeMap::new(),
            pending_stakes: BTreeMap::new(),
            pending_delegations: Vec::new(),
            delegations: BTreeMap::new(),
            unbonding: Vec::new(),
            claimable: BTreeMap::new(),
            epoch: 0,
            epoch_start_block: 0,
            validator_set: Vec::new(),
            slash_events: Vec::new(),
            total_burned: 0,
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn validator(&self, addr: &str) -> Option<&ValidatorInfo> {
        self.validators.get(addr)
    }

    pub fn is_registered(&self, addr: &str) -> bool {
        self.validators.contains_key(addr)
    }

    /// Registered, funded, not jailed, not banned — eligible to produce.
    pub fn is_active_validator(&self, addr: &str) -> bool {
        self.validators.get(addr).is_some_and(|v| {
            !v.is_jailed && !v.banned && v.self_stake >= MIN_VALIDATOR_SELF_STAKE
        })
    }

    /// Validator set recorded at the last epoch boundary.
    pub fn validator_set(&self) -> &[String] {
        &self.validator_set
    }

    pub fn self_stake(&self, addr: &str) -> Amount {
        self.validators.get(addr).map_or(0, |v| v.self_stake)
    }

    pub fn delegated_to(&self, delegator: &str, validator: &str) -> Amount {
        self.delegations
            .get(delegator)
            .and_then(|m| m.get(validator))
            .copied()
            .unwrap_or(0)
    }

    /// Bonded stake owned by `addr`: self-stake plus outgoing delegations.
    /// Pending promotions are included — the funds already left the balance.
    pub fn total_stake_of(&self, addr: &str) -> Amount {
        let self_stake = self.self_stake(addr);
        let delegated: Amount = self
            .delegations
            .get(addr)
            .map_or(0, |m| m.values().fold(0u128, |a, v| a.saturating_add(*v)));
        let pending = self.pending_stakes.get(addr).map_or(0, |p| p.amount);
        let pending_del: Amount = self
            .pending_delegations
            .iter()
            .filter(|d| d.delegator == addr)
            .fold(0u128, |a, d| a.saturating_add(d.amount));
        self_stake
            .saturating_add(delegated)
            .saturating_add(pending)
            .saturating_add(pending_del)
    }

    /// Total bonded supply: Σ selfStake + delegatedStake over all validators.
    pub fn total_bonded(&self) -> Amount {
        self.validators
            .values()
            .fold(0u128, |acc, v| acc.saturating_add(v.total_stake()))
    }

    pub fn claimable_of(&self, addr: &str) -> Amount {
        self.claimable.get(addr).copied().unwrap_or(0)
    }

    /// Amount still locked in the unbonding queue for `addr`.
    pub fn unbonding_of(&self, addr: &str) -> Amount {
        self.unbonding
            .iter()
            .filter(|u| u.address == addr)
            .fold(0u128, |a, u| a.saturating_add(u.amount))
    }

    pub fn slash_events(&self) -> &[SlashEvent] {
        &self.slash_events
    }

    // ─────────────────────────────────────────────────────────────────
    // BLOCK APPLICATION
    // ─────────────────────────────────────────────────────────────────

    /// Apply every staking-relevant transaction of a confirmed block, then
    /// run the epoch boundary if this height crosses one. Failed staking
    /// transactions are skipped deterministically (they do not invalidate
    /// the block) and reported back to the caller for logging.
    pub fn apply_block(&mut self, block: &Block) -> Vec<(String, StakingError)> {
        let mut skipped = Vec::new();

        for tx in &block.transactions {
            if let Err(e) = self.apply_tx(tx) {
                skipped.push((tx.id.clone(), e));
            }
        }

        if block.index == 0 {
            // Genesis stakes bootstrap the validator set immediately —
            // otherwise no one could sign blocks 1..EPOCH_BLOCKS.
            self.promote_pending();
            self.record_validator_set();
        } else if is_epoch_boundary(block.index) {
            self.on_epoch_boundary(block.index);
        }

        skipped
    }

    /// Apply a single transaction. `Ok(false)` marks a protocol-level no-op
    /// (COMMISSION from a non-validator).
    pub fn apply_tx(&mut self, tx: &Transaction) -> Result<bool, StakingError> {
        let from = match tx.from_address.as_deref() {
            Some(f) => f.to_string(),
            None => return Ok(false), // coinbase / system credit
        };

        match tx.tx_type {
            TxType::Stake => {
                let entry = self
                    .pending_stakes
                    .entry(from)
                    .or_insert_with(|| PendingStake {
                        amount: 0,
                        public_key: tx.public_key.clone(),
                    });
                entry.amount = entry.amount.saturating_add(tx.amount);
                if entry.public_key.is_empty() {
                    entry.public_key = tx.public_key.clone();
                }
                Ok(true)
            }
            TxType::Unstake => {
                let bonded = self.self_stake(&from);
                let already_queued: Amount = self
                    .unbonding
                    .iter()
                    .filter(|u| u.kind == UnbondKind::SelfStake && u.address == from)
                    .fold(0u128, |a, u| a.saturating_add(u.amount));
                if bonded.saturating_sub(already_queued) < tx.amount {
                    return Err(StakingError::InsufficientStake);
                }
                self.unbonding.push(UnbondingEntry {
                    address: from.clone(),
                    validator: from,
                    amount: tx.amount,
                    effective_epoch: self.epoch + unbonding_epochs(self.network),
                    kind: UnbondKind::SelfStake,
                });
                Ok(true)
            }
            TxType::Delegate => {
                let validator = tx
                    .data
                    .clone()
                    .ok_or(StakingError::MissingValidatorData)?;
                match self.validators.get(&validator) {
                    None => return Err(StakingError::UnknownValidator(validator)),
                    Some(v) if v.banned => return Err(StakingError::Banned(validator)),
                    Some(_) => {}
                }
                self.pending_delegations.push(PendingDelegation {
                    delegator: from,
                    validator,
                    amount: tx.amount,
                });
                Ok(true)
            }
            TxType::Undelegate => {
                let validator = tx
                    .data
                    .clone()
                    .ok_or(StakingError::MissingValidatorData)?;
                let bonded = self.delegated_to(&from, &validator);
                let already_queued: Amount = self
                    .unbonding
                    .iter()
                    .filter(|u| {
                        u.kind == UnbondKind::Delegation
                            && u.address == from
                            && u.validator == validator
                    })
                    .fold(0u128, |a, u| a.saturating_add(u.amount));
                if bonded.saturating_sub(already_queued) < tx.amount {
                    return Err(StakingError::InsufficientDelegation(validator));
                }
                self.unbonding.push(UnbondingEntry {
                    address: from,
                    validator,
                    amount: tx.amount,
                    effective_epoch: self.epoch + unbonding_epochs(self.network),
                    kind: UnbondKind::Delegation,
                });
                Ok(true)
            }
            TxType::Claim => {
                let available = self.claimable_of(&from);
                if available < tx.amount || tx.amount == 0 {
                    return Err(StakingError::NothingToClaim);
                }
                let remaining = available - tx.amount;
                if remaining == 0 {
                    self.claimable.remove(&from);
                } else {
                    self.claimable.insert(from, remaining);
                }
                Ok(true)
            }
            TxType::Commission => {
                // Unregistered sender: explicit no-op by protocol decision.
                let Some(v) = self.validators.get_mut(&from) else {
                    return Ok(false);
                };
                let pct = (tx.amount.min(u8::MAX as u128) as u8)
                    .clamp(MIN_COMMISSION_PCT, MAX_COMMISSION_PCT);
                v.pending_commission_pct = Some(pct);
                Ok(true)
            }
            TxType::Transfer => Ok(false),
        }
    }

    // ─────────────────────────────────────────────────────────────────
    // EPOCH BOUNDARY
    // ─────────────────────────────────────────────────────────────────

    fn on_epoch_boundary(&mut self, height: u64) {
        self.epoch = epoch_of_height(height);
        self.epoch_start_block = height;

        self.promote_pending();
        self.mature_unbondings();
        self.apply_pending_commissions();
        self.evaluate_liveness();
        self.unjail_expired();
        self.record_validator_set();
    }

    fn promote_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending_stakes);
        for (addr, stake) in pending {
            let v = self
                .validators
                .entry(addr.clone())
                .or_insert_with(|| ValidatorInfo::new(addr, stake.public_key.clone()));
            if v.public_key.is_empty() {
                v.public_key = stake.public_key;
            }
            v.self_stake = v.self_stake.saturating_add(stake.amount);
        }

        let delegations = std::mem::take(&mut self.pending_delegations);
        for d in delegations {
            // Validator may have been slashed out between admission and
            // promotion; the delegation then falls back to claimable.
            match self.validators.get_mut(&d.validator) {
                Some(v) if !v.banned => {
                    v.delegated_stake = v.delegated_stake.saturating_add(d.amount);
                    *self
                        .delegations
                        .entry(d.delegator)
                        .or_default()
                        .entry(d.validator)
                        .or_insert(0) += d.amount;
                }
                _ => {
                    *self.claimable.entry(d.delegator).or_insert(0) += d.amount;
                }
            }
        }
    }

    fn mature_unbondings(&mut self) {
        let epoch = self.epoch;
        let mut matured = Vec::new();
        self.unbonding.retain(|entry| {
            if entry.effective_epoch <= epoch {
                matured.push(entry.clone());
                false
            } else {
                true
            }
        });

        for entry in matured {
            match entry.kind {
                UnbondKind::SelfStake => {
                    if let Some(v) = self.validators.get_mut(&entry.address) {
                        v.self_stake = v.self_stake.saturating_sub(entry.amount);
                    }
                }
                UnbondKind::Delegation => {
                    if let Some(v) = self.validators.get_mut(&entry.validator) {
                        v.delegated_stake = v.delegated_stake.saturating_sub(entry.amount);
                    }
                    if let Some(m) = self.delegations.get_mut(&entry.address) {
                        if let Some(amt) = m.get_mut(&entry.validator) {
                            *amt = amt.saturating_sub(entry.amount);
                            if *amt == 0 {
                                m.remove(&entry.validator);
                            }
                        }
                        if m.is_empty() {
                            self.delegations.remove(&entry.address);
                        }
                    }
                }
            }
            *self.claimable.entry(entry.address).or_insert(0) += entry.amount;
        }

        // Drop fully unbonded validators that no longer meet the minimum.
        self.validators
            .retain(|_, v| v.self_stake > 0 || v.delegated_stake > 0 || v.banned);
    }

    fn apply_pending_commissions(&mut self) {
        for v in self.validators.values_mut() {
            if let Some(pct) = v.pending_commission_pct.take() {
                v.commission_pct = pct;
            }
        }
    }

    fn evaluate_liveness(&mut self) {
        let jail_epochs = jail_duration_epochs(self.network);
        let epoch = self.epoch;
        for v in self.validators.values_mut() {
            if v.banned || v.is_jailed {
                continue;
            }
            if v.liveness.is_full() && !v.liveness.meets_threshold() {
                v.is_jailed = true;
                v.jailed_until_epoch = epoch + jail_epochs;
                v.jail_count += 1;
                v.liveness.clear();

                // Downtime slash: 0.1% of self-stake into the burn sink.
                let slash = v.self_stake * params::DOWNTIME_SLASH_BPS as u128 / 10_000;
                v.self_stake = v.self_stake.saturating_sub(slash);
                self.total_burned = self.total_burned.saturating_add(slash);
                self.slash_events.push(SlashEvent {
                    validator: v.address.clone(),
                    epoch,
                    amount: slash,
                    reason: SlashReason::Downtime,
                });

                if v.jail_count >= MAX_JAIL_COUNT {
                    v.banned = true;
                }
                log::warn!(
                    "validator {} jailed until epoch {} (jail #{}, banned={})",
                    v.address,
                    v.jailed_until_epoch,
                    v.jail_count,
                    v.banned
                );
            }
        }
    }

    fn unjail_expired(&mut self) {
        let epoch = self.epoch;
        for v in self.validators.values_mut() {
            if v.is_jailed && !v.banned && v.jailed_until_epoch <= epoch {
                v.is_jailed = false;
            }
        }
    }

    fn record_validator_set(&mut self) {
        self.validator_set = self
            .validators
            .values()
            .filter(|v| !v.is_jailed && !v.banned && v.self_stake >= MIN_VALIDATOR_SELF_STAKE)
            .map(|v| v.address.clone())
            .collect();
    }

    // ─────────────────────────────────────────────────────────────────
    // LIVENESS OBSERVATION
    // ─────────────────────────────────────────────────────────────────

    /// Slots examined per block for missed-producer marks. Gaps beyond this
    /// (idle network, restart after downtime) would only flood every window
    /// with misses that the boundary evaluation already treats as a full
    /// failure; the horizon keeps the scan O(1) per block.
    pub const MISSED_SLOT_LOOKBACK: u64 = 64;

    /// Record the outcome of the slots between two consecutive blocks.
    /// For every skipped slot the deterministically assigned producer gets a
    /// missed mark; the actual producer gets a signed mark.
    pub fn observe_block_liveness(
        &mut self,
        prev_hash: &str,
        prev_slot: u64,
        new_slot: u64,
        producer: &str,
    ) {
        let horizon = new_slot.saturating_sub(Self::MISSED_SLOT_LOOKBACK);
        let mut slot = prev_slot.saturating_add(1).max(horizon);
        while slot < new_slot {
            if let Some(assigned) = self.select_producer(prev_hash, slot) {
                if let Some(v) = self.validators.get_mut(&assigned) {
                    v.liveness.record(false);
                }
            }
            slot += 1;
        }
        if let Some(v) = self.validators.get_mut(producer) {
            v.liveness.record(true);
            v.blocks_produced += 1;
        }
    }

    /// Slot number of a block, derived from its timestamp.
    pub fn slot_of(timestamp_ms: u64, genesis_time_ms: u64) -> u64 {
        timestamp_ms.saturating_sub(genesis_time_ms) / SLOT_DURATION_MS
    }

    // ─────────────────────────────────────────────────────────────────
    // DOUBLE-SIGN SLASHING
    // ─────────────────────────────────────────────────────────────────

    /// Apply double-sign evidence: burn `SLASH_PERCENT` of the offender's
    /// self-stake and jail them. Returns the burned amount.
    pub fn slash_double_sign(&mut self, validator: &str) -> Result<Amount, StakingError> {
        let jail_epochs = jail_duration_epochs(self.network);
        let epoch = self.epoch;
        let v = self
            .validators
            .get_mut(validator)
            .ok_or_else(|| StakingError::UnknownValidator(validator.to_string()))?;
        if v.banned {
            return Err(StakingError::Banned(validator.to_string()));
        }

        let slash = v.self_stake * params::SLASH_PERCENT as u128 / 100;
        v.self_stake = v.self_stake.saturating_sub(slash);
        v.is_jailed = true;
        v.jailed_until_epoch = epoch + jail_epochs;
        v.jail_count += 1;
        if v.jail_count >= MAX_JAIL_COUNT {
            v.banned = true;
        }
        let addr = v.address.clone();
        self.total_burned = self.total_burned.saturating_add(slash);
        self.slash_events.push(SlashEvent {
            validator: addr,
            epoch,
            amount: slash,
            reason: SlashReason::DoubleSign,
        });
        self.record_validator_set();
        Ok(slash)
    }

    // ─────────────────────────────────────────────────────────────────
    // REBUILD
    // ─────────────────────────────────────────────────────────────────

    /// Reconstruct the pool from scratch by replaying a block sequence.
    /// Deterministic: the result is bit-identical no matter how the blocks
    /// were originally applied.
    pub fn rebuild_from_chain(
        network: Network,
        blocks: &[Block],
        genesis_time_ms: u64,
    ) -> StakingPool {
        let mut pool = StakingPool::new(network);
        let mut prev: Option<(&Block, u64)> = None;

        for block in blocks {
            if let Some((prev_block, prev_slot)) = prev {
                let new_slot = Self::slot_of(block.timestamp, genesis_time_ms);
                pool.observe_block_liveness(
                    &prev_block.hash,
                    prev_slot,
                    new_slot,
                    &block.validator,
                );
            }
            pool.apply_block(block);
            prev = Some((block, Self::slot_of(block.timestamp, genesis_time_ms)));
        }
        pool
    }
}
