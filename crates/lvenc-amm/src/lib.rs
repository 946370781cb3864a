// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LVENC - AMM (CONSTANT PRODUCT POOLS)
//
// On-chain x·y=k pools driven by ordinary transactions addressed to
// POOL_<PAIR>. All products run in 256-bit integers so u128 reserves can
// never overflow mid-computation. The 0.3% swap fee stays in the reserves,
// which is why k is monotonically non-decreasing across swaps.
// A failed pool operation never invalidates its block — the state effect
// is skipped and the error reported for logging.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use lvenc_core::params::{AMM_FEE_DEN, AMM_FEE_NUM, MIN_LIQUIDITY};
use lvenc_core::{Amount, PoolOperation, Transaction, POOL_ADDRESS_PREFIX};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmmError {
    #[error("pool already initialized")]
    AlreadyInitialized,
    #[error("pool not initialized")]
    NotInitialized,
    #[error("amounts must be positive")]
    ZeroAmount,
    #[error("initial liquidity below minimum")]
    BelowMinLiquidity,
    #[error("deposit ratio deviates more than 1% from the pool ratio")]
    RatioMismatch,
    #[error("output {got} below minimum {want}")]
    Slippage { got: Amount, want: Amount },
    #[error("insufficient pool liquidity for this trade")]
    InsufficientLiquidity,
    #[error("LP balance too low")]
    InsufficientLpBalance,
    #[error("unknown token side: {0}")]
    UnknownToken(String),
    #[error("pool operand is not a valid decimal amount")]
    BadOperand,
    #[error("transaction carries no pool operation")]
    NotAPoolOperation,
    #[error("invariant violation: k decreased from {prev} to {next}")]
    InvariantViolation { prev: String, next: String },
}

impl AmmError {
    pub const fn code(&self) -> &'static str {
        match self {
            AmmError::AlreadyInitialized => "POOL_INITIALIZED",
            AmmError::NotInitialized => "POOL_UNINITIALIZED",
            AmmError::ZeroAmount => "ZERO_AMOUNT",
            AmmError::BelowMinLiquidity => "MIN_LIQUIDITY",
            AmmError::RatioMismatch => "RATIO_MISMATCH",
            AmmError::Slippage { .. } => "SLIPPAGE",
            AmmError::InsufficientLiquidity => "INSUFFICIENT_LIQUIDITY",
            AmmError::InsufficientLpBalance => "INSUFFICIENT_BALANCE",
            AmmError::UnknownToken(_) => "UNKNOWN_TOKEN",
            AmmError::BadOperand => "BAD_POOL_OP",
            AmmError::NotAPoolOperation => "BAD_POOL_OP",
            AmmError::InvariantViolation { .. } => "INVARIANT_VIOLATION",
        }
    }

    /// Invariant violations are bugs, not user errors — the chain treats
    /// them as fatal for the operation and alerts loudly.
    pub const fn is_invariant_violation(&self) -> bool {
        matches!(self, AmmError::InvariantViolation { .. })
    }
}

/// Which reserve a swap feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSide {
    A,
    B,
}

impl TokenSide {
    fn parse(s: &str) -> Result<Self, AmmError> {
        match s {
            "A" | "a" => Ok(TokenSide::A),
            "B" | "b" => Ok(TokenSide::B),
            other => Err(AmmError::UnknownToken(other.to_string())),
        }
    }
}

/// Integer square root over U256 — Newton's method, floor(√n).
fn isqrt(n: U256) -> U256 {
    if n.is_zero() {
        return U256::zero();
    }
    let mut x = n;
    let mut y = (x + U256::one()) / 2;
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}

fn parse_amount(s: &str) -> Result<Amount, AmmError> {
    s.parse::<u128>().map_err(|_| AmmError::BadOperand)
}

/// State of one constant-product pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolState {
    pub initialized: bool,
    pub reserve_a: Amount,
    pub reserve_b: Amount,
    /// Stored invariant. Recomputed after every transition; swaps assert it
    /// never decreases.
    pub k: U256,
    pub total_lp_tokens: Amount,
    pub lp_balances: BTreeMap<String, Amount>,
    pub created_at_block: u64,
    pub last_update_block: u64,
}

/// Interface for price observers (e.g. a TWAP oracle). Called after every
/// state transition. The oracle itself is outside the core.
pub trait ReserveObserver {
    fn observe(&mut self, reserve_a: Amount, reserve_b: Amount, timestamp: u64);
}

impl PoolState {
    fn product(reserve_a: Amount, reserve_b: Amount) -> U256 {
        U256::from(reserve_a) * U256::from(reserve_b)
    }

    /// Seed the pool. LP minted = floor(√(a·b)), all credited to the
    /// first provider.
    pub fn initialize(
        &mut self,
        provider: &str,
        a: Amount,
        b: Amount,
        block_index: u64,
    ) -> Result<Amount, AmmError> {
        if self.initialized {
            return Err(AmmError::AlreadyInitialized);
        }
        if a == 0 || b == 0 {
            return Err(AmmError::ZeroAmount);
        }

        let lp_u256 = isqrt(Self::product(a, b));
        if lp_u256 < U256::from(MIN_LIQUIDITY) {
            return Err(AmmError::BelowMinLiquidity);
        }
        let lp = lp_u256.as_u128();

        self.initialized = true;
        self.reserve_a = a;
        self.reserve_b = b;
        self.k = Self::product(a, b);
        self.total_lp_tokens = lp;
        self.lp_balances.insert(provider.to_string(), lp);
        self.created_at_block = block_index;
        self.last_update_block = block_index;
        Ok(lp)
    }

    /// Constant-product swap. The fee is charged on the input but the FULL
    /// input lands in the reserve, so k strictly grows on every swap.
    pub fn swap(
        &mut self,
        token_in: TokenSide,
        amount_in: Amount,
        min_out: Amount,
        block_index: u64,
    ) -> Result<Amount, AmmError> {
        if !self.initialized {
            return Err(AmmError::NotInitialized);
        }
        if amount_in == 0 {
            return Err(AmmError::ZeroAmount);
        }

        let fee = amount_in * AMM_FEE_NUM / AMM_FEE_DEN;
        let amount_in_net = amount_in - fee;
        if amount_in_net == 0 {
            return Err(AmmError::ZeroAmount);
        }

        let (reserve_in, reserve_out) = match token_in {
            TokenSide::A => (self.reserve_a, self.reserve_b),
            TokenSide::B => (self.reserve_b, self.reserve_a),
        };

        let new_reserve_in = U256::from(reserve_in) + U256::from(amount_in_net);
        let out_floor = self.k / new_reserve_in;
        let reserve_out_u256 = U256::from(reserve_out);
        if out_floor >= reserve_out_u256 {
            return Err(AmmError::InsufficientLiquidity);
        }
        let amount_out = (reserve_out_u256 - out_floor).as_u128();

        if amount_out == 0 {
            return Err(AmmError::InsufficientLiquidity);
        }
        if amount_out >= reserve_out {
            return Err(AmmError::InsufficientLiquidity);
        }
        if amount_out < min_out {
            return Err(AmmError::Slippage {
                got: amount_out,
                want: min_out,
            });
        }

        // Compute the post-swap state first; commit only if the invariant
        // holds, so a violation aborts with the pool untouched.
        let (new_a, new_b) = match token_in {
            TokenSide::A => (
                self.reserve_a.saturating_add(amount_in),
                self.reserve_b - amount_out,
            ),
            TokenSide::B => (
                self.reserve_a - amount_out,
                self.reserve_b.saturating_add(amount_in),
            ),
        };
        let new_k = Self::product(new_a, new_b);
        if new_k < self.k {
            return Err(AmmError::InvariantViolation {
                prev: self.k.to_string(),
                next: new_k.to_string(),
            });
        }

        self.reserve_a = new_a;
        self.reserve_b = new_b;
        self.k = new_k;
        self.last_update_block = block_index;
        Ok(amount_out)
    }

    /// Proportional deposit. Tolerates up to 1% deviation from the pool
    /// ratio: |a·reserveB − b·reserveA| ≤ (a·reserveB)/100.
    pub fn add_liquidity(
        &mut self,
        provider: &str,
        a: Amount,
        b: Amount,
        block_index: u64,
    ) -> Result<Amount, AmmError> {
        if !self.initialized {
            return self.initialize(provider, a, b, block_index);
        }
        if a == 0 || b == 0 {
            return Err(AmmError::ZeroAmount);
        }

        let lhs = U256::from(a) * U256::from(self.reserve_b);
        let rhs = U256::from(b) * U256::from(self.reserve_a);
        let deviation = if lhs > rhs { lhs - rhs } else { rhs - lhs };
        if deviation > lhs / 100 {
            return Err(AmmError::RatioMismatch);
        }

        let lp_u256 = U256::from(a) * U256::from(self.total_lp_tokens) / U256::from(self.reserve_a);
        if lp_u256 > U256::from(u128::MAX) {
            return Err(AmmError::BadOperand);
        }
        let lp = lp_u256.as_u128();
        if lp == 0 {
            return Err(AmmError::ZeroAmount);
        }

        self.reserve_a = self.reserve_a.saturating_add(a);
        self.reserve_b = self.reserve_b.saturating_add(b);
        self.total_lp_tokens = self.total_lp_tokens.saturating_add(lp);
        *self.lp_balances.entry(provider.to_string()).or_insert(0) += lp;
        self.k = Self::product(self.reserve_a, self.reserve_b);
        self.last_update_block = block_index;
        Ok(lp)
    }

    /// Burn LP tokens for a proportional share of both reserves.
    pub fn remove_liquidity(
        &mut self,
        provider: &str,
        lp: Amount,
        block_index: u64,
    ) -> Result<(Amount, Amount), AmmError> {
        if !self.initialized {
            return Err(AmmError::NotInitialized);
        }
        let balance = self.lp_balances.get(provider).copied().unwrap_or(0);
        if lp == 0 || lp > balance {
            return Err(AmmError::InsufficientLpBalance);
        }

        let total = U256::from(self.total_lp_tokens);
        let a_out = (U256::from(lp) * U256::from(self.reserve_a) / total).as_u128();
        let b_out = (U256::from(lp) * U256::from(self.reserve_b) / total).as_u128();

        self.reserve_a -= a_out;
        self.reserve_b -= b_out;
        self.total_lp_tokens -= lp;
        let remaining = balance - lp;
        if remaining == 0 {
            self.lp_balances.remove(provider);
        } else {
            self.lp_balances.insert(provider.to_string(), remaining);
        }
        self.k = Self::product(self.reserve_a, self.reserve_b);
        self.last_update_block = block_index;
        Ok((a_out, b_out))
    }

    /// Σ provider balances — must always equal `total_lp_tokens`.
    pub fn lp_balance_sum(&self) -> Amount {
        self.lp_balances
            .values()
            .fold(0u128, |a, v| a.saturating_add(*v))
    }
}

// ─────────────────────────────────────────────────────────────────
// SNAPSHOT (pool.json schema — all numerics as decimal strings)
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PoolSnapshot {
    pub initialized: bool,
    pub reserve_a: String,
    pub reserve_b: String,
    pub k: String,
    #[serde(rename = "totalLPTokens")]
    pub total_lp_tokens: String,
    pub lp_balances: BTreeMap<String, String>,
    pub created_at_block: u64,
    pub last_update_block: u64,
}

impl PoolSnapshot {
    pub fn capture(state: &PoolState) -> PoolSnapshot {
        PoolSnapshot {
            initialized: state.initialized,
            reserve_a: state.reserve_a.to_string(),
            reserve_b: state.reserve_b.to_string(),
            k: state.k.to_string(),
            total_lp_tokens: state.total_lp_tokens.to_string(),
            lp_balances: state
                .lp_balances
                .iter()
                .map(|(k, v)| (k.clone(), v.to_string()))
                .collect(),
            created_at_block: state.created_at_block,
            last_update_block: state.last_update_block,
        }
    }

    pub fn restore(&self) -> Result<PoolState, AmmError> {
        let mut lp_balances = BTreeMap::new();
        for (addr, v) in &self.lp_balances {
            lp_balances.insert(addr.clone(), parse_amount(v)?);
        }
        Ok(PoolState {
            initialized: self.initialized,
            reserve_a: parse_amount(&self.reserve_a)?,
            reserve_b: parse_amount(&self.reserve_b)?,
            k: U256::from_dec_str(&self.k).map_err(|_| AmmError::BadOperand)?,
            total_lp_tokens: parse_amount(&self.total_lp_tokens)?,
            lp_balances,
            created_at_block: self.created_at_block,
            last_update_block: self.last_update_block,
        })
    }
}

// ─────────────────────────────────────────────────────────────────
// POOL STATE MANAGER
// ─────────────────────────────────────────────────────────────────

/// All pools, keyed by pair name (the part after `POOL_` in the target
/// address). Reconstructed by replaying pool transactions from genesis.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolStateManager {
    pools: BTreeMap<String, PoolState>,
}

impl PoolStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pool(&self, pair: &str) -> Option<&PoolState> {
        self.pools.get(pair)
    }

    pub fn pairs(&self) -> impl Iterator<Item = &String> {
        self.pools.keys()
    }

    /// Execute one pool transaction. The sender pays only the tx fee at the
    /// ledger level; token movement is internal pool accounting.
    pub fn apply_transaction(
        &mut self,
        tx: &Transaction,
        block_index: u64,
    ) -> Result<(), AmmError> {
        let pair = tx
            .to_address
            .strip_prefix(POOL_ADDRESS_PREFIX)
            .ok_or(AmmError::NotAPoolOperation)?;
        let op = tx.pool_operation().ok_or(AmmError::NotAPoolOperation)?;
        let provider = tx.from_address.as_deref().unwrap_or("");
        if provider.is_empty() {
            return Err(AmmError::NotAPoolOperation);
        }

        let pool = self.pools.entry(pair.to_string()).or_default();
        match op {
            PoolOperation::Initialize { amount_a, amount_b } => {
                let a = parse_amount(&amount_a)?;
                let b = parse_amount(&amount_b)?;
                pool.initialize(provider, a, b, block_index).map(|_| ())
            }
            PoolOperation::AddLiquidity { amount_a, amount_b } => {
                let a = parse_amount(&amount_a)?;
                let b = parse_amount(&amount_b)?;
                pool.add_liquidity(provider, a, b, block_index).map(|_| ())
            }
            PoolOperation::RemoveLiquidity { lp_amount } => {
                let lp = parse_amount(&lp_amount)?;
                pool.remove_liquidity(provider, lp, block_index).map(|_| ())
            }
            PoolOperation::Swap {
                token_in,
                amount_in,
                min_out,
            } => {
                let side = TokenSide::parse(&token_in)?;
                let amount = parse_amount(&amount_in)?;
                let min = parse_amount(&min_out)?;
                pool.swap(side, amount, min, block_index).map(|_| ())
            }
        }
    }

    /// Apply every pool transaction of a confirmed block. Failures are
    /// collected for logging; they never invalidate the block.
    pub fn process_block_pool_operations(
        &mut self,
        transactions: &[Transaction],
        block_index: u64,
    ) -> Vec<(String, AmmError)> {
        let mut skipped = Vec::new();
        for tx in transactions {
            if !tx.is_pool_op() || tx.is_system() {
                continue;
            }
            if let Err(e) = self.apply_transaction(tx, block_index) {
                log::debug!("pool tx {} skipped: {}", tx.id, e);
                skipped.push((tx.id.clone(), e));
            }
        }
        skipped
    }

    pub fn snapshot(&self) -> BTreeMap<String, PoolSnapshot> {
        self.pools
            .iter()
            .map(|(pair, state)| (pair.clone(), PoolSnapshot::capture(state)))
            .collect()
    }

    pub fn restore(snapshot: &BTreeMap<String, PoolSnapshot>) -> Result<Self, AmmError> {
        let mut pools = BTreeMap::new();
        for (pair, snap) in snapshot {
            pools.insert(pair.clone(), snap.restore()?);
        }
        Ok(PoolStateManager { pools })
    }
}
