// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LVENC - PROTOCOL PARAMETERS
//
// Network-wide constants. Identical on every node — never configurable at
// runtime. A node with different values forks itself off the network.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::Amount;
use lvenc_crypto::Network;

/// Scaled-integer precision: 1 LVE = 100_000_000 units (8 fractional digits)
pub const PRECISION: Amount = 100_000_000;

/// Chain identifier strings — included in every signed payload to prevent
/// cross-chain replay.
pub const CHAIN_ID_TESTNET: &str = "lvenc-testnet-1";
pub const CHAIN_ID_MAINNET: &str = "lvenc-mainnet-1";

pub fn chain_id(network: Network) -> &'static str {
    match network {
        Network::Testnet => CHAIN_ID_TESTNET,
        Network::Mainnet => CHAIN_ID_MAINNET,
    }
}

/// Resolve a chain id string back to its network.
pub fn network_for_chain_id(id: &str) -> Option<Network> {
    match id {
        CHAIN_ID_TESTNET => Some(Network::Testnet),
        CHAIN_ID_MAINNET => Some(Network::Mainnet),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────
// SLOTS & EPOCHS
// ─────────────────────────────────────────────────────────────────

/// One producer slot every 30 seconds
pub const SLOT_DURATION_MS: u64 = 30_000;
/// One epoch = 100 consecutive blocks; staking changes promote at boundaries
pub const EPOCH_BLOCKS: u64 = 100;
/// Slots per calendar year at 30 s slots (365 days)
pub const BLOCKS_PER_YEAR: u64 = 365 * 24 * 3600 * 1000 / SLOT_DURATION_MS;

/// Epoch containing block height `h`
pub const fn epoch_of_height(h: u64) -> u64 {
    h / EPOCH_BLOCKS
}

/// True when appending block `h` crosses an epoch boundary (genesis excluded)
pub const fn is_epoch_boundary(h: u64) -> bool {
    h > 0 && h % EPOCH_BLOCKS == 0
}

/// Slot number for wall-clock time `now_ms` relative to `genesis_time_ms`
pub const fn slot_for_time(now_ms: u64, genesis_time_ms: u64) -> u64 {
    (now_ms.saturating_sub(genesis_time_ms)) / SLOT_DURATION_MS
}

// ─────────────────────────────────────────────────────────────────
// FEES & MEMPOOL
// ─────────────────────────────────────────────────────────────────

/// Minimum fee for non-staking user transactions: 0.1 LVE
pub const MIN_FEE: Amount = PRECISION / 10;
/// Maximum user transactions per block (excluding the coinbase)
pub const MAX_TX_PER_BLOCK: usize = 10;
/// Mempool capacity
pub const MAX_PENDING_TX: usize = 100;
/// Largest accepted gap between a new nonce and the last confirmed one
pub const MAX_NONCE_GAP: u64 = 100;

// ─────────────────────────────────────────────────────────────────
// STAKING
// ─────────────────────────────────────────────────────────────────

/// Minimum self-stake to register as a validator: 100 LVE
pub const MIN_VALIDATOR_SELF_STAKE: Amount = 100 * PRECISION;
/// Minimum delegation: 10 LVE
pub const MIN_DELEGATION: Amount = 10 * PRECISION;
/// Double-sign slash: 50% of self-stake, burned
pub const SLASH_PERCENT: u32 = 50;
/// Downtime slash on jailing, in basis points (0.1%)
pub const DOWNTIME_SLASH_BPS: u32 = 10;
/// Commission applied to newly registered validators
pub const DEFAULT_COMMISSION_PCT: u8 = 10;
/// COMMISSION transactions are clamped into this range
pub const MIN_COMMISSION_PCT: u8 = 0;
pub const MAX_COMMISSION_PCT: u8 = 100;
/// Selection weight of one validator is capped at this share of total bonded
/// stake. The cap truncates weights only — stake is never confiscated.
pub const MAX_CONCENTRATION_PCT: u32 = 33;
/// Lifetime jail count that converts into a permanent ban
pub const MAX_JAIL_COUNT: u32 = 3;
/// Sliding liveness window: last 20 assigned slots
pub const SIGNED_BLOCKS_WINDOW: usize = 20;
/// Minimum signed fraction of the window, as (numerator, denominator)
pub const MIN_SIGNED_PER_WINDOW: (u64, u64) = (1, 2);

/// Epochs an UNSTAKE/UNDELEGATE stays in the unbonding queue
pub const fn unbonding_epochs(network: Network) -> u64 {
    match network {
        Network::Testnet => 3,
        Network::Mainnet => 21,
    }
}

/// Epochs a jailed validator stays out of the validator set
pub const fn jail_duration_epochs(network: Network) -> u64 {
    match network {
        Network::Testnet => 2,
        Network::Mainnet => 7,
    }
}

// ─────────────────────────────────────────────────────────────────
// CHAIN & INFLATION
// ─────────────────────────────────────────────────────────────────

/// Blocks at height ≤ tip − FINALITY_DEPTH are irreversible on this node
pub const FINALITY_DEPTH: u64 = 32;
/// Annual inflation 0.6%, expressed as an exact fraction
pub const INFLATION_RATE_NUM: u128 = 6;
pub const INFLATION_RATE_DEN: u128 = 1000;

/// Inflation minted at one epoch boundary:
/// `floor(totalSupply * rate * epochBlocks / blocksPerYear)` — exact integer.
pub fn epoch_inflation(total_supply: Amount) -> Amount {
    total_supply * INFLATION_RATE_NUM * EPOCH_BLOCKS as u128
        / (INFLATION_RATE_DEN * BLOCKS_PER_YEAR as u128)
}

// ─────────────────────────────────────────────────────────────────
// SYNC & PROTOCOL VERSIONING
// ─────────────────────────────────────────────────────────────────

/// Gaps larger than this trigger chunked backfill instead of chain replace
pub const CHUNK_SIZE: u64 = 500;
/// Upper bound on blocks served per QUERY_BLOCKS_FROM
pub const MAX_BLOCKS_PER_REQUEST: u64 = 1000;
/// Current gossip protocol version
pub const PROTOCOL_VERSION: u32 = 2;
/// Oldest peer protocol version accepted after the grace window closes
pub const MIN_PROTOCOL_VERSION: u32 = 1;
/// Handshake and sync-request deadline
pub const PEER_TIMEOUT_SECS: u64 = 30;

// ─────────────────────────────────────────────────────────────────
// AMM
// ─────────────────────────────────────────────────────────────────

/// Swap fee 3/1000 of amountIn, retained in the pool reserves
pub const AMM_FEE_NUM: u128 = 3;
pub const AMM_FEE_DEN: u128 = 1000;
/// Minimum initial LP mint — blocks dust pools and price manipulation
pub const MIN_LIQUIDITY: Amount = 1000 * PRECISION;

// ─────────────────────────────────────────────────────────────────
// GENESIS
// ─────────────────────────────────────────────────────────────────

/// Initial supply credited to the faucet: 70,000,000 LVE
pub const GENESIS_AMOUNT: Amount = 70_000_000 * PRECISION;

/// Format a scaled amount for logs and display ONLY — never for consensus.
pub fn format_amount(units: Amount) -> String {
    let whole = units / PRECISION;
    let frac = units % PRECISION;
    if frac == 0 {
        format!("{}", whole)
    } else {
        let s = format!("{:08}", frac);
        format!("{}.{}", whole, s.trim_end_matches('0'))
    }
}
