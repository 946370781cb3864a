// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LVENC - CORE MODULE
//
// Blockchain primitives: Transaction, Block, protocol parameters, genesis.
// All financial arithmetic uses scaled u128 integers (no floating-point);
// amounts carry 8 fractional digits (PRECISION = 10^8).
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod block;
pub mod genesis;
pub mod params;
pub mod transaction;

pub use block::Block;
pub use genesis::GenesisConfig;
pub use lvenc_crypto::Network;
pub use transaction::{PoolOperation, Transaction, TxError, TxType};

/// Scaled integer amount: 1 LVE = 10^8 units.
pub type Amount = u128;

// ─────────────────────────────────────────────────────────────────
// SENTINEL ADDRESSES
// ─────────────────────────────────────────────────────────────────
// Reserved recipients that never correspond to a keypair. Funds sent
// here are accounted by the owning subsystem (staking pool, AMM).
// ─────────────────────────────────────────────────────────────────

/// Staking subsystem sink: STAKE and DELEGATE transactions target this.
pub const STAKE_POOL_ADDRESS: &str = "STAKE_POOL";
/// Producer of the genesis block.
pub const GENESIS_ADDRESS: &str = "GENESIS";
/// Source of epoch-reward coinbase transactions.
pub const COINBASE_ADDRESS: &str = "COINBASE";
/// Testnet faucet sentinel.
pub const FAUCET_ADDRESS: &str = "FAUCET";
/// Prefix of per-pair AMM pool addresses (`POOL_<PAIR>`).
pub const POOL_ADDRESS_PREFIX: &str = "POOL_";

/// AMM pool address for a token pair, e.g. `pool_address("LVE_USD")`.
pub fn pool_address(pair: &str) -> String {
    format!("{}{}", POOL_ADDRESS_PREFIX, pair)
}

/// True if `addr` is one of the reserved sentinel addresses.
pub fn is_sentinel_address(addr: &str) -> bool {
    matches!(
        addr,
        STAKE_POOL_ADDRESS | GENESIS_ADDRESS | COINBASE_ADDRESS | FAUCET_ADDRESS
    ) || addr.starts_with(POOL_ADDRESS_PREFIX)
}
