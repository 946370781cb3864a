// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LVENC - GENESIS
//
// Deterministic construction of block 0. Every node must derive an
// identical genesis block from the same GenesisConfig, so every field
// (including the informational tx ids) is fixed — nothing random.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::block::Block;
use crate::params::{chain_id, GENESIS_AMOUNT, MIN_VALIDATOR_SELF_STAKE};
use crate::transaction::{Transaction, TxType, ZERO_SIGNATURE};
use crate::{GENESIS_ADDRESS, STAKE_POOL_ADDRESS};
use lvenc_crypto::Network;
use serde::{Deserialize, Serialize};

/// Fixed ids for the genesis transactions — informational, but they feed the
/// block hash, so they must match on every node.
const GENESIS_CREDIT_TX_ID: &str = "00000000-0000-0000-0000-000000000001";
const GENESIS_STAKE_TX_ID: &str = "00000000-0000-0000-0000-000000000002";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisConfig {
    pub faucet_address: String,
    /// When present, the faucet bootstraps the validator set with a
    /// minimum self-stake at genesis.
    #[serde(default)]
    pub faucet_public_key: Option<String>,
    /// Genesis time in milliseconds — also the slot-0 start.
    pub timestamp: u64,
}

impl GenesisConfig {
    /// Default testnet genesis used by tests and fresh testnet nodes.
    pub fn testnet_default() -> Self {
        GenesisConfig {
            faucet_address: "tLVE0000000000000000000000000000000000000001".to_string(),
            faucet_public_key: None,
            timestamp: 1_700_000_000_000,
        }
    }
}

/// Build the deterministic genesis block:
/// 1. TRANSFER from null crediting the faucet with `GENESIS_AMOUNT`;
/// 2. if a faucet public key is configured, a bootstrap STAKE from the
///    faucet into the stake pool, carrying the all-zero sentinel signature.
pub fn genesis_block(config: &GenesisConfig, network: Network) -> Block {
    let cid = chain_id(network);

    let mut credit = Transaction::new(
        TxType::Transfer,
        None,
        config.faucet_address.clone(),
        GENESIS_AMOUNT,
        0,
        0,
        config.timestamp,
        cid.to_string(),
        Some("genesis".to_string()),
    );
    credit.id = GENESIS_CREDIT_TX_ID.to_string();
    credit.signature = ZERO_SIGNATURE.to_string();

    let mut transactions = vec![credit];

    if let Some(faucet_pk) = &config.faucet_public_key {
        let mut stake = Transaction::new(
            TxType::Stake,
            Some(config.faucet_address.clone()),
            STAKE_POOL_ADDRESS.to_string(),
            MIN_VALIDATOR_SELF_STAKE,
            0,
            1,
            config.timestamp,
            cid.to_string(),
            None,
        );
        stake.id = GENESIS_STAKE_TX_ID.to_string();
        stake.public_key = faucet_pk.clone();
        stake.signature = ZERO_SIGNATURE.to_string();
        transactions.push(stake);
    }

    let mut block = Block::new(
        0,
        config.timestamp,
        "0".to_string(),
        transactions,
        GENESIS_ADDRESS.to_string(),
    );
    block.signature = ZERO_SIGNATURE.to_string();
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_is_deterministic() {
        let cfg = GenesisConfig::testnet_default();
        let a = genesis_block(&cfg, Network::Testnet);
        let b = genesis_block(&cfg, Network::Testnet);
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.index, 0);
        assert_eq!(a.previous_hash, "0");
        assert_eq!(a.validator, GENESIS_ADDRESS);
        assert!(a.is_genesis());
    }

    #[test]
    fn test_genesis_without_faucet_key_has_single_credit() {
        let cfg = GenesisConfig::testnet_default();
        let block = genesis_block(&cfg, Network::Testnet);
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(block.transactions[0].amount, GENESIS_AMOUNT);
        assert!(block.transactions[0].from_address.is_none());
    }

    #[test]
    fn test_genesis_with_faucet_key_bootstraps_stake() {
        let keys = lvenc_crypto::generate_keypair();
        let cfg = GenesisConfig {
            faucet_address: lvenc_crypto::public_key_to_address(
                &keys.public_key,
                Network::Testnet,
            ),
            faucet_public_key: Some(hex::encode(&keys.public_key)),
            timestamp: 1_700_000_000_000,
        };
        let block = genesis_block(&cfg, Network::Testnet);
        assert_eq!(block.transactions.len(), 2);

        let stake = &block.transactions[1];
        assert_eq!(stake.tx_type, TxType::Stake);
        assert_eq!(stake.to_address, STAKE_POOL_ADDRESS);
        assert_eq!(stake.amount, MIN_VALIDATOR_SELF_STAKE);
        assert_eq!(stake.nonce, 1);
        assert_eq!(stake.signature, ZERO_SIGNATURE);
    }

    #[test]
    fn test_networks_produce_different_genesis() {
        let cfg = GenesisConfig::testnet_default();
        let t = genesis_block(&cfg, Network::Testnet);
        let m = genesis_block(&cfg, Network::Mainnet);
        assert_ne!(t.hash, m.hash);
    }
}
