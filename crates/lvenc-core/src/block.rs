// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LVENC - BLOCK
//
// A block is an ordered transaction list under a producer signature.
// hash     = SHA-256(index ∥ timestamp ∥ concat(canonical-json(tx)) ∥ previousHash)
// signature = Ed25519 over (chainId ∥ index ∥ hash) by the producing validator
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::transaction::{Transaction, ZERO_SIGNATURE};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("block hash mismatch: stored {stored}, computed {computed}")]
    HashMismatch { stored: String, computed: String },
    #[error("block signature malformed or missing")]
    MalformedSignature,
    #[error("block signature verification failed")]
    InvalidSignature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Height. Block 0 is the genesis block.
    pub index: u64,
    /// Slot start time in milliseconds.
    pub timestamp: u64,
    pub previous_hash: String,
    /// First entry is the epoch-reward coinbase, then fee-sorted user tx.
    pub transactions: Vec<Transaction>,
    /// Address of the producing validator (GENESIS sentinel for block 0).
    pub validator: String,
    /// Producer signature over `chainId ∥ index ∥ hash`.
    pub signature: String,
    pub hash: String,
}

impl Block {
    pub fn new(
        index: u64,
        timestamp: u64,
        previous_hash: String,
        transactions: Vec<Transaction>,
        validator: String,
    ) -> Self {
        let mut block = Block {
            index,
            timestamp,
            previous_hash,
            transactions,
            validator,
            signature: String::new(),
            hash: String::new(),
        };
        block.hash = block.calculate_hash();
        block
    }

    /// Content hash over index, timestamp, every transaction's canonical
    /// JSON, and the parent link. Field order inside the transaction JSON is
    /// the struct declaration order, which serde keeps stable.
    pub fn calculate_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.index.to_string().as_bytes());
        hasher.update(self.timestamp.to_string().as_bytes());
        for tx in &self.transactions {
            // Serialization of an in-memory tx cannot fail; fall back to the
            // canonical hash so a pathological tx still contributes bytes.
            match serde_json::to_string(tx) {
                Ok(json) => hasher.update(json.as_bytes()),
                Err(_) => hasher.update(tx.canonical_hash().as_bytes()),
            }
        }
        hasher.update(self.previous_hash.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// The producer signing message: `chainId ∥ index ∥ hash`.
    pub fn signing_message(&self, chain_id: &str) -> String {
        format!("{}{}{}", chain_id, self.index, self.hash)
    }

    /// Sign as the producing validator. The hash must already be computed.
    pub fn sign(&mut self, secret_key: &[u8], chain_id: &str) -> Result<(), BlockError> {
        let msg = self.signing_message(chain_id);
        let sig = lvenc_crypto::sign_message(msg.as_bytes(), secret_key)
            .map_err(|_| BlockError::MalformedSignature)?;
        self.signature = hex::encode(sig);
        Ok(())
    }

    /// Verify the stored hash and the producer signature against the
    /// validator's registered public key.
    pub fn verify_producer_signature(
        &self,
        validator_public_key: &[u8],
        chain_id: &str,
    ) -> Result<(), BlockError> {
        let computed = self.calculate_hash();
        if computed != self.hash {
            return Err(BlockError::HashMismatch {
                stored: self.hash.clone(),
                computed,
            });
        }

        let sig_bytes = hex::decode(&self.signature).map_err(|_| BlockError::MalformedSignature)?;
        let msg = self.signing_message(chain_id);
        if !lvenc_crypto::verify_signature(msg.as_bytes(), &sig_bytes, validator_public_key) {
            return Err(BlockError::InvalidSignature);
        }
        Ok(())
    }

    /// Genesis blocks carry the all-zero sentinel signature.
    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.signature == ZERO_SIGNATURE
    }

    /// Sum of user transaction fees in this block.
    pub fn total_fees(&self) -> crate::Amount {
        self.transactions
            .iter()
            .filter(|tx| !tx.is_system())
            .fold(0u128, |acc, tx| acc.saturating_add(tx.fee))
    }
}
