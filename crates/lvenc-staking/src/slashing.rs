// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LVENC - SLASHING RECORDS
//
// Local record-keeping for validator misbehavior. Double-sign detection
// compares producer signatures per height; the actual stake deduction lives
// in StakingPool::slash_double_sign. Evidence is never gossiped.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use lvenc_core::Amount;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SlashReason {
    DoubleSign,
    Downtime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlashEvent {
    pub validator: String,
    pub epoch: u64,
    pub amount: Amount,
    pub reason: SlashReason,
}

/// One observed producer signature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignatureRecord {
    pub height: u64,
    pub block_hash: String,
}

/// Retained signature history per validator (most recent heights only).
const SIGNATURE_HISTORY: usize = 1000;

/// Tracks which block each validator signed at each height. Two different
/// hashes at the same height from the same validator is double-signing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DoubleSignDetector {
    records: BTreeMap<String, Vec<SignatureRecord>>,
}

impl DoubleSignDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a signature. Returns the conflicting hash if this validator
    /// already signed a DIFFERENT block at the same height.
    pub fn record(&mut self, validator: &str, height: u64, block_hash: &str) -> Option<String> {
        let records = self.records.entry(validator.to_string()).or_default();

        for r in records.iter() {
            if r.height == height && r.block_hash != block_hash {
                return Some(r.block_hash.clone());
            }
        }

        records.push(SignatureRecord {
            height,
            block_hash: block_hash.to_string(),
        });
        if records.len() > SIGNATURE_HISTORY {
            records.remove(0);
        }
        None
    }
}
