// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LVENC - VALIDATOR SELECTION
//
// Deterministic weighted producer pick per slot. Every node computes the
// same producer from (previousBlockHash, slotNumber) — no communication.
// Weight = selfStake + delegatedStake, truncated at MAX_CONCENTRATION_PCT
// of the total bonded stake of the recorded validator set.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::StakingPool;
use lvenc_core::params::MAX_CONCENTRATION_PCT;
use lvenc_core::Amount;
use sha2::{Digest, Sha256};

impl StakingPool {
    /// Selection weights for the recorded validator set, concentration cap
    /// applied. Order follows the (sorted) validator set.
    pub fn selection_weights(&self) -> Vec<(String, Amount)> {
        let set = self.validator_set();
        let total: Amount = set
            .iter()
            .filter_map(|a| self.validator(a))
            .fold(0u128, |acc, v| acc.saturating_add(v.total_stake()));
        if total == 0 {
            return Vec::new();
        }

        // Truncate weights only; the stake itself is never touched.
        let cap = total * MAX_CONCENTRATION_PCT as u128 / 100;
        set.iter()
            .filter_map(|a| self.validator(a))
            .map(|v| {
                let w = v.total_stake();
                let w = if cap > 0 { w.min(cap) } else { w };
                (v.address.clone(), w)
            })
            .collect()
    }

    /// Deterministic pseudorandom producer for `slot`, seeded by
    /// `SHA-256(previousBlockHash ∥ slotNumber)`.
    pub fn select_producer(&self, previous_hash: &str, slot: u64) -> Option<String> {
        let weights = self.selection_weights();
        let total: Amount = weights.iter().fold(0u128, |a, (_, w)| a.saturating_add(*w));
        if total == 0 {
            return None;
        }

        let mut hasher = Sha256::new();
        hasher.update(previous_hash.as_bytes());
        hasher.update(slot.to_string().as_bytes());
        let digest = hasher.finalize();

        let mut seed_bytes = [0u8; 16];
        seed_bytes.copy_from_slice(&digest[..16]);
        let ticket = u128::from_be_bytes(seed_bytes) % total;

        let mut cumulative: Amount = 0;
        for (addr, weight) in weights {
            cumulative = cumulative.saturating_add(weight);
            if ticket < cumulative {
                return Some(addr);
            }
        }
        None
    }
}
