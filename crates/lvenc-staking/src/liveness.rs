// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LVENC - LIVENESS WINDOW
//
// Sliding bitset over a validator's last SIGNED_BLOCKS_WINDOW assigned
// slots. All math is integer — the signed fraction is compared as
// signed * den >= len * num to avoid floating point in consensus.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use lvenc_core::params::{MIN_SIGNED_PER_WINDOW, SIGNED_BLOCKS_WINDOW};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LivenessWindow {
    /// true = slot signed, false = slot missed. Oldest entry at the front.
    bits: VecDeque<bool>,
}

impl LivenessWindow {
    pub fn new() -> Self {
        LivenessWindow {
            bits: VecDeque::with_capacity(SIGNED_BLOCKS_WINDOW),
        }
    }

    /// Record the outcome of one assigned slot.
    pub fn record(&mut self, signed: bool) {
        if self.bits.len() == SIGNED_BLOCKS_WINDOW {
            self.bits.pop_front();
        }
        self.bits.push_back(signed);
    }

    pub fn clear(&mut self) {
        self.bits.clear();
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Window has seen a full SIGNED_BLOCKS_WINDOW of assigned slots.
    pub fn is_full(&self) -> bool {
        self.bits.len() == SIGNED_BLOCKS_WINDOW
    }

    pub fn signed_count(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    /// signed/len ≥ MIN_SIGNED_PER_WINDOW, in exact integer arithmetic.
    pub fn meets_threshold(&self) -> bool {
        if self.bits.is_empty() {
            return true;
        }
        let (num, den) = MIN_SIGNED_PER_WINDOW;
        (self.signed_count() as u64) * den >= (self.bits.len() as u64) * num
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_caps_at_size() {
        let mut w = LivenessWindow::new();
        for _ in 0..50 {
            w.record(true);
        }
        assert_eq!(w.len(), SIGNED_BLOCKS_WINDOW);
        assert!(w.is_full());
    }

    #[test]
    fn test_threshold_boundary() {
        // Exactly half signed → meets (>= 1/2)
        let mut w = LivenessWindow::new();
        for i in 0..SIGNED_BLOCKS_WINDOW {
            w.record(i % 2 == 0);
        }
        assert_eq!(w.signed_count(), SIGNED_BLOCKS_WINDOW / 2);
        assert!(w.meets_threshold());

        // 9 of 20 → 0.45 < 0.5 → fails
        let mut w = LivenessWindow::new();
        for i in 0..20 {
            w.record(i < 9);
        }
        assert!(!w.meets_threshold());
    }

    #[test]
    fn test_sliding_evicts_oldest() {
        let mut w = LivenessWindow::new();
        for _ in 0..SIGNED_BLOCKS_WINDOW {
            w.record(false);
        }
        assert!(!w.meets_threshold());
        // Recover: fresh signed slots push the misses out
        for _ in 0..SIGNED_BLOCKS_WINDOW {
            w.record(true);
        }
        assert!(w.meets_threshold());
        assert_eq!(w.signed_count(), SIGNED_BLOCKS_WINDOW);
    }

    #[test]
    fn test_empty_window_passes() {
        let w = LivenessWindow::new();
        assert!(w.meets_threshold());
        assert!(!w.is_full());
    }
}
