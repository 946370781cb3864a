// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PROPERTY-BASED TESTS — lvenc-amm
//
// k-monotonicity across swaps and LP-supply conservation for arbitrary
// operation sequences.
// Run: cargo test -p lvenc-amm --test prop_amm
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use lvenc_amm::{PoolState, TokenSide};
use lvenc_core::params::PRECISION;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    SwapA(u128),
    SwapB(u128),
    Add(u128),
    Remove(u128),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u128..=10_000).prop_map(|a| Op::SwapA(a * PRECISION)),
        (1u128..=10_000).prop_map(|a| Op::SwapB(a * PRECISION)),
        (1u128..=5_000).prop_map(|a| Op::Add(a * PRECISION)),
        (1u128..=1_000_000).prop_map(Op::Remove),
    ]
}

fn seeded_pool() -> PoolState {
    let mut pool = PoolState::default();
    pool.initialize(
        "provider",
        1_000_000 * PRECISION,
        1_000_000 * PRECISION,
        1,
    )
    .unwrap();
    pool
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// PROPERTY: k never decreases across any swap sequence (fees stay in
    /// the pool), and every state transition keeps reserveA*reserveB ≥ k.
    #[test]
    fn prop_k_monotone_over_swaps(ops in prop::collection::vec(arb_op(), 1..40)) {
        let mut pool = seeded_pool();
        let mut k_prev = pool.k;

        for (i, op) in ops.iter().enumerate() {
            let block = 2 + i as u64;
            match op {
                Op::SwapA(amount) => {
                    if pool.swap(TokenSide::A, *amount, 0, block).is_ok() {
                        prop_assert!(pool.k >= k_prev, "k decreased on swap");
                        k_prev = pool.k;
                    }
                }
                Op::SwapB(amount) => {
                    if pool.swap(TokenSide::B, *amount, 0, block).is_ok() {
                        prop_assert!(pool.k >= k_prev, "k decreased on swap");
                        k_prev = pool.k;
                    }
                }
                // Liquidity events legitimately move k; re-baseline.
                Op::Add(amount) => {
                    let b = *amount * pool.reserve_b / pool.reserve_a.max(1);
                    if b > 0 {
                        let _ = pool.add_liquidity("provider", *amount, b, block);
                    }
                    k_prev = pool.k;
                }
                Op::Remove(lp) => {
                    let _ = pool.remove_liquidity("provider", *lp, block);
                    k_prev = pool.k;
                }
            }

            // Stored k always equals the live product after a transition
            let product = primitive_types::U256::from(pool.reserve_a)
                * primitive_types::U256::from(pool.reserve_b);
            prop_assert!(product >= pool.k);
        }
    }

    /// PROPERTY: total LP tokens always equal the sum of provider balances.
    #[test]
    fn prop_lp_supply_conserved(ops in prop::collection::vec(arb_op(), 1..40)) {
        let mut pool = seeded_pool();
        for (i, op) in ops.iter().enumerate() {
            let block = 2 + i as u64;
            match op {
                Op::SwapA(amount) => { let _ = pool.swap(TokenSide::A, *amount, 0, block); }
                Op::SwapB(amount) => { let _ = pool.swap(TokenSide::B, *amount, 0, block); }
                Op::Add(amount) => {
                    let b = *amount * pool.reserve_b / pool.reserve_a.max(1);
                    if b > 0 {
                        let _ = pool.add_liquidity("other", *amount, b, block);
                    }
                }
                Op::Remove(lp) => { let _ = pool.remove_liquidity("provider", *lp, block); }
            }
            prop_assert_eq!(pool.lp_balance_sum(), pool.total_lp_tokens);
        }
    }

    /// PROPERTY: remove followed by re-adding the returned amounts restores
    /// the reserves modulo 1 unit of rounding per side.
    #[test]
    fn prop_remove_add_roundtrip(share_denom in 2u128..=50) {
        let mut pool = seeded_pool();
        let before = (pool.reserve_a, pool.reserve_b);
        let lp = pool.lp_balances["provider"] / share_denom;
        prop_assume!(lp > 0);

        let (a_out, b_out) = pool.remove_liquidity("provider", lp, 2).unwrap();
        prop_assume!(a_out > 0 && b_out > 0);
        pool.add_liquidity("provider", a_out, b_out, 3).unwrap();

        prop_assert!(before.0.abs_diff(pool.reserve_a) <= 1);
        prop_assert!(before.1.abs_diff(pool.reserve_b) <= 1);
    }
}
