// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PROPERTY-BASED TESTS — lvenc-core
//
// Canonical-hash determinism and tamper detection for ALL transactions.
// Run: cargo test -p lvenc-core --test prop_core
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use lvenc_core::params::chain_id;
use lvenc_core::{Transaction, TxType};
use lvenc_crypto::{generate_keypair_from_seed, public_key_to_address, Network};
use proptest::prelude::*;

fn arb_tx_type() -> impl Strategy<Value = TxType> {
    prop_oneof![
        Just(TxType::Transfer),
        Just(TxType::Stake),
        Just(TxType::Unstake),
        Just(TxType::Delegate),
        Just(TxType::Undelegate),
        Just(TxType::Claim),
        Just(TxType::Commission),
    ]
}

proptest! {
    /// PROPERTY: canonical hash is a pure function of the signed fields —
    /// metadata (id, timestamp, signature) never changes it.
    #[test]
    fn prop_hash_ignores_metadata(
        tx_type in arb_tx_type(),
        amount in 0u128..u64::MAX as u128,
        fee in 0u128..u64::MAX as u128,
        nonce in 0u64..u64::MAX,
        ts1 in 0u64..u64::MAX,
        ts2 in 0u64..u64::MAX,
    ) {
        let make = |ts: u64| Transaction::new(
            tx_type,
            Some("tLVEaa00000000000000000000000000000000000001".to_string()),
            "tLVEbb00000000000000000000000000000000000002".to_string(),
            amount,
            fee,
            nonce,
            ts,
            chain_id(Network::Testnet).to_string(),
            None,
        );
        // ids are random UUIDs, timestamps differ — hashes must not.
        prop_assert_eq!(make(ts1).canonical_hash(), make(ts2).canonical_hash());
    }

    /// PROPERTY: any change to a signed field changes the hash
    #[test]
    fn prop_hash_sensitive_to_signed_fields(
        amount in 0u128..u64::MAX as u128,
        fee in 0u128..u64::MAX as u128,
        nonce in 0u64..1_000_000,
        bump in 1u64..1_000,
    ) {
        let base = Transaction::new(
            TxType::Transfer,
            Some("tLVEaa00000000000000000000000000000000000001".to_string()),
            "tLVEbb00000000000000000000000000000000000002".to_string(),
            amount,
            fee,
            nonce,
            0,
            chain_id(Network::Testnet).to_string(),
            None,
        );
        let h = base.canonical_hash();

        let mut t = base.clone();
        t.nonce = nonce + bump;
        prop_assert_ne!(t.canonical_hash(), h.clone());

        let mut t = base.clone();
        t.amount = amount.wrapping_add(bump as u128);
        prop_assert_ne!(t.canonical_hash(), h);
    }

    /// PROPERTY: signing round-trips and tampering any signed field breaks
    /// verification for every seed/amount combination.
    #[test]
    fn prop_sign_then_tamper_fails(
        seed in prop::array::uniform32(any::<u8>()),
        amount in 1u128..u64::MAX as u128,
        nonce in 1u64..1_000_000,
    ) {
        let mut full_seed = [0u8; 64];
        full_seed[..32].copy_from_slice(&seed);
        let keys = generate_keypair_from_seed(&full_seed);
        let from = public_key_to_address(&keys.public_key, Network::Testnet);

        let mut tx = Transaction::new(
            TxType::Transfer,
            Some(from),
            "tLVEbb00000000000000000000000000000000000002".to_string(),
            amount,
            lvenc_core::params::MIN_FEE,
            nonce,
            0,
            chain_id(Network::Testnet).to_string(),
            None,
        );
        tx.sign(&keys.secret_key, Network::Testnet).unwrap();
        prop_assert!(tx.verify(Network::Testnet).is_ok());

        let mut tampered = tx.clone();
        tampered.amount = amount.wrapping_add(1);
        prop_assert!(tampered.verify(Network::Testnet).is_err());

        let mut tampered = tx.clone();
        tampered.to_address = "tLVEcc00000000000000000000000000000000000003".to_string();
        prop_assert!(tampered.verify(Network::Testnet).is_err());

        // Metadata tampering does NOT break the signature
        let mut retimed = tx.clone();
        retimed.timestamp = 999;
        prop_assert!(retimed.verify(Network::Testnet).is_ok());
    }
}
