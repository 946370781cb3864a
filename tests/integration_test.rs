// ========================================
// INTEGRATION TESTS FOR LVENC
// ========================================
//
// Test Scenarios:
// 1. Genesis bootstrap balances and stake
// 2. Transfer through mempool admission and block application
// 3. AMM pool lifecycle driven by on-chain transactions
// 4. Double-spend race — exactly one admission wins
// 5. Deep-reorg refusal at the finality depth
// 6. Liveness jailing after a failed window
//
// Usage:
//   cargo test --test integration_test -- --test-threads=1 --nocapture
//
// ========================================

use lvenc_chain::Chain;
use lvenc_core::genesis::GenesisConfig;
use lvenc_core::params::{
    chain_id, EPOCH_BLOCKS, FINALITY_DEPTH, MIN_FEE, PRECISION, SLOT_DURATION_MS,
};
use lvenc_core::{Network, PoolOperation, Transaction, TxType};
use lvenc_crypto::{generate_keypair, public_key_to_address, KeyPair};
use lvenc_node::Mempool;
use std::sync::Arc;
use tokio::sync::Mutex;

const RECIPIENT: &str = "tLVEaa00000000000000000000000000000000000001";

fn faucet_chain() -> (Chain, KeyPair) {
    let keys = generate_keypair();
    let faucet = public_key_to_address(&keys.public_key, Network::Testnet);
    let chain = Chain::new(
        Network::Testnet,
        GenesisConfig {
            faucet_address: faucet,
            faucet_public_key: Some(hex::encode(&keys.public_key)),
            timestamp: 1_700_000_000_000,
        },
    );
    (chain, keys)
}

/// Produce the next block at an explicit slot (slot gaps = missed slots).
fn produce_at_slot(
    chain: &Chain,
    keys: &KeyPair,
    txs: Vec<Transaction>,
    slot: u64,
) -> lvenc_core::Block {
    let validator = public_key_to_address(&keys.public_key, Network::Testnet);
    let timestamp = chain.genesis_time_ms() + slot * SLOT_DURATION_MS;
    let fees = txs.iter().fold(0u128, |a, t| a.saturating_add(t.fee));
    let coinbase = Transaction::coinbase(
        &validator,
        chain.expected_coinbase_amount(fees),
        timestamp,
        chain.chain_id(),
    );
    let mut all = vec![coinbase];
    all.extend(txs);
    let mut block = lvenc_core::Block::new(
        chain.height() + 1,
        timestamp,
        chain.tip().hash.clone(),
        all,
        validator,
    );
    block.sign(&keys.secret_key, chain.chain_id()).unwrap();
    block
}

fn produce(chain: &Chain, keys: &KeyPair, txs: Vec<Transaction>) -> lvenc_core::Block {
    produce_at_slot(chain, keys, txs, chain.height() + 1)
}

fn signed_transfer(keys: &KeyPair, to: &str, amount: u128, fee: u128, nonce: u64) -> Transaction {
    let from = public_key_to_address(&keys.public_key, Network::Testnet);
    let mut tx = Transaction::new(
        TxType::Transfer,
        Some(from),
        to.to_string(),
        amount,
        fee,
        nonce,
        0,
        chain_id(Network::Testnet).to_string(),
        None,
    );
    tx.sign(&keys.secret_key, Network::Testnet).unwrap();
    tx
}

// ========================================
// TEST 1: GENESIS BOOTSTRAP
// ========================================
#[test]
fn test_genesis_bootstrap() {
    println!("\n🧪 TEST 1: Genesis bootstrap");

    let (chain, keys) = faucet_chain();
    let faucet = public_key_to_address(&keys.public_key, Network::Testnet);

    assert_eq!(chain.blocks().len(), 1);
    assert_eq!(chain.last_finalized_index(), 0);
    assert_eq!(
        chain.balance_of(&faucet),
        (70_000_000 - 100) * PRECISION,
        "faucet = genesisAmount − bootstrap stake"
    );
    assert_eq!(chain.staking().self_stake(&faucet), 100 * PRECISION);
    assert!(chain.staking().is_active_validator(&faucet));
    chain.audit_supply().unwrap();

    println!("✅ genesis balances and validator set OK");
}

// ========================================
// TEST 2: MEMPOOL → BLOCK → BALANCES
// ========================================
#[tokio::test]
async fn test_transfer_through_mempool_and_block() {
    println!("\n🧪 TEST 2: Transfer through mempool admission");

    let (chain, keys) = faucet_chain();
    let faucet = public_key_to_address(&keys.public_key, Network::Testnet);
    let chain = Arc::new(Mutex::new(chain));
    let mempool = Mempool::new(None);

    // Admission
    let tx = signed_transfer(&keys, RECIPIENT, 10 * PRECISION, MIN_FEE, 2);
    mempool.admit(tx, &chain).await.unwrap();
    assert_eq!(mempool.len(), 1);

    // Block assembly and application
    let selected = mempool.take_for_block();
    let mut guard = chain.lock().await;
    let block = produce(&guard, &keys, selected);
    guard.append_block(block.clone()).unwrap();
    mempool.remove_confirmed(&block, &guard);

    assert_eq!(guard.height(), 1);
    assert_eq!(guard.balance_of(RECIPIENT), 10 * PRECISION);
    // The faucet paid amount + fee and, as producer, earned the fee back
    assert_eq!(
        guard.balance_of(&faucet),
        (70_000_000 - 100 - 10) * PRECISION
    );
    guard.audit_supply().unwrap();
    drop(guard);
    assert!(mempool.is_empty());

    println!("✅ transfer applied, mempool drained");
}

// ========================================
// TEST 3: AMM LIFECYCLE ON-CHAIN
// ========================================
#[test]
fn test_amm_lifecycle_on_chain() {
    println!("\n🧪 TEST 3: AMM pool lifecycle");

    let (mut chain, keys) = faucet_chain();
    let faucet = public_key_to_address(&keys.public_key, Network::Testnet);

    // Blocks 1-4: warm-up, pool initialized in block 5
    for _ in 0..4 {
        let block = produce(&chain, &keys, vec![]);
        chain.append_block(block).unwrap();
    }

    let mut init = Transaction::pool_op(
        &faucet,
        "LVE_USD",
        &PoolOperation::Initialize {
            amount_a: (100_000 * PRECISION).to_string(),
            amount_b: (5_000 * PRECISION).to_string(),
        },
        MIN_FEE,
        2,
        0,
        chain.chain_id(),
    );
    init.sign(&keys.secret_key, Network::Testnet).unwrap();
    let block5 = produce(&chain, &keys, vec![init]);
    chain.append_block(block5).unwrap();

    let pool = chain.amm().pool("LVE_USD").unwrap();
    assert!(pool.initialized);
    assert_eq!(pool.created_at_block, 5);
    assert_eq!(pool.reserve_a, 100_000 * PRECISION);
    let k_before = pool.k;

    // Swap 1_000 A with minOut 0: fee 3, net 997, out ≈ 49.40
    let mut swap = Transaction::pool_op(
        &faucet,
        "LVE_USD",
        &PoolOperation::Swap {
            token_in: "A".to_string(),
            amount_in: (1_000 * PRECISION).to_string(),
            min_out: "0".to_string(),
        },
        MIN_FEE,
        3,
        0,
        chain.chain_id(),
    );
    swap.sign(&keys.secret_key, Network::Testnet).unwrap();
    let block6 = produce(&chain, &keys, vec![swap]);
    chain.append_block(block6).unwrap();

    let pool = chain.amm().pool("LVE_USD").unwrap();
    assert_eq!(pool.reserve_a, 101_000 * PRECISION);
    let received = 5_000 * PRECISION - pool.reserve_b;
    assert!(received > 49 * PRECISION && received < 50 * PRECISION);
    assert!(pool.k >= k_before, "k must not decrease across a swap");

    println!("✅ pool initialized at block 5, swap preserved k");
}

// ========================================
// TEST 4: DOUBLE-SPEND RACE
// ========================================
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_double_spend_race() {
    println!("\n🧪 TEST 4: Double-spend race");

    let (chain, keys) = faucet_chain();
    let chain = Arc::new(Mutex::new(chain));
    let mempool = Arc::new(Mempool::new(None));

    let tx_a = signed_transfer(&keys, RECIPIENT, 10 * PRECISION, MIN_FEE, 2);
    let tx_b = signed_transfer(
        &keys,
        "tLVEbb00000000000000000000000000000000000002",
        20 * PRECISION,
        MIN_FEE,
        2,
    );

    let (m1, c1) = (mempool.clone(), chain.clone());
    let (m2, c2) = (mempool.clone(), chain.clone());
    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { m1.admit(tx_a, &c1).await }),
        tokio::spawn(async move { m2.admit(tx_b, &c2).await }),
    );

    let results = [r1.unwrap(), r2.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(mempool.len(), 1);

    println!("✅ exactly one admission won the race");
}

// ========================================
// TEST 5: DEEP REORG REFUSED
// ========================================
#[test]
fn test_deep_reorg_refused() {
    println!("\n🧪 TEST 5: Deep-reorg protection");

    let (mut local, keys) = faucet_chain();
    let mut fork = local.clone();

    for _ in 0..(FINALITY_DEPTH + 6) {
        let block = produce(&local, &keys, vec![]);
        local.append_block(block).unwrap();
    }
    assert!(local.last_finalized_index() > 0);

    // Fork rewrites history from block 1 and outgrows the local chain.
    let divergent = signed_transfer(&keys, RECIPIENT, PRECISION, MIN_FEE, 2);
    let block = produce(&fork, &keys, vec![divergent]);
    fork.append_block(block).unwrap();
    for _ in 0..(FINALITY_DEPTH + 10) {
        let block = produce(&fork, &keys, vec![]);
        fork.append_block(block).unwrap();
    }

    let tip = local.tip().hash.clone();
    let err = local.replace_chain(fork.blocks().to_vec()).unwrap_err();
    assert!(matches!(
        err,
        lvenc_chain::ChainError::FinalityViolation { .. }
    ));
    assert_eq!(local.tip().hash, tip, "local chain must be untouched");

    println!("✅ finalized prefix protected, chain unchanged");
}

// ========================================
// TEST 6: LIVENESS JAIL AT EPOCH BOUNDARY
// ========================================
#[test]
fn test_liveness_jail_at_boundary() {
    println!("\n🧪 TEST 6: Liveness window jailing");

    let (mut chain, keys) = faucet_chain();
    let faucet = public_key_to_address(&keys.public_key, Network::Testnet);

    // Blocks 1..=99 land on consecutive slots (all signed).
    for _ in 0..(EPOCH_BLOCKS - 1) {
        let block = produce(&chain, &keys, vec![]);
        chain.append_block(block).unwrap();
    }

    // The boundary block skips 11 slots: the last 20 observed slots are
    // 8 signed + 11 missed + 1 signed = 9/20 = 0.45 < 0.5.
    let tip_slot = EPOCH_BLOCKS - 1;
    let boundary = produce_at_slot(&chain, &keys, vec![], tip_slot + 12);
    chain.append_block(boundary).unwrap();

    let v = chain.staking().validator(&faucet).unwrap();
    assert!(v.is_jailed, "validator must be jailed at the boundary");
    assert_eq!(v.jail_count, 1);
    assert!(!chain.staking().validator_set().contains(&faucet));

    println!("✅ validator jailed for missing its window");
}
