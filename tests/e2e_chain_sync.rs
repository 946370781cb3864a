// ========================================
// E2E CHAIN SYNC TESTS FOR LVENC
// ========================================
//
// Drives two full nodes' gossip contexts against each other:
// 1. Chunked backfill across a gap larger than CHUNK_SIZE
// 2. Small-gap chain replace via QUERY_ALL / RESPONSE_CHAIN
// 3. The same flows over a real TCP loopback with framed sessions
//
// Usage:
//   cargo test --test e2e_chain_sync -- --nocapture
//
// ========================================

use lvenc_chain::Chain;
use lvenc_core::genesis::GenesisConfig;
use lvenc_core::params::{CHUNK_SIZE, SLOT_DURATION_MS};
use lvenc_core::{Network, Transaction};
use lvenc_crypto::{generate_keypair, public_key_to_address, KeyPair};
use lvenc_network::{GossipContext, HandshakeConfig, Message, PeerSession};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};

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

fn produce(chain: &Chain, keys: &KeyPair) -> lvenc_core::Block {
    let validator = public_key_to_address(&keys.public_key, Network::Testnet);
    let index = chain.height() + 1;
    let timestamp = chain.genesis_time_ms() + index * SLOT_DURATION_MS;
    let coinbase = Transaction::coinbase(
        &validator,
        chain.expected_coinbase_amount(0),
        timestamp,
        chain.chain_id(),
    );
    let mut block = lvenc_core::Block::new(
        index,
        timestamp,
        chain.tip().hash.clone(),
        vec![coinbase],
        validator,
    );
    block.sign(&keys.secret_key, chain.chain_id()).unwrap();
    block
}

fn grow(chain: &mut Chain, keys: &KeyPair, blocks: u64) {
    for _ in 0..blocks {
        let block = produce(chain, keys);
        chain.append_block(block).unwrap();
    }
}

fn context(chain: Chain) -> (GossipContext, mpsc::Receiver<Transaction>) {
    let (tx_sink, rx) = mpsc::channel(16);
    (
        GossipContext::new(
            Arc::new(Mutex::new(chain)),
            Arc::new(AtomicBool::new(false)),
            tx_sink,
        ),
        rx,
    )
}

/// Ping-pong every reply between the two contexts until the conversation
/// goes quiet. `seed` is delivered to `local` first.
async fn pump(local: &GossipContext, remote: &GossipContext, seed: Message) -> usize {
    let mut for_local = vec![seed];
    let mut for_remote: Vec<Message> = Vec::new();
    let mut rounds = 0usize;

    while !for_local.is_empty() || !for_remote.is_empty() {
        rounds += 1;
        assert!(rounds < 64, "sync conversation did not converge");

        let mut next_for_remote = Vec::new();
        for msg in for_local.drain(..) {
            next_for_remote.extend(local.handle_message(msg).await);
        }
        let mut next_for_local = Vec::new();
        for msg in for_remote.drain(..) {
            next_for_local.extend(remote.handle_message(msg).await);
        }
        for_remote = next_for_remote;
        for_local = next_for_local;
    }
    rounds
}

// ========================================
// TEST 1: CHUNKED BACKFILL (gap > CHUNK_SIZE)
// ========================================
#[tokio::test]
async fn test_chunked_backfill_over_large_gap() {
    println!("\n🧪 E2E 1: Chunked backfill over {}+ blocks", CHUNK_SIZE);

    let (local, keys) = faucet_chain();
    let mut remote_chain = local.clone();
    grow(&mut remote_chain, &keys, CHUNK_SIZE + 20);

    let announcement = Message::ResponseLatest {
        block: remote_chain.tip().clone(),
    };
    let remote_tip = remote_chain.tip().hash.clone();

    let (local_ctx, _lrx) = context(local);
    let (remote_ctx, _rrx) = context(remote_chain);

    let rounds = pump(&local_ctx, &remote_ctx, announcement).await;
    println!("  conversation settled after {} rounds", rounds);

    assert!(local_ctx.is_synced(), "local must flip synced after backfill");
    let guard = local_ctx.chain.lock().await;
    assert_eq!(guard.height(), CHUNK_SIZE + 20);
    assert_eq!(guard.tip().hash, remote_tip);

    println!("✅ backfilled {} blocks in chunks", CHUNK_SIZE + 20);
}

// ========================================
// TEST 2: SMALL-GAP CHAIN REPLACE
// ========================================
#[tokio::test]
async fn test_small_gap_chain_replace() {
    println!("\n🧪 E2E 2: Small-gap replace");

    let (mut local_chain, keys) = faucet_chain();
    let mut remote_chain = local_chain.clone();

    // Both advance, remote further: not a direct successor, small gap.
    grow(&mut local_chain, &keys, 2);
    grow(&mut remote_chain, &keys, 7);

    let announcement = Message::NewBlock {
        block: remote_chain.tip().clone(),
    };
    let remote_tip = remote_chain.tip().hash.clone();

    let (local_ctx, _lrx) = context(local_chain);
    let (remote_ctx, _rrx) = context(remote_chain);
    pump(&local_ctx, &remote_ctx, announcement).await;

    assert!(local_ctx.is_synced());
    let guard = local_ctx.chain.lock().await;
    assert_eq!(guard.height(), 7);
    assert_eq!(guard.tip().hash, remote_tip);

    println!("✅ stateful replace converged on the longer fork");
}

// ========================================
// TEST 3: SYNC OVER REAL TCP SESSIONS
// ========================================
#[tokio::test]
async fn test_sync_over_tcp_loopback() {
    println!("\n🧪 E2E 3: Sync over TCP loopback");

    let (local_chain, keys) = faucet_chain();
    let mut remote_chain = local_chain.clone();
    grow(&mut remote_chain, &keys, 5);

    let genesis_hash = local_chain.genesis_hash().to_string();
    let make_cfg = |height: u64| HandshakeConfig {
        node_id: public_key_to_address(&keys.public_key, Network::Testnet),
        chain_id: local_chain.chain_id().to_string(),
        genesis_hash: genesis_hash.clone(),
        node_version: "1.0.0".to_string(),
        block_height: height,
        reward_address: public_key_to_address(&keys.public_key, Network::Testnet),
        grace_until_block: 0,
    };
    let server_cfg = make_cfg(remote_chain.height());
    let client_cfg = make_cfg(local_chain.height());

    let (remote_ctx, _rrx) = context(remote_chain);
    let (local_ctx, _lrx) = context(local_chain);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    // Server: handshake, then answer every inbound frame.
    let server_ctx = remote_ctx.clone();
    let server = tokio::spawn(async move {
        let (stream, peer) = listener.accept().await.unwrap();
        let mut session = PeerSession::from_stream(stream, peer.to_string());
        session.handshake(&server_cfg).await.unwrap();
        while let Ok(Some(msg)) = session.recv_timeout().await {
            for reply in server_ctx.handle_message(msg).await {
                session.send(&reply).await.unwrap();
            }
            if server_ctx.is_synced() {
                break;
            }
        }
    });

    // Client: handshake, kick off with QUERY_LATEST, keep handling replies
    // until the sync engine reports done.
    let mut client = PeerSession::connect(&addr.to_string()).await.unwrap();
    client.handshake(&client_cfg).await.unwrap();
    client.send(&Message::QueryLatest).await.unwrap();

    while !local_ctx.is_synced() {
        let Some(msg) = client.recv_timeout().await.unwrap() else {
            break;
        };
        for reply in local_ctx.handle_message(msg).await {
            client.send(&reply).await.unwrap();
        }
    }

    assert!(local_ctx.is_synced());
    assert_eq!(local_ctx.chain.lock().await.height(), 5);
    drop(client);
    let _ = server.await;

    println!("✅ framed TCP sync converged");
}
