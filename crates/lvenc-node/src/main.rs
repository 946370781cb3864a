// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LVENC - VALIDATOR NODE
//
// Main entry point for the lvenc-node binary. Wires together identity,
// storage, chain, mempool, block producer and the gossip layer on a single
// tokio runtime. Chain mutation is serialized by one async mutex — the
// chain-mutation token; every other task only ever holds it briefly.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use lvenc_chain::{Chain, NodeEvent};
use lvenc_network::{GossipContext, HandshakeConfig, Message, PeerRegistry, PeerSession};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, Mutex};

use lvenc_node::config::NodeConfig;
use lvenc_node::identity::NodeIdentity;
use lvenc_node::mempool::Mempool;
use lvenc_node::producer::BlockProducer;
use lvenc_node::storage::{self, BlockchainBlob, FsStorage, Storage};

const NODE_VERSION: &str = env!("CARGO_PKG_VERSION");
/// Snapshot cadence between the shutdown saves.
const AUTOSAVE_SECS: u64 = 300;
/// Mempool expiry sweep cadence.
const EXPIRY_SWEEP_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let mut config_path = "lvenc.toml".to_string();
    let mut confirm_backup = false;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config_path = args.next().ok_or("--config needs a path")?;
            }
            "confirm-backup" => confirm_backup = true,
            other => return Err(format!("unknown argument: {}", other).into()),
        }
    }

    let config = NodeConfig::load(&config_path)?;
    let network = config.network()?;
    let storage = Arc::new(FsStorage::open(&config.data_dir)?);

    // ── Identity ────────────────────────────────────────────────────
    let mut identity = match storage.load_identity()? {
        Some(blob) => NodeIdentity::from_blob(&blob, network)?,
        None => {
            let identity = NodeIdentity::create(network, config.reward_address.clone())?;
            storage.save_identity(&identity.to_blob()?)?;
            if let Some(mnemonic) = &identity.file.mnemonic {
                // Printed exactly once, never logged. Wiped from disk by
                // `lvenc-node confirm-backup`.
                println!("──────────────────────────────────────────────────────");
                println!("  NEW NODE IDENTITY: {}", identity.address());
                println!();
                println!("  Recovery mnemonic (write it down, then run");
                println!("  `lvenc-node confirm-backup` to remove it from disk):");
                println!();
                println!("  {}", mnemonic);
                println!("──────────────────────────────────────────────────────");
            }
            identity
        }
    };

    if confirm_backup {
        if identity.strip_mnemonic() {
            storage.save_identity(&identity.to_blob()?)?;
            println!("mnemonic removed from node_identity.json");
        } else {
            println!("no mnemonic on disk — nothing to do");
        }
        return Ok(());
    }

    log::info!(
        "lvenc-node v{} — address {}, network {:?}",
        NODE_VERSION,
        identity.address(),
        network
    );

    // ── Chain ───────────────────────────────────────────────────────
    let genesis_config = config.genesis_config();
    let mut chain = match storage.load_blockchain()? {
        Some(blob) if !blob.chain.is_empty() => {
            let chain = Chain::from_blocks(network, genesis_config.clone(), blob.chain)?;
            log::info!("loaded chain at height {}", chain.height());
            chain
        }
        _ => {
            log::info!("starting fresh chain from genesis");
            Chain::new(network, genesis_config.clone())
        }
    };

    let (events_tx, events_rx) = lvenc_chain::channel();
    chain.set_event_sender(events_tx.clone());

    let genesis_hash = chain.genesis_hash().to_string();
    let chain = Arc::new(Mutex::new(chain));
    let mempool = Arc::new(Mempool::new(Some(events_tx.clone())));

    // Standalone nodes are synced by definition; peered nodes must earn it.
    let synced = Arc::new(AtomicBool::new(config.peers.is_empty()));
    let shutdown = Arc::new(AtomicBool::new(false));

    // Outbound bus: every peer task subscribes and relays to its wire.
    let (outbound_tx, _) = broadcast::channel::<Message>(256);
    // Gossiped transactions funnel into mempool admission.
    let (tx_sink, tx_source) = mpsc::channel(64);

    let gossip = GossipContext::new(chain.clone(), synced.clone(), tx_sink);
    let registry = Arc::new(Mutex::new(PeerRegistry::new()));

    let handshake_config = {
        let guard = chain.lock().await;
        HandshakeConfig {
            node_id: identity.address().to_string(),
            chain_id: guard.chain_id().to_string(),
            genesis_hash: genesis_hash.clone(),
            node_version: NODE_VERSION.to_string(),
            block_height: guard.height(),
            reward_address: identity.reward_address().to_string(),
            grace_until_block: config.grace_until_block,
        }
    };

    // Re-admit transactions that were pending at the last shutdown.
    if let Some(blob) = storage.load_blockchain()? {
        for tx in blob.pending_transactions {
            if let Err(e) = mempool.admit(tx, &chain).await {
                log::debug!("dropped stale pending tx on restart: {}", e);
            }
        }
    }

    // ── Tasks ───────────────────────────────────────────────────────

    // Inbound listener
    let listener = TcpListener::bind(&config.listen_addr).await?;
    log::info!("listening on {}", config.listen_addr);
    tokio::spawn(accept_loop(
        listener,
        gossip.clone(),
        handshake_config.clone(),
        outbound_tx.clone(),
    ));

    // Outbound dialers with reconnect + deprioritization
    for peer_addr in &config.peers {
        registry.lock().await.add(peer_addr);
        tokio::spawn(dial_loop(
            peer_addr.clone(),
            gossip.clone(),
            handshake_config.clone(),
            outbound_tx.clone(),
            registry.clone(),
            shutdown.clone(),
        ));
    }

    // Gossiped-transaction admission pump: admit, then rebroadcast.
    tokio::spawn(admission_pump(
        tx_source,
        mempool.clone(),
        chain.clone(),
        outbound_tx.clone(),
    ));

    // Event relay: appended blocks go out as NEW_BLOCK.
    tokio::spawn(event_relay(events_rx, chain.clone(), outbound_tx.clone()));

    // Block producer
    let producer = BlockProducer {
        chain: chain.clone(),
        mempool: mempool.clone(),
        synced: synced.clone(),
        address: identity.address().to_string(),
        secret_key: identity.keys.secret_key.clone(),
    };
    tokio::spawn(producer.run(shutdown.clone()));

    // Mempool expiry sweep
    {
        let mempool = mempool.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(EXPIRY_SWEEP_SECS));
            loop {
                tick.tick().await;
                let evicted = mempool.expire_old();
                if evicted > 0 {
                    log::info!("expired {} stale mempool transactions", evicted);
                }
            }
        });
    }

    // Periodic snapshots
    {
        let (chain, mempool, storage) = (chain.clone(), mempool.clone(), storage.clone());
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(AUTOSAVE_SECS));
            tick.tick().await; // skip the immediate tick
            loop {
                tick.tick().await;
                if let Err(e) = persist(&chain, &mempool, storage.as_ref()).await {
                    log::error!("autosave failed: {}", e);
                }
            }
        });
    }

    // ── Shutdown ────────────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    log::info!("shutdown signal — persisting state");
    shutdown.store(true, Ordering::SeqCst);
    persist(&chain, &mempool, storage.as_ref()).await?;
    log::info!("state persisted, bye");
    Ok(())
}

/// Save chain, pending transactions, pool and staking snapshots.
async fn persist(
    chain: &Mutex<Chain>,
    mempool: &Mempool,
    storage: &dyn Storage,
) -> Result<(), storage::StorageError> {
    let guard = chain.lock().await;
    let blob = BlockchainBlob {
        chain: guard.blocks().to_vec(),
        pending_transactions: mempool.pending(),
    };
    storage.save_blockchain(&blob)?;
    storage.save_pool(&guard.amm().snapshot())?;
    storage.save_staking(guard.staking())?;

    if let Err(e) = guard.audit_supply() {
        // Diagnostic only at save time, but loud: this is a consensus bug.
        log::error!("CRITICAL: {}", e);
    }
    Ok(())
}

/// Accept inbound connections, handshake, and hand off to the peer loop.
async fn accept_loop(
    listener: TcpListener,
    gossip: GossipContext,
    handshake_config: HandshakeConfig,
    outbound: broadcast::Sender<Message>,
) {
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                log::warn!("accept failed: {}", e);
                continue;
            }
        };
        let gossip = gossip.clone();
        let mut handshake_config = handshake_config.clone();
        let outbound_rx = outbound.subscribe();

        tokio::spawn(async move {
            let mut session = PeerSession::from_stream(stream, peer_addr.to_string());
            handshake_config.block_height = gossip.chain.lock().await.height();
            match session.handshake(&handshake_config).await {
                Ok((remote, _)) => {
                    log::info!("peer in: {} (height {})", remote.node_id, remote.block_height);
                    peer_loop(session, gossip, outbound_rx).await;
                }
                Err(e) => log::warn!("inbound handshake with {} failed: {}", peer_addr, e),
            }
        });
    }
}

/// Keep one configured peer dialed, with reconnect and deprioritization.
async fn dial_loop(
    addr: String,
    gossip: GossipContext,
    handshake_config: HandshakeConfig,
    outbound: broadcast::Sender<Message>,
    registry: Arc<Mutex<PeerRegistry>>,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }

        // Deprioritized peers wait an extra backoff round before re-dial.
        if registry.lock().await.is_deprioritized(&addr) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }

        match PeerSession::connect(&addr).await {
            Ok(mut session) => {
                let mut cfg = handshake_config.clone();
                cfg.block_height = gossip.chain.lock().await.height();
                match session.handshake(&cfg).await {
                    Ok((remote, _)) => {
                        registry.lock().await.note_success(&addr);
                        log::info!("peer out: {} (height {})", remote.node_id, remote.block_height);
                        // Kick off sync immediately.
                        if session.send(&Message::QueryLatest).await.is_ok() {
                            peer_loop(session, gossip.clone(), outbound.subscribe()).await;
                        }
                    }
                    Err(e) => {
                        log::warn!("handshake with {} failed: {}", addr, e);
                        registry.lock().await.note_timeout(&addr);
                    }
                }
            }
            Err(e) => {
                log::debug!("dial {} failed: {}", addr, e);
                registry.lock().await.note_timeout(&addr);
            }
        }

        tokio::time::sleep(Duration::from_secs(10)).await;
    }
}

/// Per-peer message loop: inbound frames are handled strictly in arrival
/// order; outbound bus traffic is relayed in between.
async fn peer_loop(
    mut session: PeerSession,
    gossip: GossipContext,
    mut outbound: broadcast::Receiver<Message>,
) {
    loop {
        tokio::select! {
            inbound = session.recv() => {
                let msg = match inbound {
                    Ok(Some(msg)) => msg,
                    Ok(None) => {
                        log::info!("peer {} closed", session.addr);
                        return;
                    }
                    Err(e) => {
                        log::warn!("peer {} error: {}", session.addr, e);
                        return;
                    }
                };
                for reply in gossip.handle_message(msg).await {
                    if let Err(e) = session.send(&reply).await {
                        log::warn!("send to {} failed: {}", session.addr, e);
                        return;
                    }
                }
            }
            relayed = outbound.recv() => {
                match relayed {
                    Ok(msg) => {
                        if let Err(e) = session.send(&msg).await {
                            log::warn!("relay to {} failed: {}", session.addr, e);
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("peer {} lagged {} outbound messages", session.addr, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        }
    }
}

/// Admit gossiped transactions and rebroadcast the accepted ones.
async fn admission_pump(
    mut source: mpsc::Receiver<lvenc_core::Transaction>,
    mempool: Arc<Mempool>,
    chain: Arc<Mutex<Chain>>,
    outbound: broadcast::Sender<Message>,
) {
    while let Some(tx) = source.recv().await {
        match mempool.admit(tx.clone(), &chain).await {
            Ok(_) => {
                let _ = outbound.send(Message::NewTx { tx });
            }
            Err(e) => log::debug!("gossiped tx rejected: {} ({})", e, e.code()),
        }
    }
}

/// Relay appended blocks to every peer as NEW_BLOCK.
async fn event_relay(
    mut events: broadcast::Receiver<NodeEvent>,
    chain: Arc<Mutex<Chain>>,
    outbound: broadcast::Sender<Message>,
) {
    loop {
        match events.recv().await {
            Ok(NodeEvent::BlockAppended { index, .. }) => {
                let block = {
                    let guard = chain.lock().await;
                    guard.block_at(index).cloned()
                };
                if let Some(block) = block {
                    let _ = outbound.send(Message::NewBlock { block });
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                log::warn!("event relay lagged {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
