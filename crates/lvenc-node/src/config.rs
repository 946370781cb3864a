// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LVENC - NODE CONFIGURATION
//
// Node-LOCAL settings only (addresses, peers, data dir). Protocol
// parameters are compile-time constants — putting them here would let a
// single operator fork themselves off the network.
// Precedence: environment variables > TOML file > defaults.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use lvenc_core::{GenesisConfig, Network};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("config file malformed: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown network '{0}' (expected testnet or mainnet)")]
    UnknownNetwork(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct NodeConfig {
    /// "testnet" or "mainnet"
    pub network: String,
    pub listen_addr: String,
    /// Peer addresses to dial on startup (host:port).
    pub peers: Vec<String>,
    pub data_dir: String,
    /// Rewards land here instead of the node address, if set.
    pub reward_address: Option<String>,
    /// Height until which legacy-protocol peers are tolerated.
    pub grace_until_block: u64,
    /// Genesis override; defaults to the built-in testnet genesis.
    pub genesis: Option<GenesisConfig>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            network: "testnet".to_string(),
            listen_addr: "0.0.0.0:46656".to_string(),
            peers: Vec::new(),
            data_dir: "lvenc_data".to_string(),
            reward_address: None,
            grace_until_block: 0,
            genesis: None,
        }
    }
}

impl NodeConfig {
    /// Load from a TOML file (missing file = defaults), then apply
    /// environment overrides.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(raw) => toml::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => NodeConfig::default(),
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_string(),
                    source: e,
                })
            }
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("LVENC_NETWORK") {
            self.network = v;
        }
        if let Ok(v) = std::env::var("LVENC_LISTEN_ADDR") {
            self.listen_addr = v;
        }
        if let Ok(v) = std::env::var("LVENC_DATA_DIR") {
            self.data_dir = v;
        }
        if let Ok(v) = std::env::var("LVENC_PEERS") {
            self.peers = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
    }

    pub fn network(&self) -> Result<Network, ConfigError> {
        match self.network.as_str() {
            "testnet" => Ok(Network::Testnet),
            "mainnet" => Ok(Network::Mainnet),
            other => Err(ConfigError::UnknownNetwork(other.to_string())),
        }
    }

    pub fn genesis_config(&self) -> GenesisConfig {
        self.genesis
            .clone()
            .unwrap_or_else(GenesisConfig::testnet_default)
    }
}
