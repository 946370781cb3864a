// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LVENC - STORAGE ADAPTER
//
// Opaque persistence seam consumed by the chain, AMM, staking pool and node
// identity. The core never distinguishes backends; this file ships the
// filesystem one (blocks.json / pool.json / staking.json /
// node_identity.json). Writes go through a temp file + rename so a crash
// mid-save never leaves a torn file.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use lvenc_amm::PoolSnapshot;
use lvenc_core::{Block, Transaction};
use lvenc_staking::StakingPool;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// `blocks.json`: the chain plus whatever was pending at shutdown.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainBlob {
    pub chain: Vec<Block>,
    pub pending_transactions: Vec<Transaction>,
}

/// `pool.json`: per-pair snapshots, all numerics as decimal strings.
pub type PoolBlob = BTreeMap<String, PoolSnapshot>;

/// Storage interface. Implementations may be filesystem or database —
/// callers cannot tell.
pub trait Storage: Send + Sync {
    fn load_blockchain(&self) -> Result<Option<BlockchainBlob>, StorageError>;
    fn save_blockchain(&self, blob: &BlockchainBlob) -> Result<(), StorageError>;
    fn load_pool(&self) -> Result<Option<PoolBlob>, StorageError>;
    fn save_pool(&self, blob: &PoolBlob) -> Result<(), StorageError>;
    fn load_staking(&self) -> Result<Option<StakingPool>, StorageError>;
    fn save_staking(&self, blob: &StakingPool) -> Result<(), StorageError>;
    fn load_identity(&self) -> Result<Option<Vec<u8>>, StorageError>;
    /// Identity blobs are written owner-read/write only (0600).
    fn save_identity(&self, blob: &[u8]) -> Result<(), StorageError>;
}

const BLOCKS_FILE: &str = "blocks.json";
const POOL_FILE: &str = "pool.json";
const STAKING_FILE: &str = "staking.json";
const IDENTITY_FILE: &str = "node_identity.json";

pub struct FsStorage {
    dir: PathBuf,
}

impl FsStorage {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StorageError> {
        fs::create_dir_all(&dir)?;
        Ok(FsStorage {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        file: &str,
    ) -> Result<Option<T>, StorageError> {
        let path = self.path(file);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Atomic write: temp file in the same directory, then rename.
    fn write_atomic(&self, file: &str, bytes: &[u8], mode_0600: bool) -> Result<(), StorageError> {
        let tmp = self.path(&format!("{}.tmp", file));
        fs::write(&tmp, bytes)?;

        #[cfg(unix)]
        if mode_0600 {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
        }
        #[cfg(not(unix))]
        let _ = mode_0600;

        fs::rename(tmp, self.path(file))?;
        Ok(())
    }

    fn write_json<T: Serialize>(
        &self,
        file: &str,
        value: &T,
        mode_0600: bool,
    ) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_atomic(file, &bytes, mode_0600)
    }
}

impl Storage for FsStorage {
    fn load_blockchain(&self) -> Result<Option<BlockchainBlob>, StorageError> {
        self.read_json(BLOCKS_FILE)
    }

    fn save_blockchain(&self, blob: &BlockchainBlob) -> Result<(), StorageError> {
        self.write_json(BLOCKS_FILE, blob, false)
    }

    fn load_pool(&self) -> Result<Option<PoolBlob>, StorageError> {
        self.read_json(POOL_FILE)
    }

    fn save_pool(&self, blob: &PoolBlob) -> Result<(), StorageError> {
        self.write_json(POOL_FILE, blob, false)
    }

    fn load_staking(&self) -> Result<Option<StakingPool>, StorageError> {
        self.read_json(STAKING_FILE)
    }

    fn save_staking(&self, blob: &StakingPool) -> Result<(), StorageError> {
        self.write_json(STAKING_FILE, blob, false)
    }

    fn load_identity(&self) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path(IDENTITY_FILE);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(path)?))
    }

    fn save_identity(&self, blob: &[u8]) -> Result<(), StorageError> {
        self.write_atomic(IDENTITY_FILE, blob, true)
    }
}
