// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LVENC - NODE LIBRARY
//
// The node's building blocks, exposed as a library so the workspace
// integration tests can drive the same code the binary runs.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub mod config;
pub mod identity;
pub mod mempool;
pub mod producer;
pub mod storage;

pub use config::NodeConfig;
pub use identity::NodeIdentity;
pub use mempool::{AdmissionError, Mempool};
pub use producer::{assemble_block, BlockProducer};
pub use storage::{BlockchainBlob, FsStorage, Storage};
