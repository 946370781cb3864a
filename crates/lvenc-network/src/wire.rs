// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LVENC - WIRE PROTOCOL
//
// Newline-delimited JSON frames, each `{ "type": ..., "data": ... }`.
// Message type names and field spellings are part of the protocol contract
// — changing any of them is a network fork.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use lvenc_core::{Block, Transaction};
use serde::{Deserialize, Serialize};

/// Handshake payload sent by both sides immediately after connecting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub node_id: String,
    pub protocol_version: u32,
    pub min_protocol_version: u32,
    /// Block height until which this node tolerates legacy peers.
    pub grace_until_block: u64,
    pub chain_id: String,
    pub genesis_hash: String,
    pub node_version: String,
    pub block_height: u64,
    pub reward_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VersionReject {
    pub error_code: String,
    pub current_version: u32,
    pub required_version: u32,
    pub grace_until_block: u64,
    pub recommended_action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum Message {
    #[serde(rename = "HANDSHAKE")]
    Handshake(Handshake),
    #[serde(rename = "VERSION_REJECT")]
    VersionReject(VersionReject),
    #[serde(rename = "QUERY_LATEST")]
    QueryLatest,
    #[serde(rename = "QUERY_ALL")]
    QueryAll,
    #[serde(rename = "QUERY_BLOCKS_FROM")]
    #[serde(rename_all = "camelCase")]
    QueryBlocksFrom { start_index: u64, limit: u64 },
    #[serde(rename = "RESPONSE_LATEST")]
    ResponseLatest { block: Block },
    #[serde(rename = "RESPONSE_BLOCKS")]
    #[serde(rename_all = "camelCase")]
    ResponseBlocks {
        blocks: Vec<Block>,
        has_more: bool,
        total_blocks: u64,
    },
    #[serde(rename = "RESPONSE_CHAIN")]
    ResponseChain { blocks: Vec<Block> },
    #[serde(rename = "NEW_BLOCK")]
    NewBlock { block: Block },
    #[serde(rename = "NEW_TX")]
    NewTx { tx: Transaction },
}

impl Message {
    /// One wire frame: compact JSON + trailing newline.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        let mut frame = serde_json::to_string(self)?;
        frame.push('\n');
        Ok(frame)
    }

    pub fn from_line(line: &str) -> Result<Message, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}
