// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LVENC - NODE IDENTITY
//
// Persisted keypair + derived address (node_identity.json, version 2).
// The BIP-39 mnemonic is written ONLY on first creation and must be wiped
// from disk once the operator confirms the backup. File mode 0600.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use lvenc_crypto::{KeyPair, Network};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

/// Current identity file schema version.
pub const IDENTITY_VERSION: u32 = 2;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("crypto error: {0}")]
    Crypto(#[from] lvenc_crypto::CryptoError),
    #[error("identity file malformed: {0}")]
    Malformed(String),
    #[error("unsupported identity version {0}")]
    UnsupportedVersion(u32),
    #[error("stored key does not derive the stored address")]
    AddressMismatch,
}

/// `{ "type": "ed25519", "value": "<hex>" }`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyRef {
    #[serde(rename = "type")]
    pub key_type: String,
    pub value: String,
}

impl KeyRef {
    fn ed25519(value: String) -> Self {
        KeyRef {
            key_type: "ed25519".to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeIdentityFile {
    pub version: u32,
    pub address: String,
    pub full_address: String,
    pub node_id: String,
    #[serde(rename = "pub_key")]
    pub pub_key: KeyRef,
    #[serde(rename = "priv_key")]
    pub priv_key: KeyRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward_address: Option<String>,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrated_from: Option<u32>,
    /// Present only between first creation and operator backup confirmation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<String>,
}

/// Legacy version-1 layout: flat hex keys, no nodeId.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyIdentityV1 {
    version: u32,
    address: String,
    public_key: String,
    private_key: String,
    #[serde(default)]
    created_at: Option<String>,
}

/// In-memory identity: live keys plus the persisted record.
pub struct NodeIdentity {
    pub keys: KeyPair,
    pub file: NodeIdentityFile,
}

impl NodeIdentity {
    /// Create a brand-new identity from a fresh mnemonic. The mnemonic is
    /// embedded in the returned file exactly once; the caller must show it
    /// to the operator and call `strip_mnemonic` after confirmation.
    pub fn create(network: Network, reward_address: Option<String>) -> Result<Self, IdentityError> {
        let mnemonic = lvenc_crypto::generate_mnemonic()?;
        let seed = Zeroizing::new(lvenc_crypto::mnemonic_to_seed(&mnemonic)?);
        let keys = lvenc_crypto::derive_keypair_bip44(&seed, 0, 0)?;
        let address = lvenc_crypto::public_key_to_address(&keys.public_key, network);

        let file = NodeIdentityFile {
            version: IDENTITY_VERSION,
            address: address.clone(),
            full_address: address.clone(),
            node_id: address,
            pub_key: KeyRef::ed25519(hex::encode(&keys.public_key)),
            priv_key: KeyRef::ed25519(hex::encode(&keys.secret_key)),
            reward_address,
            created_at: chrono::Utc::now().to_rfc3339(),
            migrated_from: None,
            mnemonic: Some(mnemonic),
        };
        Ok(NodeIdentity { keys, file })
    }

    /// Parse a persisted identity blob, migrating version 1 in place.
    pub fn from_blob(blob: &[u8], network: Network) -> Result<Self, IdentityError> {
        let probe: serde_json::Value = serde_json::from_slice(blob)
            .map_err(|e| IdentityError::Malformed(e.to_string()))?;
        let version = probe
            .get("version")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32;

        let file = match version {
            IDENTITY_VERSION => serde_json::from_slice::<NodeIdentityFile>(blob)
                .map_err(|e| IdentityError::Malformed(e.to_string()))?,
            1 => {
                let legacy: LegacyIdentityV1 = serde_json::from_slice(blob)
                    .map_err(|e| IdentityError::Malformed(e.to_string()))?;
                NodeIdentityFile {
                    version: IDENTITY_VERSION,
                    address: legacy.address.clone(),
                    full_address: legacy.address.clone(),
                    node_id: legacy.address,
                    pub_key: KeyRef::ed25519(legacy.public_key),
                    priv_key: KeyRef::ed25519(legacy.private_key),
                    reward_address: None,
                    created_at: legacy
                        .created_at
                        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
                    migrated_from: Some(legacy.version),
                    mnemonic: None,
                }
            }
            other => return Err(IdentityError::UnsupportedVersion(other)),
        };

        if file.pub_key.key_type != "ed25519" || file.priv_key.key_type != "ed25519" {
            return Err(IdentityError::Malformed("unknown key type".to_string()));
        }

        let secret = Zeroizing::new(
            hex::decode(&file.priv_key.value)
                .map_err(|e| IdentityError::Malformed(e.to_string()))?,
        );
        let keys = lvenc_crypto::keypair_from_secret(&secret)?;

        // The stored address must still derive from the stored key — a
        // mismatch means a corrupted or tampered file.
        let derived = lvenc_crypto::public_key_to_address(&keys.public_key, network);
        if derived != file.address {
            return Err(IdentityError::AddressMismatch);
        }

        Ok(NodeIdentity { keys, file })
    }

    pub fn to_blob(&self) -> Result<Vec<u8>, IdentityError> {
        serde_json::to_vec_pretty(&self.file).map_err(|e| IdentityError::Malformed(e.to_string()))
    }

    /// Wipe the one-time mnemonic after the operator confirms the backup.
    /// Returns true if there was one to remove.
    pub fn strip_mnemonic(&mut self) -> bool {
        self.file.mnemonic.take().is_some()
    }

    pub fn address(&self) -> &str {
        &self.file.address
    }

    pub fn reward_address(&self) -> &str {
        self.file
            .reward_address
            .as_deref()
            .unwrap_or(&self.file.address)
    }
}
