// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LVENC - CRYPTOGRAPHY MODULE
//
// Ed25519 signatures and address derivation for the LVENC chain.
// - Key generation (random and deterministic from BIP-39 seed)
// - BIP-44 hardened derivation (SLIP-0010, HMAC-SHA512)
// - Message signing and verification
// - LVE/tLVE address derivation (network prefix + truncated SHA-256)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;
use zeroize::Zeroize;

/// Ed25519 public key length in bytes
pub const PUBLIC_KEY_LEN: usize = 32;
/// Ed25519 signature length in bytes
pub const SIGNATURE_LEN: usize = 64;
/// Hex characters of the SHA-256 digest kept in an address
pub const ADDRESS_HASH_HEX_LEN: usize = 40;

/// BIP-44 coin type registered for LVENC (hardened in the path)
pub const BIP44_COIN_TYPE: u32 = 713;

type HmacSha512 = Hmac<Sha512>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key format")]
    InvalidKey,
    #[error("Signature verification failed")]
    VerificationFailed,
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),
    #[error("Invalid derivation path component")]
    InvalidPath,
}

/// Which network an address belongs to. Decides the human-readable prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    Testnet,
    Mainnet,
}

impl Network {
    pub const fn address_prefix(&self) -> &'static str {
        match self {
            Network::Testnet => "tLVE",
            Network::Mainnet => "LVE",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KeyPair {
    pub public_key: Vec<u8>,
    pub secret_key: Vec<u8>,
}

/// Zeroize secret key material on drop so it cannot be recovered from a
/// memory dump, swap file, or core dump.
impl Drop for KeyPair {
    fn drop(&mut self) {
        self.secret_key.zeroize();
    }
}

impl KeyPair {
    fn from_signing_key(sk: SigningKey) -> Self {
        KeyPair {
            public_key: sk.verifying_key().to_bytes().to_vec(),
            secret_key: sk.to_bytes().to_vec(),
        }
    }
}

/// Generate a new random Ed25519 keypair from the OS RNG.
pub fn generate_keypair() -> KeyPair {
    let mut csprng = rand::rngs::OsRng;
    KeyPair::from_signing_key(SigningKey::generate(&mut csprng))
}

/// Generate a DETERMINISTIC Ed25519 keypair from a BIP-39 seed.
///
/// Domain separation:
///   salt    = SHA-256("lvenc-ed25519-keygen-v1")
///   derived = SHA-256(salt || bip39_seed) → 32-byte signing key seed
///
/// Same seed ALWAYS produces the same keypair and address.
///
/// # Panics
/// If the seed is shorter than 32 bytes.
pub fn generate_keypair_from_seed(bip39_seed: &[u8]) -> KeyPair {
    assert!(bip39_seed.len() >= 32, "BIP-39 seed must be at least 32 bytes");

    let salt = Sha256::digest(b"lvenc-ed25519-keygen-v1");
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(bip39_seed);
    let mut derived: [u8; 32] = hasher.finalize().into();

    let sk = SigningKey::from_bytes(&derived);
    derived.zeroize();

    KeyPair::from_signing_key(sk)
}

/// Derive a keypair along the hardened BIP-44 path
/// `m/44'/713'/account'/0'/index'` using SLIP-0010 for Ed25519.
///
/// Every step is hardened — Ed25519 has no usable non-hardened derivation.
pub fn derive_keypair_bip44(
    bip39_seed: &[u8],
    account: u32,
    index: u32,
) -> Result<KeyPair, CryptoError> {
    let (mut key, mut chain_code) = slip10_master(bip39_seed)?;

    for component in [44, BIP44_COIN_TYPE, account, 0, index] {
        let (k, c) = slip10_child(&key, &chain_code, component)?;
        key.zeroize();
        chain_code.zeroize();
        key = k;
        chain_code = c;
    }

    let sk = SigningKey::from_bytes(&key);
    key.zeroize();
    chain_code.zeroize();

    Ok(KeyPair::from_signing_key(sk))
}

/// SLIP-0010 master key: HMAC-SHA512("ed25519 seed", seed) → (IL, IR).
fn slip10_master(seed: &[u8]) -> Result<([u8; 32], [u8; 32]), CryptoError> {
    let mut mac =
        HmacSha512::new_from_slice(b"ed25519 seed").map_err(|_| CryptoError::InvalidKey)?;
    mac.update(seed);
    let digest = mac.finalize().into_bytes();

    let mut key = [0u8; 32];
    let mut chain_code = [0u8; 32];
    key.copy_from_slice(&digest[..32]);
    chain_code.copy_from_slice(&digest[32..]);
    Ok((key, chain_code))
}

/// SLIP-0010 hardened child: HMAC-SHA512(cc, 0x00 || key || index|0x80000000).
fn slip10_child(
    key: &[u8; 32],
    chain_code: &[u8; 32],
    index: u32,
) -> Result<([u8; 32], [u8; 32]), CryptoError> {
    let hardened = index.checked_add(0x8000_0000).ok_or(CryptoError::InvalidPath)?;

    let mut mac = HmacSha512::new_from_slice(chain_code).map_err(|_| CryptoError::InvalidKey)?;
    mac.update(&[0u8]);
    mac.update(key);
    mac.update(&hardened.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let mut child_key = [0u8; 32];
    let mut child_cc = [0u8; 32];
    child_key.copy_from_slice(&digest[..32]);
    child_cc.copy_from_slice(&digest[32..]);
    Ok((child_key, child_cc))
}

/// Reconstruct a KeyPair from a 32-byte Ed25519 secret key.
pub fn keypair_from_secret(secret_bytes: &[u8]) -> Result<KeyPair, CryptoError> {
    let seed: [u8; 32] = secret_bytes.try_into().map_err(|_| CryptoError::InvalidKey)?;
    Ok(KeyPair::from_signing_key(SigningKey::from_bytes(&seed)))
}

/// Sign a message with an Ed25519 secret key. Returns the 64-byte signature.
pub fn sign_message(message: &[u8], secret_key_bytes: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let seed: [u8; 32] = secret_key_bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKey)?;
    let sk = SigningKey::from_bytes(&seed);
    Ok(sk.sign(message).to_bytes().to_vec())
}

/// Verify an Ed25519 signature. Malformed keys or signatures verify as false.
pub fn verify_signature(message: &[u8], signature_bytes: &[u8], public_key_bytes: &[u8]) -> bool {
    let pk_array: [u8; PUBLIC_KEY_LEN] = match public_key_bytes.try_into() {
        Ok(a) => a,
        Err(_) => return false,
    };
    let vk = match VerifyingKey::from_bytes(&pk_array) {
        Ok(k) => k,
        Err(_) => return false,
    };
    let sig = match Signature::from_slice(signature_bytes) {
        Ok(s) => s,
        Err(_) => return false,
    };

    vk.verify(message, &sig).is_ok()
}

/// SHA-256 digest, hex-encoded.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ADDRESS DERIVATION
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Derive an LVENC address from an Ed25519 public key.
///
/// Format: `prefix || first-40-hex-of-SHA-256(pubkey-hex)`
/// - The digest input is the LOWERCASE HEX encoding of the key, not the raw
///   bytes. This is a wire-compatibility requirement.
/// - Prefix: `tLVE` on testnet, `LVE` on mainnet.
pub fn public_key_to_address(public_key_bytes: &[u8], network: Network) -> String {
    let pubkey_hex = hex::encode(public_key_bytes);
    let digest_hex = sha256_hex(pubkey_hex.as_bytes());
    format!(
        "{}{}",
        network.address_prefix(),
        &digest_hex[..ADDRESS_HASH_HEX_LEN]
    )
}

/// Validate address shape: known prefix + exactly 40 lowercase hex chars.
/// Matches `^(tLVE|LVE)[a-f0-9]{40}$`.
pub fn validate_address(address: &str) -> bool {
    let body = if let Some(rest) = address.strip_prefix("tLVE") {
        rest
    } else if let Some(rest) = address.strip_prefix("LVE") {
        rest
    } else {
        return false;
    };

    body.len() == ADDRESS_HASH_HEX_LEN
        && body
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// The network an address claims to belong to, if its shape is valid.
pub fn address_network(address: &str) -> Option<Network> {
    if !validate_address(address) {
        return None;
    }
    if address.starts_with("tLVE") {
        Some(Network::Testnet)
    } else {
        Some(Network::Mainnet)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BIP-39 MNEMONICS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Generate a fresh 24-word English mnemonic.
pub fn generate_mnemonic() -> Result<String, CryptoError> {
    let mut entropy = [0u8; 32];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut entropy);
    let mnemonic = bip39::Mnemonic::from_entropy(&entropy)
        .map_err(|e| CryptoError::InvalidMnemonic(e.to_string()))?;
    Ok(mnemonic.to_string())
}

/// Parse a mnemonic phrase and return its 64-byte BIP-39 seed (empty passphrase).
pub fn mnemonic_to_seed(phrase: &str) -> Result<Vec<u8>, CryptoError> {
    let mnemonic = bip39::Mnemonic::parse_normalized(phrase)
        .map_err(|e| CryptoError::InvalidMnemonic(e.to_string()))?;
    Ok(mnemonic.to_seed("").to_vec())
}
