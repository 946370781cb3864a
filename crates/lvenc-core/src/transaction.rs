// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LVENC - TRANSACTION
//
// Canonical encoding, hashing, signing and verification for all transaction
// types. The canonical hash NEVER covers `timestamp`, `signature`, or `id`
// — those fields are mutable metadata. Everything else is signed.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::params::{self, MIN_DELEGATION, MIN_VALIDATOR_SELF_STAKE};
use crate::{Amount, POOL_ADDRESS_PREFIX, STAKE_POOL_ADDRESS};
use lvenc_crypto::Network;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Sentinel signature carried by genesis transactions (64 zero bytes, hex).
pub const ZERO_SIGNATURE: &str =
    "00000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TxType {
    Transfer,
    Stake,
    Unstake,
    Delegate,
    Undelegate,
    Claim,
    Commission,
}

impl TxType {
    /// Wire spelling, also used inside the canonical hash preimage.
    pub const fn as_str(&self) -> &'static str {
        match self {
            TxType::Transfer => "TRANSFER",
            TxType::Stake => "STAKE",
            TxType::Unstake => "UNSTAKE",
            TxType::Delegate => "DELEGATE",
            TxType::Undelegate => "UNDELEGATE",
            TxType::Claim => "CLAIM",
            TxType::Commission => "COMMISSION",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TxError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("unsupported signature scheme: {0}")]
    UnsupportedScheme(String),
    #[error("signature or public key malformed")]
    MalformedSignature,
    #[error("public key does not derive fromAddress")]
    AddressMismatch,
    #[error("Ed25519 signature verification failed")]
    InvalidSignature,
    #[error("STAKE must target {STAKE_POOL_ADDRESS}")]
    BadStakeTarget,
    #[error("amount below protocol minimum")]
    AmountTooLow,
    #[error("DELEGATE requires a validator address in data")]
    MissingValidator,
    #[error("pool transaction carries no parsable operation")]
    BadPoolOperation,
    #[error("commission percentage must be 0-100")]
    BadCommission,
}

impl TxError {
    /// Short machine code surfaced at API / wire boundaries.
    pub const fn code(&self) -> &'static str {
        match self {
            TxError::MissingField(_) => "MISSING_FIELD",
            TxError::UnsupportedScheme(_) => "INVALID_SIGNATURE",
            TxError::MalformedSignature => "INVALID_SIGNATURE",
            TxError::AddressMismatch => "INVALID_SIGNATURE",
            TxError::InvalidSignature => "INVALID_SIGNATURE",
            TxError::BadStakeTarget => "STAKE_TARGET",
            TxError::AmountTooLow => "AMOUNT_TOO_LOW",
            TxError::MissingValidator => "VALIDATOR_UNKNOWN",
            TxError::BadPoolOperation => "BAD_POOL_OP",
            TxError::BadCommission => "BAD_COMMISSION",
        }
    }
}

/// Typed AMM operation carried in the `data` field of a pool transaction
/// (`toAddress = POOL_<PAIR>`). Operands are decimal strings so arbitrarily
/// large scaled amounts survive JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum PoolOperation {
    #[serde(rename_all = "camelCase")]
    Initialize { amount_a: String, amount_b: String },
    #[serde(rename_all = "camelCase")]
    AddLiquidity { amount_a: String, amount_b: String },
    #[serde(rename_all = "camelCase")]
    RemoveLiquidity { lp_amount: String },
    #[serde(rename_all = "camelCase")]
    Swap {
        token_in: String,
        amount_in: String,
        min_out: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Informational UUID — excluded from the canonical hash.
    pub id: String,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    /// None for system mints (coinbase, genesis credit).
    pub from_address: Option<String>,
    pub to_address: String,
    pub amount: Amount,
    pub fee: Amount,
    /// Metadata only — excluded from the canonical hash.
    pub timestamp: u64,
    pub nonce: u64,
    pub chain_id: String,
    pub signature_scheme: String,
    pub public_key: String,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl Transaction {
    /// Bare transaction with empty signature fields. Callers sign afterwards.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tx_type: TxType,
        from_address: Option<String>,
        to_address: String,
        amount: Amount,
        fee: Amount,
        nonce: u64,
        timestamp: u64,
        chain_id: String,
        data: Option<String>,
    ) -> Self {
        Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            tx_type,
            from_address,
            to_address,
            amount,
            fee,
            timestamp,
            nonce,
            chain_id,
            signature_scheme: "ed25519".to_string(),
            public_key: String::new(),
            signature: String::new(),
            data,
        }
    }

    /// Epoch-reward coinbase: first transaction of every block.
    /// `amount` = collected fees, plus inflation on epoch-boundary blocks.
    pub fn coinbase(to: &str, amount: Amount, timestamp: u64, chain_id: &str) -> Self {
        let mut tx = Transaction::new(
            TxType::Transfer,
            None,
            to.to_string(),
            amount,
            0,
            0,
            timestamp,
            chain_id.to_string(),
            Some("coinbase".to_string()),
        );
        tx.signature = ZERO_SIGNATURE.to_string();
        tx
    }

    /// Pool transaction targeting `POOL_<PAIR>` with a typed operation payload.
    pub fn pool_op(
        from: &str,
        pair: &str,
        op: &PoolOperation,
        fee: Amount,
        nonce: u64,
        timestamp: u64,
        chain_id: &str,
    ) -> Self {
        let payload = serde_json::to_string(op).unwrap_or_default();
        Transaction::new(
            TxType::Transfer,
            Some(from.to_string()),
            crate::pool_address(pair),
            0,
            fee,
            nonce,
            timestamp,
            chain_id.to_string(),
            Some(payload),
        )
    }

    /// System transactions (coinbase, genesis mint) have no `fromAddress`
    /// or a sentinel one, and skip signature verification.
    pub fn is_system(&self) -> bool {
        match &self.from_address {
            None => true,
            Some(from) => crate::is_sentinel_address(from),
        }
    }

    /// True when this transaction addresses an AMM pool.
    pub fn is_pool_op(&self) -> bool {
        self.to_address.starts_with(POOL_ADDRESS_PREFIX)
    }

    /// Parse the typed pool operation, if this is a pool transaction.
    pub fn pool_operation(&self) -> Option<PoolOperation> {
        if !self.is_pool_op() {
            return None;
        }
        self.data
            .as_deref()
            .and_then(|d| serde_json::from_str(d).ok())
    }

    /// Canonical hash preimage: decimal/string encodings of
    /// `chainId, type, fromAddress ∥ "", toAddress, amount, fee, nonce`
    /// concatenated in that order. Excludes timestamp, signature, id.
    fn canonical_preimage(&self) -> String {
        let mut preimage = String::with_capacity(128);
        preimage.push_str(&self.chain_id);
        preimage.push_str(self.tx_type.as_str());
        preimage.push_str(self.from_address.as_deref().unwrap_or(""));
        preimage.push_str(&self.to_address);
        preimage.push_str(&self.amount.to_string());
        preimage.push_str(&self.fee.to_string());
        preimage.push_str(&self.nonce.to_string());
        preimage
    }

    /// Canonical hash as raw digest bytes — the Ed25519 signing message.
    pub fn canonical_hash_bytes(&self) -> [u8; 32] {
        Sha256::digest(self.canonical_preimage().as_bytes()).into()
    }

    /// Canonical hash, hex-encoded.
    pub fn canonical_hash(&self) -> String {
        hex::encode(self.canonical_hash_bytes())
    }

    /// Sign in place. Derives the public key from `secret_key` and requires
    /// that it maps to `fromAddress` on the given network.
    pub fn sign(&mut self, secret_key: &[u8], network: Network) -> Result<(), TxError> {
        let from = self
            .from_address
            .as_deref()
            .ok_or(TxError::MissingField("fromAddress"))?;

        let keypair =
            lvenc_crypto::keypair_from_secret(secret_key).map_err(|_| TxError::MalformedSignature)?;
        let derived = lvenc_crypto::public_key_to_address(&keypair.public_key, network);
        if derived != from {
            return Err(TxError::AddressMismatch);
        }

        let sig = lvenc_crypto::sign_message(&self.canonical_hash_bytes(), secret_key)
            .map_err(|_| TxError::MalformedSignature)?;

        self.signature_scheme = "ed25519".to_string();
        self.public_key = hex::encode(&keypair.public_key);
        self.signature = hex::encode(sig);
        Ok(())
    }

    /// Full verification: field presence, scheme, key/signature shape,
    /// address binding, Ed25519 over the canonical hash. System transactions
    /// are exempt from signature checks.
    pub fn verify(&self, network: Network) -> Result<(), TxError> {
        if self.is_system() {
            return Ok(());
        }

        let from = self
            .from_address
            .as_deref()
            .ok_or(TxError::MissingField("fromAddress"))?;
        if self.to_address.is_empty() {
            return Err(TxError::MissingField("toAddress"));
        }
        if self.chain_id.is_empty() {
            return Err(TxError::MissingField("chainId"));
        }
        if self.public_key.is_empty() {
            return Err(TxError::MissingField("publicKey"));
        }
        if self.signature.is_empty() {
            return Err(TxError::MissingField("signature"));
        }
        if self.signature_scheme != "ed25519" {
            return Err(TxError::UnsupportedScheme(self.signature_scheme.clone()));
        }

        let pk_bytes = hex::decode(&self.public_key).map_err(|_| TxError::MalformedSignature)?;
        let sig_bytes = hex::decode(&self.signature).map_err(|_| TxError::MalformedSignature)?;
        if pk_bytes.len() != lvenc_crypto::PUBLIC_KEY_LEN
            || sig_bytes.len() != lvenc_crypto::SIGNATURE_LEN
        {
            return Err(TxError::MalformedSignature);
        }

        // Account ↔ public key binding: only the key owner can spend.
        let derived = lvenc_crypto::public_key_to_address(&pk_bytes, network);
        if derived != from {
            return Err(TxError::AddressMismatch);
        }

        if !lvenc_crypto::verify_signature(&self.canonical_hash_bytes(), &sig_bytes, &pk_bytes) {
            return Err(TxError::InvalidSignature);
        }
        Ok(())
    }

    /// Type-specific shape rules that need no chain state.
    /// Stateful checks (validator registration, balances) happen at
    /// mempool admission and block application.
    pub fn validate_type_rules(&self) -> Result<(), TxError> {
        match self.tx_type {
            TxType::Stake => {
                if self.to_address != STAKE_POOL_ADDRESS {
                    return Err(TxError::BadStakeTarget);
                }
                if self.amount < MIN_VALIDATOR_SELF_STAKE {
                    return Err(TxError::AmountTooLow);
                }
            }
            TxType::Unstake | TxType::Undelegate => {
                if self.to_address != STAKE_POOL_ADDRESS {
                    return Err(TxError::BadStakeTarget);
                }
                if self.amount == 0 {
                    return Err(TxError::AmountTooLow);
                }
                if self.tx_type == TxType::Undelegate && self.data.is_none() {
                    return Err(TxError::MissingValidator);
                }
            }
            TxType::Delegate => {
                if self.to_address != STAKE_POOL_ADDRESS {
                    return Err(TxError::BadStakeTarget);
                }
                if self.data.as_deref().map(str::trim).unwrap_or("").is_empty() {
                    return Err(TxError::MissingValidator);
                }
                if self.amount < MIN_DELEGATION {
                    return Err(TxError::AmountTooLow);
                }
            }
            TxType::Claim => {
                if self.amount == 0 {
                    return Err(TxError::AmountTooLow);
                }
            }
            TxType::Commission => {
                // amount carries the plain percentage (0-100), unscaled
                if self.amount > 100 {
                    return Err(TxError::BadCommission);
                }
            }
            TxType::Transfer => {
                if self.is_pool_op() && !self.is_system() && self.pool_operation().is_none() {
                    return Err(TxError::BadPoolOperation);
                }
            }
        }
        Ok(())
    }

    /// Staking transactions are fee-exempt by protocol; everyone else pays
    /// at least `MIN_FEE`.
    pub fn is_fee_exempt(&self) -> bool {
        self.is_system()
            || matches!(
                self.tx_type,
                TxType::Stake
                    | TxType::Unstake
                    | TxType::Delegate
                    | TxType::Undelegate
                    | TxType::Claim
                    | TxType::Commission
            )
    }

    /// Total debit this transaction causes on its sender.
    pub fn required_balance(&self) -> Amount {
        self.amount.saturating_add(self.fee)
    }

    /// Spendable-balance debit on the sender. TRANSFER/STAKE/DELEGATE move
    /// `amount` (plus fee) out of the balance; UNSTAKE/UNDELEGATE/CLAIM/
    /// COMMISSION are directives over bonded or pooled funds — only the fee
    /// leaves the spendable balance.
    pub fn spend_amount(&self) -> Amount {
        match self.tx_type {
            TxType::Transfer | TxType::Stake | TxType::Delegate => self.required_balance(),
            TxType::Unstake | TxType::Undelegate | TxType::Claim | TxType::Commission => self.fee,
        }
    }
}

/// Minimum fee check used by mempool admission.
pub fn meets_min_fee(tx: &Transaction) -> bool {
    tx.is_fee_exempt() || tx.fee >= params::MIN_FEE
}
