/// Transaction types for Emberchain
use crate::blockchain::Sha3Hash;
use crate::crypto::{sha3_256, Address, KeyPair};
use crate::error::ChainError;

/// Effective fee is `fee_base_price` multiplied by this factor.
pub const TRANSACTION_FEE_UNITS: u64 = 10;

/// Fixed byte cost accounted per transaction, excluding the signature.
pub const TRANSACTION_META_DATA_SIZE: u64 = 242;

/// Upper bound used when deriving block capacity; actual compact
/// signatures are smaller.
pub const TRANSACTION_SIGNATURE_MAX_SIZE: u64 = 72;

/// A signed value transfer between two accounts.
///
/// The id is the SHA3-256 digest of the signable payload, so it is stable
/// from construction and unaffected by the signature or by inclusion in a
/// block. `block_id` is stamped once the transaction lands in a block.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Transaction {
    pub sender: Address,
    pub receiver: Address,
    pub amount: u64,
    pub nonce: u64,
    pub fee_base_price: u64,
    pub fee_limit: u64,
    #[serde(with = "serde_bytes", default)]
    pub data: Vec<u8>,
    #[serde(with = "serde_bytes", default)]
    pub public_key: Vec<u8>,
    #[serde(with = "serde_bytes", default)]
    pub signature: Vec<u8>,
    #[serde(default)]
    pub block_id: Option<Sha3Hash>,
    #[serde(default)]
    pub received_at: u64,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sender: Address,
        receiver: Address,
        amount: u64,
        nonce: u64,
        fee_base_price: u64,
        fee_limit: u64,
        data: Vec<u8>,
    ) -> Self {
        Transaction {
            sender,
            receiver,
            amount,
            nonce,
            fee_base_price,
            fee_limit,
            data,
            public_key: Vec::new(),
            signature: Vec::new(),
            block_id: None,
            received_at: chrono::Utc::now().timestamp_millis() as u64,
        }
    }

    /// Unsigned credit used only inside the genesis block.
    pub fn premine(receiver: Address, amount: u64) -> Self {
        Transaction {
            sender: [0u8; 32],
            receiver,
            amount,
            nonce: 0,
            fee_base_price: 0,
            fee_limit: 0,
            data: Vec::new(),
            public_key: Vec::new(),
            signature: Vec::new(),
            block_id: None,
            received_at: 0,
        }
    }

    /// The canonical byte sequence covered by the signature. The signature,
    /// public key, block id and arrival timestamp are deliberately excluded.
    pub fn signable_message(&self) -> Vec<u8> {
        let mut message = Vec::new();
        message.extend_from_slice(b"ember-transfer:");
        message.extend_from_slice(&self.sender);
        message.extend_from_slice(&self.receiver);
        message.extend_from_slice(&self.amount.to_le_bytes());
        message.extend_from_slice(&self.nonce.to_le_bytes());
        message.extend_from_slice(&self.fee_base_price.to_le_bytes());
        message.extend_from_slice(&self.fee_limit.to_le_bytes());
        message.extend_from_slice(&self.data);
        message
    }

    /// The transaction id: SHA3-256 over the signable payload.
    pub fn id(&self) -> Sha3Hash {
        sha3_256(&self.signable_message())
    }

    pub fn id_str(&self) -> String {
        hex::encode(self.id())
    }

    /// Signs the transaction and attaches the compressed public key so
    /// verifiers can bind the signature to the sender address.
    pub fn sign(&mut self, keypair: &KeyPair) -> Result<(), ChainError> {
        let signature = keypair.sign(&self.signable_message())?;
        self.public_key = keypair.public_key_bytes().to_vec();
        self.signature = signature.to_vec();
        Ok(())
    }

    /// Effective fee paid to the miner on inclusion.
    pub fn fee(&self) -> u64 {
        self.fee_base_price.saturating_mul(TRANSACTION_FEE_UNITS)
    }

    /// Accounted wire size: fixed metadata plus the actual signature bytes.
    pub fn size_bytes(&self) -> u64 {
        TRANSACTION_META_DATA_SIZE + self.signature.len() as u64
    }
}
