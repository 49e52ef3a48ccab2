//! Block and header types
//!
//! A block commits to its transactions through a Merkle root carried in the
//! header. The coinbase address is attached after the nonce search succeeds
//! and is not covered by the header hash, so crediting the miner does not
//! invalidate the proof of work.

use sha3::{Digest, Sha3_256};

use crate::crypto::{address_from_string, Address};
use crate::merkle::MerkleTree;
use crate::transaction::{
    Transaction, TRANSACTION_META_DATA_SIZE, TRANSACTION_SIGNATURE_MAX_SIZE,
};

pub type Sha3Hash = [u8; 32];

/// Block format version, covered by the header hash.
pub const VERSION: u32 = 1;

/// Hard cap on the serialized size of a block.
pub const MAX_BLOCK_SIZE_BYTES: u64 = 1_048_576;

/// Accounted size of the serialized header.
pub const BLOCK_HEADER_SIZE: u64 = 80;

/// Accounted per-block overhead outside the header.
pub const BLOCK_META_DATA_SIZE: u64 = 81;

/// Freshly minted units credited to the coinbase of every mined block,
/// on top of the fees collected from its transactions.
pub const BLOCK_REWARD: u64 = 50;

/// Fixed genesis timestamp: 2023-01-01T00:00:00Z in millis.
pub const GENESIS_TIMESTAMP: u64 = 1_672_531_200_000;

/// How many transactions fit in a block when every signature is at its
/// maximum encoded size.
pub const fn max_transactions_per_block() -> u64 {
    (MAX_BLOCK_SIZE_BYTES - BLOCK_META_DATA_SIZE - BLOCK_HEADER_SIZE)
        / (TRANSACTION_META_DATA_SIZE + TRANSACTION_SIGNATURE_MAX_SIZE)
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub previous_hash: Sha3Hash,
    pub merkle_root: Sha3Hash,
    pub timestamp: u64,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn hash(&self) -> Sha3Hash {
        let mut hasher = Sha3_256::new();
        hasher.update(self.version.to_le_bytes());
        hasher.update(self.previous_hash);
        hasher.update(self.merkle_root);
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.nonce.to_le_bytes());
        hasher.finalize().into()
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    // private so that merkle_root and size_bytes always track the contents
    transactions: Vec<Transaction>,
    pub coinbase: Option<Address>,
    size_bytes: u64,
}

impl Block {
    /// A mining candidate on top of `previous_hash`. Nonce starts at zero
    /// and the coinbase is attached only after the search succeeds.
    pub fn candidate(previous_hash: Sha3Hash, transactions: Vec<Transaction>) -> Self {
        let timestamp = chrono::Utc::now().timestamp_millis() as u64;
        Self::assemble(previous_hash, timestamp, transactions)
    }

    /// The fixed first block: zero previous hash, fixed timestamp, no
    /// coinbase, premine credits as its transactions. Never mined.
    pub fn genesis(premine: &[(Address, u64)]) -> Self {
        let transactions = premine
            .iter()
            .map(|(address, amount)| Transaction::premine(*address, *amount))
            .collect();

        let mut block = Self::assemble([0u8; 32], GENESIS_TIMESTAMP, transactions);
        block.stamp_transactions();
        block
    }

    fn assemble(previous_hash: Sha3Hash, timestamp: u64, transactions: Vec<Transaction>) -> Self {
        let merkle_root = Block::calculate_merkle_root(&transactions);
        let size_bytes = Block::accounted_size(&transactions);

        Block {
            header: BlockHeader {
                version: VERSION,
                previous_hash,
                merkle_root,
                timestamp,
                nonce: 0,
            },
            transactions,
            coinbase: None,
            size_bytes,
        }
    }

    pub fn hash(&self) -> Sha3Hash {
        self.header.hash()
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Replaces the transaction list and refreshes the header commitment
    /// and the accounted size.
    pub fn set_transactions(&mut self, transactions: Vec<Transaction>) {
        self.header.merkle_root = Block::calculate_merkle_root(&transactions);
        self.size_bytes = Block::accounted_size(&transactions);
        self.transactions = transactions;
    }

    /// Writes this block's hash into every contained transaction. Called
    /// once the header is final; the id and Merkle root do not cover the
    /// block id, so the commitment stays intact.
    pub fn stamp_transactions(&mut self) {
        let block_hash = self.header.hash();
        for tx in &mut self.transactions {
            tx.block_id = Some(block_hash);
        }
    }

    pub fn calculate_merkle_root(transactions: &[Transaction]) -> Sha3Hash {
        let leaves: Vec<Sha3Hash> = transactions.iter().map(|tx| tx.id()).collect();
        MerkleTree::compute_root(&leaves)
    }

    /// Size charged against `MAX_BLOCK_SIZE_BYTES` for this transaction
    /// list. Validation recomputes this rather than trusting the stored
    /// field of a deserialized block.
    pub fn accounted_size(transactions: &[Transaction]) -> u64 {
        BLOCK_META_DATA_SIZE
            + BLOCK_HEADER_SIZE
            + transactions.iter().map(|tx| tx.size_bytes()).sum::<u64>()
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn total_fees(&self) -> u64 {
        self.transactions.iter().map(|tx| tx.fee()).sum()
    }

    /// What the coinbase earns for this block: fixed reward plus fees.
    pub fn coinbase_value(&self) -> u64 {
        BLOCK_REWARD + self.total_fees()
    }

    pub fn is_genesis(&self) -> bool {
        self.header.previous_hash == [0u8; 32]
    }
}

/// Initial balances credited by the genesis block.
pub fn default_premine() -> Vec<(Address, u64)> {
    vec![
        (address_from_string("ember-foundation"), 1_000),
        (address_from_string("ember-faucet"), 1_000),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn signed_transfer(amount: u64) -> Transaction {
        signed_transfer_with_fee(amount, 1)
    }

    fn signed_transfer_with_fee(amount: u64, fee_base_price: u64) -> Transaction {
        let keypair = KeyPair::generate().unwrap();
        let receiver = address_from_string("receiver");
        let mut tx = Transaction::new(
            keypair.address(),
            receiver,
            amount,
            1,
            fee_base_price,
            100,
            vec![],
        );
        tx.sign(&keypair).unwrap();
        tx
    }

    #[test]
    fn test_capacity_derivation() {
        assert_eq!(max_transactions_per_block(), 3_338);
    }

    #[test]
    fn test_header_hash_ignores_coinbase() {
        let mut block = Block::candidate([1u8; 32], vec![signed_transfer(5)]);
        let before = block.hash();

        block.coinbase = Some(address_from_string("miner"));
        assert_eq!(block.hash(), before);
    }

    #[test]
    fn test_header_hash_covers_nonce() {
        let mut block = Block::candidate([1u8; 32], vec![signed_transfer(5)]);
        let before = block.hash();

        block.header.nonce = 7;
        assert_ne!(block.hash(), before);
    }

    #[test]
    fn test_set_transactions_refreshes_commitment() {
        let mut block = Block::candidate([1u8; 32], vec![signed_transfer(5)]);
        let root_before = block.header.merkle_root;
        let size_before = block.size_bytes();

        block.set_transactions(vec![signed_transfer(5), signed_transfer(6)]);
        assert_ne!(block.header.merkle_root, root_before);
        assert_eq!(
            block.size_bytes(),
            size_before + TRANSACTION_META_DATA_SIZE + 64
        );
        assert_eq!(
            block.header.merkle_root,
            Block::calculate_merkle_root(block.transactions())
        );
    }

    #[test]
    fn test_genesis_shape() {
        let block = Block::genesis(&default_premine());

        assert!(block.is_genesis());
        assert_eq!(block.header.previous_hash, [0u8; 32]);
        assert_eq!(block.header.timestamp, GENESIS_TIMESTAMP);
        assert_eq!(block.header.nonce, 0);
        assert!(block.coinbase.is_none());
        assert_eq!(block.transactions().len(), 2);

        let hash = block.hash();
        for tx in block.transactions() {
            assert_eq!(tx.block_id, Some(hash));
            assert_eq!(tx.sender, [0u8; 32]);
            assert_eq!(tx.fee(), 0);
        }
    }

    #[test]
    fn test_genesis_is_deterministic() {
        let a = Block::genesis(&default_premine());
        let b = Block::genesis(&default_premine());
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn test_coinbase_value_includes_fees() {
        let block = Block::candidate(
            [1u8; 32],
            vec![signed_transfer(5), signed_transfer_with_fee(5, 3)],
        );

        // one transfer at base price 1 (fee 10) plus one at base price 3 (fee 30)
        assert_eq!(block.total_fees(), 40);
        assert_eq!(block.coinbase_value(), BLOCK_REWARD + 40);
    }

    #[test]
    fn test_accounted_size() {
        let block = Block::candidate([1u8; 32], vec![signed_transfer(5)]);
        assert_eq!(
            block.size_bytes(),
            BLOCK_META_DATA_SIZE + BLOCK_HEADER_SIZE + TRANSACTION_META_DATA_SIZE + 64
        );
    }
}
