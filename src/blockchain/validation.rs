//! Block validation
//!
//! Ordered predicate chain over an incoming block; the first failure
//! rejects. The full check runs against the canonical tip with ledger and
//! pool context. Blocks extending an alternative chain get the structural
//! subset only, since no ledger exists for a fork until it is promoted.

use num_bigint::BigInt;

use crate::error::{ChainError, Result};
use crate::mempool::Mempool;

use super::accounts::AccountLedger;
use super::block::{Block, Sha3Hash, MAX_BLOCK_SIZE_BYTES, VERSION};

/// A hash wins when its signed big-endian value is at or below the target.
pub fn fulfills_difficulty(hash: &Sha3Hash, target: &BigInt) -> bool {
    BigInt::from_signed_bytes_be(hash) <= *target
}

/// Full validation against the canonical tip.
pub fn validate_block(
    block: &Block,
    tip_hash: &Sha3Hash,
    ledger: &AccountLedger,
    pool: &Mempool,
    target: &BigInt,
) -> Result<()> {
    validate_shape(block)?;
    validate_linkage(block, tip_hash)?;
    validate_merkle_root(block)?;

    for tx in block.transactions() {
        tx.validate(ledger, pool)?;
    }

    if !fulfills_difficulty(&block.hash(), target) {
        return Err(ChainError::DifficultyNotMet);
    }
    Ok(())
}

/// Context-free validation for blocks appended to an alternative chain:
/// shape, linkage, Merkle commitment, signatures and proof of work. Balance
/// and pool checks are deferred until the fork is promoted and replayed.
pub fn validate_structure(block: &Block, tip_hash: &Sha3Hash, target: &BigInt) -> Result<()> {
    validate_shape(block)?;
    validate_linkage(block, tip_hash)?;
    validate_merkle_root(block)?;

    for tx in block.transactions() {
        tx.validate_signature()?;
    }

    if !fulfills_difficulty(&block.hash(), target) {
        return Err(ChainError::DifficultyNotMet);
    }
    Ok(())
}

fn validate_shape(block: &Block) -> Result<()> {
    if Block::accounted_size(block.transactions()) > MAX_BLOCK_SIZE_BYTES {
        return Err(ChainError::MalformedBlock(
            "accounted size exceeds the block limit".into(),
        ));
    }
    if block.header.version != VERSION {
        return Err(ChainError::MalformedBlock(format!(
            "unsupported version {}",
            block.header.version
        )));
    }
    Ok(())
}

fn validate_linkage(block: &Block, tip_hash: &Sha3Hash) -> Result<()> {
    if block.header.previous_hash != *tip_hash {
        return Err(ChainError::UnknownParent(hex::encode(
            block.header.previous_hash,
        )));
    }
    Ok(())
}

fn validate_merkle_root(block: &Block) -> Result<()> {
    if Block::calculate_merkle_root(block.transactions()) != block.header.merkle_root {
        return Err(ChainError::MerkleMismatch);
    }
    Ok(())
}
