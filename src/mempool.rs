//! Transaction pool ordered by fee
//!
//! Pending transactions wait here until a miner packs them into a block.
//! Batch assembly walks the fee index from the most expensive transaction
//! down, so senders can pay for earlier inclusion.

use std::collections::{BTreeSet, HashMap};

use crate::blockchain::Sha3Hash;
use crate::crypto::Address;
use crate::error::ChainError;
use crate::transaction::Transaction;

#[derive(Clone, Debug, Default)]
pub struct Mempool {
    entries: HashMap<Sha3Hash, Transaction>,
    // (fee, id) so that iteration order is total even when fees collide
    by_fee: BTreeSet<(u64, Sha3Hash)>,
}

impl Mempool {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            by_fee: BTreeSet::new(),
        }
    }

    /// Adds a transaction to the pool. The caller is expected to have
    /// validated it already.
    pub fn add_transaction(&mut self, transaction: Transaction) -> Result<(), ChainError> {
        let id = transaction.id();
        if self.entries.contains_key(&id) {
            return Err(ChainError::DuplicateTransaction);
        }

        self.by_fee.insert((transaction.fee(), id));
        self.entries.insert(id, transaction);
        Ok(())
    }

    pub fn remove_transaction(&mut self, id: &Sha3Hash) -> Option<Transaction> {
        let transaction = self.entries.remove(id)?;
        self.by_fee.remove(&(transaction.fee(), *id));
        Some(transaction)
    }

    pub fn get_transaction(&self, id: &Sha3Hash) -> Option<&Transaction> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &Sha3Hash) -> bool {
        self.entries.contains_key(id)
    }

    /// Snapshot of every pending transaction, highest fee first.
    pub fn get_all_transactions(&self) -> Vec<Transaction> {
        self.by_fee
            .iter()
            .rev()
            .filter_map(|(_, id)| self.entries.get(id).cloned())
            .collect()
    }

    /// Selects transactions for the next block: highest fee first, skipping
    /// any that would push the running total over `byte_budget`. The pool is
    /// not modified; entries leave only once their block is adopted.
    pub fn next_batch(&self, byte_budget: u64) -> Vec<Transaction> {
        let mut batch = Vec::new();
        let mut remaining = byte_budget;

        for (_, id) in self.by_fee.iter().rev() {
            let Some(transaction) = self.entries.get(id) else {
                continue;
            };
            let size = transaction.size_bytes();
            if size <= remaining {
                remaining -= size;
                batch.push(transaction.clone());
            }
        }
        batch
    }

    /// True when no pending transaction other than `excluding` names
    /// `sender` as its sender. Enforces one in-flight transfer per account.
    pub fn no_other_pending_from(&self, sender: &Address, excluding: &Sha3Hash) -> bool {
        !self
            .entries
            .iter()
            .any(|(id, tx)| tx.sender == *sender && id != excluding)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{address_from_string, KeyPair};

    fn transfer_with_fee(keypair: &KeyPair, fee_base_price: u64, nonce: u64) -> Transaction {
        let receiver = address_from_string("receiver");
        let mut tx = Transaction::new(
            keypair.address(),
            receiver,
            10,
            nonce,
            fee_base_price,
            100,
            vec![],
        );
        tx.sign(keypair).unwrap();
        tx
    }

    #[test]
    fn test_add_and_get() {
        let keypair = KeyPair::generate().unwrap();
        let tx = transfer_with_fee(&keypair, 1, 1);
        let id = tx.id();

        let mut pool = Mempool::new();
        pool.add_transaction(tx).unwrap();

        assert!(pool.contains(&id));
        assert_eq!(pool.get_transaction(&id).map(|t| t.id()), Some(id));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_duplicate_rejected() {
        let keypair = KeyPair::generate().unwrap();
        let tx = transfer_with_fee(&keypair, 1, 1);

        let mut pool = Mempool::new();
        pool.add_transaction(tx.clone()).unwrap();

        assert!(matches!(
            pool.add_transaction(tx),
            Err(ChainError::DuplicateTransaction)
        ));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_remove_clears_fee_index() {
        let keypair = KeyPair::generate().unwrap();
        let tx = transfer_with_fee(&keypair, 1, 1);
        let id = tx.id();

        let mut pool = Mempool::new();
        pool.add_transaction(tx).unwrap();
        assert!(pool.remove_transaction(&id).is_some());

        assert!(pool.is_empty());
        assert!(pool.next_batch(u64::MAX).is_empty());
        assert!(pool.remove_transaction(&id).is_none());
    }

    #[test]
    fn test_batch_orders_by_fee_descending() {
        let mut pool = Mempool::new();
        let mut fees = Vec::new();
        for fee_base_price in [1u64, 5, 3] {
            let keypair = KeyPair::generate().unwrap();
            let tx = transfer_with_fee(&keypair, fee_base_price, 1);
            fees.push(tx.fee());
            pool.add_transaction(tx).unwrap();
        }

        let batch = pool.next_batch(u64::MAX);
        let batch_fees: Vec<u64> = batch.iter().map(|tx| tx.fee()).collect();
        assert_eq!(batch_fees, vec![50, 30, 10]);
        assert_eq!(fees.iter().sum::<u64>(), batch_fees.iter().sum::<u64>());
    }

    #[test]
    fn test_batch_respects_byte_budget() {
        let mut pool = Mempool::new();
        for fee_base_price in [1u64, 5, 3] {
            let keypair = KeyPair::generate().unwrap();
            pool.add_transaction(transfer_with_fee(&keypair, fee_base_price, 1))
                .unwrap();
        }

        let single = pool.next_batch(400);
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].fee(), 50);

        assert!(pool.next_batch(0).is_empty());
        // batch assembly leaves the pool untouched
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_pending_sender_conflicts() {
        let keypair = KeyPair::generate().unwrap();
        let first = transfer_with_fee(&keypair, 1, 1);
        let first_id = first.id();
        let second = transfer_with_fee(&keypair, 1, 2);

        let mut pool = Mempool::new();
        pool.add_transaction(first).unwrap();

        assert!(pool.no_other_pending_from(&keypair.address(), &first_id));
        assert!(!pool.no_other_pending_from(&keypair.address(), &second.id()));

        let other = KeyPair::generate().unwrap();
        assert!(pool.no_other_pending_from(&other.address(), &second.id()));
    }
}
