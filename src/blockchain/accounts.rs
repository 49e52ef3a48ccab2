//! Account balances derived from the canonical chain
//!
//! The ledger is a pure state machine: blocks reaching it have already been
//! validated, so application never fails. Coinbase earnings stay locked
//! until the block underneath has enough confirmations, and a full replay
//! reproduces exactly the state the incremental path builds.

use std::collections::HashMap;

use crate::crypto::Address;

use super::block::{Block, Sha3Hash};

/// Blocks that must be mined on top before a coinbase reward unlocks.
pub const REQUIRED_BLOCK_CONFIRMATIONS: u64 = 1;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Account {
    pub address: Address,
    pub balance: u64,
    pub locked_balance: u64,
    incoming: Vec<Sha3Hash>,
    outgoing: Vec<Sha3Hash>,
    mined_blocks: Vec<Sha3Hash>,
}

impl Account {
    fn new(address: Address) -> Self {
        Account {
            address,
            ..Default::default()
        }
    }

    /// What the account can spend right now. Locked coinbase earnings
    /// count towards `balance` but not towards this.
    pub fn spendable(&self) -> u64 {
        self.balance.saturating_sub(self.locked_balance)
    }

    pub fn incoming(&self) -> &[Sha3Hash] {
        &self.incoming
    }

    pub fn outgoing(&self) -> &[Sha3Hash] {
        &self.outgoing
    }

    pub fn mined_blocks(&self) -> &[Sha3Hash] {
        &self.mined_blocks
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct AccountLedger {
    accounts: HashMap<Address, Account>,
}

impl AccountLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    pub fn balance(&self, address: &Address) -> u64 {
        self.accounts.get(address).map_or(0, |a| a.balance)
    }

    pub fn spendable(&self, address: &Address) -> u64 {
        self.accounts.get(address).map_or(0, |a| a.spendable())
    }

    /// Sum over every account, locked funds included.
    pub fn total_balance(&self) -> u64 {
        self.accounts.values().map(|a| a.balance).sum()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Applies one block at the given height. Height 0 is the genesis
    /// block: its premine transactions only credit receivers. Any other
    /// block debits senders, credits receivers and locks the coinbase
    /// earnings until confirmed. Balance arithmetic saturates; validation
    /// upstream is what actually prevents overdrafts.
    pub fn apply_block(&mut self, block: &Block, height: u64) {
        if height == 0 {
            for tx in block.transactions() {
                let account = self.entry(tx.receiver);
                account.balance = account.balance.saturating_add(tx.amount);
                account.incoming.push(tx.id());
            }
            return;
        }

        for tx in block.transactions() {
            let id = tx.id();
            let cost = tx.amount.saturating_add(tx.fee());

            let sender = self.entry(tx.sender);
            sender.balance = sender.balance.saturating_sub(cost);
            sender.outgoing.push(id);

            let receiver = self.entry(tx.receiver);
            receiver.balance = receiver.balance.saturating_add(tx.amount);
            receiver.incoming.push(id);
        }

        if let Some(coinbase) = block.coinbase {
            let earned = block.coinbase_value();
            let account = self.entry(coinbase);
            account.balance = account.balance.saturating_add(earned);
            account.locked_balance = account.locked_balance.saturating_add(earned);
            account.mined_blocks.push(block.hash());
        }
    }

    /// Unlocks the coinbase earnings of a block that has reached the
    /// required confirmations. The amount released is exactly what
    /// `apply_block` locked for this block.
    pub fn release_locked(&mut self, block: &Block) {
        let Some(coinbase) = block.coinbase else {
            return;
        };
        if let Some(account) = self.accounts.get_mut(&coinbase) {
            account.locked_balance = account
                .locked_balance
                .saturating_sub(block.coinbase_value());
        }
    }

    /// Rebuilds the whole ledger from a block sequence, genesis first.
    /// Used after a reorganization.
    pub fn replay(&mut self, blocks: &[Block]) {
        self.accounts.clear();
        for (height, block) in blocks.iter().enumerate() {
            let height = height as u64;
            self.apply_block(block, height);
            if height >= REQUIRED_BLOCK_CONFIRMATIONS {
                let confirmed = &blocks[(height - REQUIRED_BLOCK_CONFIRMATIONS) as usize];
                self.release_locked(confirmed);
            }
        }
    }

    fn entry(&mut self, address: Address) -> &mut Account {
        self.accounts
            .entry(address)
            .or_insert_with(|| Account::new(address))
    }
}
