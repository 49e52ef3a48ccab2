//! Network seam for Emberchain
//!
//! Transport is a collaborator, not part of the engine. Peers deliver blocks
//! and transactions into the node through its handlers; the node announces
//! local events outward through registered listeners. Whole-chain state moves
//! between peers as a [`crate::blockchain::ChainSnapshot`].

use std::sync::Arc;

use parking_lot::RwLock;

use crate::blockchain::Block;
use crate::transaction::Transaction;

/// Callbacks into the transport layer. Implementations typically broadcast
/// the event to connected peers.
pub trait NetworkListener: Send + Sync {
    fn on_block_mined(&self, block: &Block);
    fn on_transaction_submitted(&self, transaction: &Transaction);
}

/// Registered listeners, shared between the node and the miner thread.
/// Cloning yields a handle to the same underlying set.
#[derive(Clone, Default)]
pub struct ListenerSet {
    listeners: Arc<RwLock<Vec<Arc<dyn NetworkListener>>>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn NetworkListener>) {
        self.listeners.write().push(listener);
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    pub fn notify_block_mined(&self, block: &Block) {
        for listener in self.listeners.read().iter() {
            listener.on_block_mined(block);
        }
    }

    pub fn notify_transaction_submitted(&self, transaction: &Transaction) {
        for listener in self.listeners.read().iter() {
            listener.on_transaction_submitted(transaction);
        }
    }
}
