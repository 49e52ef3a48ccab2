//! Proof-of-work mining loop
//!
//! The miner is a state machine on a dedicated OS thread: assemble a
//! candidate block from the pool, search the nonce space, hand a solved
//! block to the chain and notify listeners. Cancellation is a best-effort
//! flag polled between hash attempts, raised when a competing block arrives
//! so the search does not continue on a stale tip.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use num_bigint::BigInt;
use parking_lot::Mutex;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::blockchain::{
    fulfills_difficulty, Block, Blockchain, Sha3Hash, BLOCK_HEADER_SIZE, BLOCK_META_DATA_SIZE,
    MAX_BLOCK_SIZE_BYTES,
};
use crate::crypto::Address;
use crate::error::ChainError;
use crate::network::ListenerSet;

/// Result of one nonce search over one candidate block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The block hash fulfills the difficulty target.
    Mined,
    /// The cancellation flag was raised mid-search.
    Cancelled,
    /// The nonce space is spent; the candidate must be rebuilt.
    Exhausted,
}

/// Events published by the mining thread, mainly for tooling and tests.
#[derive(Debug, Clone)]
pub enum MinerEvent {
    Mined(Sha3Hash),
    Stopped,
}

/// Byte budget available to transactions in a candidate block.
pub const fn candidate_byte_budget() -> u64 {
    MAX_BLOCK_SIZE_BYTES - BLOCK_META_DATA_SIZE - BLOCK_HEADER_SIZE
}

/// Increments the nonce until the header hash fulfills `target`, the flag
/// raises, or the nonce range runs out. The flag is checked once per attempt,
/// so the hash computation for the current nonce always completes.
pub fn search_nonce(block: &mut Block, target: &BigInt, cancelled: &AtomicBool) -> SearchOutcome {
    loop {
        if cancelled.load(Ordering::Relaxed) {
            return SearchOutcome::Cancelled;
        }
        if fulfills_difficulty(&block.hash(), target) {
            return SearchOutcome::Mined;
        }
        block.header.nonce = match block.header.nonce.checked_add(1) {
            Some(next) => next,
            None => return SearchOutcome::Exhausted,
        };
    }
}

pub struct Miner {
    chain: Arc<RwLock<Blockchain>>,
    listeners: ListenerSet,
    coinbase: Address,
    running: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    events_tx: Sender<MinerEvent>,
    events_rx: Receiver<MinerEvent>,
}

impl Miner {
    pub fn new(chain: Arc<RwLock<Blockchain>>, listeners: ListenerSet, coinbase: Address) -> Self {
        let (events_tx, events_rx) = unbounded();
        Miner {
            chain,
            listeners,
            coinbase,
            running: Arc::new(AtomicBool::new(false)),
            cancelled: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
            events_tx,
            events_rx,
        }
    }

    pub fn coinbase(&self) -> Address {
        self.coinbase
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Receiver for mining events. Messages go to one receiver each, so a
    /// single consumer should hold this at a time.
    pub fn events(&self) -> Receiver<MinerEvent> {
        self.events_rx.clone()
    }

    /// Spawns the mining thread. A second call while running is a no-op.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancelled.store(false, Ordering::SeqCst);

        let chain = self.chain.clone();
        let listeners = self.listeners.clone();
        let coinbase = self.coinbase;
        let running = self.running.clone();
        let cancelled = self.cancelled.clone();
        let events = self.events_tx.clone();

        *self.handle.lock() = Some(thread::spawn(move || {
            mining_loop(chain, listeners, coinbase, running, cancelled, events);
        }));
        info!("Miner started (coinbase {})", hex::encode(self.coinbase));
    }

    /// Signals the thread to stop and joins it. A call while stopped is a
    /// no-op.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                warn!("Miner thread panicked during shutdown");
            }
        }
        info!("Miner stopped");
    }

    /// Abandons the in-flight candidate; the loop rebuilds it on the current
    /// tip. Called when a competing block arrives.
    pub fn cancel_current(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl Drop for Miner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn mining_loop(
    chain: Arc<RwLock<Blockchain>>,
    listeners: ListenerSet,
    coinbase: Address,
    running: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
    events: Sender<MinerEvent>,
) {
    while running.load(Ordering::SeqCst) {
        let (previous_hash, target, batch) = {
            let chain = chain.blocking_read();
            let Some(tip) = chain.tip() else {
                warn!("Cannot mine on an empty chain");
                break;
            };
            (
                tip.hash(),
                chain.difficulty_target().clone(),
                chain.mempool.next_batch(candidate_byte_budget()),
            )
        };

        let mut candidate = Block::candidate(previous_hash, batch);
        candidate.coinbase = Some(coinbase);

        match search_nonce(&mut candidate, &target, &cancelled) {
            SearchOutcome::Mined => {
                candidate.stamp_transactions();
                let hash = candidate.hash();
                let accepted = {
                    let mut chain = chain.blocking_write();
                    chain.add_block(candidate.clone())
                };
                match accepted {
                    Ok(()) => {
                        info!(
                            "Mined block {} with {} transaction(s)",
                            hex::encode(hash),
                            candidate.transactions().len()
                        );
                        listeners.notify_block_mined(&candidate);
                        let _ = events.send(MinerEvent::Mined(hash));
                    }
                    Err(ChainError::BlockAlreadyKnown) | Err(ChainError::UnknownParent(_)) => {
                        debug!("Chain advanced during the search; candidate discarded");
                    }
                    Err(err) => {
                        warn!("Mined block was rejected: {}", err);
                    }
                }
            }
            SearchOutcome::Cancelled => {
                // only clear the flag when still running; stop() raises it
                // after clearing `running` and must win that race
                if running.load(Ordering::SeqCst) {
                    cancelled.store(false, Ordering::SeqCst);
                    debug!("Search cancelled; rebuilding candidate");
                }
            }
            SearchOutcome::Exhausted => {
                debug!("Nonce range exhausted; rebuilding candidate with a fresh batch");
            }
        }
    }
    let _ = events.send(MinerEvent::Stopped);
}
