//! Canonical chain, alternative chains and reorganization
//!
//! `Blockchain` owns the canonical chain, every known fork, the pending
//! transaction pool and the account ledger. All mutation funnels through
//! `add_block`, which decides where an incoming block belongs: extend the
//! canonical tip, extend a fork, open a new fork from a mid-chain block,
//! or be rejected. A fork that grows strictly longer than the canonical
//! chain takes over; equal length never switches.

use std::collections::{HashMap, HashSet};

use num_bigint::BigInt;
use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

use crate::crypto::Address;
use crate::error::{ChainError, Result};
use crate::mempool::Mempool;
use crate::persistence::{InMemoryPersistence, Persistence};
use crate::transaction::Transaction;

use super::accounts::{AccountLedger, REQUIRED_BLOCK_CONFIRMATIONS};
use super::block::{Block, Sha3Hash};
use super::validation::{validate_block, validate_structure};

/// Identifier of the blockchain network this node participates in.
pub const NETWORK_ID: u32 = 1;

/// Network-wide difficulty target: a block hash, read as a signed
/// big-endian integer, must be at or below this value. The value is
/// -57896 * 10^72, slightly above the signed 256-bit minimum.
pub static DIFFICULTY_TARGET: Lazy<BigInt> =
    Lazy::new(|| -(BigInt::from(57_896u64) * BigInt::from(10u64).pow(72u32)));

/// An ordered block sequence starting at a genesis block, tagged with the
/// network it belongs to.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Chain {
    pub network_id: u32,
    blocks: Vec<Block>,
}

impl Chain {
    pub fn new(network_id: u32, premine: &[(Address, u64)]) -> Self {
        Chain {
            network_id,
            blocks: vec![Block::genesis(premine)],
        }
    }

    pub fn from_blocks(network_id: u32, blocks: Vec<Block>) -> Self {
        Chain { network_id, blocks }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn tip(&self) -> Option<&Block> {
        self.blocks.last()
    }

    pub fn get(&self, index: usize) -> Option<&Block> {
        self.blocks.get(index)
    }

    pub fn push(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Index of the block with the given hash, if it is on this chain.
    pub fn position_of(&self, hash: &Sha3Hash) -> Option<usize> {
        self.blocks.iter().position(|b| b.hash() == *hash)
    }
}

/// Serialized chain state: what peers exchange on sync and what the
/// database stores between runs.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChainSnapshot {
    pub network_id: u32,
    pub canonical: Chain,
    pub alternatives: Vec<Chain>,
}

impl ChainSnapshot {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    pub fn tip_hash(&self) -> Option<Sha3Hash> {
        self.canonical.tip().map(|b| b.hash())
    }
}

pub struct Blockchain {
    chain: Chain,
    alt_chains: Vec<Chain>,
    block_index: HashMap<Sha3Hash, Block>,
    tx_index: HashMap<Sha3Hash, Sha3Hash>,
    difficulty_target: BigInt,
    pub mempool: Mempool,
    pub ledger: AccountLedger,
    persistence: Box<dyn Persistence>,
}

impl Blockchain {
    /// A fresh chain with an in-memory persistence backend.
    pub fn new(network_id: u32, premine: &[(Address, u64)]) -> Self {
        Self::build(
            network_id,
            premine,
            DIFFICULTY_TARGET.clone(),
            Box::new(InMemoryPersistence::new()),
        )
    }

    /// A fresh chain writing snapshots to the provided backend.
    pub fn with_persistence(
        network_id: u32,
        premine: &[(Address, u64)],
        persistence: Box<dyn Persistence>,
    ) -> Self {
        Self::build(network_id, premine, DIFFICULTY_TARGET.clone(), persistence)
    }

    /// A fresh chain with a custom difficulty target.
    pub fn with_difficulty(network_id: u32, premine: &[(Address, u64)], target: BigInt) -> Self {
        Self::build(
            network_id,
            premine,
            target,
            Box::new(InMemoryPersistence::new()),
        )
    }

    fn build(
        network_id: u32,
        premine: &[(Address, u64)],
        difficulty_target: BigInt,
        persistence: Box<dyn Persistence>,
    ) -> Self {
        let chain = Chain::new(network_id, premine);
        let mut blockchain = Blockchain {
            chain,
            alt_chains: Vec::new(),
            block_index: HashMap::new(),
            tx_index: HashMap::new(),
            difficulty_target,
            mempool: Mempool::new(),
            ledger: AccountLedger::new(),
            persistence,
        };
        blockchain.rebuild_indexes();
        blockchain.ledger.replay(blockchain.chain.blocks());
        blockchain
    }

    /// Restores chain state from a stored or received snapshot.
    pub fn from_snapshot(snapshot: ChainSnapshot, persistence: Box<dyn Persistence>) -> Result<Self> {
        verify_snapshot(&snapshot)?;

        let mut blockchain = Blockchain {
            chain: snapshot.canonical,
            alt_chains: snapshot.alternatives,
            block_index: HashMap::new(),
            tx_index: HashMap::new(),
            difficulty_target: DIFFICULTY_TARGET.clone(),
            mempool: Mempool::new(),
            ledger: AccountLedger::new(),
            persistence,
        };
        blockchain.rebuild_indexes();
        blockchain.ledger.replay(blockchain.chain.blocks());
        Ok(blockchain)
    }

    pub fn network_id(&self) -> u32 {
        self.chain.network_id
    }

    pub fn canonical(&self) -> &Chain {
        &self.chain
    }

    pub fn alt_chains(&self) -> &[Chain] {
        &self.alt_chains
    }

    pub fn tip(&self) -> Option<&Block> {
        self.chain.tip()
    }

    pub fn genesis(&self) -> Option<&Block> {
        self.chain.get(0)
    }

    pub fn difficulty_target(&self) -> &BigInt {
        &self.difficulty_target
    }

    /// Accepts a block into the chain structure. One atomic step: the
    /// caller is expected to hold the node-wide write lock.
    pub fn add_block(&mut self, mut block: Block) -> Result<()> {
        let hash = block.hash();
        if self.block_index.contains_key(&hash) {
            return Err(ChainError::BlockAlreadyKnown);
        }
        // ids exclude the block id, so stamping cannot break the header
        // commitment; every stored copy then knows its containing block
        block.stamp_transactions();

        let tip_hash = self
            .chain
            .tip()
            .map(|b| b.hash())
            .ok_or_else(|| ChainError::ChainIntegrity("canonical chain is empty".into()))?;

        match validate_block(
            &block,
            &tip_hash,
            &self.ledger,
            &self.mempool,
            &self.difficulty_target,
        ) {
            Ok(()) => self.commit_canonical(block),
            // not an extension of the canonical tip; try the forks
            Err(ChainError::UnknownParent(_)) => self.place_on_fork(block),
            Err(err) => Err(err),
        }
    }

    fn commit_canonical(&mut self, block: Block) -> Result<()> {
        let hash = block.hash();
        let height = self.chain.len() as u64;

        self.chain.push(block.clone());
        self.ledger.apply_block(&block, height);

        if height >= REQUIRED_BLOCK_CONFIRMATIONS {
            let confirmed_index = (height - REQUIRED_BLOCK_CONFIRMATIONS) as usize;
            if let Some(confirmed) = self.chain.get(confirmed_index) {
                self.ledger.release_locked(confirmed);
            }
        }

        for tx in block.transactions() {
            let id = tx.id();
            self.mempool.remove_transaction(&id);
            self.tx_index.insert(id, hash);
        }
        self.block_index.insert(hash, block);

        self.persist();
        info!(
            "Block {} appended at height {}",
            hex::encode(hash),
            height
        );
        Ok(())
    }

    fn place_on_fork(&mut self, block: Block) -> Result<()> {
        let hash = block.hash();
        let parent = block.header.previous_hash;

        // extend a fork whose tip is the parent
        if let Some(index) = self
            .alt_chains
            .iter()
            .position(|alt| alt.tip().map_or(false, |t| t.hash() == parent))
        {
            validate_structure(&block, &parent, &self.difficulty_target)?;
            self.alt_chains[index].push(block.clone());
            self.block_index.insert(hash, block);
            info!(
                "Block {} extends alternative chain {}",
                hex::encode(hash),
                index
            );
            return self.promote_if_longer(index);
        }

        // otherwise fork off the middle of a known chain
        if !self.block_index.contains_key(&parent) {
            return Err(ChainError::UnknownParent(hex::encode(parent)));
        }
        validate_structure(&block, &parent, &self.difficulty_target)?;

        let mut blocks = self.fork_prefix(&parent).ok_or_else(|| {
            warn!(
                "Parent {} is indexed but on no chain; dropping block {}",
                hex::encode(parent),
                hex::encode(hash)
            );
            ChainError::ChainIntegrity(format!(
                "no chain contains parent {}",
                hex::encode(parent)
            ))
        })?;
        blocks.push(block.clone());

        self.alt_chains
            .push(Chain::from_blocks(self.chain.network_id, blocks));
        self.block_index.insert(hash, block);
        info!(
            "Block {} opened a new fork from {}",
            hex::encode(hash),
            hex::encode(parent)
        );
        self.promote_if_longer(self.alt_chains.len() - 1)
    }

    /// Prefix of the chain owning `parent`, up to and including it. The
    /// canonical chain is searched first, matching lookup priority.
    fn fork_prefix(&self, parent: &Sha3Hash) -> Option<Vec<Block>> {
        std::iter::once(&self.chain)
            .chain(self.alt_chains.iter())
            .find_map(|c| {
                c.position_of(parent)
                    .map(|i| c.blocks()[..=i].to_vec())
            })
    }

    /// Reorganizes when the fork at `index` is strictly longer than the
    /// canonical chain. The pool gives up transactions the incoming chain
    /// confirmed and takes back those only the outgoing chain had; the
    /// ledger is rebuilt by full replay.
    fn promote_if_longer(&mut self, index: usize) -> Result<()> {
        if self.alt_chains[index].len() <= self.chain.len() {
            return Ok(());
        }

        let incoming = self.alt_chains.remove(index);
        let fork_index = fork_point(&self.chain, &incoming);

        let confirmed_by_incoming: HashSet<Sha3Hash> = incoming.blocks()[fork_index..]
            .iter()
            .flat_map(|b| b.transactions().iter().map(|tx| tx.id()))
            .collect();
        for id in &confirmed_by_incoming {
            self.mempool.remove_transaction(id);
        }
        for displaced in &self.chain.blocks()[fork_index..] {
            for tx in displaced.transactions() {
                if confirmed_by_incoming.contains(&tx.id()) {
                    continue;
                }
                let mut tx = tx.clone();
                tx.block_id = None;
                if self.mempool.add_transaction(tx).is_err() {
                    debug!("Displaced transaction already pending");
                }
            }
        }

        let outgoing = std::mem::replace(&mut self.chain, incoming);
        info!(
            "Reorganized: height {} -> {}, fork at index {}",
            outgoing.len(),
            self.chain.len(),
            fork_index
        );
        self.alt_chains.push(outgoing);

        self.rebuild_tx_index();
        self.ledger.replay(self.chain.blocks());
        self.persist();
        Ok(())
    }

    /// Installs a peer's snapshot when its canonical chain is strictly
    /// longer than ours. Returns whether the snapshot was adopted.
    pub fn adopt_snapshot(&mut self, snapshot: ChainSnapshot) -> Result<bool> {
        if snapshot.network_id != self.chain.network_id {
            return Err(ChainError::ChainIntegrity(format!(
                "snapshot is for network {}, this node runs network {}",
                snapshot.network_id, self.chain.network_id
            )));
        }
        if snapshot.canonical.len() <= self.chain.len() {
            debug!("Ignoring snapshot: not longer than the local chain");
            return Ok(false);
        }
        verify_snapshot(&snapshot)?;
        if snapshot.canonical.get(0).map(|b| b.hash()) != self.chain.get(0).map(|b| b.hash()) {
            return Err(ChainError::ChainIntegrity(
                "snapshot has a different genesis block".into(),
            ));
        }

        let incoming = snapshot.canonical;
        let fork_index = fork_point(&self.chain, &incoming);

        let confirmed_by_incoming: HashSet<Sha3Hash> = incoming.blocks()[fork_index..]
            .iter()
            .flat_map(|b| b.transactions().iter().map(|tx| tx.id()))
            .collect();
        for id in &confirmed_by_incoming {
            self.mempool.remove_transaction(id);
        }
        for displaced in &self.chain.blocks()[fork_index..] {
            for tx in displaced.transactions() {
                if confirmed_by_incoming.contains(&tx.id()) {
                    continue;
                }
                let mut tx = tx.clone();
                tx.block_id = None;
                let _ = self.mempool.add_transaction(tx);
            }
        }

        let outgoing = std::mem::replace(&mut self.chain, incoming);
        self.alt_chains = snapshot.alternatives;
        self.alt_chains.push(outgoing);

        self.rebuild_indexes();
        self.ledger.replay(self.chain.blocks());
        self.persist();
        info!("Adopted snapshot: new height {}", self.chain.len());
        Ok(true)
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            network_id: self.chain.network_id,
            canonical: self.chain.clone(),
            alternatives: self.alt_chains.clone(),
        }
    }

    pub fn block_by_hash(&self, hash: &Sha3Hash) -> Option<&Block> {
        self.block_index.get(hash)
    }

    /// A confirmed transaction by id. Pending transactions live in the
    /// pool, not here.
    pub fn transaction_by_hash(&self, id: &Sha3Hash) -> Option<&Transaction> {
        self.transaction_location(id).map(|(_, tx)| tx)
    }

    /// A confirmed transaction together with the canonical block holding it.
    pub fn transaction_location(&self, id: &Sha3Hash) -> Option<(&Block, &Transaction)> {
        let block_hash = self.tx_index.get(id)?;
        let block = self.block_index.get(block_hash)?;
        let transaction = block.transactions().iter().find(|tx| tx.id() == *id)?;
        Some((block, transaction))
    }

    /// Newest-first canonical blocks, walking previous-hash links from the
    /// tip, skipping `offset` and returning at most `count`.
    pub fn latest_blocks(&self, count: usize, offset: usize) -> Vec<Block> {
        let mut result = Vec::new();
        let mut cursor = self.chain.tip().map(|b| b.hash());
        let mut skipped = 0;

        while let Some(hash) = cursor {
            let Some(block) = self.block_index.get(&hash) else {
                break;
            };
            if skipped < offset {
                skipped += 1;
            } else if result.len() < count {
                result.push(block.clone());
            } else {
                break;
            }
            if block.is_genesis() {
                break;
            }
            cursor = Some(block.header.previous_hash);
        }
        result
    }

    /// The canonical successor of a block, if any.
    pub fn child_of(&self, hash: &Sha3Hash) -> Option<&Block> {
        let index = self.chain.position_of(hash)?;
        self.chain.get(index + 1)
    }

    fn rebuild_indexes(&mut self) {
        self.block_index.clear();
        for chain in std::iter::once(&self.chain).chain(self.alt_chains.iter()) {
            for block in chain.blocks() {
                self.block_index.insert(block.hash(), block.clone());
            }
        }
        self.rebuild_tx_index();
    }

    fn rebuild_tx_index(&mut self) {
        self.tx_index.clear();
        for block in self.chain.blocks() {
            let hash = block.hash();
            for tx in block.transactions() {
                self.tx_index.insert(tx.id(), hash);
            }
        }
    }

    fn persist(&self) {
        if let Err(err) = self.persistence.save_snapshot(&self.snapshot()) {
            warn!("Failed to persist chain snapshot: {}", err);
        }
    }
}

/// First index after the deepest block of `outgoing` that `incoming` also
/// contains. Both chains share at least the genesis block in practice;
/// an empty intersection reconciles everything from index 0.
fn fork_point(outgoing: &Chain, incoming: &Chain) -> usize {
    for block in outgoing.blocks().iter().rev() {
        if let Some(index) = incoming.position_of(&block.hash()) {
            return index + 1;
        }
    }
    warn!("Chains share no ancestor; reconciling from the genesis block");
    0
}

fn verify_snapshot(snapshot: &ChainSnapshot) -> Result<()> {
    for chain in std::iter::once(&snapshot.canonical).chain(snapshot.alternatives.iter()) {
        if chain.network_id != snapshot.network_id {
            return Err(ChainError::ChainIntegrity(
                "chain network id differs from the snapshot".into(),
            ));
        }
        verify_linkage(chain)?;
    }
    for alt in &snapshot.alternatives {
        if alt.get(0).map(|b| b.hash()) != snapshot.canonical.get(0).map(|b| b.hash()) {
            return Err(ChainError::ChainIntegrity(
                "alternative chain has a different genesis block".into(),
            ));
        }
    }
    Ok(())
}

fn verify_linkage(chain: &Chain) -> Result<()> {
    let first = chain
        .get(0)
        .ok_or_else(|| ChainError::ChainIntegrity("chain is empty".into()))?;
    if !first.is_genesis() {
        return Err(ChainError::ChainIntegrity(
            "chain does not start at a genesis block".into(),
        ));
    }
    for pair in chain.blocks().windows(2) {
        if pair[1].header.previous_hash != pair[0].hash() {
            return Err(ChainError::ChainIntegrity(format!(
                "broken link before block {}",
                hex::encode(pair[1].hash())
            )));
        }
    }
    Ok(())
}
