//! Node orchestration for Emberchain
//!
//! `Node` is the explicit context object wiring the chain, the miner, the
//! listener set and persistence together. Everything the network and API
//! layers call into goes through here; there is no process-wide state, so
//! tests build a fresh node each.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::blockchain::{default_premine, Block, Blockchain, ChainSnapshot, Sha3Hash};
use crate::config::Config;
use crate::crypto::{address_from_hex, Address, KeyPair};
use crate::error::Result;
use crate::miner::Miner;
use crate::network::{ListenerSet, NetworkListener};
use crate::persistence::{Database, InMemoryPersistence, Persistence};
use crate::transaction::Transaction;

pub struct Node {
    pub config: Config,
    pub chain: Arc<RwLock<Blockchain>>,
    pub listeners: ListenerSet,
    pub miner: Arc<Miner>,
    keypair: KeyPair,
}

impl Node {
    /// Boots a node from configuration: open persistence, load or create the
    /// chain, load or generate the node key, wire the miner.
    pub fn init(config: Config) -> Result<Self> {
        info!(
            "Starting Emberchain node (network_id = {})",
            config.node.network_id
        );

        let persistence = open_persistence(&config);
        let stored = match persistence.load_snapshot(config.node.network_id) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("Failed to load stored chain: {}", err);
                None
            }
        };

        let blockchain = match stored {
            Some(snapshot) => match Blockchain::from_snapshot(snapshot, persistence) {
                Ok(chain) => {
                    info!("Restored chain at height {}", chain.canonical().len());
                    chain
                }
                Err(err) => {
                    warn!("Stored snapshot rejected: {}. Starting a fresh chain.", err);
                    Blockchain::with_persistence(
                        config.node.network_id,
                        &default_premine(),
                        open_persistence(&config),
                    )
                }
            },
            None => Blockchain::with_persistence(
                config.node.network_id,
                &default_premine(),
                persistence,
            ),
        };

        Self::with_blockchain(config, blockchain)
    }

    /// Wires a node around an existing chain. This is the assembly point
    /// `init` funnels into; tests use it to supply prepared chains.
    pub fn with_blockchain(config: Config, blockchain: Blockchain) -> Result<Self> {
        let keypair = load_or_generate_key(&config)?;

        let coinbase = if config.mining.coinbase_address.is_empty() {
            keypair.address()
        } else {
            address_from_hex(&config.mining.coinbase_address)?
        };

        let chain = Arc::new(RwLock::new(blockchain));
        let listeners = ListenerSet::new();
        let miner = Arc::new(Miner::new(chain.clone(), listeners.clone(), coinbase));

        Ok(Node {
            config,
            chain,
            listeners,
            miner,
            keypair,
        })
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    pub fn address(&self) -> Address {
        self.keypair.address()
    }

    pub fn register_listener(&self, listener: Arc<dyn NetworkListener>) {
        self.listeners.register(listener);
    }

    pub fn start_mining(&self) {
        self.miner.start();
    }

    pub fn stop_mining(&self) {
        self.miner.stop();
    }

    /// A block delivered by a peer. The in-flight mining candidate is
    /// abandoned first so the search does not continue on a stale tip.
    pub async fn handle_incoming_block(&self, block: Block) -> Result<()> {
        self.miner.cancel_current();
        let mut chain = self.chain.write().await;
        chain.add_block(block)
    }

    /// A transaction delivered by a peer: validated and pooled, no echo.
    pub async fn handle_incoming_transaction(&self, transaction: Transaction) -> Result<Sha3Hash> {
        let id = self.accept_transaction(transaction).await?;
        debug!("Pooled incoming transaction {}", hex::encode(id));
        Ok(id)
    }

    /// A transaction submitted by a local client: validated, pooled and
    /// announced to the network listeners. The in-flight mining candidate
    /// is abandoned so the next one picks the new transaction up.
    pub async fn submit_transaction(&self, transaction: Transaction) -> Result<Sha3Hash> {
        let announced = transaction.clone();
        let id = self.accept_transaction(transaction).await?;
        self.miner.cancel_current();
        self.listeners.notify_transaction_submitted(&announced);
        info!("Accepted transaction {}", hex::encode(id));
        Ok(id)
    }

    async fn accept_transaction(&self, mut transaction: Transaction) -> Result<Sha3Hash> {
        transaction.received_at = chrono::Utc::now().timestamp_millis() as u64;

        let mut chain = self.chain.write().await;
        transaction.validate(&chain.ledger, &chain.mempool)?;
        let id = transaction.id();
        chain.mempool.add_transaction(transaction)?;
        Ok(id)
    }

    pub async fn snapshot(&self) -> ChainSnapshot {
        self.chain.read().await.snapshot()
    }

    /// Offers a peer's snapshot to the chain; adopted only when strictly
    /// longer. Returns whether a reorganization happened.
    pub async fn adopt_snapshot(&self, snapshot: ChainSnapshot) -> Result<bool> {
        self.miner.cancel_current();
        let mut chain = self.chain.write().await;
        chain.adopt_snapshot(snapshot)
    }
}

fn open_persistence(config: &Config) -> Box<dyn Persistence> {
    if let Some(parent) = Path::new(&config.database.path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!("Failed to create data dir {:?}: {}", parent, err);
            }
        }
    }
    match Database::open(&config.database.path) {
        Ok(db) => Box::new(db),
        Err(err) => {
            warn!(
                "Failed to open DB at {}: {}. Falling back to in-memory persistence.",
                config.database.path, err
            );
            Box::new(InMemoryPersistence::new())
        }
    }
}

fn load_or_generate_key(config: &Config) -> Result<KeyPair> {
    let path = Path::new(&config.node.key_file);
    if path.exists() {
        return KeyPair::load_from_file(path);
    }

    let keypair = KeyPair::generate()?;
    if let Err(err) = keypair.save_to_file(path) {
        warn!(
            "Failed to save node key to {}: {}",
            config.node.key_file, err
        );
    } else {
        info!("Generated node key at {}", config.node.key_file);
    }
    Ok(keypair)
}
