//! Snapshot persistence layer for Emberchain
//!
//! Chain state is stored as whole snapshots keyed by network id and tip
//! hash. The engine never depends on a backend being present; a node can run
//! purely in memory.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::blockchain::ChainSnapshot;
use crate::error::{ChainError, Result};

/// Abstraction over snapshot storage backends.
pub trait Persistence: Send + Sync {
    fn save_snapshot(&self, snapshot: &ChainSnapshot) -> Result<()>;
    fn load_snapshot(&self, network_id: u32) -> Result<Option<ChainSnapshot>>;
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| ChainError::Database(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS snapshots (
                network_id INTEGER NOT NULL,
                tip_hash BLOB NOT NULL,
                payload BLOB NOT NULL,
                saved_at INTEGER NOT NULL,
                PRIMARY KEY (network_id, tip_hash)
            )",
            [],
        )?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }
}

impl Persistence for Database {
    fn save_snapshot(&self, snapshot: &ChainSnapshot) -> Result<()> {
        let tip_hash = snapshot
            .tip_hash()
            .ok_or_else(|| ChainError::Database("Refusing to save an empty chain".into()))?;
        let payload = snapshot.encode()?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO snapshots (network_id, tip_hash, payload, saved_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                snapshot.network_id,
                tip_hash.to_vec(),
                payload,
                chrono::Utc::now().timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    /// The most recently saved snapshot for the network, if any.
    fn load_snapshot(&self, network_id: u32) -> Result<Option<ChainSnapshot>> {
        let conn = self.conn.lock();
        let payload: Option<Vec<u8>> = conn
            .query_row(
                "SELECT payload FROM snapshots WHERE network_id = ?1
                 ORDER BY saved_at DESC, rowid DESC LIMIT 1",
                params![network_id],
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(bytes) => Ok(Some(ChainSnapshot::decode(&bytes)?)),
            None => Ok(None),
        }
    }
}

/// In-memory backend for tests and ephemeral runs. Clones share storage.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    snapshots: Arc<Mutex<HashMap<u32, ChainSnapshot>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for InMemoryPersistence {
    fn save_snapshot(&self, snapshot: &ChainSnapshot) -> Result<()> {
        self.snapshots
            .lock()
            .insert(snapshot.network_id, snapshot.clone());
        Ok(())
    }

    fn load_snapshot(&self, network_id: u32) -> Result<Option<ChainSnapshot>> {
        Ok(self.snapshots.lock().get(&network_id).cloned())
    }
}
