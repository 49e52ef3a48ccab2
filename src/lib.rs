//! Emberchain - a minimal proof-of-work blockchain with account balances
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Chain
//! - [`blockchain`] - Blocks, the account ledger, validation and chain
//!   management (canonical plus alternative chains, reorganization)
//! - [`transaction`] - Signed value transfers
//! - [`mempool`] - Fee-prioritized pending-transaction pool
//! - [`merkle`] - Merkle commitments and inclusion proofs
//!
//! ## Consensus
//! - [`miner`] - Proof-of-work nonce search on a dedicated thread
//!
//! ## Cryptography
//! - [`crypto`] - SHA3-256 hashing, secp256k1 keys and signatures
//!
//! ## State Management
//! - [`persistence`] - Chain snapshot storage (SQLite)
//!
//! ## Networking & Integration
//! - [`network`] - Listener seam for block and transaction announcements
//! - [`api`] - REST endpoints (axum)
//!
//! ## Node & Configuration
//! - [`node`] - The context object wiring everything together
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Chain
// ============================================================================
pub mod blockchain;
pub mod mempool;
pub mod merkle;
pub mod transaction;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod miner;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// State Management
// ============================================================================
pub mod persistence;

// ============================================================================
// Networking & Integration
// ============================================================================
pub mod network;

#[cfg(feature = "api")]
pub mod api;

// ============================================================================
// Node, Configuration & Errors
// ============================================================================
pub mod config;
pub mod error;
pub mod node;
