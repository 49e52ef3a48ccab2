//! REST interface over a running node
//!
//! Read endpoints cover blocks, transactions, Merkle proofs and accounts;
//! the single write endpoint submits a signed transaction. Every response
//! is JSON, and error bodies carry one `error` field.

use axum::{
    extract::{Path, Query, State},
    http::{self, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hex::decode_to_slice;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::info;

use crate::blockchain::{Account, Block, Sha3Hash};
use crate::crypto::address_to_hex;
use crate::error::ChainError;
use crate::merkle::MerkleTree;
use crate::node::Node;
use crate::transaction::Transaction;

/// Cap on `count` for list endpoints.
const MAX_PAGE_SIZE: usize = 100;

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    /// The chain rejected a submitted entity.
    Rejected(ChainError),
    /// The request itself is malformed.
    InvalidInput(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Rejected(err) => (StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
            ApiError::InvalidInput(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::InvalidTransaction(_)
            | ChainError::DuplicateTransaction
            | ChainError::MalformedBlock(_)
            | ChainError::DifficultyNotMet
            | ChainError::MerkleMismatch
            | ChainError::UnknownParent(_)
            | ChainError::BlockAlreadyKnown => ApiError::Rejected(err),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Serialize)]
struct SubmitResponse {
    id: String,
}

#[derive(Serialize)]
struct ProofResponse {
    transaction: String,
    block: String,
    /// Sibling hashes from the leaf up, root last.
    hashes: Vec<String>,
}

#[derive(Serialize)]
struct AccountResponse {
    address: String,
    balance: u64,
    locked_balance: u64,
    spendable: u64,
    incoming: Vec<String>,
    outgoing: Vec<String>,
    mined_blocks: Vec<String>,
}

impl AccountResponse {
    fn from_account(account: &Account) -> Self {
        AccountResponse {
            address: address_to_hex(&account.address),
            balance: account.balance,
            locked_balance: account.locked_balance,
            spendable: account.spendable(),
            incoming: account.incoming().iter().map(hex::encode).collect(),
            outgoing: account.outgoing().iter().map(hex::encode).collect(),
            mined_blocks: account.mined_blocks().iter().map(hex::encode).collect(),
        }
    }
}

#[derive(Deserialize)]
struct WalkQuery {
    #[serde(default = "default_count")]
    count: usize,
    #[serde(default)]
    offset: usize,
}

fn default_count() -> usize {
    10
}

// ============================================================================
// Utilities
// ============================================================================

/// Parses a 64-character hex string into a 32-byte hash.
fn parse_hash(input: &str) -> Result<Sha3Hash, ApiError> {
    if input.len() != 64 {
        return Err(ApiError::InvalidInput(
            "Expected a 64-character hex string".to_string(),
        ));
    }
    let mut hash = [0u8; 32];
    decode_to_slice(input, &mut hash)
        .map_err(|e| ApiError::InvalidInput(format!("Invalid hex: {}", e)))?;
    Ok(hash)
}

// ============================================================================
// Router
// ============================================================================

/// Builds the router. Separate from [`serve`] so tests can drive the
/// endpoints without binding a socket.
pub fn router(node: Arc<Node>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(vec![http::Method::GET, http::Method::POST])
        .allow_headers(vec![http::header::CONTENT_TYPE]);

    let api = Router::new()
        .route("/health", get(health))
        .route("/blocks", get(recent_blocks))
        .route("/blocks/:hash", get(block_by_hash))
        .route("/blocks/:hash/child", get(block_child))
        .route("/transactions", post(submit_transaction))
        .route("/transactions/:hash", get(transaction_by_hash))
        .route("/transactions/:hash/proof", get(transaction_proof))
        .route("/accounts/:address", get(account_by_address))
        .route("/search/:hash", get(search))
        .with_state(node);

    Router::new().nest("/api", api).layer(cors)
}

/// Binds the address from the node's config and serves until dropped.
pub async fn serve(node: Arc<Node>) -> Result<(), ChainError> {
    let addr = format!("{}:{}", node.config.api.bind, node.config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("API listening on http://{}", addr);
    axum::serve(listener, router(node)).await?;
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

async fn health(State(node): State<Arc<Node>>) -> impl IntoResponse {
    let chain = node.chain.read().await;
    Json(serde_json::json!({
        "status": "ok",
        "network_id": chain.network_id(),
        "height": chain.canonical().len(),
        "mining": node.miner.is_running(),
    }))
}

async fn recent_blocks(
    State(node): State<Arc<Node>>,
    Query(query): Query<WalkQuery>,
) -> impl IntoResponse {
    let chain = node.chain.read().await;
    Json(chain.latest_blocks(query.count.min(MAX_PAGE_SIZE), query.offset))
}

async fn block_by_hash(
    State(node): State<Arc<Node>>,
    Path(hash): Path<String>,
) -> Result<Json<Block>, ApiError> {
    let id = parse_hash(&hash)?;
    let chain = node.chain.read().await;
    chain
        .block_by_hash(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No block {}", hash)))
}

async fn block_child(
    State(node): State<Arc<Node>>,
    Path(hash): Path<String>,
) -> Result<Json<Block>, ApiError> {
    let id = parse_hash(&hash)?;
    let chain = node.chain.read().await;
    chain
        .child_of(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No canonical block after {}", hash)))
}

async fn submit_transaction(
    State(node): State<Arc<Node>>,
    Json(transaction): Json<Transaction>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let id = node.submit_transaction(transaction).await?;
    Ok(Json(SubmitResponse {
        id: hex::encode(id),
    }))
}

/// Confirmed transactions first, then the pending pool.
async fn transaction_by_hash(
    State(node): State<Arc<Node>>,
    Path(hash): Path<String>,
) -> Result<Json<Transaction>, ApiError> {
    let id = parse_hash(&hash)?;
    let chain = node.chain.read().await;

    if let Some(transaction) = chain.transaction_by_hash(&id) {
        return Ok(Json(transaction.clone()));
    }
    if let Some(pending) = chain.mempool.get_transaction(&id) {
        return Ok(Json(pending.clone()));
    }
    Err(ApiError::NotFound(format!("No transaction {}", hash)))
}

async fn transaction_proof(
    State(node): State<Arc<Node>>,
    Path(hash): Path<String>,
) -> Result<Json<ProofResponse>, ApiError> {
    let id = parse_hash(&hash)?;
    let chain = node.chain.read().await;

    let (block, _) = chain.transaction_location(&id).ok_or_else(|| {
        ApiError::NotFound(format!("Transaction {} is not in a block", hash))
    })?;

    let leaves: Vec<Sha3Hash> = block.transactions().iter().map(|tx| tx.id()).collect();
    let tree = MerkleTree::build(&leaves);
    let hashes = tree
        .proof_for(&id)
        .ok_or_else(|| ApiError::Internal("Transaction missing from its own block".to_string()))?;

    Ok(Json(ProofResponse {
        transaction: hash,
        block: hex::encode(block.hash()),
        hashes: hashes.iter().map(hex::encode).collect(),
    }))
}

async fn account_by_address(
    State(node): State<Arc<Node>>,
    Path(address): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let address_bytes = parse_hash(&address)?;
    let chain = node.chain.read().await;
    chain
        .ledger
        .account(&address_bytes)
        .map(|account| Json(AccountResponse::from_account(account)))
        .ok_or_else(|| ApiError::NotFound(format!("No account {}", address)))
}

/// Resolves a bare hash against accounts, then blocks, then transactions.
/// The matching entity is returned in its own shape.
async fn search(
    State(node): State<Arc<Node>>,
    Path(hash): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_hash(&hash)?;
    let chain = node.chain.read().await;

    if let Some(account) = chain.ledger.account(&id) {
        return Ok(Json(AccountResponse::from_account(account)).into_response());
    }
    if let Some(block) = chain.block_by_hash(&id) {
        return Ok(Json(block.clone()).into_response());
    }
    if let Some(transaction) = chain.transaction_by_hash(&id) {
        return Ok(Json(transaction.clone()).into_response());
    }
    Err(ApiError::NotFound(format!("Nothing known under {}", hash)))
}
