//! Integration tests for the REST endpoints
//!
//! Each test drives the real router through an in-process server backed by
//! a low-difficulty chain, checking status codes and JSON shapes.

use axum_test::TestServer;
use num_bigint::BigInt;
use serde_json::Value;
use std::sync::Arc;

use emberchain::api;
use emberchain::blockchain::{fulfills_difficulty, Block, Blockchain, Sha3Hash, NETWORK_ID};
use emberchain::config::Config;
use emberchain::crypto::{address_from_string, address_to_hex, KeyPair};
use emberchain::node::Node;
use emberchain::transaction::Transaction;

fn test_config(dir: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    config.node.key_file = dir.path().join("node.key").to_string_lossy().into_owned();
    config.database.path = dir.path().join("chain.db").to_string_lossy().into_owned();
    config
}

fn funded_node(dir: &tempfile::TempDir, keypair: &KeyPair) -> Node {
    let blockchain = Blockchain::with_difficulty(
        NETWORK_ID,
        &[(keypair.address(), 10_000)],
        BigInt::from(0),
    );
    Node::with_blockchain(test_config(dir), blockchain).unwrap()
}

fn transfer(keypair: &KeyPair, receiver: &str, amount: u64, nonce: u64) -> Transaction {
    let mut tx = Transaction::new(
        keypair.address(),
        address_from_string(receiver),
        amount,
        nonce,
        1,
        100,
        vec![],
    );
    tx.sign(keypair).unwrap();
    tx
}

fn mined_on(parent: Sha3Hash, transactions: Vec<Transaction>, miner: &str) -> Block {
    let target = BigInt::from(0);
    let mut block = Block::candidate(parent, transactions);
    block.coinbase = Some(address_from_string(miner));
    while !fulfills_difficulty(&block.hash(), &target) {
        block.header.nonce += 1;
    }
    block
}

#[tokio::test]
async fn test_read_endpoints_cover_chain_history() {
    let dir = tempfile::tempdir().unwrap();
    let keypair = KeyPair::generate().unwrap();
    let node = funded_node(&dir, &keypair);

    let tx = transfer(&keypair, "bob", 250, 1);
    let tx_id = tx.id_str();
    let fee = tx.fee();
    let tx2 = transfer(&keypair, "dave", 100, 2);
    let tx2_id = tx2.id_str();

    let (genesis_hash, first_hash, tip_hash) = {
        let mut chain = node.chain.write().await;
        let genesis_hash = chain.genesis().unwrap().hash();
        let first = mined_on(genesis_hash, vec![tx], "miner");
        let first_hash = first.hash();
        chain.add_block(first).unwrap();
        let second = mined_on(first_hash, vec![tx2], "miner");
        let tip_hash = second.hash();
        chain.add_block(second).unwrap();
        (genesis_hash, first_hash, tip_hash)
    };

    let server = TestServer::new(api::router(Arc::new(node))).unwrap();

    // health reports the chain height
    let response = server.get("/api/health").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["height"], 3);
    assert_eq!(json["network_id"], u64::from(NETWORK_ID));
    assert_eq!(json["mining"], false);

    // blocks walk back from the tip
    let blocks: Vec<Block> = server.get("/api/blocks").await.json();
    assert_eq!(blocks.len(), 3);
    assert_eq!(blocks[0].hash(), tip_hash);
    assert!(blocks[2].is_genesis());

    let response = server.get("/api/blocks?count=1&offset=1").await;
    assert_eq!(response.status_code(), 200);
    let page: Vec<Block> = response.json();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].hash(), first_hash);

    // block by hash and its canonical child
    let response = server.get(&format!("/api/blocks/{}", hex::encode(first_hash))).await;
    assert_eq!(response.status_code(), 200);
    let block: Block = response.json();
    assert_eq!(block.hash(), first_hash);
    assert_eq!(block.transactions().len(), 1);

    let child: Block = server
        .get(&format!("/api/blocks/{}/child", hex::encode(genesis_hash)))
        .await
        .json();
    assert_eq!(child.hash(), first_hash);

    let response = server
        .get(&format!("/api/blocks/{}/child", hex::encode(tip_hash)))
        .await;
    assert_eq!(response.status_code(), 404);

    // confirmed transaction carries its containing block
    let response = server.get(&format!("/api/transactions/{}", tx_id)).await;
    assert_eq!(response.status_code(), 200);
    let confirmed: Transaction = response.json();
    assert_eq!(confirmed.id_str(), tx_id);
    assert_eq!(confirmed.block_id, Some(first_hash));

    // single-transaction block: the proof is just the root
    let response = server.get(&format!("/api/transactions/{}/proof", tx_id)).await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["block"], hex::encode(first_hash));
    assert_eq!(json["hashes"], serde_json::json!([tx_id]));

    // account state of the premined sender
    let sender_hex = address_to_hex(&keypair.address());
    let response = server.get(&format!("/api/accounts/{}", sender_hex)).await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["balance"], 10_000 - 250 - 100 - 2 * fee);
    assert_eq!(json["locked_balance"], 0);
    assert_eq!(json["outgoing"], serde_json::json!([tx_id, tx2_id]));

    let response = server
        .get(&format!("/api/accounts/{}", hex::encode([9u8; 32])))
        .await;
    assert_eq!(response.status_code(), 404);

    // the dispatcher resolves each kind of hash
    let json: Value = server.get(&format!("/api/search/{}", sender_hex)).await.json();
    assert!(json["balance"].is_number());

    let json: Value = server
        .get(&format!("/api/search/{}", hex::encode(first_hash)))
        .await
        .json();
    assert!(json["header"].is_object());

    let json: Value = server.get(&format!("/api/search/{}", tx_id)).await.json();
    assert_eq!(json["amount"], 250);

    let response = server
        .get(&format!("/api/search/{}", hex::encode([7u8; 32])))
        .await;
    assert_eq!(response.status_code(), 404);
    let json: Value = response.json();
    assert!(json["error"].is_string());

    // malformed hashes are rejected before any lookup
    let response = server.get("/api/blocks/abc").await;
    assert_eq!(response.status_code(), 422);
    let response = server.get(&format!("/api/blocks/{}", "zz".repeat(32))).await;
    assert_eq!(response.status_code(), 422);
}

#[tokio::test]
async fn test_submission_validates_and_pools() {
    let dir = tempfile::tempdir().unwrap();
    let keypair = KeyPair::generate().unwrap();
    let node = funded_node(&dir, &keypair);
    let server = TestServer::new(api::router(Arc::new(node))).unwrap();

    let tx = transfer(&keypair, "bob", 100, 1);
    let response = server.post("/api/transactions").json(&tx).await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["id"], tx.id_str());

    // pending transactions resolve before they are mined
    let response = server
        .get(&format!("/api/transactions/{}", tx.id_str()))
        .await;
    assert_eq!(response.status_code(), 200);
    let pending: Transaction = response.json();
    assert_eq!(pending.block_id, None);

    // the per-sender rule holds across the API
    let second = transfer(&keypair, "carol", 50, 2);
    let response = server.post("/api/transactions").json(&second).await;
    assert_eq!(response.status_code(), 422);
    let json: Value = response.json();
    assert!(json["error"].is_string());

    // an unfunded sender cannot overdraft
    let broke = KeyPair::generate().unwrap();
    let overdraft = transfer(&broke, "bob", 1_000, 1);
    let response = server.post("/api/transactions").json(&overdraft).await;
    assert_eq!(response.status_code(), 422);

    // a broken signature is rejected
    let mut forged = transfer(&keypair, "bob", 10, 3);
    forged.amount = 99;
    let response = server.post("/api/transactions").json(&forged).await;
    assert_eq!(response.status_code(), 422);
}
