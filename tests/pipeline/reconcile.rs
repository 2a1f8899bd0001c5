use std::time::Duration;

use crate::support::{
    helpers::{init_tracing, Stack},
    mock_chain::MockChain,
    mock_gateway::MockGateway,
};
use anyhow::{Context, Result};
use serde_json::json;
use uri_sync::{ContractEntity, ManagedEntity, TokenEntity};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn contract_and_token_documents_are_reconciled() -> Result<()> {
    init_tracing();
    let chain = MockChain::new();
    chain.set_contract_uri("0xc1", "ipfs://ipfs/abc");
    chain.set_token_uri("0xc1", 1, "ipfs://QmToken/1.json");
    let gateway = MockGateway::new();
    gateway.set_document("/ipfs/abc", json!({ "name": "X", "image": "ipfs://ipfs/xyz" }));
    gateway.set_document(
        "/ipfs/QmToken/1.json",
        json!({
            "name": "Token 1",
            "type": "avatar",
            "composite": true,
            "layers": ["base", 2],
            "attributes": [
                { "trait_type": "eyes", "value": "blue" },
                { "trait_type": "level", "value": 3, "display_type": "number" }
            ]
        }),
    );
    let stack = Stack::start(chain, gateway, |builder| builder).await?;

    let contracts = stack.reconciler.contracts();
    let tokens = stack.reconciler.tokens();
    contracts
        .insert_for_refresh(ContractEntity::new("0xc1").with_uri("ipfs://ipfs/abc"))
        .await;
    tokens.insert_for_refresh(TokenEntity::new("0xc1", 1u64)).await;

    let report = stack.reconciler.reconcile_cycle_at(1_700_000_000).await?;

    let contract = contracts.get("0xc1").await.context("contract missing")?;
    assert_eq!(contract.metadata_name.as_deref(), Some("X"));
    assert_eq!(contract.image.as_deref(), Some("ipfs://ipfs/xyz"));
    assert_eq!(contract.contract_uri_updated, None);
    assert!(!contracts.in_pointer_queue("0xc1").await);
    assert!(!contracts.in_document_queue("0xc1").await);

    let token = tokens.get("0xc1-1").await.context("token missing")?;
    assert_eq!(token.token_uri.as_deref(), Some("ipfs://QmToken/1.json"));
    assert_eq!(token.updated_at, Some(1_700_000_000));
    let metadata = token.metadata.context("token document missing")?;
    assert_eq!(metadata.name.as_deref(), Some("Token 1"));
    assert_eq!(metadata.kind.as_deref(), Some("avatar"));
    assert!(metadata.composite);
    assert_eq!(
        metadata.layers,
        Some(vec!["base".to_string(), "2".to_string()])
    );
    assert_eq!(metadata.attributes.len(), 2);
    assert_eq!(metadata.attributes[1].value, "3");
    assert_eq!(metadata.attributes[1].display_type.as_deref(), Some("number"));

    assert_eq!(report.contracts.documents_merged, 1);
    assert_eq!(report.tokens.pointers_updated, 1);
    assert_eq!(report.tokens.documents_merged, 1);
    assert_eq!(stack.contract_store.count_for("0xc1"), 1);
    assert_eq!(stack.token_store.count_for("0xc1-1"), 1);
    assert_eq!(stack.chain.calls(), 2);

    stack.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn banned_address_stops_receiving_requests() -> Result<()> {
    init_tracing();
    let chain = MockChain::new();
    chain.set_contract_uri("0xc1", "ipfs://ipfs/broken");
    let gateway = MockGateway::new();
    gateway.set_raw("/ipfs/broken", 500, "upstream failure");
    let stack = Stack::start(chain, gateway, |builder| builder).await?;

    stack
        .reconciler
        .contracts()
        .insert_for_refresh(ContractEntity::new("0xc1"))
        .await;

    for cycle in 0..8 {
        stack.reconciler.reconcile_cycle_at(cycle).await?;
    }

    // Five failures are tolerated, the sixth bans the address.
    assert_eq!(stack.gateway.hits("/ipfs/broken"), 6);
    let telemetry = stack.telemetry.snapshot();
    assert_eq!(telemetry.gateway_errors, 6);
    assert_eq!(telemetry.banned_skips, 2);
    assert_eq!(telemetry.cycles, 8);

    let contract = stack
        .reconciler
        .contracts()
        .get("0xc1")
        .await
        .context("contract missing")?;
    assert_eq!(contract.pointer(), Some("ipfs://ipfs/broken"));
    assert!(!contract.has_document());
    // The pointer write happened once, in the first cycle.
    assert_eq!(stack.contract_store.count_for("0xc1"), 1);

    stack.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reverting_token_pointer_never_triggers_a_fetch() -> Result<()> {
    init_tracing();
    let chain = MockChain::new();
    let gateway = MockGateway::new();
    let stack = Stack::start(chain, gateway, |builder| builder).await?;

    let tokens = stack.reconciler.tokens();
    tokens.insert_for_refresh(TokenEntity::new("0xc1", 42u64)).await;

    for cycle in 0..3 {
        let report = stack.reconciler.reconcile_cycle_at(cycle).await?;
        assert_eq!(report.tokens.pointer_failures, 1);
    }

    let token = tokens.get("0xc1-42").await.context("token missing")?;
    assert_eq!(token.token_uri, None);
    assert_eq!(token.metadata, None);
    assert_eq!(stack.gateway.total_hits(), 0);
    assert_eq!(stack.chain.calls(), 3);
    assert!(stack.token_store.persisted().is_empty());

    stack.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dirty_flag_forces_pointer_and_document_refresh() -> Result<()> {
    init_tracing();
    let chain = MockChain::new();
    chain.set_contract_uri("0xc1", "ipfs://ipfs/v1");
    let gateway = MockGateway::new();
    gateway.set_document("/ipfs/v1", json!({ "name": "first" }));
    gateway.set_document("/ipfs/v2", json!({ "name": "second" }));
    let stack = Stack::start(chain, gateway, |builder| builder).await?;

    let contracts = stack.reconciler.contracts();
    contracts
        .insert_for_refresh(ContractEntity::new("0xc1"))
        .await;
    stack.reconciler.reconcile_cycle_at(10).await?;

    stack.chain.set_contract_uri("0xc1", "ipfs://ipfs/v2");
    let quiet = stack.reconciler.reconcile_cycle_at(20).await?;
    assert_eq!(quiet.contracts.pointers_read, 0);
    let contract = contracts.get("0xc1").await.context("contract missing")?;
    assert_eq!(contract.metadata_name.as_deref(), Some("first"));

    stack.dirty.mark("0xc1");
    let forced = stack.reconciler.reconcile_cycle_at(30).await?;
    stack.dirty.clear();

    assert_eq!(forced.contracts.dirty, 1);
    assert_eq!(forced.contracts.pointers_updated, 1);
    let contract = contracts.get("0xc1").await.context("contract missing")?;
    assert_eq!(contract.contract_uri.as_deref(), Some("ipfs://ipfs/v2"));
    assert_eq!(contract.contract_uri_updated, Some(30));
    assert_eq!(contract.metadata_name.as_deref(), Some("second"));
    assert_eq!(stack.contract_store.count_for("0xc1"), 2);

    stack.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn malformed_document_counts_as_failure() -> Result<()> {
    init_tracing();
    let chain = MockChain::new();
    chain.set_token_uri("0xc1", 6, "ipfs://QmBad");
    let gateway = MockGateway::new();
    gateway.set_raw("/ipfs/QmBad", 200, "[1, 2, 3]");
    let stack = Stack::start(chain, gateway, |builder| builder.ban_threshold(1)).await?;

    let tokens = stack.reconciler.tokens();
    tokens.insert_for_refresh(TokenEntity::new("0xc1", 6u64)).await;

    for cycle in 0..4 {
        stack.reconciler.reconcile_cycle_at(cycle).await?;
    }

    assert_eq!(stack.gateway.hits("/ipfs/QmBad"), 2);
    let token = tokens.get("0xc1-6").await.context("token missing")?;
    assert_eq!(token.metadata, None);
    assert!(tokens.in_document_queue("0xc1-6").await);

    stack.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cycle_deadline_abandons_slow_work() -> Result<()> {
    init_tracing();
    let chain = MockChain::new();
    chain.set_contract_uri("0xc1", "ipfs://ipfs/slow");
    let gateway = MockGateway::new();
    gateway.set_document("/ipfs/slow", json!({ "name": "eventually" }));
    gateway.set_delay("/ipfs/slow", Duration::from_secs(3));
    let stack = Stack::start(chain, gateway, |builder| {
        builder.cycle_deadline(Duration::from_millis(500))
    })
    .await?;

    let contracts = stack.reconciler.contracts();
    contracts
        .insert_for_refresh(ContractEntity::new("0xc1"))
        .await;

    let err = stack
        .reconciler
        .reconcile_cycle_at(1)
        .await
        .expect_err("slow gateway should exceed the deadline");
    assert!(format!("{err}").contains("deadline"));

    assert_eq!(stack.telemetry.snapshot().cycle_timeouts, 1);
    assert!(contracts.in_pointer_queue("0xc1").await);
    assert!(contracts.in_document_queue("0xc1").await);
    let contract = contracts.get("0xc1").await.context("contract missing")?;
    assert_eq!(contract.metadata_name, None);
    assert_eq!(stack.config.cycle_deadline(), Some(Duration::from_millis(500)));

    stack.shutdown().await;
    Ok(())
}
