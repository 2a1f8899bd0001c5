use std::time::Duration;

use crate::support::{
    helpers::{init_tracing, Stack},
    mock_chain::MockChain,
    mock_gateway::MockGateway,
};
use anyhow::{Context, Result};
use serde_json::json;
use tokio::time::timeout;
use uri_sync::{ContractEntity, CycleTrigger, Runner};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runner_runs_one_cycle_per_trigger_until_channel_closes() -> Result<()> {
    init_tracing();
    let chain = MockChain::new();
    chain.set_contract_uri("0xc1", "ipfs://ipfs/meta");
    let gateway = MockGateway::new();
    gateway.set_document("/ipfs/meta", json!({ "name": "Collection" }));
    let stack = Stack::start(chain, gateway, |builder| {
        builder.metrics_interval(Duration::from_millis(20))
    })
    .await?;

    stack
        .reconciler
        .contracts()
        .insert_for_refresh(ContractEntity::new("0xc1"))
        .await;

    let (runner, triggers) = Runner::new(stack.reconciler.clone(), stack.config.metrics_interval());
    triggers.send(CycleTrigger { timestamp: 100 }).await?;
    triggers.send(CycleTrigger { timestamp: 200 }).await?;
    drop(triggers);

    let completed = timeout(Duration::from_secs(10), runner.run())
        .await
        .context("runner should stop once the channel closes")??;

    assert_eq!(completed, 2);
    assert_eq!(stack.telemetry.snapshot().cycles, 2);
    let contract = stack
        .reconciler
        .contracts()
        .get("0xc1")
        .await
        .context("contract missing")?;
    assert_eq!(contract.metadata_name.as_deref(), Some("Collection"));
    assert_eq!(contract.contract_uri_updated, Some(100));

    stack.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runner_stops_when_cancelled() -> Result<()> {
    init_tracing();
    let stack = Stack::start(MockChain::new(), MockGateway::new(), |builder| builder).await?;

    let (runner, triggers) = Runner::new(stack.reconciler.clone(), stack.config.metrics_interval());
    let shutdown = runner.cancellation_token();
    let handle = tokio::spawn(runner.run());

    triggers.send(CycleTrigger { timestamp: 1 }).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();

    let completed = timeout(Duration::from_secs(5), handle)
        .await
        .context("runner should observe cancellation")???;
    assert_eq!(completed, 1);
    assert!(triggers.is_closed());

    stack.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ctrl_c_runner_honours_the_shutdown_token() -> Result<()> {
    init_tracing();
    let stack = Stack::start(MockChain::new(), MockGateway::new(), |builder| builder).await?;

    let (runner, triggers) = Runner::new(stack.reconciler.clone(), stack.config.metrics_interval());
    let shutdown = runner.cancellation_token();
    let handle = tokio::spawn(runner.run_until_ctrl_c());

    triggers.send(CycleTrigger { timestamp: 7 }).await?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.cancel();

    let completed = timeout(Duration::from_secs(5), handle)
        .await
        .context("runner should stop without a signal")???;
    assert_eq!(completed, 1);
    assert_eq!(stack.telemetry.snapshot().cycles, 1);

    stack.shutdown().await;
    Ok(())
}
