use crate::utils::*;
use alloy_consensus::TxEnvelope;
use alloy_eips::eip2718::Decodable2718;
use alloy_primitives::{TxKind, U256};
use kestrel_common::test_utils::RecordingReporter;
use kestrel_confirm::{
    ConfirmationFlow, FlowConfig, FlowOutcome, GasEstimate, Pipeline, PresetSelection,
    SimulationResult, SubmitMode, simulation::SimulatedTransaction,
};
use kestrel_wallets::{SessionSecret, SigningEngine};
use serde_json::json;
use std::sync::{Arc, atomic::Ordering};

fn confirmation(backend: &MockBackend) -> (ConfirmationFlow, Arc<RecordingReporter>) {
    let config = backend.config();
    let reporter = Arc::new(RecordingReporter::default());
    let pipeline =
        Pipeline::from_config(&config, Arc::new(SigningEngine::new()), reporter.clone()).unwrap();
    let flow = ConfirmationFlow::new(
        pipeline,
        ethereum(),
        key_store(),
        approve_request(),
        FlowConfig::from(&config),
    )
    .unwrap();
    (flow, reporter)
}

async fn wait_for_fees(flow: &ConfirmationFlow) {
    let mut fees = flow.subscribe_fees();
    fees.wait_for(|state| state.response().is_some()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn loads_and_broadcasts_approval() {
    crate::init_tracing();
    let backend = MockBackend::spawn().await;
    let (flow, reporter) = confirmation(&backend);

    let prepared = flow.load().await.unwrap();
    assert_eq!(prepared.nonce, NONCE);
    assert_eq!(prepared.gas, GasEstimate { gas: GAS, is_fallback: false });
    let simulation = prepared.simulation.simulation().unwrap();
    assert!(matches!(simulation.transaction, SimulatedTransaction::Approval { amount: None, .. }));

    wait_for_fees(&flow).await;
    let forecast = backend.recorded.forecasts.lock()[0].clone();
    assert_eq!(forecast["network"], "Ethereum");
    assert_eq!(forecast["gasLimit"], json!(format!("{GAS:#x}")));
    assert_eq!(forecast["selectedPreset"], json!({ "type": "normal" }));

    let outcome = flow
        .submit(&PresetSelection::Normal, SessionSecret::new("pw"), SubmitMode::Broadcast)
        .await
        .unwrap();
    assert_eq!(outcome, FlowOutcome::Submitted { hash: TX_HASH });

    let sent = backend.recorded.rpc_calls_to("eth_sendRawTransaction");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["params"].as_array().map(Vec::len), Some(1));

    let raw = &backend.recorded.raw_transactions()[0];
    let envelope = TxEnvelope::decode_2718(&mut raw.as_ref()).unwrap();
    let TxEnvelope::Eip1559(signed) = &envelope else { panic!("expected eip1559 envelope") };
    let tx = signed.tx();
    assert_eq!(tx.chain_id, 1);
    assert_eq!(tx.nonce, NONCE);
    assert_eq!(tx.gas_limit, GAS);
    assert_eq!(tx.max_fee_per_gas, 102);
    assert_eq!(tx.max_priority_fee_per_gas, 2);
    assert_eq!(tx.to, TxKind::Call(USDC));
    assert_eq!(tx.input, approve_data(U256::MAX));
    assert_eq!(signed.recover_signer().unwrap(), DEV_ADDRESS);
    assert!(reporter.reports().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn edited_approval_is_relayed() {
    let backend = MockBackend::spawn().await;
    let (flow, _) = confirmation(&backend);
    flow.load().await.unwrap();

    let prepared = flow.edit_approval_amount(U256::from(1_000_000)).await.unwrap();
    assert_eq!(prepared.request.tx().data, Some(approve_data(U256::from(1_000_000))));
    assert_eq!(backend.recorded.simulations.lock().len(), 2);

    wait_for_fees(&flow).await;
    let outcome = flow
        .submit(&PresetSelection::Fast, SessionSecret::new("pw"), SubmitMode::Relay)
        .await
        .unwrap();
    assert_eq!(outcome, FlowOutcome::Relayed { id: "relay-1".to_string() });
    assert!(backend.recorded.rpc_calls_to("eth_sendRawTransaction").is_empty());

    let relayed = backend.recorded.relayed.lock()[0].clone();
    assert_eq!(relayed["network"], "Ethereum");
    assert_eq!(relayed["transaction"]["id"], 11);
    assert_eq!(relayed["transaction"]["method"], "eth_sendRawTransaction");
}

#[tokio::test(flavor = "multi_thread")]
async fn simulation_outage_still_loads() {
    let backend = MockBackend::spawn().await;
    backend.recorded.fail_simulation.store(true, Ordering::SeqCst);
    let (flow, reporter) = confirmation(&backend);

    let prepared = flow.load().await.unwrap();
    assert_eq!(prepared.simulation, SimulationResult::Failed);
    assert_eq!(prepared.nonce, NONCE);

    let reports = reporter.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].contains("500"), "{reports:?}");
}
