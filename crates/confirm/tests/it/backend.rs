use crate::utils::*;
use alloy_primitives::bytes;
use kestrel_common::{EthSendRawTransaction, Id};
use kestrel_confirm::{
    BackendClient, BackendError, FeeForecastBackend, RelayBackend, SimulationBackend,
};
use serde_json::json;

#[tokio::test(flavor = "multi_thread")]
async fn posts_to_backend_routes() {
    crate::init_tracing();
    let backend = MockBackend::spawn().await;
    let client = BackendClient::from_config(&backend.config()).unwrap();

    let forecast = client.forecast(&json!({ "network": "Ethereum" })).await.unwrap();
    assert_eq!(forecast["type"], "FeesForecastResponseEip1559Fee");
    let body = backend.recorded.forecasts.lock()[0].clone();
    similar_asserts::assert_eq!(body, json!({ "network": "Ethereum" }));

    let simulation = client.simulate(&ethereum(), &json!({ "from": DEV_ADDRESS })).await.unwrap();
    assert_eq!(simulation["transaction"]["type"], "approval");
    assert_eq!(backend.recorded.simulations.lock()[0].0, "Ethereum");

    let raw = EthSendRawTransaction::new(Id::String("dapp-1".to_string()), bytes!("0x02f8"));
    let id = client.relay(&ethereum(), &raw).await.unwrap();
    assert_eq!(id, "relay-1");
    similar_asserts::assert_eq!(
        backend.recorded.relayed.lock()[0],
        json!({
            "network": "Ethereum",
            "transaction": {
                "id": "dapp-1",
                "jsonrpc": "2.0",
                "method": "eth_sendRawTransaction",
                "params": ["0x02f8"]
            }
        })
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_route_is_a_status_error() {
    let backend = MockBackend::spawn().await;
    let base = backend.url.join("missing/").unwrap();
    let client = BackendClient::new(reqwest::Client::new(), base);

    let err = client.forecast(&json!({})).await.unwrap_err();
    let BackendError::HttpStatus { url, status } = &err else { panic!("unexpected error {err}") };
    assert_eq!(status.as_u16(), 404);
    assert_eq!(url.path(), "/missing/wallet/fee/forecast");
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_simulation_is_a_status_error() {
    let backend = MockBackend::spawn().await;
    backend.recorded.fail_simulation.store(true, std::sync::atomic::Ordering::SeqCst);
    let client = BackendClient::from_config(&backend.config()).unwrap();

    let err = client.simulate(&ethereum(), &json!({})).await.unwrap_err();
    assert!(matches!(err, BackendError::HttpStatus { status, .. } if status.as_u16() == 500));
    assert_eq!(backend.recorded.simulations.lock().len(), 1);
}
