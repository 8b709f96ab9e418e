//! A local stand-in for the wallet backend and its rpc proxy.

use alloy_primitives::{Address, B256, Bytes, U256, address, b256};
use alloy_sol_types::{SolCall, sol};
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    routing::post,
};
use kestrel_common::{CustomNetworkMap, EthSendTransaction, Id, Network, SendTransactionParams};
use kestrel_config::KestrelConfig;
use kestrel_wallets::KeyStore;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::{
    collections::HashMap,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::task::JoinHandle;
use url::Url;

sol! {
    function approve(address spender, uint256 amount) external returns (bool);
}

pub const DEV_ADDRESS: Address = address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
pub const USDC: Address = address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
pub const SPENDER: Address = address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
pub const TX_HASH: B256 =
    b256!("0x2222222222222222222222222222222222222222222222222222222222222222");

pub const NONCE: u64 = 3;
pub const GAS: u64 = 0xb411;

/// Requests seen by the mock backend.
#[derive(Debug, Default)]
pub struct Recorded {
    pub rpc: Mutex<Vec<Value>>,
    pub forecasts: Mutex<Vec<Value>>,
    pub simulations: Mutex<Vec<(String, Value)>>,
    pub relayed: Mutex<Vec<Value>>,
    pub fail_simulation: AtomicBool,
}

impl Recorded {
    pub fn rpc_calls_to(&self, method: &str) -> Vec<Value> {
        self.rpc.lock().iter().filter(|req| req["method"] == method).cloned().collect()
    }

    /// Raw transactions passed to `eth_sendRawTransaction`.
    pub fn raw_transactions(&self) -> Vec<Bytes> {
        self.rpc_calls_to("eth_sendRawTransaction")
            .iter()
            .map(|req| req["params"][0].as_str().unwrap().parse().unwrap())
            .collect()
    }
}

pub struct MockBackend {
    pub url: Url,
    pub recorded: Arc<Recorded>,
    server: JoinHandle<()>,
}

impl MockBackend {
    pub async fn spawn() -> Self {
        let recorded = Arc::new(Recorded::default());
        let app = Router::new()
            .route("/proxy/rpc/ethereum", post(rpc))
            .route("/wallet/fee/forecast", post(forecast))
            .route("/wallet/transaction/simulate/", post(simulate))
            .route("/wallet/transaction/relay", post(relay))
            .with_state(recorded.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap()).parse().unwrap();
        let server = tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        Self { url, recorded, server }
    }

    /// Config pointing at this backend, with fast timings for tests.
    pub fn config(&self) -> KestrelConfig {
        KestrelConfig {
            backend_url: self.url.to_string(),
            max_retry: 0,
            simulation_min_display: 50,
            fee_poll_interval: 60_000,
            ..Default::default()
        }
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn rpc(State(recorded): State<Arc<Recorded>>, Json(req): Json<Value>) -> Json<Value> {
    recorded.rpc.lock().push(req.clone());
    let result = match req["method"].as_str() {
        Some("eth_getTransactionCount") => json!(format!("{NONCE:#x}")),
        Some("eth_estimateGas") => json!(format!("{GAS:#x}")),
        Some("eth_sendRawTransaction") => json!(TX_HASH),
        _ => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": req["id"],
                "error": { "code": -32601, "message": "method not found" }
            }));
        }
    };
    Json(json!({ "jsonrpc": "2.0", "id": req["id"], "result": result }))
}

fn eip1559_fee(base: u64, priority: u64) -> Value {
    json!({
        "maxBaseFee": format!("{base:#x}"),
        "maxPriorityFee": format!("{priority:#x}"),
        "priceInNativeCurrency": "0x0",
        "forecastDuration": { "type": "WithinForecast", "durationMs": 12000 }
    })
}

async fn forecast(State(recorded): State<Arc<Recorded>>, Json(body): Json<Value>) -> Json<Value> {
    recorded.forecasts.lock().push(body);
    Json(json!({
        "type": "FeesForecastResponseEip1559Fee",
        "slow": eip1559_fee(100, 1),
        "normal": eip1559_fee(100, 2),
        "fast": eip1559_fee(100, 5),
        "nonce": NONCE,
        "balance": "0xde0b6b3a7640000",
        "networkState": "medium"
    }))
}

async fn simulate(
    State(recorded): State<Arc<Recorded>>,
    Query(query): Query<HashMap<String, String>>,
    Json(params): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    let network = query.get("network").cloned().unwrap_or_default();
    recorded.simulations.lock().push((network, params));
    if recorded.fail_simulation.load(Ordering::SeqCst) {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(Json(json!({
        "transaction": {
            "type": "approval",
            "spender": SPENDER,
            "currency": "erc20:usdc",
            "amount": null
        },
        "currencies": {
            "erc20:usdc": { "symbol": "USDC", "name": "USD Coin", "decimals": 6 }
        },
        "checks": [
            { "name": "unlimited_allowance", "state": "failed", "severity": "caution" }
        ]
    })))
}

async fn relay(State(recorded): State<Arc<Recorded>>, Json(body): Json<Value>) -> Json<Value> {
    recorded.relayed.lock().push(body);
    Json(json!({ "id": "relay-1" }))
}

pub fn ethereum() -> Network {
    kestrel_common::networks::find_network_by_number(1, &CustomNetworkMap::new()).unwrap()
}

/// The dev account in a key store file encrypted with `pw`.
pub fn key_store() -> KeyStore {
    KeyStore::PrivateKeyStore {
        address: DEV_ADDRESS,
        keystore: Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../testdata/keystore/dev-key.json"),
    }
}

pub fn approve_data(amount: U256) -> Bytes {
    approveCall { spender: SPENDER, amount }.abi_encode().into()
}

/// An unlimited USDC approval, as a dApp would request it.
pub fn approve_request() -> EthSendTransaction {
    EthSendTransaction::new(
        Id::Number(11),
        SendTransactionParams {
            from: DEV_ADDRESS,
            to: Some(USDC),
            data: Some(approve_data(U256::MAX)),
            value: None,
            gas: None,
        },
    )
}
