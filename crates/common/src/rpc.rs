//! JSON-RPC client used to talk to a network's configured endpoint.

use crate::{
    networks::Network,
    rpc_map::NetworkRpcMap,
    transactions::EthSendRawTransaction,
};
use alloy_json_rpc::{RpcRecv, RpcSend};
use alloy_primitives::{Address, B256, U64, U256};
use alloy_rpc_client::ClientBuilder;
use alloy_transport::{layers::RetryBackoffLayer, utils::guess_local_url};
use alloy_transport_http::Http;
use kestrel_config::KestrelConfig;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::{collections::HashMap, fmt, sync::Arc};
use url::Url;

pub mod policy;
pub use policy::RateLimitRetryPolicy;

pub use alloy_json_rpc::{ErrorPayload, Id};
pub use alloy_transport::{TransportError, TransportErrorKind};

/// Block tag used for nonce and balance queries.
pub const LATEST_BLOCK: &str = "latest";

/// Alloy requests with more compute units per second than this are never throttled.
const UNTHROTTLED_COMPUTE_UNITS: u64 = u64::MAX;

/// Errors returned by the [RpcClient].
#[derive(Debug, thiserror::Error)]
pub enum RpcClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid rpc url: {0}")]
    Url(#[from] url::ParseError),
}

impl RpcClientError {
    /// Returns the JSON-RPC error payload, if the node answered with one.
    pub fn as_error_resp(&self) -> Option<&ErrorPayload> {
        match self {
            Self::Transport(err) => err.as_error_resp(),
            Self::Url(_) => None,
        }
    }
}

/// Opens an alloy rpc client for a resolved endpoint.
pub trait RpcConnector: Send + Sync + fmt::Debug {
    fn connect(&self, url: &Url) -> alloy_rpc_client::RpcClient;
}

/// [RpcConnector] over HTTP, retrying rate limited requests with exponential backoff.
#[derive(Clone, Debug)]
pub struct HttpConnector {
    client: reqwest::Client,
    max_retry: u32,
    initial_backoff_ms: u64,
}

impl HttpConnector {
    pub fn new(config: &KestrelConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self { client, max_retry: config.max_retry, initial_backoff_ms: config.initial_backoff })
    }
}

impl RpcConnector for HttpConnector {
    fn connect(&self, url: &Url) -> alloy_rpc_client::RpcClient {
        let retry = RetryBackoffLayer::new_with_policy(
            self.max_retry,
            self.initial_backoff_ms,
            UNTHROTTLED_COMPUTE_UNITS,
            RateLimitRetryPolicy,
        );
        let http = Http::with_client(self.client.clone(), url.clone());
        ClientBuilder::default().layer(retry).transport(http, guess_local_url(url))
    }
}

/// JSON-RPC client that routes every request to the endpoint selected for its network.
///
/// One alloy client is kept per endpoint url.
#[derive(Clone, Debug)]
pub struct RpcClient {
    connector: Arc<dyn RpcConnector>,
    rpc_map: Arc<RwLock<NetworkRpcMap>>,
    backend_url: Url,
    clients: Arc<Mutex<HashMap<Url, alloy_rpc_client::RpcClient>>>,
}

impl RpcClient {
    pub fn new(
        connector: Arc<dyn RpcConnector>,
        rpc_map: Arc<RwLock<NetworkRpcMap>>,
        backend_url: Url,
    ) -> Self {
        Self { connector, rpc_map, backend_url, clients: Default::default() }
    }

    /// Shared endpoint selection. Writes here affect every later request.
    pub fn rpc_map(&self) -> &Arc<RwLock<NetworkRpcMap>> {
        &self.rpc_map
    }

    pub fn url_for(&self, network: &Network) -> Result<Url, RpcClientError> {
        Ok(self.rpc_map.read().resolve_url(network, &self.backend_url)?)
    }

    fn client_for(&self, network: &Network) -> Result<alloy_rpc_client::RpcClient, RpcClientError> {
        let url = self.url_for(network)?;
        let mut clients = self.clients.lock();
        let client = clients.entry(url).or_insert_with_key(|url| self.connector.connect(url));
        Ok(client.clone())
    }

    /// Sends `method` with `params` to `network` and parses the result.
    pub async fn request<P: RpcSend, R: RpcRecv>(
        &self,
        network: &Network,
        method: &'static str,
        params: P,
    ) -> Result<R, RpcClientError> {
        let client = self.client_for(network)?;
        trace!(target: "kestrel::rpc", chain = %network.hex_chain_id(), method, "sending request");
        Ok(client.request(method, params).await?)
    }

    #[instrument(skip_all, fields(chain = %network.hex_chain_id()))]
    pub async fn estimate_gas<T: Serialize + Sync>(
        &self,
        network: &Network,
        tx: &T,
    ) -> Result<U256, RpcClientError> {
        let tx = serde_json::to_value(tx).map_err(TransportError::ser_err)?;
        self.request(network, "eth_estimateGas", (tx,)).await
    }

    #[instrument(skip_all, fields(chain = %network.hex_chain_id(), %address))]
    pub async fn get_transaction_count(
        &self,
        network: &Network,
        address: Address,
    ) -> Result<u64, RpcClientError> {
        let nonce: U64 =
            self.request(network, "eth_getTransactionCount", (address, LATEST_BLOCK)).await?;
        Ok(nonce.to())
    }

    pub async fn gas_price(&self, network: &Network) -> Result<U256, RpcClientError> {
        self.request(network, "eth_gasPrice", ()).await
    }

    pub async fn get_balance(
        &self,
        network: &Network,
        address: Address,
    ) -> Result<U256, RpcClientError> {
        self.request(network, "eth_getBalance", (address, LATEST_BLOCK)).await
    }

    /// Broadcasts a signed transaction and returns its hash.
    #[instrument(skip_all, fields(chain = %network.hex_chain_id(), id = %raw.id))]
    pub async fn send_raw_transaction(
        &self,
        network: &Network,
        raw: &EthSendRawTransaction,
    ) -> Result<B256, RpcClientError> {
        let hash = self.request(network, "eth_sendRawTransaction", (raw.raw().clone(),)).await?;
        debug!(%hash, "broadcast transaction");
        Ok(hash)
    }
}
