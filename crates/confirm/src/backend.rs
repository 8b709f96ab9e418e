//! HTTP client for the wallet backend: fee forecasts, simulations and relayed sends.

use async_trait::async_trait;
use kestrel_common::{EthSendRawTransaction, Network};
use kestrel_config::{ConfigValueError, KestrelConfig};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("failed to reach {url}: {source}")]
    Http { url: Url, source: reqwest::Error },
    #[error("{url} responded with {status}")]
    HttpStatus { url: Url, status: StatusCode },
    #[error("cannot parse {tag}: {source}")]
    Deser { tag: &'static str, source: serde_json::Error },
    #[error("invalid backend url: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, thiserror::Error)]
pub enum BackendSetupError {
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
    #[error(transparent)]
    Config(#[from] ConfigValueError),
}

/// Computes fee presets for networks the backend knows about.
#[async_trait]
pub trait FeeForecastBackend: Send + Sync + fmt::Debug {
    /// Posts the forecast request body and returns the undecoded response.
    async fn forecast(&self, body: &Value) -> Result<Value, BackendError>;
}

/// Dry-runs transactions.
#[async_trait]
pub trait SimulationBackend: Send + Sync + fmt::Debug {
    /// Posts the `eth_sendTransaction` params and returns the undecoded response.
    async fn simulate(&self, network: &Network, params: &Value) -> Result<Value, BackendError>;
}

/// Submits signed transactions on behalf of the user for gas-abstracted sends.
#[async_trait]
pub trait RelayBackend: Send + Sync + fmt::Debug {
    /// Returns the relay id of the submission.
    async fn relay(
        &self,
        network: &Network,
        raw: &EthSendRawTransaction,
    ) -> Result<String, BackendError>;
}

#[derive(Serialize)]
struct RelayRequest<'a> {
    network: &'a str,
    transaction: &'a EthSendRawTransaction,
}

#[derive(Deserialize)]
struct RelayResponse {
    id: String,
}

/// [FeeForecastBackend], [SimulationBackend] and [RelayBackend] over HTTP.
#[derive(Clone, Debug)]
pub struct BackendClient {
    client: reqwest::Client,
    base: Url,
}

impl BackendClient {
    pub fn new(client: reqwest::Client, base: Url) -> Self {
        Self { client, base }
    }

    pub fn from_config(config: &KestrelConfig) -> Result<Self, BackendSetupError> {
        let client = reqwest::Client::builder().timeout(config.request_timeout()).build()?;
        Ok(Self::new(client, config.backend_url()?))
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(format!("{}/{path}", self.base.as_str().trim_end_matches('/')).parse()?)
    }

    async fn post(
        &self,
        url: Url,
        body: &(impl Serialize + Sync),
        tag: &'static str,
    ) -> Result<Value, BackendError> {
        let http_err = |source| BackendError::Http { url: url.clone(), source };
        trace!(target: "kestrel::backend", %url, "posting");
        let resp = self.client.post(url.clone()).json(body).send().await.map_err(http_err)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(BackendError::HttpStatus { url: url.clone(), status });
        }
        let body = resp.bytes().await.map_err(http_err)?;
        serde_json::from_slice(&body).map_err(|source| BackendError::Deser { tag, source })
    }
}

#[async_trait]
impl FeeForecastBackend for BackendClient {
    #[instrument(skip_all)]
    async fn forecast(&self, body: &Value) -> Result<Value, BackendError> {
        let url = self.endpoint("wallet/fee/forecast")?;
        self.post(url, body, "fee forecast response").await
    }
}

#[async_trait]
impl SimulationBackend for BackendClient {
    #[instrument(skip_all, fields(network = network.name()))]
    async fn simulate(&self, network: &Network, params: &Value) -> Result<Value, BackendError> {
        let mut url = self.endpoint("wallet/transaction/simulate/")?;
        url.query_pairs_mut().append_pair("network", network.name());
        self.post(url, params, "simulation response").await
    }
}

#[async_trait]
impl RelayBackend for BackendClient {
    #[instrument(skip_all, fields(network = network.name(), id = %raw.id))]
    async fn relay(
        &self,
        network: &Network,
        raw: &EthSendRawTransaction,
    ) -> Result<String, BackendError> {
        let url = self.endpoint("wallet/transaction/relay")?;
        let body = RelayRequest { network: network.name(), transaction: raw };
        let value = self.post(url, &body, "relay response").await?;
        let resp: RelayResponse = serde_json::from_value(value)
            .map_err(|source| BackendError::Deser { tag: "relay response", source })?;
        Ok(resp.id)
    }
}
