//! Fee presets.
//!
//! Networks known to the backend get their slow, normal and fast presets from the forecast
//! endpoint. User-added networks have no forecasting service, so the presets are synthesized from
//! the node's current gas price and are identical across tiers.

use crate::backend::{BackendError, FeeForecastBackend};
use alloy_primitives::{Address, U256};
use kestrel_common::{
    Eip1559Fee, Fee, FeeModel, ForecastDuration, ImpossibleState, LegacyFee, Network, RpcClient,
    RpcClientError, SendTransactionParams, SharedReporter,
};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::sync::watch;

/// A named fee tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Slow,
    Normal,
    Fast,
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Slow => "slow",
            Self::Normal => "normal",
            Self::Fast => "fast",
        })
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "slow" => Ok(Self::Slow),
            "normal" => Ok(Self::Normal),
            "fast" => Ok(Self::Fast),
            _ => Err(format!("unknown fee preset `{s}`, expected one of slow, normal, fast")),
        }
    }
}

/// The preset the user picked, or their own fee.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresetSelection {
    Slow,
    #[default]
    Normal,
    Fast,
    Custom { fee: Fee },
}

impl From<Preset> for PresetSelection {
    fn from(preset: Preset) -> Self {
        match preset {
            Preset::Slow => Self::Slow,
            Preset::Normal => Self::Normal,
            Preset::Fast => Self::Fast,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkCongestion {
    Low,
    Medium,
    High,
}

/// Presets of one pricing scheme.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeesForecast<F> {
    pub slow: F,
    pub normal: F,
    pub fast: F,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom: Option<F>,
    pub nonce: u64,
    pub balance: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_state: Option<NetworkCongestion>,
}

impl<F> FeesForecast<F> {
    pub fn preset(&self, preset: Preset) -> &F {
        match preset {
            Preset::Slow => &self.slow,
            Preset::Normal => &self.normal,
            Preset::Fast => &self.fast,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeeForecastResponse {
    #[serde(rename = "FeesForecastResponseLegacyFee")]
    Legacy(FeesForecast<LegacyFee>),
    #[serde(rename = "FeesForecastResponseEip1559Fee")]
    Eip1559(FeesForecast<Eip1559Fee>),
}

impl FeeForecastResponse {
    pub fn fee_model(&self) -> FeeModel {
        match self {
            Self::Legacy(_) => FeeModel::Legacy,
            Self::Eip1559(_) => FeeModel::Eip1559,
        }
    }

    pub fn preset(&self, preset: Preset) -> Fee {
        match self {
            Self::Legacy(forecast) => forecast.preset(preset).clone().into(),
            Self::Eip1559(forecast) => forecast.preset(preset).clone().into(),
        }
    }

    pub fn custom(&self) -> Option<Fee> {
        match self {
            Self::Legacy(forecast) => forecast.custom.clone().map(Into::into),
            Self::Eip1559(forecast) => forecast.custom.clone().map(Into::into),
        }
    }

    pub fn nonce(&self) -> u64 {
        match self {
            Self::Legacy(forecast) => forecast.nonce,
            Self::Eip1559(forecast) => forecast.nonce,
        }
    }

    pub fn balance(&self) -> U256 {
        match self {
            Self::Legacy(forecast) => forecast.balance,
            Self::Eip1559(forecast) => forecast.balance,
        }
    }

    /// Resolves `selection` to the fee to sign with.
    ///
    /// A custom fee uses the forecast's recomputed custom preset when that preset was computed for
    /// the same prices, and is used as given otherwise. A custom fee of the other pricing scheme is
    /// an [ImpossibleState].
    pub fn fee_for(&self, selection: &PresetSelection) -> Result<Fee, ImpossibleState> {
        match selection {
            PresetSelection::Slow => Ok(self.preset(Preset::Slow)),
            PresetSelection::Normal => Ok(self.preset(Preset::Normal)),
            PresetSelection::Fast => Ok(self.preset(Preset::Fast)),
            PresetSelection::Custom { fee } if fee.fee_model() != self.fee_model() => {
                Err(ImpossibleState::new(format!(
                    "{:?} custom fee for a {:?} forecast",
                    fee.fee_model(),
                    self.fee_model()
                )))
            }
            PresetSelection::Custom { fee } => Ok(self
                .custom()
                .filter(|forecast| forecast.same_pricing(fee))
                .unwrap_or_else(|| fee.clone())),
        }
    }
}

/// Input of a forecast.
#[derive(Clone, Debug)]
pub struct FeeForecastRequest {
    pub network: Network,
    pub address: Address,
    pub params: SendTransactionParams,
    pub gas_limit: u64,
    pub gas_estimate: u64,
    pub selected: PresetSelection,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ForecastBody<'a> {
    send_transaction_params: &'a SendTransactionParams,
    network: &'a str,
    address: Address,
    gas_limit: U256,
    gas_estimate: U256,
    selected_preset: &'a PresetSelection,
}

#[derive(Debug, thiserror::Error)]
pub enum FeeForecastError {
    #[error("fee forecast request failed: {0}")]
    Backend(#[from] BackendError),
    #[error("failed to fetch {what}: {source}")]
    Rpc { what: &'static str, source: RpcClientError },
    #[error("cannot parse fee forecast response: {0}")]
    Malformed(serde_json::Error),
    #[error("fee of gas price {gas_price} at gas limit {gas_limit} overflows")]
    Overflow { gas_price: U256, gas_limit: U256 },
    #[error(transparent)]
    ImpossibleState(#[from] ImpossibleState),
}

impl FeeForecastError {
    fn rpc(what: &'static str) -> impl FnOnce(RpcClientError) -> Self {
        move |source| Self::Rpc { what, source }
    }

    /// Whether the error means a broken contract rather than a transient failure.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Backend(_) | Self::Rpc { .. } => false,
            Self::Malformed(_) | Self::Overflow { .. } | Self::ImpossibleState(_) => true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FeeForecastEngine {
    rpc: RpcClient,
    backend: Arc<dyn FeeForecastBackend>,
    reporter: SharedReporter,
}

impl FeeForecastEngine {
    pub fn new(
        rpc: RpcClient,
        backend: Arc<dyn FeeForecastBackend>,
        reporter: SharedReporter,
    ) -> Self {
        Self { rpc, backend, reporter }
    }

    /// Computes the presets for `request`. The response always has the network's pricing scheme.
    #[instrument(skip_all, fields(network = %request.network, selected = ?request.selected))]
    pub async fn forecast(
        &self,
        request: &FeeForecastRequest,
    ) -> Result<FeeForecastResponse, FeeForecastError> {
        let result = match &request.network {
            Network::Predefined(_) | Network::Testnet(_) => self.forecast_with_backend(request).await,
            Network::Custom(_) => self.forecast_locally(request).await,
        };
        if let Err(err) = &result
            && err.is_fatal()
        {
            self.reporter.report(err);
        }
        result
    }

    async fn forecast_with_backend(
        &self,
        request: &FeeForecastRequest,
    ) -> Result<FeeForecastResponse, FeeForecastError> {
        let body = ForecastBody {
            send_transaction_params: &request.params,
            network: request.network.name(),
            address: request.address,
            gas_limit: U256::from(request.gas_limit),
            gas_estimate: U256::from(request.gas_estimate),
            selected_preset: &request.selected,
        };
        let body = serde_json::to_value(&body).map_err(|err| {
            ImpossibleState::new(format!("unserializable fee forecast request: {err}"))
        })?;

        let value = self.backend.forecast(&body).await?;
        let response: FeeForecastResponse =
            serde_json::from_value(value).map_err(FeeForecastError::Malformed)?;

        let expected = request.network.fee_model();
        if response.fee_model() != expected {
            return Err(ImpossibleState::new(format!(
                "{:?} fee forecast for {expected:?} network {}",
                response.fee_model(),
                request.network
            ))
            .into());
        }
        Ok(response)
    }

    async fn forecast_locally(
        &self,
        request: &FeeForecastRequest,
    ) -> Result<FeeForecastResponse, FeeForecastError> {
        let network = &request.network;
        let gas_limit = U256::from(request.gas_limit);

        let custom_gas_price = match &request.selected {
            PresetSelection::Slow | PresetSelection::Normal | PresetSelection::Fast => None,
            PresetSelection::Custom { fee: Fee::Legacy(fee) } => Some(fee.gas_price),
            PresetSelection::Custom { fee: Fee::Eip1559(_) } => {
                return Err(ImpossibleState::new(format!(
                    "eip1559 fee selected on legacy network {network}"
                ))
                .into());
            }
        };

        let (balance, nonce, gas_price) = tokio::join!(
            self.rpc.get_balance(network, request.address),
            self.rpc.get_transaction_count(network, request.address),
            self.rpc.gas_price(network),
        );
        let balance = balance.map_err(FeeForecastError::rpc("balance"))?;
        let nonce = nonce.map_err(FeeForecastError::rpc("nonce"))?;
        let gas_price = gas_price.map_err(FeeForecastError::rpc("gas price"))?;

        let tier = unforecast_legacy_fee(gas_price, gas_limit)?;
        trace!(%gas_price, price = %tier.price_in_native_currency, "synthesized legacy presets");
        let custom = custom_gas_price
            .map(|gas_price| unforecast_legacy_fee(gas_price, gas_limit))
            .transpose()?;
        Ok(FeeForecastResponse::Legacy(FeesForecast {
            slow: tier.clone(),
            normal: tier.clone(),
            fast: tier,
            custom,
            nonce,
            balance,
            network_state: None,
        }))
    }
}

fn unforecast_legacy_fee(gas_price: U256, gas_limit: U256) -> Result<LegacyFee, FeeForecastError> {
    let price_in_native_currency = gas_price
        .checked_mul(gas_limit)
        .ok_or(FeeForecastError::Overflow { gas_price, gas_limit })?;
    Ok(LegacyFee {
        gas_price,
        price_in_native_currency,
        forecast_duration: ForecastDuration::OutsideOfForecast,
    })
}

/// Latest state of a [FeePoller].
#[derive(Clone, Debug, Default)]
pub enum FeePollState {
    #[default]
    Idle,
    Loading {
        generation: u64,
    },
    Loaded {
        generation: u64,
        response: Arc<FeeForecastResponse>,
    },
    Failed {
        generation: u64,
        error: Arc<FeeForecastError>,
    },
}

impl FeePollState {
    pub fn generation(&self) -> Option<u64> {
        match self {
            Self::Idle => None,
            Self::Loading { generation } |
            Self::Loaded { generation, .. } |
            Self::Failed { generation, .. } => Some(*generation),
        }
    }

    pub fn response(&self) -> Option<&Arc<FeeForecastResponse>> {
        match self {
            Self::Loaded { response, .. } => Some(response),
            _ => None,
        }
    }
}

/// Re-runs a forecast on a fixed interval.
///
/// Every [FeePoller::start] begins a new generation. A forecast that completes after its
/// generation was superseded is dropped without touching the published state.
#[derive(Debug)]
pub struct FeePoller {
    engine: FeeForecastEngine,
    interval: Duration,
    generation: Arc<AtomicU64>,
    state: Arc<watch::Sender<FeePollState>>,
}

impl FeePoller {
    pub fn new(engine: FeeForecastEngine, interval: Duration) -> Self {
        let (state, _) = watch::channel(FeePollState::Idle);
        Self { engine, interval, generation: Arc::new(AtomicU64::new(0)), state: Arc::new(state) }
    }

    pub fn subscribe(&self) -> watch::Receiver<FeePollState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> FeePollState {
        self.state.borrow().clone()
    }

    /// Starts polling for `request`, superseding the previous poll. Returns the new generation.
    pub fn start(&self, request: FeeForecastRequest) -> u64 {
        let mut generation = 0;
        self.state.send_modify(|state| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *state = FeePollState::Loading { generation };
        });
        debug!(generation, network = %request.network, "starting fee polling");

        let task = PollTask {
            engine: self.engine.clone(),
            interval: self.interval,
            generation,
            current: self.generation.clone(),
            state: self.state.clone(),
            request,
        };
        tokio::spawn(task.run());
        generation
    }

    pub fn stop(&self) {
        self.state.send_modify(|state| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            *state = FeePollState::Idle;
        });
    }
}

impl Drop for FeePoller {
    fn drop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

struct PollTask {
    engine: FeeForecastEngine,
    interval: Duration,
    generation: u64,
    current: Arc<AtomicU64>,
    state: Arc<watch::Sender<FeePollState>>,
    request: FeeForecastRequest,
}

impl PollTask {
    fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    async fn run(self) {
        let generation = self.generation;
        while self.is_current() {
            let result = self.engine.forecast(&self.request).await;
            let fatal = result.as_ref().is_err_and(FeeForecastError::is_fatal);

            // checked under the channel lock so a concurrent `start` can't interleave
            let applied = self.state.send_if_modified(|state| {
                if !self.is_current() {
                    return false;
                }
                *state = match result {
                    Ok(response) => FeePollState::Loaded { generation, response: Arc::new(response) },
                    Err(error) => FeePollState::Failed { generation, error: Arc::new(error) },
                };
                true
            });
            if !applied {
                trace!(generation, "discarding superseded fee forecast");
                break;
            }
            if fatal {
                break;
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
