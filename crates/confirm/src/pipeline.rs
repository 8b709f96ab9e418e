use crate::{
    backend::{BackendClient, BackendSetupError, RelayBackend},
    fees::FeeForecastEngine,
    gas::GasEstimator,
    simulation::SimulationClient,
};
use kestrel_common::{
    NetworkRpcMap, RpcClient, SharedReporter, rpc::HttpConnector, rpc_map::RpcMapError,
};
use kestrel_config::{ConfigValueError, KestrelConfig};
use kestrel_wallets::SigningEngine;
use parking_lot::RwLock;
use std::{sync::Arc, time::Duration};

#[derive(Debug, thiserror::Error)]
pub enum PipelineSetupError {
    #[error(transparent)]
    Backend(#[from] BackendSetupError),
    #[error("failed to build rpc transport: {0}")]
    Transport(reqwest::Error),
    #[error(transparent)]
    RpcMap(#[from] RpcMapError),
    #[error(transparent)]
    Config(#[from] ConfigValueError),
}

/// The services a confirmation flow drives.
#[derive(Clone, Debug)]
pub struct Pipeline {
    pub rpc: RpcClient,
    pub gas: GasEstimator,
    pub simulation: SimulationClient,
    pub fees: FeeForecastEngine,
    pub signer: Arc<SigningEngine>,
    /// Relay for gas-abstracted sends, if the deployment offers one.
    pub relay: Option<Arc<dyn RelayBackend>>,
    pub reporter: SharedReporter,
}

impl Pipeline {
    /// Wires every service to the configured backend and rpc endpoints.
    pub fn from_config(
        config: &KestrelConfig,
        signer: Arc<SigningEngine>,
        reporter: SharedReporter,
    ) -> Result<Self, PipelineSetupError> {
        let connector = HttpConnector::new(config).map_err(PipelineSetupError::Transport)?;
        let rpc_map = NetworkRpcMap::from_config(config)?;
        let rpc_map = Arc::new(RwLock::new(rpc_map));
        let rpc = RpcClient::new(Arc::new(connector), rpc_map, config.backend_url()?);
        let backend = Arc::new(BackendClient::from_config(config)?);

        Ok(Self {
            gas: GasEstimator::new(rpc.clone(), reporter.clone(), config.fallback_gas_limit),
            simulation: SimulationClient::new(backend.clone(), reporter.clone()),
            fees: FeeForecastEngine::new(rpc.clone(), backend.clone(), reporter.clone()),
            relay: Some(backend),
            rpc,
            signer,
            reporter,
        })
    }
}

/// Timing of a confirmation flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowConfig {
    /// Shortest time the loading state is shown, however fast loading completes.
    pub min_display: Duration,
    pub fee_poll_interval: Duration,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self { min_display: Duration::from_millis(1500), fee_poll_interval: Duration::from_secs(5) }
    }
}

impl From<&KestrelConfig> for FlowConfig {
    fn from(config: &KestrelConfig) -> Self {
        Self {
            min_display: config.simulation_min_display(),
            fee_poll_interval: config.fee_poll_interval(),
        }
    }
}
