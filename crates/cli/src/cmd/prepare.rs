use crate::{opts::NetworkOpts, utils};
use clap::{Parser, ValueHint};
use eyre::{Result, WrapErr};
use kestrel_common::{EthSendTransaction, TracingReporter};
use kestrel_confirm::{FeeForecastRequest, Pipeline, Preset, PresetSelection};
use kestrel_wallets::SigningEngine;
use serde_json::json;
use std::{path::PathBuf, sync::Arc};

/// Estimate gas, simulate and forecast fees for a dApp request without signing it.
#[derive(Clone, Debug, Parser)]
pub struct PrepareArgs {
    /// JSON file holding the `eth_sendTransaction` request.
    #[arg(value_hint = ValueHint::FilePath)]
    pub request: PathBuf,

    /// Fee preset the forecast is requested for.
    #[arg(long, default_value_t = Preset::Normal)]
    pub preset: Preset,

    #[command(flatten)]
    pub network: NetworkOpts,
}

impl PrepareArgs {
    pub async fn run(self) -> Result<()> {
        let (config, network) = self.network.load()?;
        let request: EthSendTransaction = utils::read_json(&self.request)?;
        let signer = Arc::new(SigningEngine::new());
        let pipeline = Pipeline::from_config(&config, signer, Arc::new(TracingReporter))?;

        let from = request.tx().from;
        let (simulation, nonce, gas) = tokio::join!(
            pipeline.simulation.simulate(&network, &request),
            pipeline.rpc.get_transaction_count(&network, from),
            pipeline.gas.estimate(&network, &request),
        );
        let nonce = nonce.wrap_err("failed to fetch nonce")?;

        let gas_limit = gas.limit_for(&request);
        let fees = pipeline
            .fees
            .forecast(&FeeForecastRequest {
                network: network.clone(),
                address: from,
                params: request.tx().clone(),
                gas_limit,
                gas_estimate: gas.gas,
                selected: PresetSelection::from(self.preset),
            })
            .await?;

        utils::print_json(&json!({
            "network": network.to_string(),
            "nonce": nonce,
            "gas": { "limit": gas_limit, "estimate": gas.gas, "isFallback": gas.is_fallback },
            "simulation": simulation,
            "hasFailedDangerChecks": simulation.has_failed_danger_checks(),
            "fees": fees,
        }))
    }
}
