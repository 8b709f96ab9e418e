use crate::{opts::NetworkOpts, utils};
use alloy_primitives::U256;
use clap::{Parser, ValueHint};
use eyre::{Result, bail};
use kestrel_common::{EthSendTransaction, TracingReporter};
use kestrel_confirm::{
    ConfirmationFlow, FeePollState, FlowConfig, Pipeline, Preset, PresetSelection, SubmitMode,
};
use kestrel_wallets::{KeyStore, SigningEngine};
use std::{path::PathBuf, sync::Arc};

/// Confirm, sign and send a dApp request with a local key store.
#[derive(Clone, Debug, Parser)]
pub struct SendArgs {
    /// JSON file holding the `eth_sendTransaction` request.
    #[arg(value_hint = ValueHint::FilePath)]
    pub request: PathBuf,

    /// JSON file holding the key store of the sending account.
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub keystore: PathBuf,

    /// Fee preset to sign with.
    #[arg(long, default_value_t = Preset::Normal)]
    pub preset: Preset,

    /// Replace the amount of an ERC-20 approval before signing.
    #[arg(long, value_name = "AMOUNT")]
    pub approval_amount: Option<U256>,

    /// Hand the signed transaction to the backend relay instead of broadcasting it.
    #[arg(long)]
    pub relay: bool,

    /// Sign even when the simulation failed a danger check.
    #[arg(long)]
    pub allow_danger: bool,

    /// The session secret unlocking the key store. Prompted for when unset.
    #[arg(long, env = "KESTREL_SESSION_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    #[command(flatten)]
    pub network: NetworkOpts,
}

impl SendArgs {
    pub async fn run(self) -> Result<()> {
        let (config, network) = self.network.load()?;
        let request: EthSendTransaction = utils::read_json(&self.request)?;
        let key_store: KeyStore = utils::read_json(&self.keystore)?;
        let signer = Arc::new(SigningEngine::new());
        let pipeline = Pipeline::from_config(&config, signer, Arc::new(TracingReporter))?;

        let flow_config = FlowConfig::from(&config);
        let flow = ConfirmationFlow::new(pipeline, network, key_store, request, flow_config)?;
        let mut prepared = flow.load().await?;
        if let Some(amount) = self.approval_amount {
            prepared = flow.edit_approval_amount(amount).await?;
        }
        info!(nonce = prepared.nonce, gas = prepared.gas_limit(), "prepared transaction");

        if prepared.simulation.has_failed_danger_checks() && !self.allow_danger {
            flow.cancel()?;
            bail!("the simulation failed a danger check; pass --allow-danger to sign anyway");
        }

        let selection = PresetSelection::from(self.preset);
        let mut fees = flow.subscribe_fees();
        let state = fees
            .wait_for(|state| {
                matches!(state, FeePollState::Loaded { .. } | FeePollState::Failed { .. })
            })
            .await?
            .clone();
        if let FeePollState::Failed { error, .. } = state {
            bail!("failed to forecast fees: {error}");
        }

        let secret = utils::session_secret(self.secret)?;
        let mode = if self.relay { SubmitMode::Relay } else { SubmitMode::Broadcast };
        let outcome = flow.submit(&selection, secret, mode).await?;
        utils::print_json(&outcome)
    }
}
