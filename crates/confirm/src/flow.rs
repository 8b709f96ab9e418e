//! Confirmation of a single dApp transaction request.
//!
//! Loading fetches the simulation, nonce and gas estimate together, then shows the result no
//! sooner than the configured minimum display time. Editing the approval amount replaces the
//! request and loads again; results of superseded loads are dropped.

use crate::{
    backend::BackendError,
    fees::{FeeForecastError, FeeForecastRequest, FeePollState, FeePoller, PresetSelection},
    gas::GasEstimate,
    pipeline::{FlowConfig, Pipeline},
    simulation::SimulationResult,
};
use alloy_primitives::{B256, U256};
use alloy_sol_types::SolCall;
use kestrel_common::{
    EthSendTransaction, ImpossibleState, Network, RpcClientError, SendTransactionParams,
    display_chain,
};
use kestrel_wallets::{
    HardwareWalletError, KeyStore, RecoveryPrompt, SessionSecret, SignAndSubmitRequest,
    WalletSignerError,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio::{sync::watch, time::Instant};

mod abi {
    alloy_sol_types::sol! {
        function approve(address spender, uint256 amount) external returns (bool);
    }
}

/// Everything loaded for one version of the request.
#[derive(Clone, Debug)]
pub struct Prepared {
    pub generation: u64,
    pub request: EthSendTransaction,
    pub nonce: u64,
    pub gas: GasEstimate,
    pub simulation: SimulationResult,
}

impl Prepared {
    /// See [GasEstimate::limit_for].
    pub fn gas_limit(&self) -> u64 {
        self.gas.limit_for(&self.request)
    }
}

/// How a signed transaction leaves the wallet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SubmitMode {
    /// `eth_sendRawTransaction` to the network's rpc.
    #[default]
    Broadcast,
    /// Handed to the backend relay.
    Relay,
}

/// Terminal result of a flow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowOutcome {
    Submitted { hash: B256 },
    Relayed { id: String },
    Cancelled,
    FailureAccepted { reason: String },
}

/// What the user is offered after a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserAction {
    TryAgain,
    ResyncDevice,
    Close,
}

#[derive(Clone, Debug)]
pub enum FlowState {
    Loading { generation: u64 },
    Loaded(Arc<Prepared>),
    Error { generation: u64, message: String, action: UserAction },
    Submitting { generation: u64 },
    Finished(FlowOutcome),
}

impl FlowState {
    pub fn prepared(&self) -> Option<&Arc<Prepared>> {
        match self {
            Self::Loaded(prepared) => Some(prepared),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfirmationError {
    #[error("failed to fetch nonce")]
    Nonce(#[source] RpcClientError),
    #[error(transparent)]
    Fees(#[from] FeeForecastError),
    #[error("fee presets are not available")]
    FeesUnavailable,
    #[error(transparent)]
    Signing(#[from] WalletSignerError),
    #[error("failed to broadcast transaction")]
    Broadcast(#[source] RpcClientError),
    #[error("failed to relay transaction")]
    Relay(#[source] BackendError),
    #[error("relayed sends are not available")]
    RelayUnavailable,
    #[error("the request is not loaded")]
    NotReady,
    #[error("the request was replaced while loading")]
    Superseded,
    #[error("a submission is in progress")]
    Submitting,
    #[error("the request is not a token approval")]
    NotAnApproval,
    #[error("the confirmation has already finished")]
    Finished,
    #[error(transparent)]
    ImpossibleState(#[from] ImpossibleState),
}

impl ConfirmationError {
    pub fn user_action(&self) -> UserAction {
        match self {
            Self::Signing(err) => match err.as_hardware().and_then(HardwareWalletError::prompt) {
                Some(RecoveryPrompt::ResyncDevice) => UserAction::ResyncDevice,
                Some(RecoveryPrompt::Retry) => UserAction::TryAgain,
                None if matches!(err, WalletSignerError::ImpossibleState(_)) => UserAction::Close,
                None => UserAction::TryAgain,
            },
            Self::Fees(err) if err.is_fatal() => UserAction::Close,
            Self::Nonce(_) |
            Self::Fees(_) |
            Self::FeesUnavailable |
            Self::Broadcast(_) |
            Self::Relay(_) |
            Self::NotReady |
            Self::Submitting => UserAction::TryAgain,
            Self::RelayUnavailable |
            Self::Superseded |
            Self::NotAnApproval |
            Self::Finished |
            Self::ImpossibleState(_) => UserAction::Close,
        }
    }

    /// The error and its sources on one line.
    pub fn chain_message(&self) -> String {
        display_chain(self as &(dyn std::error::Error + 'static))
    }

    /// Whether this error means a broken invariant that must be reported.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Fees(err) => err.is_fatal(),
            Self::Signing(WalletSignerError::ImpossibleState(_)) | Self::ImpossibleState(_) => true,
            _ => false,
        }
    }
}

/// Confirmation of one request signed by one account.
///
/// At most one submission runs at a time. While it runs the flow can't be reloaded, cancelled or
/// finished by anything but the submission itself.
#[derive(Debug)]
pub struct ConfirmationFlow {
    pipeline: Pipeline,
    network: Network,
    key_store: KeyStore,
    config: FlowConfig,
    request: Mutex<EthSendTransaction>,
    generation: AtomicU64,
    state: watch::Sender<FlowState>,
    fees: FeePoller,
    submit_lock: tokio::sync::Mutex<()>,
}

impl ConfirmationFlow {
    /// Creates the flow in the loading state. Call [ConfirmationFlow::load] to start it.
    pub fn new(
        pipeline: Pipeline,
        network: Network,
        key_store: KeyStore,
        request: EthSendTransaction,
        config: FlowConfig,
    ) -> Result<Self, ConfirmationError> {
        if !key_store.is_signing() {
            return Err(ImpossibleState::new(format!(
                "confirmation requested for a {} account",
                key_store.kind()
            ))
            .into());
        }
        if request.tx().from != key_store.address() {
            return Err(ImpossibleState::new(format!(
                "request from {} confirmed with the key store of {}",
                request.tx().from,
                key_store.address()
            ))
            .into());
        }

        let fees = FeePoller::new(pipeline.fees.clone(), config.fee_poll_interval);
        let (state, _) = watch::channel(FlowState::Loading { generation: 0 });
        Ok(Self {
            pipeline,
            network,
            key_store,
            config,
            request: Mutex::new(request),
            generation: AtomicU64::new(0),
            state,
            fees,
            submit_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// The current version of the request.
    pub fn request(&self) -> EthSendTransaction {
        self.request.lock().clone()
    }

    pub fn state(&self) -> FlowState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FlowState> {
        self.state.subscribe()
    }

    pub fn subscribe_fees(&self) -> watch::Receiver<FeePollState> {
        self.fees.subscribe()
    }

    pub fn fees(&self) -> FeePollState {
        self.fees.current()
    }

    /// Loads the current request, superseding any load in flight.
    ///
    /// The nonce is required, simulation and gas estimation degrade instead of failing. Fee
    /// polling starts with the normal preset once loaded.
    #[instrument(skip_all, fields(network = %self.network))]
    pub async fn load(&self) -> Result<Arc<Prepared>, ConfirmationError> {
        let request = self.request();
        let generation = self.begin()?;
        let started = Instant::now();
        debug!(generation, id = %request.id, "loading request");

        let address = request.tx().from;
        let (simulation, nonce, gas) = tokio::join!(
            self.pipeline.simulation.simulate(&self.network, &request),
            self.pipeline.rpc.get_transaction_count(&self.network, address),
            self.pipeline.gas.estimate(&self.network, &request),
        );
        tokio::time::sleep_until(started + self.config.min_display).await;

        let loaded = nonce
            .map(|nonce| Arc::new(Prepared { generation, request, nonce, gas, simulation }))
            .map_err(ConfirmationError::Nonce);

        let published = self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *state = match &loaded {
                Ok(prepared) => {
                    self.fees.start(self.fee_request(prepared, PresetSelection::Normal));
                    FlowState::Loaded(prepared.clone())
                }
                Err(err) => FlowState::Error {
                    generation,
                    message: err.chain_message(),
                    action: err.user_action(),
                },
            };
            true
        });
        if !published {
            trace!(generation, "discarding superseded load");
            return Err(ConfirmationError::Superseded);
        }
        loaded
    }

    /// Re-forecasts fees with `selected`, e.g. after the user entered a custom fee.
    pub fn select_fee(&self, selected: PresetSelection) -> Result<u64, ConfirmationError> {
        let prepared = self.prepared()?;
        if let PresetSelection::Custom { fee } = &selected
            && fee.fee_model() != self.network.fee_model()
        {
            let err = ImpossibleState::new(format!(
                "{:?} fee selected on {:?} network {}",
                fee.fee_model(),
                self.network.fee_model(),
                self.network
            ));
            self.pipeline.reporter.report(&err);
            return Err(err.into());
        }
        Ok(self.fees.start(self.fee_request(&prepared, selected)))
    }

    /// Replaces the approved amount of an ERC-20 approval and loads the new request.
    pub async fn edit_approval_amount(
        &self,
        amount: U256,
    ) -> Result<Arc<Prepared>, ConfirmationError> {
        let prepared = self.prepared()?;
        let params = prepared.request.tx();
        let data = params.data.as_ref().ok_or(ConfirmationError::NotAnApproval)?;
        let call =
            abi::approveCall::abi_decode(data).map_err(|_| ConfirmationError::NotAnApproval)?;

        let data = abi::approveCall { spender: call.spender, amount }.abi_encode();
        let edited = prepared
            .request
            .with_params(SendTransactionParams { data: Some(data.into()), ..params.clone() });
        debug!(%amount, spender = %call.spender, "editing approval amount");
        *self.request.lock() = edited;
        self.load().await
    }

    /// Signs the loaded request with the fee of `selection` and sends it.
    ///
    /// A failed submission returns the flow to the loaded state so the user can try again.
    #[instrument(skip_all, fields(network = %self.network, ?mode))]
    pub async fn submit(
        &self,
        selection: &PresetSelection,
        session_secret: SessionSecret,
        mode: SubmitMode,
    ) -> Result<FlowOutcome, ConfirmationError> {
        let _guard = self.submit_lock.lock().await;
        let prepared = self.prepared()?;
        if mode == SubmitMode::Relay && self.pipeline.relay.is_none() {
            return Err(ConfirmationError::RelayUnavailable);
        }

        let response = match self.fees.current() {
            FeePollState::Loaded { response, .. } => response,
            FeePollState::Idle | FeePollState::Loading { .. } | FeePollState::Failed { .. } => {
                return Err(ConfirmationError::FeesUnavailable);
            }
        };
        let fee = response.fee_for(selection)?;

        let generation = prepared.generation;
        let started = self.state.send_if_modified(|state| {
            let current = self.generation.load(Ordering::SeqCst) == generation &&
                matches!(&*state, FlowState::Loaded(loaded) if loaded.generation == generation);
            if current {
                *state = FlowState::Submitting { generation };
            }
            current
        });
        if !started {
            return Err(ConfirmationError::Superseded);
        }

        let request = SignAndSubmitRequest {
            fee,
            network: self.network.clone(),
            nonce: prepared.nonce,
            request: prepared.request.clone(),
            key_store: self.key_store.clone(),
            session_secret,
            gas_limit: prepared.gas_limit(),
        };
        match self.sign_and_send(request, mode).await {
            Ok(outcome) => {
                self.finish(outcome.clone());
                Ok(outcome)
            }
            Err(err) => {
                if err.is_fatal() {
                    self.pipeline.reporter.report(&err);
                }
                warn!(err = %err.chain_message(), "submission failed");
                let restored = self.state.send_if_modified(|state| {
                    let current = self.generation.load(Ordering::SeqCst) == generation &&
                        matches!(
                            &*state,
                            FlowState::Submitting { generation: g } if *g == generation
                        );
                    if current {
                        *state = FlowState::Loaded(prepared);
                    }
                    current
                });
                if !restored {
                    trace!(generation, "flow moved on during the failed submission");
                }
                Err(err)
            }
        }
    }

    pub fn cancel(&self) -> Result<FlowOutcome, ConfirmationError> {
        self.try_finish(FlowOutcome::Cancelled)
    }

    /// Ends the flow after the user acknowledged `error`.
    pub fn accept_failure(
        &self,
        error: &ConfirmationError,
    ) -> Result<FlowOutcome, ConfirmationError> {
        self.try_finish(FlowOutcome::FailureAccepted { reason: error.chain_message() })
    }

    async fn sign_and_send(
        &self,
        request: SignAndSubmitRequest,
        mode: SubmitMode,
    ) -> Result<FlowOutcome, ConfirmationError> {
        let raw = self.pipeline.signer.sign(request).await?;
        match mode {
            SubmitMode::Broadcast => {
                let hash = self
                    .pipeline
                    .rpc
                    .send_raw_transaction(&self.network, &raw)
                    .await
                    .map_err(ConfirmationError::Broadcast)?;
                Ok(FlowOutcome::Submitted { hash })
            }
            SubmitMode::Relay => {
                let relay =
                    self.pipeline.relay.as_ref().ok_or(ConfirmationError::RelayUnavailable)?;
                let id = relay.relay(&self.network, &raw).await.map_err(ConfirmationError::Relay)?;
                Ok(FlowOutcome::Relayed { id })
            }
        }
    }

    /// Starts a new generation in the loading state.
    fn begin(&self) -> Result<u64, ConfirmationError> {
        let mut begun = Err(ConfirmationError::Finished);
        self.state.send_if_modified(|state| {
            if let Some(err) = Self::refuse_transition(state) {
                begun = Err(err);
                return false;
            }
            let next = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *state = FlowState::Loading { generation: next };
            begun = Ok(next);
            true
        });
        let generation = begun?;
        self.fees.stop();
        Ok(generation)
    }

    /// Why `state` can't be left for a new load or a user-chosen outcome, if it can't.
    fn refuse_transition(state: &FlowState) -> Option<ConfirmationError> {
        match state {
            FlowState::Finished(_) => Some(ConfirmationError::Finished),
            FlowState::Submitting { .. } => Some(ConfirmationError::Submitting),
            FlowState::Loading { .. } | FlowState::Loaded(_) | FlowState::Error { .. } => None,
        }
    }

    fn prepared(&self) -> Result<Arc<Prepared>, ConfirmationError> {
        match &*self.state.borrow() {
            FlowState::Loaded(prepared) => Ok(prepared.clone()),
            FlowState::Finished(_) => Err(ConfirmationError::Finished),
            FlowState::Loading { .. } | FlowState::Error { .. } | FlowState::Submitting { .. } => {
                Err(ConfirmationError::NotReady)
            }
        }
    }

    fn fee_request(&self, prepared: &Prepared, selected: PresetSelection) -> FeeForecastRequest {
        FeeForecastRequest {
            network: self.network.clone(),
            address: prepared.request.tx().from,
            params: prepared.request.tx().clone(),
            gas_limit: prepared.gas_limit(),
            gas_estimate: prepared.gas.gas,
            selected,
        }
    }

    /// Finishes the flow with a user-chosen outcome unless it finished or is submitting.
    fn try_finish(&self, outcome: FlowOutcome) -> Result<FlowOutcome, ConfirmationError> {
        let mut refused = None;
        self.state.send_if_modified(|state| {
            refused = Self::refuse_transition(state);
            if refused.is_some() {
                return false;
            }
            self.generation.fetch_add(1, Ordering::SeqCst);
            *state = FlowState::Finished(outcome.clone());
            true
        });
        if let Some(err) = refused {
            return Err(err);
        }
        info!(?outcome, "confirmation finished");
        self.fees.stop();
        Ok(outcome)
    }

    fn finish(&self, outcome: FlowOutcome) {
        info!(?outcome, "confirmation finished");
        self.state.send_modify(|state| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            *state = FlowState::Finished(outcome);
        });
        self.fees.stop();
    }
}
