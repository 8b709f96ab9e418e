//! # kestrel-confirm
//!
//! Prepares dApp transaction requests for confirmation: gas estimation, fee forecasts and
//! simulation previews, and the flow that signs and submits the confirmed transaction.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

pub mod backend;
pub mod fees;
pub mod flow;
pub mod gas;
pub mod pipeline;
pub mod simulation;

pub use backend::{
    BackendClient, BackendError, BackendSetupError, FeeForecastBackend, RelayBackend,
    SimulationBackend,
};
pub use fees::{
    FeeForecastEngine, FeeForecastError, FeeForecastRequest, FeeForecastResponse, FeePollState,
    FeePoller, FeesForecast, Preset, PresetSelection,
};
pub use flow::{
    ConfirmationError, ConfirmationFlow, FlowOutcome, FlowState, Prepared, SubmitMode, UserAction,
};
pub use gas::{GasEstimate, GasEstimator};
pub use pipeline::{FlowConfig, Pipeline, PipelineSetupError};
pub use simulation::{SimulationClient, SimulationResult};
