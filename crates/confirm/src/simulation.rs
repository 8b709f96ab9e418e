//! Transaction simulation previews.

use crate::backend::{BackendError, SimulationBackend};
use alloy_primitives::{Address, U256};
use kestrel_common::{EthSendTransaction, Network, SharedReporter};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};

/// Outcome of a simulation request. Never an error: failures degrade to [SimulationResult::Failed].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimulationResult {
    /// The network has no simulation support.
    NotSupported,
    Failed,
    Simulated { simulation: Simulation },
}

impl SimulationResult {
    pub fn simulation(&self) -> Option<&Simulation> {
        match self {
            Self::Simulated { simulation } => Some(simulation),
            Self::NotSupported | Self::Failed => None,
        }
    }

    pub fn has_failed_danger_checks(&self) -> bool {
        self.simulation().is_some_and(Simulation::has_failed_danger_checks)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Simulation {
    pub transaction: SimulatedTransaction,
    /// Currencies referenced by `transaction`, keyed by [CurrencyId].
    #[serde(default)]
    pub currencies: BTreeMap<CurrencyId, Currency>,
    #[serde(default)]
    pub checks: Vec<SafetyCheck>,
}

impl Simulation {
    pub fn has_failed_danger_checks(&self) -> bool {
        self.checks.iter().any(SafetyCheck::is_failed_danger)
    }

    pub fn currency(&self, id: &CurrencyId) -> Option<&Currency> {
        self.currencies.get(id)
    }
}

/// Key of a currency in [Simulation::currencies], e.g. `erc20:0x…` or `native`.
pub type CurrencyId = String;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Currency {
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NftId {
    pub contract: Address,
    pub token_id: U256,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Send,
    Receive,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub currency: CurrencyId,
    pub amount: U256,
    pub direction: Direction,
}

/// What the simulated transaction does.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimulatedTransaction {
    /// ERC-20 allowance change. `amount` is `None` for an unlimited allowance.
    Approval {
        spender: Address,
        currency: CurrencyId,
        #[serde(default)]
        amount: Option<U256>,
    },
    /// A transaction the backend can't classify, described by its balance changes.
    Unknown {
        #[serde(default)]
        changes: Vec<BalanceChange>,
    },
    /// The transaction reverts.
    Failed {
        #[serde(default)]
        reason: Option<String>,
    },
    SingleNftApproval {
        spender: Address,
        nft: NftId,
    },
    CollectionNftApproval {
        spender: Address,
        contract: Address,
    },
    #[serde(rename = "p2p_token_transfer")]
    P2pTokenTransfer {
        to: Address,
        currency: CurrencyId,
        amount: U256,
    },
    #[serde(rename = "p2p_nft_transfer")]
    P2pNftTransfer {
        to: Address,
        nft: NftId,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckState {
    Passed,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckSeverity {
    Caution,
    Danger,
}

/// Heuristic flag raised on a simulated transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyCheck {
    pub name: String,
    pub state: CheckState,
    pub severity: CheckSeverity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SafetyCheck {
    pub fn is_failed_danger(&self) -> bool {
        self.state == CheckState::Failed && self.severity == CheckSeverity::Danger
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("simulation request failed: {0}")]
    Backend(#[from] BackendError),
    #[error("cannot parse simulation: {0}")]
    Malformed(serde_json::Error),
}

#[derive(Clone, Debug)]
pub struct SimulationClient {
    backend: Arc<dyn SimulationBackend>,
    reporter: SharedReporter,
}

impl SimulationClient {
    pub fn new(backend: Arc<dyn SimulationBackend>, reporter: SharedReporter) -> Self {
        Self { backend, reporter }
    }

    /// Simulates `request` on `network`.
    ///
    /// Returns [SimulationResult::NotSupported] without a request when the network can't be
    /// simulated, and [SimulationResult::Failed] when the backend fails.
    #[instrument(skip_all, fields(network = %network, id = %request.id))]
    pub async fn simulate(&self, network: &Network, request: &EthSendTransaction) -> SimulationResult {
        if !network.is_simulation_supported() {
            trace!("simulation not supported");
            return SimulationResult::NotSupported;
        }
        match self.try_simulate(network, request).await {
            Ok(simulation) => {
                debug!(checks = simulation.checks.len(), "simulated transaction");
                SimulationResult::Simulated { simulation }
            }
            Err(err) => {
                self.reporter.report(&err);
                SimulationResult::Failed
            }
        }
    }

    async fn try_simulate(
        &self,
        network: &Network,
        request: &EthSendTransaction,
    ) -> Result<Simulation, SimulationError> {
        let params = serde_json::to_value(request.tx()).map_err(SimulationError::Malformed)?;
        let value = self.backend.simulate(network, &params).await?;
        serde_json::from_value(value).map_err(SimulationError::Malformed)
    }
}
