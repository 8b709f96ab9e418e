//! Gas limit estimation.

use alloy_primitives::{Address, Bytes, U256};
use kestrel_common::{
    EthSendTransaction, Network, RpcClient, SharedReporter, networks::ZKSYNC_ERA_CHAIN_ID,
};
use serde::Serialize;

/// `eth_estimateGas` call object.
///
/// A caller supplied `gas` is never forwarded: nodes reject the call when the true estimate exceeds
/// it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EstimateGasParams {
    pub from: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
}

impl EstimateGasParams {
    pub fn new(network: &Network, request: &EthSendTransaction) -> Self {
        let tx = request.tx();
        let mut data = tx.data.clone();
        // zkSync Era nodes fail the estimate without calldata
        if data.is_none() && network.hex_chain_id() == ZKSYNC_ERA_CHAIN_ID {
            data = Some(Bytes::new());
        }
        Self { from: tx.from, to: tx.to, data, value: tx.value }
    }
}

/// Result of [GasEstimator::estimate].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasEstimate {
    pub gas: u64,
    /// Whether estimation failed and `gas` is the fallback limit.
    pub is_fallback: bool,
}

impl GasEstimate {
    /// Gas limit to sign `request` with: the dApp's own limit when it set one, this estimate
    /// otherwise.
    pub fn limit_for(&self, request: &EthSendTransaction) -> u64 {
        request.tx().gas.and_then(|gas| u64::try_from(gas).ok()).unwrap_or(self.gas)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("gas estimate {0} does not fit a transaction gas limit")]
struct GasOverflow(U256);

#[derive(Clone, Debug)]
pub struct GasEstimator {
    rpc: RpcClient,
    reporter: SharedReporter,
    fallback_gas_limit: u64,
}

impl GasEstimator {
    pub fn new(rpc: RpcClient, reporter: SharedReporter, fallback_gas_limit: u64) -> Self {
        Self { rpc, reporter, fallback_gas_limit }
    }

    /// Estimates the gas of `request`. Never fails: errors are reported and the fallback limit is
    /// returned instead.
    #[instrument(skip_all, fields(chain = %network.hex_chain_id(), id = %request.id))]
    pub async fn estimate(&self, network: &Network, request: &EthSendTransaction) -> GasEstimate {
        let params = EstimateGasParams::new(network, request);
        let estimate = self.rpc.estimate_gas(network, &params).await;
        match estimate {
            Ok(gas) => match u64::try_from(gas) {
                Ok(gas) => {
                    debug!(gas, "estimated gas");
                    GasEstimate { gas, is_fallback: false }
                }
                Err(_) => {
                    self.reporter.report(&GasOverflow(gas));
                    self.fallback()
                }
            },
            Err(err) => {
                self.reporter.report(&err);
                self.fallback()
            }
        }
    }

    fn fallback(&self) -> GasEstimate {
        warn!(gas = self.fallback_gas_limit, "gas estimation failed, using fallback limit");
        GasEstimate { gas: self.fallback_gas_limit, is_fallback: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, bytes};
    use kestrel_common::{
        CustomNetworkMap, Id, SendTransactionParams,
        networks::find_network_by_number,
        test_utils::{MockTransport, RecordingReporter},
    };
    use serde_json::json;
    use std::sync::Arc;

    fn send(data: Option<Bytes>) -> EthSendTransaction {
        EthSendTransaction::new(
            Id::Number(1),
            SendTransactionParams {
                from: address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"),
                to: Some(address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8")),
                data,
                value: None,
                gas: Some(U256::from(21_000)),
            },
        )
    }

    fn estimator(
        transport: MockTransport,
    ) -> (GasEstimator, Arc<MockTransport>, Arc<RecordingReporter>) {
        let transport = Arc::new(transport);
        let reporter = Arc::new(RecordingReporter::default());
        let backend = "https://api.example.org".parse().unwrap();
        let rpc = RpcClient::new(transport.clone(), Default::default(), backend);
        (GasEstimator::new(rpc, reporter.clone(), 500_000), transport, reporter)
    }

    #[test]
    fn zksync_sends_empty_calldata() {
        let custom = CustomNetworkMap::new();
        let zksync = find_network_by_number(0x144, &custom).unwrap();
        let eth = find_network_by_number(1, &custom).unwrap();

        let params = serde_json::to_value(EstimateGasParams::new(&zksync, &send(None))).unwrap();
        assert_eq!(params["data"], json!("0x"));
        assert!(params.get("gas").is_none());

        let params = serde_json::to_value(EstimateGasParams::new(&eth, &send(None))).unwrap();
        assert!(params.get("data").is_none());

        let params = EstimateGasParams::new(&zksync, &send(Some(bytes!("0xdeadbeef"))));
        assert_eq!(params.data, Some(bytes!("0xdeadbeef")));
    }

    #[tokio::test]
    async fn parses_estimate() {
        let (gas, transport, reporter) =
            estimator(MockTransport::default().with_result("eth_estimateGas", json!("0x5208")));
        let eth = find_network_by_number(1, &CustomNetworkMap::new()).unwrap();

        let estimate = gas.estimate(&eth, &send(None)).await;
        assert_eq!(estimate, GasEstimate { gas: 21_000, is_fallback: false });
        assert!(reporter.reports().is_empty());

        let calls = transport.calls();
        assert!(calls[0].1.params[0].get("gas").is_none());
    }

    #[test]
    fn dapp_gas_limit_wins() {
        let estimate = GasEstimate { gas: 50_000, is_fallback: false };
        assert_eq!(estimate.limit_for(&send(None)), 21_000);

        let mut without = send(None);
        without = without.with_params(SendTransactionParams { gas: None, ..without.tx().clone() });
        assert_eq!(estimate.limit_for(&without), 50_000);
    }

    #[tokio::test]
    async fn rpc_failure_falls_back() {
        let (gas, _, reporter) = estimator(
            MockTransport::default().with_error("eth_estimateGas", 3, "execution reverted"),
        );
        let eth = find_network_by_number(1, &CustomNetworkMap::new()).unwrap();

        let estimate = gas.estimate(&eth, &send(None)).await;
        assert_eq!(estimate, GasEstimate { gas: 500_000, is_fallback: true });
        assert_eq!(reporter.reports().len(), 1);
        assert!(reporter.reports()[0].contains("execution reverted"));
    }
}
