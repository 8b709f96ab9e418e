//! # kestrel-common
//!
//! Common utilities for building and using the kestrel transaction pipeline.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

pub mod errors;
pub mod fee;
pub mod networks;
pub mod rpc;
pub mod rpc_map;
pub mod transactions;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use errors::{ErrorReporter, ImpossibleState, SharedReporter, TracingReporter, display_chain};
pub use fee::{Eip1559Fee, Fee, ForecastDuration, LegacyFee};
pub use networks::{CustomNetwork, CustomNetworkMap, FeeModel, HexChainId, Network};
pub use rpc::{Id, RpcClient, RpcClientError};
pub use rpc_map::{NetworkRpcMap, RpcSelection};
pub use transactions::{EthSendRawTransaction, EthSendTransaction, SendTransactionParams};
