//! dApp transaction requests and the signed payload handed back for broadcast.

use crate::rpc::Id;
use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

pub const ETH_SEND_TRANSACTION: &str = "eth_sendTransaction";
pub const ETH_SEND_RAW_TRANSACTION: &str = "eth_sendRawTransaction";

/// The single parameter object of an `eth_sendTransaction` call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTransactionParams {
    pub from: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<U256>,
}

/// An `eth_sendTransaction` request emitted by a dApp.
///
/// Never mutated once received. Editing it produces a new request through
/// [EthSendTransaction::with_params].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthSendTransaction {
    pub id: Id,
    pub method: String,
    pub params: [SendTransactionParams; 1],
}

impl EthSendTransaction {
    pub fn new(id: Id, params: SendTransactionParams) -> Self {
        Self { id, method: ETH_SEND_TRANSACTION.to_string(), params: [params] }
    }

    pub fn tx(&self) -> &SendTransactionParams {
        &self.params[0]
    }

    /// Returns a new request with the same id carrying `params`.
    pub fn with_params(&self, params: SendTransactionParams) -> Self {
        Self { id: self.id.clone(), method: self.method.clone(), params: [params] }
    }
}

/// A signed transaction ready for broadcast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EthSendRawTransaction {
    pub id: Id,
    pub jsonrpc: String,
    pub method: String,
    pub params: [Bytes; 1],
}

impl EthSendRawTransaction {
    /// Wraps `raw`, an EIP-2718 encoded signed transaction, answering request `id`.
    pub fn new(id: Id, raw: Bytes) -> Self {
        Self {
            id,
            jsonrpc: "2.0".to_string(),
            method: ETH_SEND_RAW_TRANSACTION.to_string(),
            params: [raw],
        }
    }

    pub fn raw(&self) -> &Bytes {
        &self.params[0]
    }
}
