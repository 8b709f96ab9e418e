//! Trezor signing through the vendor's connect bridge.
//!
//! The bridge is a request/response RPC into an external helper process, abstracted by
//! [TrezorConnect]. The connection is process-wide and initialized at most once.

use crate::{
    error::{HardwareWalletError, WalletSignerError},
    hardware::{DeviceFailure, DeviceSignature},
    tx::UnsignedTransaction,
};
use alloy_primitives::{Address, Bytes, hex, normalize_v};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use std::{fmt, sync::Arc};
use tokio::sync::OnceCell;

/// Response envelope of every bridge call: `{ success, payload }`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrezorResponse<T> {
    Success(T),
    Failure(DeviceFailure),
}

impl<T> TrezorResponse<T> {
    /// Returns the payload, or the device's own failure as an error.
    pub fn into_result(self) -> Result<T, HardwareWalletError> {
        match self {
            Self::Success(payload) => Ok(payload),
            Self::Failure(failure) => Err(HardwareWalletError::from_device_failure(&failure)),
        }
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for TrezorResponse<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Envelope {
            success: bool,
            #[serde(default)]
            payload: serde_json::Value,
        }

        let Envelope { success, payload } = Envelope::deserialize(deserializer)?;
        let resp = if success {
            Self::Success(serde_json::from_value(payload).map_err(serde::de::Error::custom)?)
        } else {
            Self::Failure(serde_json::from_value(payload).map_err(serde::de::Error::custom)?)
        };
        Ok(resp)
    }
}

/// The transaction shape expected by `ethereumSignTransaction`.
///
/// Legacy transactions must not carry a `txType` at all. The transaction type is only attached
/// to the signed encoding after the device answered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrezorTransaction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    pub value: String,
    pub data: String,
    pub chain_id: u64,
    pub nonce: String,
    pub gas_limit: String,
    #[serde(flatten)]
    pub pricing: TrezorPricing,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TrezorPricing {
    Legacy {
        #[serde(rename = "gasPrice")]
        gas_price: String,
        #[serde(rename = "txType", skip_serializing_if = "Option::is_none")]
        tx_type: Option<u8>,
    },
    Eip1559 {
        #[serde(rename = "maxFeePerGas")]
        max_fee_per_gas: String,
        #[serde(rename = "maxPriorityFeePerGas")]
        max_priority_fee_per_gas: String,
        #[serde(rename = "accessList")]
        access_list: Vec<serde_json::Value>,
    },
}

impl From<&UnsignedTransaction> for TrezorTransaction {
    fn from(tx: &UnsignedTransaction) -> Self {
        let pricing = match tx {
            UnsignedTransaction::Legacy(tx) => {
                TrezorPricing::Legacy { gas_price: quantity(tx.gas_price), tx_type: None }
            }
            UnsignedTransaction::Eip1559(tx) => TrezorPricing::Eip1559 {
                max_fee_per_gas: quantity(tx.max_fee_per_gas),
                max_priority_fee_per_gas: quantity(tx.max_priority_fee_per_gas),
                access_list: Vec::new(),
            },
        };
        Self {
            to: tx.to(),
            value: format!("{:#x}", tx.value()),
            data: hex::encode_prefixed(tx.input()),
            chain_id: tx.chain_id(),
            nonce: quantity(tx.nonce()),
            gas_limit: quantity(tx.gas_limit()),
            pricing,
        }
    }
}

fn quantity(x: impl Into<u128>) -> String {
    format!("{:#x}", x.into())
}

/// Connect bridge calls used by the signer.
#[async_trait]
pub trait TrezorConnect: Send + Sync + fmt::Debug {
    /// Initializes the bridge. Fails with `AlreadyInitialized` when called twice.
    async fn init(&self) -> Result<TrezorResponse<serde_json::Value>, HardwareWalletError>;

    async fn ethereum_sign_transaction(
        &self,
        path: &str,
        transaction: &TrezorTransaction,
    ) -> Result<TrezorResponse<DeviceSignature>, HardwareWalletError>;
}

/// Process-wide Trezor connection with idempotent initialization.
#[derive(Clone, Debug)]
pub struct TrezorConnection {
    connect: Arc<dyn TrezorConnect>,
    initialized: Arc<OnceCell<()>>,
}

impl TrezorConnection {
    pub fn new(connect: Arc<dyn TrezorConnect>) -> Self {
        Self { connect, initialized: Arc::new(OnceCell::new()) }
    }

    /// Initializes the bridge unless already done. A bridge reporting that it is already
    /// initialized counts as success, any other error is returned.
    pub async fn ensure_initialized(&self) -> Result<(), HardwareWalletError> {
        self.initialized
            .get_or_try_init(|| async {
                let init = self.connect.init().await.and_then(TrezorResponse::into_result);
                match init {
                    Ok(_) | Err(HardwareWalletError::AlreadyInitialized) => {
                        debug!("trezor connection initialized");
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            })
            .await
            .copied()
    }

    /// Signs `tx` with the account at `path` and returns the encoded signed transaction.
    #[instrument(skip_all, fields(%path, chain_id = tx.chain_id()))]
    pub async fn sign(
        &self,
        path: &str,
        expected: Address,
        tx: UnsignedTransaction,
    ) -> Result<Bytes, WalletSignerError> {
        self.ensure_initialized().await?;

        let request = TrezorTransaction::from(&tx);
        let sig = self.connect.ethereum_sign_transaction(path, &request).await?.into_result()?;

        let v = sig.v().map_err(HardwareWalletError::InvalidSignature)?;
        let parity = normalize_v(v)
            .ok_or_else(|| HardwareWalletError::InvalidSignature(format!("invalid parity {v}")))?;
        let signature = sig.with_parity(parity).map_err(HardwareWalletError::InvalidSignature)?;
        tx.verify_signer(&signature, expected)?;
        Ok(tx.into_raw(signature))
    }
}
