//! Ledger signing over a USB-HID transport.
//!
//! The device may disconnect while a signature is pending. The signing request and the
//! disconnect listener race into a [Settlement]; whichever completes first decides the outcome
//! and the transport is closed exactly once afterwards, also when the signing future is dropped.

use crate::{
    error::{HardwareWalletError, WalletSignerError},
    hardware::{DeviceSignature, legacy_parity},
    settle::Settlement,
    tx::UnsignedTransaction,
};
use alloy_primitives::{Address, Bytes, hex, normalize_v};
use async_trait::async_trait;
use kestrel_common::FeeModel;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tokio::task::JoinHandle;

/// Metadata the device app needs to display calldata in a human readable way.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerResolution(pub serde_json::Value);

/// Looks up [LedgerResolution]s for a to-be-signed message.
#[async_trait]
pub trait LedgerResolutionService: Send + Sync + fmt::Debug {
    async fn resolve_transaction(
        &self,
        raw_tx_hex: &str,
    ) -> Result<LedgerResolution, HardwareWalletError>;
}

/// An open connection to the device.
#[async_trait]
pub trait LedgerTransport: Send + Sync + fmt::Debug {
    async fn sign_transaction(
        &self,
        path: &str,
        raw_tx_hex: &str,
        resolution: &LedgerResolution,
    ) -> Result<DeviceSignature, HardwareWalletError>;

    /// Completes when the device disconnects.
    async fn disconnected(&self) -> HardwareWalletError;

    async fn close(&self);
}

/// Opens transports.
#[async_trait]
pub trait LedgerConnector: Send + Sync + fmt::Debug {
    async fn open(&self) -> Result<Arc<dyn LedgerTransport>, HardwareWalletError>;
}

#[derive(Clone, Debug)]
pub struct LedgerSigner {
    connector: Arc<dyn LedgerConnector>,
    resolver: Arc<dyn LedgerResolutionService>,
}

impl LedgerSigner {
    pub fn new(
        connector: Arc<dyn LedgerConnector>,
        resolver: Arc<dyn LedgerResolutionService>,
    ) -> Self {
        Self { connector, resolver }
    }

    /// Signs `tx` with the account at `path` and returns the encoded signed transaction.
    #[instrument(skip_all, fields(%path, chain_id = tx.chain_id()))]
    pub async fn sign(
        &self,
        path: &str,
        expected: Address,
        tx: UnsignedTransaction,
    ) -> Result<Bytes, WalletSignerError> {
        let message = hex::encode(tx.encoded_for_signing());

        let transport = self.connector.open().await?;
        let mut open = OpenTransport::new(transport.clone());
        let outcome = self.race(&mut open, transport, path.to_string(), message).await;
        open.close().await;
        let sig = outcome?;

        let v = sig.v().map_err(HardwareWalletError::InvalidSignature)?;
        let parity = match tx.fee_model() {
            FeeModel::Legacy => legacy_parity(v, tx.chain_id()),
            FeeModel::Eip1559 => normalize_v(v),
        }
        .ok_or_else(|| HardwareWalletError::InvalidSignature(format!("invalid parity {v}")))?;
        let signature = sig.with_parity(parity).map_err(HardwareWalletError::InvalidSignature)?;
        tx.verify_signer(&signature, expected)?;
        Ok(tx.into_raw(signature))
    }

    async fn race(
        &self,
        open: &mut OpenTransport,
        transport: Arc<dyn LedgerTransport>,
        path: String,
        message: String,
    ) -> Result<DeviceSignature, HardwareWalletError> {
        let (settlement, rx) = Settlement::new();
        let settlement = Arc::new(settlement);

        open.listener = Some(tokio::spawn({
            let transport = transport.clone();
            let settlement = settlement.clone();
            async move {
                let err = transport.disconnected().await;
                if settlement.settle(Err(err)) {
                    debug!("ledger disconnected before signing completed");
                }
            }
        }));

        open.request = Some(tokio::spawn({
            let resolver = self.resolver.clone();
            async move {
                let result = match resolver.resolve_transaction(&message).await {
                    Ok(resolution) => {
                        transport.sign_transaction(&path, &message, &resolution).await
                    }
                    Err(err) => Err(err),
                };
                if !settlement.settle(result) {
                    debug!("discarding ledger response received after disconnect");
                }
            }
        }));

        rx.await.unwrap_or(Err(HardwareWalletError::Disconnected))
    }
}

/// A transport opened for one signature, with the tasks racing on it.
///
/// [OpenTransport::close] stops the disconnect listener and closes the transport. A pending
/// device request is left running, its late result is discarded. Dropping an unclosed
/// [OpenTransport], e.g. when the signing future is cancelled, also stops the request and closes
/// the transport on a spawned task.
struct OpenTransport {
    transport: Option<Arc<dyn LedgerTransport>>,
    listener: Option<JoinHandle<()>>,
    request: Option<JoinHandle<()>>,
}

impl OpenTransport {
    fn new(transport: Arc<dyn LedgerTransport>) -> Self {
        Self { transport: Some(transport), listener: None, request: None }
    }

    async fn close(mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        // detached, a late device response is discarded
        self.request = None;
        if let Some(transport) = self.transport.take() {
            transport.close().await;
        }
    }
}

impl Drop for OpenTransport {
    fn drop(&mut self) {
        for task in [self.listener.take(), self.request.take()].into_iter().flatten() {
            task.abort();
        }
        let Some(transport) = self.transport.take() else { return };
        debug!("closing the transport of an abandoned ledger signature");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { transport.close().await });
            }
            Err(_) => warn!("no runtime to close the ledger transport on"),
        }
    }
}
