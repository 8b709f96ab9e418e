use crate::{
    error::WalletSignerError,
    keystore::KeyStore,
    ledger::LedgerSigner,
    local::sign_locally,
    trezor::TrezorConnection,
    tx::{SignAndSubmitRequest, UnsignedTransaction},
};
use kestrel_common::{EthSendRawTransaction, ImpossibleState};
use tokio::sync::Mutex;

/// Dispatches signing requests to the signer matching the account's key store.
///
/// Hardware devices only handle one request at a time, so device signing is serialized.
#[derive(Debug, Default)]
pub struct SigningEngine {
    trezor: Option<TrezorConnection>,
    ledger: Option<LedgerSigner>,
    device_lock: Mutex<()>,
}

impl SigningEngine {
    /// An engine that can only sign with local key stores.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trezor(mut self, trezor: TrezorConnection) -> Self {
        self.trezor = Some(trezor);
        self
    }

    pub fn with_ledger(mut self, ledger: LedgerSigner) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Signs the request and wraps the encoded transaction in an `eth_sendRawTransaction`
    /// request carrying the original request id.
    #[instrument(
        skip_all,
        fields(id = %request.request.id, kind = request.key_store.kind(), network = %request.network)
    )]
    pub async fn sign(
        &self,
        request: SignAndSubmitRequest,
    ) -> Result<EthSendRawTransaction, WalletSignerError> {
        let tx = UnsignedTransaction::from_request(&request)?;
        let SignAndSubmitRequest { request: send, key_store, session_secret, .. } = request;

        let raw = match &key_store {
            KeyStore::PrivateKeyStore { .. } | KeyStore::SecretPhraseKey { .. } => {
                sign_locally(key_store.clone(), session_secret, tx).await?
            }
            KeyStore::Trezor { address, path } => {
                let trezor =
                    self.trezor.as_ref().ok_or_else(WalletSignerError::trezor_unsupported)?;
                let _guard = self.device_lock.lock().await;
                trezor.sign(path, *address, tx).await?
            }
            KeyStore::Ledger { address, path } => {
                let ledger =
                    self.ledger.as_ref().ok_or_else(WalletSignerError::ledger_unsupported)?;
                let _guard = self.device_lock.lock().await;
                ledger.sign(path, *address, tx).await?
            }
            KeyStore::TrackOnly { .. } | KeyStore::SafeV0 { .. } => {
                return Err(ImpossibleState::new(format!(
                    "cannot sign with a {} key store",
                    key_store.kind()
                ))
                .into());
            }
        };

        trace!(len = raw.len(), "signed transaction");
        Ok(EthSendRawTransaction::new(send.id, raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::tests::*;
    use alloy_consensus::TxEnvelope;
    use alloy_eips::eip2718::Decodable2718;
    use kestrel_common::{Id, networks::find_network_by_number};

    #[tokio::test]
    async fn signs_legacy_locally_and_keeps_request_id() {
        let req = request(devnet(), legacy_fee(), local_key_store());
        let raw = SigningEngine::new().sign(req).await.unwrap();

        assert_eq!(raw.id, Id::Number(42));
        assert_eq!(raw.method, "eth_sendRawTransaction");

        let envelope = TxEnvelope::decode_2718(&mut raw.raw().as_ref()).unwrap();
        let TxEnvelope::Legacy(signed) = &envelope else { panic!("expected legacy envelope") };
        assert_eq!(signed.tx().chain_id, Some(0x7a69));
        assert_eq!(signed.recover_signer().unwrap(), DEV_ADDRESS);
    }

    #[tokio::test]
    async fn signs_eip1559_locally() {
        let eth = find_network_by_number(1, &Default::default()).unwrap();
        let req = request(eth, eip1559_fee(), local_key_store());
        let raw = SigningEngine::new().sign(req).await.unwrap();

        let envelope = TxEnvelope::decode_2718(&mut raw.raw().as_ref()).unwrap();
        let TxEnvelope::Eip1559(signed) = &envelope else { panic!("expected eip1559 envelope") };
        assert_eq!(signed.tx().max_fee_per_gas, 0x69);
        assert_eq!(signed.recover_signer().unwrap(), DEV_ADDRESS);
    }

    #[tokio::test]
    async fn watch_only_accounts_cannot_sign() {
        let req = request(devnet(), legacy_fee(), KeyStore::TrackOnly { address: DEV_ADDRESS });
        let err = SigningEngine::new().sign(req).await.unwrap_err();
        assert!(matches!(err, WalletSignerError::ImpossibleState(_)), "{err}");
    }

    #[tokio::test]
    async fn missing_device_connection() {
        let store = KeyStore::Ledger { address: DEV_ADDRESS, path: crate::bip44_path(0) };
        let req = request(devnet(), legacy_fee(), store);
        let err = SigningEngine::new().sign(req).await.unwrap_err();
        assert!(matches!(err, WalletSignerError::UnsupportedSigner("Ledger")), "{err}");
    }
}
