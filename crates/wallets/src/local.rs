use crate::{
    error::WalletSignerError,
    keystore::{KeyStore, SessionSecret},
    tx::UnsignedTransaction,
};
use alloy_primitives::Bytes;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;

/// Decrypts a local key store and signs `tx` in-process.
///
/// Key derivation is CPU heavy, so the whole operation runs on the blocking pool.
pub(crate) async fn sign_locally(
    key_store: KeyStore,
    secret: SessionSecret,
    tx: UnsignedTransaction,
) -> Result<Bytes, WalletSignerError> {
    tokio::task::spawn_blocking(move || -> Result<Bytes, WalletSignerError> {
        let signer = unlock(&key_store, &secret)?;
        let signature = signer.sign_hash_sync(&tx.signature_hash())?;
        Ok(tx.into_raw(signature))
    })
    .await?
}

fn unlock(
    key_store: &KeyStore,
    secret: &SessionSecret,
) -> Result<PrivateKeySigner, WalletSignerError> {
    let signer = key_store.decrypt(secret)?;
    let expected = key_store.address();
    if signer.address() != expected {
        return Err(WalletSignerError::AddressMismatch { expected, actual: signer.address() });
    }
    Ok(signer)
}
