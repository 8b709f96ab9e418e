//! Key store records, looked up by address for every signing operation.
//!
//! Local keys live in Web3 Secret Storage (v3) files. A secret phrase is stored the same way,
//! with the phrase's bytes as the encrypted secret.

use crate::{error::WalletSignerError, hardware::bip44_path};
use alloy_primitives::{Address, B256};
use alloy_signer_local::{MnemonicBuilder, PrivateKeySigner, coins_bip39::English};
use kestrel_common::ImpossibleState;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
};

/// Where and how the key of an account is held.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeyStore {
    PrivateKeyStore {
        address: Address,
        /// The encrypted key file.
        keystore: PathBuf,
    },
    SecretPhraseKey {
        address: Address,
        /// The encrypted phrase file.
        keystore: PathBuf,
        /// Account index on the default BIP-44 path.
        index: u32,
    },
    Trezor {
        address: Address,
        path: String,
    },
    Ledger {
        address: Address,
        path: String,
    },
    /// Watch-only account.
    TrackOnly {
        address: Address,
    },
    SafeV0 {
        address: Address,
    },
}

impl KeyStore {
    pub fn address(&self) -> Address {
        match self {
            Self::PrivateKeyStore { address, .. } |
            Self::SecretPhraseKey { address, .. } |
            Self::Trezor { address, .. } |
            Self::Ledger { address, .. } |
            Self::TrackOnly { address } |
            Self::SafeV0 { address } => *address,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::PrivateKeyStore { .. } => "private_key_store",
            Self::SecretPhraseKey { .. } => "secret_phrase_key",
            Self::Trezor { .. } => "trezor",
            Self::Ledger { .. } => "ledger",
            Self::TrackOnly { .. } => "track_only",
            Self::SafeV0 { .. } => "safe_v0",
        }
    }

    /// Whether this key store can produce signatures.
    pub fn is_signing(&self) -> bool {
        match self {
            Self::PrivateKeyStore { .. } |
            Self::SecretPhraseKey { .. } |
            Self::Trezor { .. } |
            Self::Ledger { .. } => true,
            Self::TrackOnly { .. } | Self::SafeV0 { .. } => false,
        }
    }

    /// Encrypts a raw private key under the session secret into a new file in `dir`.
    pub fn import_private_key(
        private_key: B256,
        secret: &SessionSecret,
        dir: &Path,
    ) -> Result<Self, WalletSignerError> {
        let (signer, id) = PrivateKeySigner::encrypt_keystore(
            dir,
            &mut rand_08::thread_rng(),
            private_key,
            secret.expose(),
            None,
        )?;
        let keystore = dir.join(id);
        debug!(address = %signer.address(), keystore = %keystore.display(), "imported private key");
        Ok(Self::PrivateKeyStore { address: signer.address(), keystore })
    }

    /// Encrypts a BIP-39 phrase into a new file in `dir`, recording the account at `index`.
    pub fn import_secret_phrase(
        phrase: &str,
        index: u32,
        secret: &SessionSecret,
        dir: &Path,
    ) -> Result<Self, WalletSignerError> {
        let phrase = phrase.split_whitespace().collect::<Vec<_>>().join(" ");
        let signer = signer_from_phrase(&phrase, index)?;
        let id = eth_keystore::encrypt_key(
            dir,
            &mut rand_08::thread_rng(),
            phrase.as_bytes(),
            secret.expose(),
            None,
        )?;
        let keystore = dir.join(id);
        debug!(
            address = %signer.address(),
            keystore = %keystore.display(),
            index,
            "imported secret phrase"
        );
        Ok(Self::SecretPhraseKey { address: signer.address(), keystore, index })
    }

    /// Decrypts the local key behind this key store.
    ///
    /// Fails for key stores that aren't local. Key derivation is CPU heavy.
    pub(crate) fn decrypt(
        &self,
        secret: &SessionSecret,
    ) -> Result<PrivateKeySigner, WalletSignerError> {
        match self {
            Self::PrivateKeyStore { keystore, .. } => {
                Ok(PrivateKeySigner::decrypt_keystore(keystore, secret.expose())?)
            }
            Self::SecretPhraseKey { keystore, index, .. } => {
                let phrase = eth_keystore::decrypt_key(keystore, secret.expose())?;
                let phrase =
                    String::from_utf8(phrase).map_err(|_| WalletSignerError::PhraseEncoding)?;
                signer_from_phrase(&phrase, *index)
            }
            other => Err(ImpossibleState::new(format!(
                "{} key store reached the local signer",
                other.kind()
            ))
            .into()),
        }
    }
}

pub(crate) fn signer_from_phrase(
    phrase: &str,
    index: u32,
) -> Result<PrivateKeySigner, WalletSignerError> {
    Ok(MnemonicBuilder::<English>::default()
        .phrase(phrase)
        .derivation_path(bip44_path(index))?
        .build()?)
}

/// The password that unlocks local key stores for the current session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionSecret(String);

impl SessionSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionSecret(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};
    use serde_json::json;

    const PHRASE: &str = "test test test test test test test test test test test junk";

    #[test]
    fn imports_private_key() {
        let dir = tempfile::tempdir().unwrap();
        let secret = SessionSecret::new("pw");
        let key = b256!("0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80");
        let store = KeyStore::import_private_key(key, &secret, dir.path()).unwrap();
        assert_eq!(store.address(), address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"));
        assert_eq!(store.kind(), "private_key_store");
        assert!(store.is_signing());

        let KeyStore::PrivateKeyStore { keystore, .. } = &store else { unreachable!() };
        assert!(keystore.starts_with(dir.path()));
        let file: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(keystore).unwrap()).unwrap();
        assert_eq!(file["version"], 3);
        assert_eq!(file["crypto"]["cipher"], "aes-128-ctr");
        assert_eq!(store.decrypt(&secret).unwrap().address(), store.address());
    }

    #[test]
    fn imports_secret_phrase() {
        let dir = tempfile::tempdir().unwrap();
        let secret = SessionSecret::new("pw");
        let spaced = format!("  {}\n", PHRASE.replace(' ', "   "));
        let store = KeyStore::import_secret_phrase(&spaced, 1, &secret, dir.path()).unwrap();
        assert_eq!(store.address(), address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8"));

        let KeyStore::SecretPhraseKey { keystore, .. } = &store else { unreachable!() };
        assert_eq!(eth_keystore::decrypt_key(keystore, "pw").unwrap(), PHRASE.as_bytes());
        assert_eq!(store.decrypt(&secret).unwrap().address(), store.address());
    }

    #[test]
    fn decrypts_pbkdf2_keystore() {
        let store = KeyStore::PrivateKeyStore {
            address: Address::ZERO,
            keystore: Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("../../testdata/keystore/pbkdf2-vector.json"),
        };
        let signer = store.decrypt(&SessionSecret::new("testpassword")).unwrap();
        assert_eq!(
            signer.to_bytes(),
            b256!("0x7a28b5ba57c53603b0b07b56bba752f7784bf506fa95edc395f5cf6c7514fe9d")
        );
    }

    #[test]
    fn wrong_secret_is_incorrect_password() {
        let store = KeyStore::PrivateKeyStore {
            address: address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"),
            keystore: Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("../../testdata/keystore/dev-key.json"),
        };
        let err = store.decrypt(&SessionSecret::new("nope")).unwrap_err();
        assert!(matches!(err, WalletSignerError::IncorrectKeystorePassword), "{err}");
    }

    #[test]
    fn watch_only_stores_cannot_decrypt() {
        let store = KeyStore::SafeV0 { address: Address::ZERO };
        let err = store.decrypt(&SessionSecret::new("pw")).unwrap_err();
        assert!(matches!(err, WalletSignerError::ImpossibleState(_)), "{err}");
    }

    #[test]
    fn serde_tags() {
        let store: KeyStore = serde_json::from_value(json!({
            "type": "track_only",
            "address": "0x70997970c51812dc3a010c7d01b50e0d17dc79c8"
        }))
        .unwrap();
        assert!(!store.is_signing());
        assert_eq!(store.kind(), "track_only");

        let ledger = KeyStore::Ledger { address: Address::ZERO, path: bip44_path(0) };
        let value = serde_json::to_value(&ledger).unwrap();
        assert_eq!(value["type"], "ledger");
        assert_eq!(value["path"], "m/44'/60'/0'/0/0");
    }

    #[test]
    fn session_secret_is_redacted() {
        assert_eq!(format!("{:?}", SessionSecret::new("hunter2")), "SessionSecret(..)");
    }
}
