//! Building the chain-appropriate unsigned transaction from a signing request.

use crate::{
    error::WalletSignerError,
    keystore::{KeyStore, SessionSecret},
};
use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope, TxLegacy};
use alloy_eips::{eip2718::Encodable2718, eip2930::AccessList};
use alloy_primitives::{Address, B256, Bytes, Signature, TxKind, U256};
use kestrel_common::{EthSendTransaction, Fee, FeeModel, ImpossibleState, Network};

/// Everything needed to sign one transaction. Consumed by a single signing attempt.
#[derive(Clone, Debug)]
pub struct SignAndSubmitRequest {
    pub fee: Fee,
    pub network: Network,
    pub nonce: u64,
    pub request: EthSendTransaction,
    pub key_store: KeyStore,
    pub session_secret: SessionSecret,
    pub gas_limit: u64,
}

/// An unsigned transaction in the network's pricing scheme.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnsignedTransaction {
    Legacy(TxLegacy),
    Eip1559(TxEip1559),
}

impl UnsignedTransaction {
    /// Builds the transaction for `request`.
    ///
    /// A fee whose scheme differs from the network's is an [ImpossibleState].
    pub fn from_request(request: &SignAndSubmitRequest) -> Result<Self, WalletSignerError> {
        let params = request.request.tx();
        let chain_id = request.network.chain_id();
        let to = params.to.map(TxKind::Call).unwrap_or(TxKind::Create);
        let value = params.value.unwrap_or_default();
        let input = params.data.clone().unwrap_or_default();

        let tx = match (&request.fee, request.network.fee_model()) {
            (Fee::Legacy(fee), FeeModel::Legacy) => Self::Legacy(TxLegacy {
                chain_id: Some(chain_id),
                nonce: request.nonce,
                gas_price: to_u128(fee.gas_price, "gas price")?,
                gas_limit: request.gas_limit,
                to,
                value,
                input,
            }),
            (Fee::Eip1559(fee), FeeModel::Eip1559) => Self::Eip1559(TxEip1559 {
                chain_id,
                nonce: request.nonce,
                gas_limit: request.gas_limit,
                max_fee_per_gas: fee
                    .max_fee_per_gas()
                    .ok_or(WalletSignerError::ValueOutOfRange("max fee per gas"))
                    .and_then(|max_fee| to_u128(max_fee, "max fee per gas"))?,
                max_priority_fee_per_gas: to_u128(fee.max_priority_fee, "max priority fee")?,
                to,
                value,
                access_list: AccessList::default(),
                input,
            }),
            (fee, model) => {
                return Err(ImpossibleState::new(format!(
                    "{:?} fee for {model:?} network {}",
                    fee.fee_model(),
                    request.network
                ))
                .into());
            }
        };
        Ok(tx)
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            Self::Legacy(tx) => tx.chain_id.unwrap_or_default(),
            Self::Eip1559(tx) => tx.chain_id,
        }
    }

    pub fn fee_model(&self) -> FeeModel {
        match self {
            Self::Legacy(_) => FeeModel::Legacy,
            Self::Eip1559(_) => FeeModel::Eip1559,
        }
    }

    pub fn nonce(&self) -> u64 {
        match self {
            Self::Legacy(tx) => tx.nonce,
            Self::Eip1559(tx) => tx.nonce,
        }
    }

    pub fn gas_limit(&self) -> u64 {
        match self {
            Self::Legacy(tx) => tx.gas_limit,
            Self::Eip1559(tx) => tx.gas_limit,
        }
    }

    pub fn to(&self) -> Option<Address> {
        match self {
            Self::Legacy(tx) => tx.to.to().copied(),
            Self::Eip1559(tx) => tx.to.to().copied(),
        }
    }

    pub fn value(&self) -> U256 {
        match self {
            Self::Legacy(tx) => tx.value,
            Self::Eip1559(tx) => tx.value,
        }
    }

    pub fn input(&self) -> &Bytes {
        match self {
            Self::Legacy(tx) => &tx.input,
            Self::Eip1559(tx) => &tx.input,
        }
    }

    /// The message a device signs: the EIP-155 RLP list for legacy transactions, the typed
    /// `0x02 || rlp` payload for EIP-1559.
    pub fn encoded_for_signing(&self) -> Vec<u8> {
        match self {
            Self::Legacy(tx) => tx.encoded_for_signing(),
            Self::Eip1559(tx) => tx.encoded_for_signing(),
        }
    }

    pub fn signature_hash(&self) -> B256 {
        match self {
            Self::Legacy(tx) => tx.signature_hash(),
            Self::Eip1559(tx) => tx.signature_hash(),
        }
    }

    /// Attaches `signature` and returns the EIP-2718 encoded transaction.
    pub fn into_raw(self, signature: Signature) -> Bytes {
        let envelope = match self {
            Self::Legacy(tx) => TxEnvelope::from(tx.into_signed(signature)),
            Self::Eip1559(tx) => TxEnvelope::from(tx.into_signed(signature)),
        };
        envelope.encoded_2718().into()
    }

    /// Checks that `signature` was produced by `expected` over this transaction.
    pub fn verify_signer(
        &self,
        signature: &Signature,
        expected: Address,
    ) -> Result<(), crate::HardwareWalletError> {
        let recovered = signature
            .recover_address_from_prehash(&self.signature_hash())
            .map_err(|err| crate::HardwareWalletError::InvalidSignature(err.to_string()))?;
        if recovered != expected {
            return Err(crate::HardwareWalletError::InvalidSignature(format!(
                "signed by {recovered}, expected {expected}"
            )));
        }
        Ok(())
    }
}

fn to_u128(value: U256, field: &'static str) -> Result<u128, WalletSignerError> {
    u128::try_from(value).map_err(|_| WalletSignerError::ValueOutOfRange(field))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy_primitives::{address, b256, bytes};
    use std::path::{Path, PathBuf};
    use kestrel_common::{
        CustomNetwork, CustomNetworkMap, Eip1559Fee, ForecastDuration, HexChainId, Id, LegacyFee,
        SendTransactionParams, networks::find_network_by_number,
    };

    pub(crate) const DEV_KEY: B256 =
        b256!("0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80");
    pub(crate) const DEV_ADDRESS: Address = address!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

    pub(crate) fn devnet() -> Network {
        let mut custom = CustomNetworkMap::new();
        custom.insert(
            HexChainId::new(0x7a69),
            CustomNetwork {
                name: "Devnet".to_string(),
                hex_chain_id: HexChainId::new(0x7a69),
                rpc_url: "http://127.0.0.1:8545".parse().unwrap(),
                native_symbol: "DEV".to_string(),
                block_explorer_url: None,
            },
        );
        find_network_by_number(0x7a69, &custom).unwrap()
    }

    pub(crate) fn legacy_fee() -> Fee {
        Fee::Legacy(LegacyFee {
            gas_price: U256::from(1_000_000_000u64),
            price_in_native_currency: U256::from(21_000_000_000_000u64),
            forecast_duration: ForecastDuration::OutsideOfForecast,
        })
    }

    pub(crate) fn eip1559_fee() -> Fee {
        Fee::Eip1559(Eip1559Fee {
            max_base_fee: U256::from(100),
            max_priority_fee: U256::from(5),
            price_in_native_currency: U256::ZERO,
            forecast_duration: ForecastDuration::WithinForecast { duration_ms: 12_000 },
        })
    }

    pub(crate) fn request(network: Network, fee: Fee, key_store: KeyStore) -> SignAndSubmitRequest {
        SignAndSubmitRequest {
            fee,
            network,
            nonce: 7,
            request: EthSendTransaction::new(
                Id::Number(42),
                SendTransactionParams {
                    from: key_store.address(),
                    to: Some(address!("0x70997970C51812dc3A010C7d01b50e0d17dc79C8")),
                    data: Some(bytes!("0xdeadbeef")),
                    value: Some(U256::from(1)),
                    gas: None,
                },
            ),
            key_store,
            session_secret: SessionSecret::new("pw"),
            gas_limit: 21_000,
        }
    }

    /// A key store file under the workspace `testdata/keystore`, encrypted with `pw`.
    pub(crate) fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../testdata/keystore").join(name)
    }

    /// [DEV_KEY] in a key store file.
    pub(crate) fn local_key_store() -> KeyStore {
        KeyStore::PrivateKeyStore { address: DEV_ADDRESS, keystore: fixture("dev-key.json") }
    }

    #[test]
    fn builds_legacy_for_custom_network() {
        let req = request(devnet(), legacy_fee(), KeyStore::TrackOnly { address: DEV_ADDRESS });
        let UnsignedTransaction::Legacy(tx) = UnsignedTransaction::from_request(&req).unwrap()
        else {
            panic!("expected legacy transaction")
        };
        assert_eq!(tx.chain_id, Some(0x7a69));
        assert_eq!(tx.gas_price, 1_000_000_000);
        assert_eq!(tx.gas_limit, 21_000);
        assert_eq!(tx.nonce, 7);
        assert_eq!(tx.input, bytes!("0xdeadbeef"));
    }

    #[test]
    fn builds_eip1559_with_additive_max_fee() {
        let eth = find_network_by_number(1, &CustomNetworkMap::new()).unwrap();
        let req = request(eth, eip1559_fee(), KeyStore::TrackOnly { address: DEV_ADDRESS });
        let UnsignedTransaction::Eip1559(tx) = UnsignedTransaction::from_request(&req).unwrap()
        else {
            panic!("expected eip1559 transaction")
        };
        assert_eq!(tx.max_fee_per_gas, 0x69);
        assert_eq!(tx.max_priority_fee_per_gas, 5);
        assert!(tx.access_list.0.is_empty());
    }

    #[test]
    fn overflowing_max_fee_is_rejected() {
        let eth = find_network_by_number(1, &CustomNetworkMap::new()).unwrap();
        let Fee::Eip1559(mut fee) = eip1559_fee() else { unreachable!() };
        fee.max_base_fee = U256::MAX;
        let req = request(eth, fee.into(), KeyStore::TrackOnly { address: DEV_ADDRESS });
        let err = UnsignedTransaction::from_request(&req).unwrap_err();
        assert!(matches!(err, WalletSignerError::ValueOutOfRange("max fee per gas")), "{err}");
    }

    #[test]
    fn fee_model_mismatch_is_impossible() {
        let req = request(devnet(), eip1559_fee(), KeyStore::TrackOnly { address: DEV_ADDRESS });
        let err = UnsignedTransaction::from_request(&req).unwrap_err();
        assert!(matches!(err, WalletSignerError::ImpossibleState(_)), "{err}");
    }
}
