use crate::hardware::DeviceFailure;
use alloy_primitives::Address;
use alloy_signer::k256::ecdsa;
use alloy_signer_local::LocalSignerError;
use eth_keystore::KeystoreError;
use kestrel_common::ImpossibleState;
use std::fmt;

/// Errors raised by hardware devices or the processes bridging to them.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HardwareWalletError {
    #[error("hardware wallet disconnected")]
    Disconnected,
    #[error("action cancelled on the device")]
    ActionCancelled,
    #[error("PIN entry cancelled")]
    PinCancelled,
    #[error("permissions not granted")]
    PermissionsNotGranted,
    #[error("device popup closed")]
    PopupClosed,
    #[error("device connection already initialized")]
    AlreadyInitialized,
    #[error("device returned an invalid signature: {0}")]
    InvalidSignature(String),
    #[error("device error {code}: {message}")]
    Device { code: String, message: String },
}

/// What the user is asked to do after a recoverable device error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryPrompt {
    /// Confirm again on the device.
    Retry,
    /// Reconnect or unlock the device and sync the wallet with it again.
    ResyncDevice,
}

impl fmt::Display for RecoveryPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retry => f.write_str("Please try again and confirm the transaction on your device"),
            Self::ResyncDevice => {
                f.write_str("Please reconnect and unlock your device, then sync it with the wallet")
            }
        }
    }
}

impl HardwareWalletError {
    /// Maps a vendor failure payload onto the error taxonomy.
    pub fn from_device_failure(failure: &DeviceFailure) -> Self {
        let code = failure.code.as_deref().unwrap_or_default();
        match code {
            "Init_AlreadyInitialized" => Self::AlreadyInitialized,
            "Device_Disconnected" | "Transport_Missing" | "DisconnectedDevice" |
            "DisconnectedDeviceDuringOperation" => Self::Disconnected,
            "Failure_ActionCancelled" | "Method_Cancel" | "0x6985" => Self::ActionCancelled,
            "Failure_PinCancelled" => Self::PinCancelled,
            "Method_PermissionsNotGranted" => Self::PermissionsNotGranted,
            "Method_Interrupted" => Self::PopupClosed,
            _ if failure.error.eq_ignore_ascii_case("popup closed") => Self::PopupClosed,
            _ => Self::Device { code: code.to_string(), message: failure.error.clone() },
        }
    }

    /// The prompt shown for this error. `None` for errors that aren't failures.
    pub fn prompt(&self) -> Option<RecoveryPrompt> {
        match self {
            Self::AlreadyInitialized => None,
            Self::Disconnected | Self::PermissionsNotGranted => Some(RecoveryPrompt::ResyncDevice),
            Self::ActionCancelled |
            Self::PinCancelled |
            Self::PopupClosed |
            Self::InvalidSignature(_) |
            Self::Device { .. } => Some(RecoveryPrompt::Retry),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WalletSignerError {
    #[error(transparent)]
    Local(LocalSignerError),
    #[error(transparent)]
    Signer(#[from] alloy_signer::Error),
    #[error(transparent)]
    Ecdsa(#[from] ecdsa::Error),
    #[error("Failed to decrypt keystore: incorrect password")]
    IncorrectKeystorePassword,
    #[error("Failed to decrypt keystore: {0}")]
    Keystore(KeystoreError),
    #[error("decrypted secret phrase is not valid utf-8")]
    PhraseEncoding,
    #[error("decrypted key belongs to {actual}, expected {expected}")]
    AddressMismatch { expected: Address, actual: Address },
    #[error("{0} does not fit in the transaction encoding")]
    ValueOutOfRange(&'static str),
    #[error(transparent)]
    Hardware(#[from] HardwareWalletError),
    #[error(transparent)]
    ImpossibleState(#[from] ImpossibleState),
    #[error("signing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("no {0} connection is configured")]
    UnsupportedSigner(&'static str),
}

impl From<KeystoreError> for WalletSignerError {
    fn from(err: KeystoreError) -> Self {
        match err {
            KeystoreError::MacMismatch => Self::IncorrectKeystorePassword,
            err => Self::Keystore(err),
        }
    }
}

impl From<LocalSignerError> for WalletSignerError {
    fn from(err: LocalSignerError) -> Self {
        match err {
            LocalSignerError::EthKeystoreError(err) => err.into(),
            err => Self::Local(err),
        }
    }
}

impl WalletSignerError {
    pub fn trezor_unsupported() -> Self {
        Self::UnsupportedSigner("Trezor")
    }

    pub fn ledger_unsupported() -> Self {
        Self::UnsupportedSigner("Ledger")
    }

    /// The device error behind this failure, if any.
    pub fn as_hardware(&self) -> Option<&HardwareWalletError> {
        match self {
            Self::Hardware(err) => Some(err),
            _ => None,
        }
    }
}
