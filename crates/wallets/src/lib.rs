//! # kestrel-wallets
//!
//! Key stores and the signers behind them: local keys, Trezor and Ledger devices.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

pub mod error;
pub mod hardware;
pub mod keystore;
pub mod ledger;
pub mod trezor;

mod engine;
mod local;
mod settle;
mod tx;

pub use engine::SigningEngine;
pub use error::{HardwareWalletError, RecoveryPrompt, WalletSignerError};
pub use hardware::{DeviceFailure, DeviceSignature, bip44_path};
pub use keystore::{KeyStore, SessionSecret};
pub use ledger::{
    LedgerConnector, LedgerResolution, LedgerResolutionService, LedgerSigner, LedgerTransport,
};
pub use settle::Settlement;
pub use trezor::{TrezorConnect, TrezorConnection, TrezorResponse, TrezorTransaction};
pub use tx::{SignAndSubmitRequest, UnsignedTransaction};
