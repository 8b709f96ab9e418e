//! Pieces shared by the hardware wallet signers.

use alloy_primitives::{Signature, U256, hex};
use serde::{Deserialize, Serialize};

/// Default BIP-44 path of account `index`.
pub fn bip44_path(index: u32) -> String {
    format!("m/44'/60'/0'/0/{index}")
}

/// Failure payload returned by a device or its bridge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFailure {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Raw signature components as returned by the vendor SDKs, hex encoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSignature {
    pub v: String,
    pub r: String,
    pub s: String,
}

impl DeviceSignature {
    pub(crate) fn v(&self) -> Result<u64, String> {
        let v = self.v.trim_start_matches("0x");
        u64::from_str_radix(v, 16).map_err(|err| format!("invalid v `{}`: {err}", self.v))
    }

    /// Builds a [Signature] with the already-normalized `parity`.
    pub(crate) fn with_parity(&self, parity: bool) -> Result<Signature, String> {
        let r = parse_scalar(&self.r)?;
        let s = parse_scalar(&self.s)?;
        Ok(Signature::new(r, s, parity))
    }
}

fn parse_scalar(s: &str) -> Result<U256, String> {
    let bytes = hex::decode(s).map_err(|err| format!("invalid scalar `{s}`: {err}"))?;
    if bytes.len() > 32 {
        return Err(format!("scalar `{s}` is longer than 32 bytes"));
    }
    Ok(U256::from_be_slice(&bytes))
}

/// Parity of a `v` value that is either raw (`0`/`1`), pre-EIP-155 (`27`/`28`) or EIP-155
/// encoded for `chain_id` and truncated to one byte, as devices do for legacy transactions.
pub(crate) fn legacy_parity(v: u64, chain_id: u64) -> Option<bool> {
    let eip155 = chain_id.wrapping_mul(2).wrapping_add(35);
    match v.wrapping_sub(eip155) & 0xff {
        0 => return Some(false),
        1 => return Some(true),
        _ => {}
    }
    match v {
        0 | 27 => Some(false),
        1 | 28 => Some(true),
        _ => None,
    }
}
