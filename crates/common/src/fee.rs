//! Fee presets shared by the forecast engine and the signer.

use crate::networks::FeeModel;
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// Expected confirmation latency of a fee.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ForecastDuration {
    WithinForecast {
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },
    /// No forecast is available, e.g. on user-added networks.
    OutsideOfForecast,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyFee {
    pub gas_price: U256,
    /// Total cost in wei at the request's gas limit.
    pub price_in_native_currency: U256,
    pub forecast_duration: ForecastDuration,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip1559Fee {
    pub max_base_fee: U256,
    pub max_priority_fee: U256,
    /// Total cost in wei at the request's gas limit.
    pub price_in_native_currency: U256,
    pub forecast_duration: ForecastDuration,
}

impl Eip1559Fee {
    /// `maxFeePerGas` of the signed transaction: `max_base_fee + max_priority_fee`, or `None` if
    /// the sum overflows.
    pub fn max_fee_per_gas(&self) -> Option<U256> {
        self.max_base_fee.checked_add(self.max_priority_fee)
    }
}

/// A resolved fee of either pricing scheme.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Fee {
    Legacy(LegacyFee),
    Eip1559(Eip1559Fee),
}

impl Fee {
    pub fn fee_model(&self) -> FeeModel {
        match self {
            Self::Legacy(_) => FeeModel::Legacy,
            Self::Eip1559(_) => FeeModel::Eip1559,
        }
    }

    pub fn price_in_native_currency(&self) -> U256 {
        match self {
            Self::Legacy(fee) => fee.price_in_native_currency,
            Self::Eip1559(fee) => fee.price_in_native_currency,
        }
    }

    /// Whether both fees sign with the same per-gas prices, ignoring the derived totals.
    pub fn same_pricing(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Legacy(a), Self::Legacy(b)) => a.gas_price == b.gas_price,
            (Self::Eip1559(a), Self::Eip1559(b)) => {
                a.max_base_fee == b.max_base_fee && a.max_priority_fee == b.max_priority_fee
            }
            (Self::Legacy(_), Self::Eip1559(_)) | (Self::Eip1559(_), Self::Legacy(_)) => false,
        }
    }

    pub fn forecast_duration(&self) -> ForecastDuration {
        match self {
            Self::Legacy(fee) => fee.forecast_duration,
            Self::Eip1559(fee) => fee.forecast_duration,
        }
    }
}

impl From<LegacyFee> for Fee {
    fn from(fee: LegacyFee) -> Self {
        Self::Legacy(fee)
    }
}

impl From<Eip1559Fee> for Fee {
    fn from(fee: Eip1559Fee) -> Self {
        Self::Eip1559(fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn max_fee_is_additive() {
        let fee = Eip1559Fee {
            max_base_fee: U256::from(100),
            max_priority_fee: U256::from(5),
            price_in_native_currency: U256::ZERO,
            forecast_duration: ForecastDuration::OutsideOfForecast,
        };
        assert_eq!(format!("{:#x}", fee.max_fee_per_gas().unwrap()), "0x69");
        assert_eq!(Fee::from(fee).fee_model(), FeeModel::Eip1559);
    }

    #[test]
    fn max_fee_overflow_is_not_clamped() {
        let fee = Eip1559Fee {
            max_base_fee: U256::MAX,
            max_priority_fee: U256::from(1),
            price_in_native_currency: U256::ZERO,
            forecast_duration: ForecastDuration::OutsideOfForecast,
        };
        assert_eq!(fee.max_fee_per_gas(), None);
    }

    #[test]
    fn parses_backend_fee() {
        let fee: LegacyFee = serde_json::from_value(json!({
            "gasPrice": "0x3b9aca00",
            "priceInNativeCurrency": "0x1319718a5000",
            "forecastDuration": { "type": "WithinForecast", "durationMs": 12000 }
        }))
        .unwrap();
        assert_eq!(fee.forecast_duration, ForecastDuration::WithinForecast { duration_ms: 12_000 });
        assert_eq!(fee.price_in_native_currency, U256::from(21_000_000_000_000u64));
    }
}
