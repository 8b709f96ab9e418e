//! Per-chain RPC endpoint overrides

use crate::resolve::{UnresolvedEnvVarError, has_placeholder, interpolate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{collections::BTreeMap, fmt, ops::Deref};

/// Container type for RPC endpoint overrides, keyed by hex chain id (`0x1`, `0x89`, ...).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RpcEndpoints {
    endpoints: BTreeMap<String, RpcEndpoint>,
}

// === impl RpcEndpoints ===

impl RpcEndpoints {
    /// Creates a new list of endpoints
    pub fn new(endpoints: impl IntoIterator<Item = (impl Into<String>, RpcEndpoint)>) -> Self {
        Self {
            endpoints: endpoints
                .into_iter()
                .map(|(chain, url)| (chain.into().to_ascii_lowercase(), url))
                .collect(),
        }
    }

    /// Returns `true` if this type doesn't contain any endpoints
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Returns all (hex chain id -> url) pairs with env vars resolved
    pub fn resolved(&self) -> ResolvedRpcEndpoints {
        ResolvedRpcEndpoints {
            endpoints: self
                .endpoints
                .iter()
                .map(|(chain, endpoint)| (chain.clone(), endpoint.clone().resolve()))
                .collect(),
        }
    }
}

impl Deref for RpcEndpoints {
    type Target = BTreeMap<String, RpcEndpoint>;

    fn deref(&self) -> &Self::Target {
        &self.endpoints
    }
}

/// Represents a single endpoint
///
/// This type preserves the value as it's stored in the config. If the value is a reference to an
/// env var, then the `Endpoint::Env` var will hold the reference (`${POLYGON_RPC}`) and _not_ the
/// value of the env var itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RpcEndpoint {
    /// A raw Url
    Url(String),
    /// An endpoint that contains at least one `${ENV_VAR}` placeholder
    Env(String),
}

// === impl RpcEndpoint ===

impl RpcEndpoint {
    /// Returns the url this type holds
    ///
    /// # Error
    ///
    /// Returns an error if the type holds a reference to an env var and the env var is not set
    pub fn resolve(self) -> Result<String, UnresolvedEnvVarError> {
        match self {
            Self::Url(url) => Ok(url),
            Self::Env(val) => interpolate(&val),
        }
    }
}

impl fmt::Display for RpcEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => url.fmt(f),
            Self::Env(var) => var.fmt(f),
        }
    }
}

impl Serialize for RpcEndpoint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RpcEndpoint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let val = String::deserialize(deserializer)?;
        let endpoint =
            if has_placeholder(&val) { Self::Env(val) } else { Self::Url(val) };

        Ok(endpoint)
    }
}

/// Container type for _resolved_ endpoints, see [RpcEndpoints::resolved()]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedRpcEndpoints {
    endpoints: BTreeMap<String, Result<String, UnresolvedEnvVarError>>,
}

impl ResolvedRpcEndpoints {
    /// Returns true if there's an endpoint that couldn't be resolved
    pub fn has_unresolved(&self) -> bool {
        self.endpoints.values().any(|val| val.is_err())
    }
}

impl Deref for ResolvedRpcEndpoints {
    type Target = BTreeMap<String, Result<String, UnresolvedEnvVarError>>;

    fn deref(&self) -> &Self::Target {
        &self.endpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_rpc_endpoint() {
        let endpoints: RpcEndpoints = serde_json::from_str(
            r#"{"0x89": "https://polygon-rpc.com", "0x38": "${BSC_RPC_URL}"}"#,
        )
        .unwrap();
        assert_eq!(endpoints["0x89"], RpcEndpoint::Url("https://polygon-rpc.com".to_string()));
        assert_eq!(endpoints["0x38"], RpcEndpoint::Env("${BSC_RPC_URL}".to_string()));
    }

    #[test]
    fn resolves_env_placeholders() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("KESTREL_TEST_RPC_HOST", "rpc.example.org");
            let endpoints = RpcEndpoints::new([
                ("0xA", RpcEndpoint::Env("https://${KESTREL_TEST_RPC_HOST}/op".to_string())),
                ("0x1", RpcEndpoint::Env("${KESTREL_TEST_MISSING_VAR}".to_string())),
            ]);
            let resolved = endpoints.resolved();
            assert!(resolved.has_unresolved());
            assert_eq!(resolved["0xa"], Ok("https://rpc.example.org/op".to_string()));
            let err = resolved["0x1"].clone().unwrap_err();
            assert_eq!(err.var, "KESTREL_TEST_MISSING_VAR");
            Ok(())
        });
    }
}
