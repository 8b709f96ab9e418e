//! Per-network RPC endpoint selection.

use crate::networks::{HexChainId, Network};
use kestrel_config::KestrelConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Which endpoint a network currently talks to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RpcSelection {
    #[default]
    Default,
    Custom {
        url: Url,
    },
}

/// Endpoint record of a single network.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkRpc {
    pub current: RpcSelection,
    /// Endpoints the user has entered before.
    pub available: Vec<Url>,
}

#[derive(Debug, thiserror::Error)]
pub enum RpcMapError {
    #[error("invalid chain id in rpc endpoints: {0}")]
    ChainId(#[from] crate::networks::ParseHexChainIdError),
    #[error(transparent)]
    Config(#[from] kestrel_config::ConfigValueError),
}

/// Endpoint selection for every network that has one.
///
/// Only mutated by an explicit user selection through [NetworkRpcMap::select_rpc].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkRpcMap(BTreeMap<HexChainId, NetworkRpc>);

impl NetworkRpcMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds custom selections from the configured `rpc_endpoints`.
    pub fn from_config(config: &KestrelConfig) -> Result<Self, RpcMapError> {
        let mut map = Self::new();
        for (chain, url) in config.rpc_endpoint_urls()? {
            map.select_rpc(chain.parse()?, RpcSelection::Custom { url });
        }
        Ok(map)
    }

    pub fn get(&self, id: HexChainId) -> Option<&NetworkRpc> {
        self.0.get(&id)
    }

    /// Switches `id` to `selection`, remembering custom urls in `available`.
    pub fn select_rpc(&mut self, id: HexChainId, selection: RpcSelection) {
        let entry = self.0.entry(id).or_default();
        if let RpcSelection::Custom { url } = &selection
            && !entry.available.contains(url)
        {
            entry.available.push(url.clone());
        }
        debug!(chain = %id, ?selection, "selected rpc");
        entry.current = selection;
    }

    /// Resolves the url requests for `network` are sent to.
    ///
    /// A custom user selection always wins. Otherwise user networks use their own endpoint,
    /// chains proxied by the backend go through `{backend}/proxy/rpc/{name}` and the rest use the
    /// network's public default.
    pub fn resolve_url(&self, network: &Network, backend_url: &Url) -> Result<Url, url::ParseError> {
        if let Some(NetworkRpc { current: RpcSelection::Custom { url }, .. }) =
            self.get(network.hex_chain_id())
        {
            return Ok(url.clone());
        }

        match network {
            Network::Custom(net) => Ok(net.rpc_url.clone()),
            Network::Predefined(net) | Network::Testnet(net) => {
                if net.is_proxy_rpc_supported {
                    let base = backend_url.as_str().trim_end_matches('/');
                    Url::parse(&format!("{base}/proxy/rpc/{}", net.name.to_lowercase()))
                } else {
                    Url::parse(net.default_rpc_url)
                }
            }
        }
    }
}
