//! Registry of supported networks.
//!
//! Built-in chains live in two static tables, predefined mainnets and testnets. User-added chains
//! are held by the caller in a [CustomNetworkMap] and handed to every lookup.

use crate::errors::ImpossibleState;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{collections::BTreeMap, fmt, num::ParseIntError, str::FromStr};
use url::Url;

/// A chain id, displayed and serialized in `0x`-prefixed lowercase hex.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HexChainId(u64);

impl HexChainId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HexChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseHexChainIdError {
    #[error("chain id `{0}` is missing the 0x prefix")]
    MissingPrefix(String),
    #[error("invalid hex chain id `{input}`: {source}")]
    Invalid { input: String, source: ParseIntError },
}

impl FromStr for HexChainId {
    type Err = ParseHexChainIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| ParseHexChainIdError::MissingPrefix(s.to_string()))?;
        u64::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|source| ParseHexChainIdError::Invalid { input: s.to_string(), source })
    }
}

impl Serialize for HexChainId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HexChainId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Transaction pricing scheme of a network.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeModel {
    /// Single `gasPrice`.
    Legacy,
    /// `maxFeePerGas` / `maxPriorityFeePerGas`.
    Eip1559,
}

/// A chain shipped with the wallet.
#[derive(Debug, PartialEq, Eq)]
pub struct BuiltinNetwork {
    pub name: &'static str,
    pub hex_chain_id: HexChainId,
    pub fee_model: FeeModel,
    pub is_simulation_supported: bool,
    /// Whether the backend proxies JSON-RPC for this chain.
    pub is_proxy_rpc_supported: bool,
    pub native_symbol: &'static str,
    pub block_explorer_url: &'static str,
    pub default_rpc_url: &'static str,
}

/// A user-added chain. Always legacy priced and never simulated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomNetwork {
    pub name: String,
    pub hex_chain_id: HexChainId,
    pub rpc_url: Url,
    pub native_symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_explorer_url: Option<Url>,
}

/// User-added networks keyed by chain id.
pub type CustomNetworkMap = BTreeMap<HexChainId, CustomNetwork>;

/// A network known to the wallet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Network {
    Predefined(&'static BuiltinNetwork),
    Testnet(&'static BuiltinNetwork),
    Custom(CustomNetwork),
}

impl Network {
    pub fn hex_chain_id(&self) -> HexChainId {
        match self {
            Self::Predefined(net) | Self::Testnet(net) => net.hex_chain_id,
            Self::Custom(net) => net.hex_chain_id,
        }
    }

    pub fn chain_id(&self) -> u64 {
        self.hex_chain_id().as_u64()
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Predefined(net) | Self::Testnet(net) => net.name,
            Self::Custom(net) => &net.name,
        }
    }

    pub fn fee_model(&self) -> FeeModel {
        match self {
            Self::Predefined(net) | Self::Testnet(net) => net.fee_model,
            Self::Custom(_) => FeeModel::Legacy,
        }
    }

    pub fn is_simulation_supported(&self) -> bool {
        match self {
            Self::Predefined(net) | Self::Testnet(net) => net.is_simulation_supported,
            Self::Custom(_) => false,
        }
    }

    pub fn is_proxy_rpc_supported(&self) -> bool {
        match self {
            Self::Predefined(net) | Self::Testnet(net) => net.is_proxy_rpc_supported,
            Self::Custom(_) => false,
        }
    }

    pub fn native_symbol(&self) -> &str {
        match self {
            Self::Predefined(net) | Self::Testnet(net) => net.native_symbol,
            Self::Custom(net) => &net.native_symbol,
        }
    }

    pub fn block_explorer_url(&self) -> Option<&str> {
        match self {
            Self::Predefined(net) | Self::Testnet(net) => Some(net.block_explorer_url),
            Self::Custom(net) => net.block_explorer_url.as_ref().map(Url::as_str),
        }
    }

    pub const fn is_custom(&self) -> bool {
        matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.hex_chain_id())
    }
}

macro_rules! builtin {
    ($name:literal, $id:literal, $fee:ident, sim: $sim:literal, proxy: $proxy:literal, $symbol:literal, $explorer:literal, $rpc:literal) => {
        BuiltinNetwork {
            name: $name,
            hex_chain_id: HexChainId::new($id),
            fee_model: FeeModel::$fee,
            is_simulation_supported: $sim,
            is_proxy_rpc_supported: $proxy,
            native_symbol: $symbol,
            block_explorer_url: $explorer,
            default_rpc_url: $rpc,
        }
    };
}

/// Built-in mainnets.
#[rustfmt::skip]
pub static PREDEFINED_NETWORKS: &[BuiltinNetwork] = &[
    builtin!("Ethereum", 0x1, Eip1559, sim: true, proxy: true, "ETH", "https://etherscan.io", "https://eth.llamarpc.com"),
    builtin!("Arbitrum", 0xa4b1, Eip1559, sim: true, proxy: true, "ETH", "https://arbiscan.io", "https://arb1.arbitrum.io/rpc"),
    builtin!("zkSync", 0x144, Eip1559, sim: false, proxy: true, "ETH", "https://explorer.zksync.io", "https://mainnet.era.zksync.io"),
    builtin!("BSC", 0x38, Legacy, sim: true, proxy: true, "BNB", "https://bscscan.com", "https://bsc-dataseed.binance.org"),
    builtin!("Polygon", 0x89, Eip1559, sim: true, proxy: true, "POL", "https://polygonscan.com", "https://polygon-rpc.com"),
    builtin!("PolygonZkevm", 0x44d, Eip1559, sim: false, proxy: true, "ETH", "https://zkevm.polygonscan.com", "https://zkevm-rpc.com"),
    builtin!("Linea", 0xe708, Eip1559, sim: true, proxy: true, "ETH", "https://lineascan.build", "https://rpc.linea.build"),
    builtin!("Avalanche", 0xa86a, Eip1559, sim: true, proxy: true, "AVAX", "https://snowtrace.io", "https://api.avax.network/ext/bc/C/rpc"),
    builtin!("Optimism", 0xa, Eip1559, sim: true, proxy: true, "ETH", "https://optimistic.etherscan.io", "https://mainnet.optimism.io"),
    builtin!("Base", 0x2105, Eip1559, sim: true, proxy: true, "ETH", "https://basescan.org", "https://mainnet.base.org"),
    builtin!("Blast", 0x13e31, Eip1559, sim: true, proxy: true, "ETH", "https://blastscan.io", "https://rpc.blast.io"),
    builtin!("OPBNB", 0xcc, Legacy, sim: false, proxy: true, "BNB", "https://opbnbscan.com", "https://opbnb-mainnet-rpc.bnbchain.org"),
    builtin!("Gnosis", 0x64, Eip1559, sim: true, proxy: true, "XDAI", "https://gnosisscan.io", "https://rpc.gnosischain.com"),
    builtin!("Celo", 0xa4ec, Eip1559, sim: false, proxy: true, "CELO", "https://celoscan.io", "https://forno.celo.org"),
    builtin!("Aurora", 0x4e454152, Legacy, sim: false, proxy: false, "ETH", "https://explorer.aurora.dev", "https://mainnet.aurora.dev"),
    builtin!("Cronos", 0x19, Legacy, sim: false, proxy: true, "CRO", "https://cronoscan.com", "https://evm.cronos.org"),
    builtin!("Mantle", 0x1388, Eip1559, sim: false, proxy: true, "MNT", "https://mantlescan.xyz", "https://rpc.mantle.xyz"),
    builtin!("Manta", 0xa9, Eip1559, sim: false, proxy: true, "ETH", "https://pacific-explorer.manta.network", "https://pacific-rpc.manta.network/http"),
    builtin!("Fantom", 0xfa, Legacy, sim: true, proxy: true, "FTM", "https://ftmscan.com", "https://rpc.ftm.tools"),
];

/// Built-in testnets. None of them are simulated.
#[rustfmt::skip]
pub static TEST_NETWORKS: &[BuiltinNetwork] = &[
    builtin!("EthereumSepolia", 0xaa36a7, Eip1559, sim: false, proxy: true, "ETH", "https://sepolia.etherscan.io", "https://rpc.sepolia.org"),
    builtin!("ArbitrumSepolia", 0x66eee, Eip1559, sim: false, proxy: true, "ETH", "https://sepolia.arbiscan.io", "https://sepolia-rollup.arbitrum.io/rpc"),
    builtin!("BscTestnet", 0x61, Legacy, sim: false, proxy: true, "tBNB", "https://testnet.bscscan.com", "https://data-seed-prebsc-1-s1.binance.org:8545"),
    builtin!("PolygonAmoy", 0x13882, Eip1559, sim: false, proxy: true, "POL", "https://amoy.polygonscan.com", "https://rpc-amoy.polygon.technology"),
    builtin!("OptimismSepolia", 0xaa37dc, Eip1559, sim: false, proxy: true, "ETH", "https://sepolia-optimism.etherscan.io", "https://sepolia.optimism.io"),
    builtin!("BaseSepolia", 0x14a34, Eip1559, sim: false, proxy: true, "ETH", "https://sepolia.basescan.org", "https://sepolia.base.org"),
    builtin!("AvalancheFuji", 0xa869, Eip1559, sim: false, proxy: true, "AVAX", "https://testnet.snowtrace.io", "https://api.avax-test.network/ext/bc/C/rpc"),
    builtin!("FantomTestnet", 0xfa2, Legacy, sim: false, proxy: false, "FTM", "https://testnet.ftmscan.com", "https://rpc.testnet.fantom.network"),
];

/// Hex chain id of zkSync Era, which needs explicit empty call data for gas estimation.
pub const ZKSYNC_ERA_CHAIN_ID: HexChainId = HexChainId::new(0x144);

/// Looks up a network by id across all three registries.
///
/// Ids reaching this function must originate from the registry, so an absent id is an
/// [ImpossibleState] rather than a user error.
pub fn find_network_by_hex_chain_id(
    id: HexChainId,
    custom: &CustomNetworkMap,
) -> Result<Network, ImpossibleState> {
    if let Some(net) = PREDEFINED_NETWORKS.iter().find(|net| net.hex_chain_id == id) {
        return Ok(Network::Predefined(net));
    }
    if let Some(net) = TEST_NETWORKS.iter().find(|net| net.hex_chain_id == id) {
        return Ok(Network::Testnet(net));
    }
    custom
        .get(&id)
        .cloned()
        .map(Network::Custom)
        .ok_or_else(|| ImpossibleState::new(format!("cannot find network by hex chain id {id}")))
}

/// Numeric counterpart of [find_network_by_hex_chain_id].
pub fn find_network_by_number(
    chain_id: u64,
    custom: &CustomNetworkMap,
) -> Result<Network, ImpossibleState> {
    find_network_by_hex_chain_id(HexChainId::new(chain_id), custom)
}

/// Errors when registering a user network.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AddNetworkError {
    #[error("chain id {0} is already used by a built-in network")]
    Builtin(HexChainId),
    #[error("chain id {0} is already used by a custom network")]
    Duplicate(HexChainId),
}

/// Registers a user network, keeping chain ids unique across all registries.
pub fn add_custom_network(
    custom: &mut CustomNetworkMap,
    network: CustomNetwork,
) -> Result<(), AddNetworkError> {
    let id = network.hex_chain_id;
    if PREDEFINED_NETWORKS.iter().chain(TEST_NETWORKS).any(|net| net.hex_chain_id == id) {
        return Err(AddNetworkError::Builtin(id));
    }
    if custom.contains_key(&id) {
        return Err(AddNetworkError::Duplicate(id));
    }
    debug!(chain = %id, name = %network.name, "added custom network");
    custom.insert(id, network);
    Ok(())
}
