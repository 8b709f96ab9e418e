use crate::utils;
use clap::{Parser, ValueHint};
use eyre::{Result, eyre};
use kestrel_common::{
    CustomNetworkMap, HexChainId, Network, networks::find_network_by_hex_chain_id,
};
use kestrel_config::KestrelConfig;
use std::path::PathBuf;

/// Where configuration and user networks are read from.
#[derive(Clone, Debug, Parser)]
#[command(next_help_heading = "Config options")]
pub struct ConfigOpts {
    /// Directory holding `kestrel.toml`.
    #[arg(long, value_hint = ValueHint::DirPath, default_value = ".")]
    pub root: PathBuf,

    /// JSON file of user-added networks keyed by hex chain id.
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub networks: Option<PathBuf>,
}

impl ConfigOpts {
    pub fn load_config(&self) -> Result<KestrelConfig> {
        Ok(KestrelConfig::load_with_root(&self.root)?)
    }

    /// Looks up `chain` among the built-in and user networks.
    pub fn network(&self, chain: HexChainId) -> Result<Network> {
        let custom: CustomNetworkMap = match &self.networks {
            Some(path) => utils::read_json(path)?,
            None => CustomNetworkMap::new(),
        };
        find_network_by_hex_chain_id(chain, &custom).map_err(|_| eyre!("unknown network {chain}"))
    }
}

/// The network a request targets.
#[derive(Clone, Debug, Parser)]
pub struct NetworkOpts {
    /// Hex chain id of the network, e.g. `0x1`.
    #[arg(long, short, value_name = "HEX_CHAIN_ID")]
    pub chain: HexChainId,

    #[command(flatten)]
    pub config: ConfigOpts,
}

impl NetworkOpts {
    pub fn load(&self) -> Result<(KestrelConfig, Network)> {
        Ok((self.config.load_config()?, self.config.network(self.chain)?))
    }
}
