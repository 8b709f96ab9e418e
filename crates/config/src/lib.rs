//! # kestrel-config
//!
//! Layered configuration for the kestrel transaction pipeline.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

use figment::{
    Figment, Provider,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use url::Url;

pub mod endpoints;
pub use endpoints::{ResolvedRpcEndpoints, RpcEndpoint, RpcEndpoints};

pub mod error;
pub use error::{ConfigValueError, ExtractConfigError};

pub mod resolve;
pub use resolve::UnresolvedEnvVarError;

/// Kestrel configuration
///
/// # Defaults
///
/// All configuration values have a default, documented in the [fields](#fields)
/// section below. [`KestrelConfig::default()`] returns the default values for
/// the default profile while [`KestrelConfig::figment()`] returns a [`Figment`]
/// that layers the `kestrel.toml` file and `KESTREL_` prefixed environment
/// variables on top of them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KestrelConfig {
    /// Base url of the wallet backend (fee forecast, simulation, relay, rpc proxy).
    pub backend_url: String,
    /// Timeout for a single HTTP request, in seconds.
    pub request_timeout: u64,
    /// Number of retries for rate limited or transiently failing RPC calls.
    pub max_retry: u32,
    /// Initial retry backoff, in milliseconds.
    pub initial_backoff: u64,
    /// Interval between fee forecast polls, in milliseconds.
    pub fee_poll_interval: u64,
    /// Minimum time the simulation stage is shown before the loaded state, in milliseconds.
    pub simulation_min_display: u64,
    /// Gas limit used when `eth_estimateGas` fails.
    pub fallback_gas_limit: u64,
    /// RPC endpoint overrides, keyed by hex chain id.
    #[serde(default, skip_serializing_if = "RpcEndpoints::is_empty")]
    pub rpc_endpoints: RpcEndpoints,
}

impl KestrelConfig {
    /// The name of the file kestrel reads its configuration from.
    pub const FILE_NAME: &'static str = "kestrel.toml";

    /// The prefix of environment variables that override file values.
    pub const ENV_PREFIX: &'static str = "KESTREL_";

    /// Default gas limit when estimation fails: `0x7a120`.
    pub const DEFAULT_FALLBACK_GAS_LIMIT: u64 = 500_000;

    /// Returns the current `KestrelConfig` read from the working directory.
    ///
    /// See [`figment`](Self::figment) for more details.
    pub fn load() -> Result<Self, ExtractConfigError> {
        Self::try_from(Self::figment())
    }

    /// Returns the current `KestrelConfig` read from `root`.
    pub fn load_with_root(root: impl AsRef<Path>) -> Result<Self, ExtractConfigError> {
        Self::try_from(Self::figment_with_root(root))
    }

    /// Attempts to extract a `KestrelConfig` from `provider`, returning the result.
    ///
    /// # Example
    ///
    /// ```rust
    /// use figment::providers::{Format, Toml};
    /// use kestrel_config::KestrelConfig;
    ///
    /// // Use the default `Figment`, but allow values from `other.toml`
    /// // to supersede its values.
    /// let figment = KestrelConfig::figment().merge(Toml::file("other.toml"));
    ///
    /// let config = KestrelConfig::try_from(figment);
    /// ```
    pub fn try_from<T: Provider>(provider: T) -> Result<Self, ExtractConfigError> {
        trace!("load config with provider: {:?}", provider.metadata());
        let figment = Figment::from(provider);
        figment.extract::<Self>().map_err(ExtractConfigError::new)
    }

    /// Returns the default figment rooted in the current directory.
    pub fn figment() -> Figment {
        Self::figment_with_root(".")
    }

    /// Returns the default figment: defaults, then `<root>/kestrel.toml`, then `KESTREL_*` env vars.
    pub fn figment_with_root(root: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(Self::config_path(root.as_ref())))
            .merge(Env::prefixed(Self::ENV_PREFIX).ignore(&["RPC_ENDPOINTS"]))
    }

    fn config_path(root: &Path) -> PathBuf {
        root.join(Self::FILE_NAME)
    }

    /// Parses the configured backend url.
    pub fn backend_url(&self) -> Result<Url, ConfigValueError> {
        Url::parse(&self.backend_url)
            .map_err(|source| ConfigValueError::BackendUrl { url: self.backend_url.clone(), source })
    }

    /// Resolves every RPC endpoint override into a url.
    ///
    /// Fails on the first endpoint that references an unset env var or isn't a valid url.
    pub fn rpc_endpoint_urls(&self) -> Result<Vec<(String, Url)>, ConfigValueError> {
        let mut urls = Vec::with_capacity(self.rpc_endpoints.len());
        for (chain, endpoint) in self.rpc_endpoints.resolved().iter() {
            let raw = endpoint.clone()?;
            let url = Url::parse(&raw)
                .map_err(|source| ConfigValueError::RpcEndpoint { chain: chain.clone(), source })?;
            urls.push((chain.clone(), url));
        }
        Ok(urls)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff)
    }

    pub fn fee_poll_interval(&self) -> Duration {
        Duration::from_millis(self.fee_poll_interval)
    }

    pub fn simulation_min_display(&self) -> Duration {
        Duration::from_millis(self.simulation_min_display)
    }
}

impl Default for KestrelConfig {
    fn default() -> Self {
        Self {
            backend_url: "https://api.kestrel.app".to_string(),
            request_timeout: 45,
            max_retry: 3,
            initial_backoff: 800,
            fee_poll_interval: 5_000,
            simulation_min_display: 1_500,
            fallback_gas_limit: Self::DEFAULT_FALLBACK_GAS_LIMIT,
            rpc_endpoints: RpcEndpoints::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use similar_asserts::assert_eq;

    #[test]
    fn default_values() {
        let config = KestrelConfig::default();
        assert_eq!(config.fallback_gas_limit, 0x7a120);
        assert_eq!(config.fee_poll_interval(), Duration::from_secs(5));
        assert_eq!(config.simulation_min_display(), Duration::from_millis(1500));
    }

    #[test]
    fn loads_toml_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "kestrel.toml",
                r#"
                backend_url = "http://localhost:9000"
                max_retry = 7
                fallback_gas_limit = 100000

                [rpc_endpoints]
                "0x89" = "https://polygon.example.org"
                "0x38" = "${KESTREL_TEST_BSC_RPC}"
            "#,
            )?;

            let config = KestrelConfig::load_with_root(jail.directory()).unwrap();
            assert_eq!(config.backend_url, "http://localhost:9000");
            assert_eq!(config.max_retry, 7);
            assert_eq!(config.fallback_gas_limit, 100_000);
            assert_eq!(config.request_timeout, 45);
            assert_eq!(
                config.rpc_endpoints["0x89"],
                RpcEndpoint::Url("https://polygon.example.org".to_string())
            );
            assert_eq!(
                config.rpc_endpoints["0x38"],
                RpcEndpoint::Env("${KESTREL_TEST_BSC_RPC}".to_string())
            );

            jail.set_env("KESTREL_TEST_BSC_RPC", "https://bsc.example.org");
            let urls = config.rpc_endpoint_urls().unwrap();
            assert_eq!(urls.len(), 2);
            assert_eq!(urls[0].1.as_str(), "https://bsc.example.org/");
            Ok(())
        });
    }

    #[test]
    fn env_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file("kestrel.toml", "fee_poll_interval = 10000")?;
            jail.set_env("KESTREL_FEE_POLL_INTERVAL", "2500");
            jail.set_env("KESTREL_BACKEND_URL", "http://127.0.0.1:1234");

            let config = KestrelConfig::load_with_root(jail.directory()).unwrap();
            assert_eq!(config.fee_poll_interval, 2500);
            assert_eq!(config.backend_url().unwrap().port(), Some(1234));
            Ok(())
        });
    }

    #[test]
    fn invalid_toml_reports_file() {
        Jail::expect_with(|jail| {
            jail.create_file("kestrel.toml", "max_retry = \"many\"")?;
            let err = KestrelConfig::load_with_root(jail.directory()).unwrap_err();
            let msg = err.to_string();
            assert!(msg.contains("kestrel.toml error"), "{msg}");
            assert!(msg.contains("max_retry"), "{msg}");
            Ok(())
        });
    }

    #[test]
    fn invalid_backend_url() {
        let config =
            KestrelConfig { backend_url: "not a url".to_string(), ..KestrelConfig::default() };
        assert!(matches!(config.backend_url(), Err(ConfigValueError::BackendUrl { .. })));
    }
}
