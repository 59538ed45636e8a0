// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Walrus client configuration.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use walrus_sui::client::ContractConfig;
use walrus_utils::{
    backoff::ExponentialBackoffConfig,
    config::{load_from_yaml, path_or_defaults_if_exist},
};

/// The well-known testnet contract configuration.
mod testnet {
    /// The Walrus package on testnet.
    pub const PACKAGE_ID: &str =
        "0xdf9033cac39b7a9b9f76fb6896c9fc5283ba730d6976a2b1d85ad1e6036c3272";
    /// The WAL coin package on testnet.
    pub const WAL_PACKAGE_ID: &str =
        "0x8270feb7375eee355e64fdb69c50abb6b5f9393a722883c1cf45f8e26048810a";
    /// The shared system object on testnet.
    pub const SYSTEM_OBJECT_ID: &str =
        "0x98ebc47370603fe81d9e15491b2f1443d619d1dab720d586e429ed233e1255c1";
    /// The shared staking object on testnet.
    pub const STAKING_POOL_ID: &str =
        "0x20266a17b4f1a216727f3eef5772f8d486a9e3b5e319af80a5b75809c035561f";
}

/// Returns the default paths for the Walrus configuration file.
pub fn default_configuration_paths() -> Vec<PathBuf> {
    const CONFIG_FILE_NAMES: [&str; 2] = ["client_config.yaml", "client_config.yml"];
    let mut directories = vec![PathBuf::from(".")];
    if let Ok(xdg_config_dir) = std::env::var("XDG_CONFIG_HOME") {
        directories.push(xdg_config_dir.into());
    }
    if let Ok(home_dir) = std::env::var("HOME") {
        let home_dir = PathBuf::from(home_dir);
        directories.push(home_dir.join(".config").join("walrus"));
        directories.push(home_dir.join(".walrus"));
    }
    directories
        .into_iter()
        .flat_map(|directory| {
            CONFIG_FILE_NAMES
                .iter()
                .map(move |file_name| directory.join(file_name))
        })
        .collect()
}

/// Loads the Walrus client configuration from the given path.
///
/// If no path is provided, tries to load the configuration first from the local folder, and
/// then from the standard Walrus configuration directories.
pub fn load_configuration(path: Option<impl AsRef<Path>>) -> anyhow::Result<ClientConfig> {
    let path = path_or_defaults_if_exist(path, &default_configuration_paths())
        .ok_or_else(|| anyhow!("could not find a valid Walrus configuration file"))?;
    tracing::info!(path = %path.display(), "loading Walrus configuration");
    load_from_yaml(&path).context("unable to parse the client configuration")
}

/// Config for the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// The Walrus contract config.
    #[serde(flatten)]
    pub contract_config: ContractConfig,
    /// Configuration for the client's network communication.
    #[serde(default)]
    pub communication_config: ClientCommunicationConfig,
}

impl ClientConfig {
    /// Creates a new client config from a contract config, using default values for the other
    /// fields.
    pub fn new_from_contract_config(contract_config: ContractConfig) -> Self {
        Self {
            contract_config,
            communication_config: Default::default(),
        }
    }

    /// Returns the configuration for a well-known network; currently only `"testnet"`.
    pub fn for_network(network: &str) -> anyhow::Result<Self> {
        match network {
            "testnet" => {
                let parse = |value: &str| {
                    value
                        .parse()
                        .expect("well-known preset object IDs are valid")
                };
                Ok(Self::new_from_contract_config(ContractConfig {
                    package_id: parse(testnet::PACKAGE_ID),
                    latest_package_id: None,
                    wal_package_id: parse(testnet::WAL_PACKAGE_ID),
                    system_object_id: parse(testnet::SYSTEM_OBJECT_ID),
                    staking_pool_id: parse(testnet::STAKING_POOL_ID),
                }))
            }
            _ => Err(anyhow!("unknown network preset: {network}")),
        }
    }
}

/// Rate and retry parameters for the requests to a single storage node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestRateConfig {
    /// The maximum number of connections the client opens towards one node.
    pub max_node_connections: usize,
    /// The backoff configuration for per-node retries.
    pub backoff_config: ExponentialBackoffConfig,
}

impl Default for RequestRateConfig {
    fn default() -> Self {
        Self {
            max_node_connections: 10,
            backoff_config: Default::default(),
        }
    }
}

/// Configuration for the communication parameters of the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientCommunicationConfig {
    /// The maximum number of nodes the client stores to concurrently; defaults to the
    /// committee size.
    pub max_concurrent_writes: Option<usize>,
    /// The maximum number of slivers the client requests concurrently.
    pub max_concurrent_sliver_reads: usize,
    /// The maximum number of concurrent metadata requests after the first-success phase.
    pub max_concurrent_metadata_reads: usize,
    /// The maximum number of slivers written concurrently across all nodes.
    pub max_concurrent_sliver_writes: usize,
    /// The per-node rate and retry parameters.
    pub request_rate_config: RequestRateConfig,
    /// The timeout applied to every single HTTP request.
    pub request_timeout: Duration,
    /// Slivers smaller than this are stored without a prior existence check.
    pub sliver_status_check_threshold: usize,
}

impl Default for ClientCommunicationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_writes: None,
            max_concurrent_sliver_reads: 10,
            max_concurrent_metadata_reads: 3,
            max_concurrent_sliver_writes: 50,
            request_rate_config: Default::default(),
            request_timeout: Duration::from_secs(30),
            sliver_status_check_threshold: 1 << 13,
        }
    }
}

impl ClientCommunicationConfig {
    /// Returns the concrete concurrency limits for a committee of `n_members` nodes.
    pub fn limits(&self, n_members: usize) -> CommunicationLimits {
        CommunicationLimits {
            max_concurrent_writes: self.max_concurrent_writes.unwrap_or(n_members.max(1)),
            max_concurrent_sliver_reads: self.max_concurrent_sliver_reads.max(1),
            max_concurrent_metadata_reads: self.max_concurrent_metadata_reads.max(1),
            max_concurrent_sliver_writes: self.max_concurrent_sliver_writes.max(1),
        }
    }
}

/// The concrete concurrency limits used for a specific committee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommunicationLimits {
    /// The maximum number of nodes stored to concurrently.
    pub max_concurrent_writes: usize,
    /// The maximum number of concurrent sliver requests.
    pub max_concurrent_sliver_reads: usize,
    /// The maximum number of concurrent metadata requests.
    pub max_concurrent_metadata_reads: usize,
    /// The maximum number of slivers written concurrently across all nodes.
    pub max_concurrent_sliver_writes: usize,
}
