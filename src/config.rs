// Copyright 2024 Suilens Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::types::MoveCallTarget;

const fn default_port() -> u16 {
    9977
}

const fn default_request_timeout_ms() -> u64 {
    15_000
}

const fn default_gas_budget() -> u64 {
    10_000_000
}

const fn default_min_coin_balance() -> u64 {
    50_000_000
}

const fn default_sponsorship_ttl_ms() -> u64 {
    60_000
}

const fn default_sweep_interval_ms() -> u64 {
    5_000
}

const fn default_gas_refresh_interval_ms() -> u64 {
    30_000
}

const fn enabled_default() -> bool {
    true
}

/// SuilensRelayerConfig is the configuration for the suilens relayer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct SuilensRelayerConfig {
    /// HTTP Server Port number
    ///
    /// default to 9977
    #[serde(default = "default_port", skip_serializing)]
    pub port: u16,
    /// Supported Sui networks and their configuration.
    ///
    /// a map between network name and its configuration.
    #[serde(default)]
    pub networks: HashMap<String, NetworkConfig>,
    /// Sponsorship policy and fee-payer configuration.
    #[serde(default)]
    pub sponsor: SponsorConfig,
}

/// NetworkConfig is the configuration for one Sui network.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkConfig {
    /// if sponsoring is enabled for this network or not.
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    /// Http(s) JSON-RPC endpoint of a fullnode on this network.
    #[serde(skip_serializing)]
    pub http_endpoint: url::Url,
    /// Bounded timeout for every RPC call to this network, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// SponsorConfig is the configuration of the sponsorship engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SponsorConfig {
    /// The fee-payer private key.
    ///
    /// the format is more dynamic here:
    /// 1. if it starts with '0x' then this would be a raw (32 bytes) hex encoded
    ///    Ed25519 secret key.
    ///
    /// 2. if it starts with '$' then it would be considered as an Environment variable
    ///    of a hex-encoded private key.
    ///    Example: $SUILENS_FEE_PAYER_KEY
    #[serde(skip_serializing, default)]
    pub private_key: Option<FeePayerKey>,
    /// Gas budget attached to every sponsored transaction, in MIST.
    #[serde(default = "default_gas_budget")]
    pub gas_budget: u64,
    /// Minimum balance a gas coin must hold to be claimable, in MIST.
    #[serde(default = "default_min_coin_balance")]
    pub min_coin_balance: u64,
    /// How long a sponsorship stays executable, in milliseconds.
    #[serde(default = "default_sponsorship_ttl_ms")]
    pub sponsorship_ttl_ms: u64,
    /// Interval of the background expiry sweep, in milliseconds.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Interval of the gas-pool refresh task, in milliseconds.
    #[serde(default = "default_gas_refresh_interval_ms")]
    pub gas_refresh_interval_ms: u64,
    /// Operator-level allow-list of Move entry points.
    ///
    /// When set, sponsored transactions may only invoke these targets,
    /// regardless of any per-request allow-list.
    #[serde(default)]
    pub allowed_move_call_targets: Option<Vec<MoveCallTarget>>,
}

impl Default for SponsorConfig {
    fn default() -> Self {
        Self {
            private_key: None,
            gas_budget: default_gas_budget(),
            min_coin_balance: default_min_coin_balance(),
            sponsorship_ttl_ms: default_sponsorship_ttl_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            gas_refresh_interval_ms: default_gas_refresh_interval_ms(),
            allowed_move_call_targets: None,
        }
    }
}

/// The fee-payer secret key, redacted everywhere it could be printed.
#[derive(Clone)]
pub struct FeePayerKey([u8; 32]);

impl FeePayerKey {
    /// The raw secret bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for FeePayerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FeePayerKey").finish()
    }
}

fn parse_hex_key(value: &str) -> Result<[u8; 32], String> {
    let stripped = value.strip_prefix("0x").unwrap_or(value);
    let raw = hex::decode(stripped).map_err(|e| e.to_string())?;
    raw.try_into()
        .map_err(|_| "expected a 32 byte (64 hex chars) secret key".to_string())
}

impl<'de> Deserialize<'de> for FeePayerKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct FeePayerKeyVistor;
        impl<'de> serde::de::Visitor<'de> for FeePayerKeyVistor {
            type Value = [u8; 32];

            fn expecting(
                &self,
                formatter: &mut std::fmt::Formatter,
            ) -> std::fmt::Result {
                formatter.write_str(
                    "hex string or an env var containing a hex string in it",
                )
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if value.starts_with("0x") {
                    // hex value
                    parse_hex_key(value).map_err(|e| {
                        serde::de::Error::custom(format!(
                            "{} but got {} chars",
                            e,
                            value.len()
                        ))
                    })
                } else if value.starts_with('$') {
                    // env
                    let var = value.strip_prefix('$').unwrap_or(value);
                    tracing::trace!("Reading {} from env", var);
                    let val = std::env::var(var).map_err(|e| {
                        serde::de::Error::custom(format!(
                            "error while loading this env {}: {}",
                            var, e,
                        ))
                    })?;
                    parse_hex_key(&val).map_err(serde::de::Error::custom)
                } else {
                    Err(serde::de::Error::custom(
                        "expected a 0x-prefixed hex key or a $ENV_VAR indirection",
                    ))
                }
            }
        }

        let secret = deserializer.deserialize_str(FeePayerKeyVistor)?;
        Ok(Self(secret))
    }
}

/// Loads the relayer configuration from all TOML/JSON files under `path`,
/// then merges in `SUILENS_`-prefixed environment variables.
pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<SuilensRelayerConfig> {
    let mut cfg = config::Config::new();
    // A pattern that covers all toml or json files in the config directory and subdirectories.
    let toml_pattern = format!("{}/**/*.toml", path.as_ref().display());
    let json_pattern = format!("{}/**/*.json", path.as_ref().display());
    tracing::trace!(
        "Loading config files from {} and {}",
        toml_pattern,
        json_pattern
    );
    let config_files = glob::glob(&toml_pattern)?
        .flatten()
        .chain(glob::glob(&json_pattern)?.flatten());

    for config_file in config_files {
        tracing::trace!("Loading config file: {}", config_file.display());
        let ext = config_file
            .extension()
            .map(|e| e.to_str().unwrap_or(""))
            .unwrap_or("");
        let format = match ext {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            _ => {
                tracing::warn!("Unknown file extension: {}", ext);
                continue;
            }
        };
        let file = config::File::from(config_file).format(format);
        if let Err(e) = cfg.merge(file) {
            tracing::warn!("Error while loading config file: {} skipping!", e);
            continue;
        }
    }

    // also merge in the environment (with a prefix of SUILENS).
    cfg.merge(config::Environment::with_prefix("SUILENS").separator("_"))?;
    // and finally deserialize the config and post-process it
    let config: Result<
        SuilensRelayerConfig,
        serde_path_to_error::Error<config::ConfigError>,
    > = serde_path_to_error::deserialize(cfg);
    match config {
        Ok(c) => postloading_process(c),
        Err(e) => {
            tracing::error!("{}", e);
            anyhow::bail!("Error while loading config files")
        }
    }
}

// The postloading_process exists to validate configuration and standardize
// the format of the configuration
fn postloading_process(
    mut config: SuilensRelayerConfig,
) -> anyhow::Result<SuilensRelayerConfig> {
    tracing::trace!("Checking configration sanity ...");
    // make all network names lower case
    // 1. drain everything, and take enabled networks.
    let old_networks = config
        .networks
        .drain()
        .filter(|(_, network)| network.enabled)
        .collect::<HashMap<_, _>>();
    // 2. insert them again, as lowercased.
    for (k, v) in old_networks {
        config.networks.insert(k.to_lowercase(), v);
    }
    if config.networks.is_empty() {
        tracing::warn!(
            "!!WARNING!!: no enabled networks are defined in the config. \
            The relayer will refuse every sponsorship request."
        );
    }
    if config.sponsor.private_key.is_none() {
        tracing::warn!(
            "!!WARNING!!: no fee-payer private-key is defined in the config. \
            The relayer cannot start without one."
        );
    }
    Ok(config)
}
