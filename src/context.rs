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
//! Shared relay state handed to every handler and background task.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::chain::{ChainClient, HttpChainClient};
use crate::config::SuilensRelayerConfig;
use crate::error::Error;
use crate::gas_pool::GasPool;
use crate::keys::FeePayer;

/// The relay's shared context: configuration, the fee-payer identity, and a
/// chain client plus gas pool per configured network.
#[derive(Clone)]
pub struct RelayerContext {
    /// The loaded configuration.
    pub config: SuilensRelayerConfig,
    fee_payer: Arc<FeePayer>,
    chain_clients: HashMap<String, Arc<dyn ChainClient>>,
    gas_pools: HashMap<String, Arc<GasPool>>,
    /// Broadcasts a shutdown signal to all active connections.
    ///
    /// The initial `shutdown` trigger is provided by the `run` caller. The
    /// server is responsible for gracefully shutting down active connections.
    /// When a connection task is spawned, it is passed a broadcast receiver
    /// handle. When a graceful shutdown is initiated, a `()` value is sent via
    /// the broadcast::Sender. Each active connection receives it, reaches a
    /// safe terminal state, and completes the task.
    notify_shutdown: broadcast::Sender<()>,
}

impl std::fmt::Debug for RelayerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayerContext")
            .field("fee_payer", &self.fee_payer)
            .field("networks", &self.chain_clients.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RelayerContext {
    /// Builds the context from a loaded configuration, creating one HTTP
    /// chain client and one empty gas pool per enabled network.
    pub fn new(config: SuilensRelayerConfig) -> crate::Result<Self> {
        let key = config
            .sponsor
            .private_key
            .as_ref()
            .ok_or(Error::MissingSecrets)?;
        let fee_payer = Arc::new(FeePayer::from_secret_bytes(key.as_bytes())?);
        let mut chain_clients: HashMap<String, Arc<dyn ChainClient>> =
            HashMap::new();
        let mut gas_pools = HashMap::new();
        for (name, network) in &config.networks {
            let client = HttpChainClient::new(
                network.http_endpoint.clone(),
                Duration::from_millis(network.request_timeout_ms),
            )?;
            chain_clients.insert(name.clone(), Arc::new(client));
            gas_pools.insert(name.clone(), Arc::new(GasPool::new()));
        }
        let (notify_shutdown, _) = broadcast::channel(2);
        Ok(Self {
            config,
            fee_payer,
            chain_clients,
            gas_pools,
            notify_shutdown,
        })
    }

    /// Builds a context over caller-provided chain clients.
    ///
    /// Used by tests to substitute a mock chain; the networks present in the
    /// map define which networks the context serves.
    pub fn with_chain_clients(
        config: SuilensRelayerConfig,
        fee_payer: FeePayer,
        chain_clients: HashMap<String, Arc<dyn ChainClient>>,
    ) -> Self {
        let gas_pools = chain_clients
            .keys()
            .map(|name| (name.clone(), Arc::new(GasPool::new())))
            .collect();
        let (notify_shutdown, _) = broadcast::channel(2);
        Self {
            config,
            fee_payer: Arc::new(fee_payer),
            chain_clients,
            gas_pools,
            notify_shutdown,
        }
    }

    /// The relay's fee-payer identity.
    pub fn fee_payer(&self) -> &FeePayer {
        &self.fee_payer
    }

    /// The names of the networks this relay serves.
    pub fn networks(&self) -> impl Iterator<Item = &str> {
        self.chain_clients.keys().map(String::as_str)
    }

    /// The chain client for a network, if it is configured.
    pub fn chain_client(
        &self,
        network: &str,
    ) -> crate::Result<Arc<dyn ChainClient>> {
        self.chain_clients
            .get(network)
            .cloned()
            .ok_or_else(|| Error::UnsupportedNetwork {
                network: network.to_string(),
            })
    }

    /// The gas pool for a network, if it is configured.
    pub fn gas_pool(&self, network: &str) -> crate::Result<Arc<GasPool>> {
        self.gas_pools
            .get(network)
            .cloned()
            .ok_or_else(|| Error::UnsupportedNetwork {
                network: network.to_string(),
            })
    }

    /// Subscribes to the shutdown broadcast.
    pub fn shutdown_signal(&self) -> Shutdown {
        Shutdown::new(self.notify_shutdown.subscribe())
    }

    /// Triggers a graceful shutdown of every task holding a [`Shutdown`].
    pub fn shutdown(&self) {
        let _ = self.notify_shutdown.send(());
    }
}

/// Listens for the server shutdown signal.
///
/// Shutdown is signalled using a `broadcast::Receiver`. Only a single value is
/// ever sent. Once a value has been sent via the broadcast channel, the server
/// should shutdown.
///
/// The `Shutdown` struct listens for the signal and tracks that the signal has
/// been received. Callers may query for whether the shutdown signal has been
/// received or not.
#[derive(Debug)]
pub struct Shutdown {
    /// `true` if the shutdown signal has been received
    shutdown: bool,

    /// The receive half of the channel used to listen for shutdown.
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    /// Create a new `Shutdown` backed by the given `broadcast::Receiver`.
    pub fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    /// Receive the shutdown notice, waiting if necessary.
    pub async fn recv(&mut self) {
        // If the shutdown signal has already been received, then return
        // immediately.
        if self.shutdown {
            return;
        }

        // Cannot receive a "lag error" as only one value is ever sent.
        let _ = self.notify.recv().await;

        // Remember that the signal has been received.
        self.shutdown = true;
    }
}
