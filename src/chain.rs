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
//! The relay's view of a Sui fullnode.
//!
//! Everything the relay needs from the chain goes through the [`ChainClient`]
//! trait: the reference gas price, the fee payer's coins, and transaction
//! submission. The production implementation speaks JSON-RPC over HTTP with
//! a bounded timeout on every call; tests inject a mock.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Error, Result};
use crate::keys::SerializedSignature;
use crate::types::{ObjectRef, SuiAddress, TransactionDigest};

/// A fee-payer-owned coin usable as a gas payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasCoin {
    /// The versioned reference submitted as the gas payment.
    pub object_ref: ObjectRef,
    /// Balance of the coin, in MIST.
    pub balance: u64,
}

/// The outcome of a transaction submission that reached the node.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// The transaction executed; carries the final on-chain digest.
    Executed {
        /// The on-chain transaction digest.
        digest: TransactionDigest,
    },
    /// The node accepted the call but execution aborted or was rejected.
    Rejected {
        /// The abort/error code reported by the chain.
        reason: String,
    },
}

/// Operations the relay performs against a fullnode.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// The current reference gas price, in MIST per gas unit.
    async fn reference_gas_price(&self) -> Result<u64>;

    /// The owner's gas coins holding at least `min_balance` MIST.
    async fn gas_coins(
        &self,
        owner: SuiAddress,
        min_balance: u64,
    ) -> Result<Vec<GasCoin>>;

    /// Submits a fully-signed transaction and waits for execution effects.
    ///
    /// A timeout surfaces as [`Error::RpcTimeout`] and a transport failure
    /// after the request was sent as [`Error::SubmitInterrupted`]; in both
    /// cases the submission outcome is unknown and must not be reported as
    /// success. Only a connection failure, where the node never saw the
    /// bytes, surfaces as [`Error::Http`].
    async fn execute_transaction(
        &self,
        tx_bytes: &[u8],
        signatures: &[SerializedSignature],
    ) -> Result<SubmitOutcome>;
}

/// JSON-RPC implementation of [`ChainClient`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpChainClient {
    endpoint: url::Url,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpChainClient {
    /// Creates a client for the given fullnode endpoint with a bounded
    /// per-call timeout.
    ///
    /// The timeout is enforced in [`Self::call`] only; a second reqwest-level
    /// timer would race it and surface the same deadline as a plain
    /// transport error.
    pub fn new(endpoint: url::Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            endpoint,
            client,
            timeout,
        })
    }

    async fn call<R: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<R> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let fut = async {
            let response = self
                .client
                .post(self.endpoint.clone())
                .json(&body)
                .send()
                .await?
                .json::<RpcEnvelope<R>>()
                .await?;
            match response {
                RpcEnvelope {
                    result: Some(result),
                    ..
                } => Ok(result),
                RpcEnvelope {
                    error: Some(error), ..
                } => Err(Error::ChainRpc {
                    message: format!("{} ({})", error.message, error.code),
                }),
                _ => Err(Error::ChainRpc {
                    message: format!("empty response for {}", method),
                }),
            }
        };
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::RpcTimeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope<R> {
    result: Option<R>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinPage {
    data: Vec<CoinInfo>,
    next_cursor: Option<String>,
    #[serde(default)]
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinInfo {
    coin_object_id: String,
    version: String,
    digest: String,
    balance: String,
}

impl CoinInfo {
    fn into_gas_coin(self) -> Result<GasCoin> {
        let malformed = |what: &str| Error::ChainRpc {
            message: format!("malformed coin {}: {}", what, self.coin_object_id),
        };
        Ok(GasCoin {
            object_ref: ObjectRef {
                id: self.coin_object_id.parse().map_err(|_| malformed("id"))?,
                version: self
                    .version
                    .parse()
                    .map_err(|_| malformed("version"))?,
                digest: self.digest.parse().map_err(|_| malformed("digest"))?,
            },
            balance: self.balance.parse().map_err(|_| malformed("balance"))?,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteResponse {
    digest: String,
    effects: Option<TransactionEffects>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionEffects {
    status: EffectsStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EffectsStatus {
    status: String,
    error: Option<String>,
}

#[async_trait]
impl ChainClient for HttpChainClient {
    async fn reference_gas_price(&self) -> Result<u64> {
        // the node reports the price as a decimal string.
        let price: String =
            self.call("suix_getReferenceGasPrice", json!([])).await?;
        price.parse().map_err(|_| Error::ChainRpc {
            message: format!("malformed gas price: {}", price),
        })
    }

    async fn gas_coins(
        &self,
        owner: SuiAddress,
        min_balance: u64,
    ) -> Result<Vec<GasCoin>> {
        let mut coins = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page: CoinPage = self
                .call(
                    "suix_getCoins",
                    json!([owner.to_string(), "0x2::sui::SUI", &cursor]),
                )
                .await?;
            for info in page.data {
                let coin = info.into_gas_coin()?;
                if coin.balance >= min_balance {
                    coins.push(coin);
                }
            }
            match page.next_cursor {
                // a node repeating a cursor would otherwise loop forever.
                Some(next)
                    if page.has_next_page
                        && cursor.as_ref() != Some(&next) =>
                {
                    cursor = Some(next)
                }
                _ => break,
            }
        }
        Ok(coins)
    }

    async fn execute_transaction(
        &self,
        tx_bytes: &[u8],
        signatures: &[SerializedSignature],
    ) -> Result<SubmitOutcome> {
        let signatures = signatures
            .iter()
            .map(SerializedSignature::to_base64)
            .collect::<Vec<_>>();
        let submitted = self
            .call::<ExecuteResponse>(
                "sui_executeTransactionBlock",
                json!([
                    base64::encode(tx_bytes),
                    signatures,
                    { "showEffects": true },
                    "WaitForLocalExecution",
                ]),
            )
            .await;
        let response = match submitted {
            Ok(response) => response,
            // a reset or garbled reply after the send means the node may
            // have executed the transaction; only a connection failure
            // proves the bytes never left the relay.
            Err(Error::Http(e)) if !e.is_connect() => {
                return Err(Error::SubmitInterrupted {
                    message: e.to_string(),
                })
            }
            Err(e) => return Err(e),
        };
        let digest: TransactionDigest =
            response.digest.parse().map_err(|_| Error::ChainRpc {
                message: format!("malformed digest: {}", response.digest),
            })?;
        match response.effects {
            Some(effects) if effects.status.status == "success" => {
                Ok(SubmitOutcome::Executed { digest })
            }
            Some(effects) => Ok(SubmitOutcome::Rejected {
                reason: effects
                    .status
                    .error
                    .unwrap_or_else(|| "execution failed".to_string()),
            }),
            None => Err(Error::ChainRpc {
                message: "node returned no execution effects".to_string(),
            }),
        }
    }
}
