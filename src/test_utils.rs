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
//! Shared fixtures for the test suite: a scriptable chain client,
//! deterministic keys and transaction-kind builders.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ed25519_dalek::{Keypair, PublicKey, SecretKey};
use parking_lot::Mutex;

use crate::chain::{ChainClient, GasCoin, SubmitOutcome};
use crate::config::SuilensRelayerConfig;
use crate::context::RelayerContext;
use crate::error::Error;
use crate::keys::{address_for_public_key, FeePayer};
use crate::transaction::{
    transaction_digest, Argument, CallArg, Command, ProgrammableMoveCall,
    ProgrammableTransaction, TransactionKind,
};
use crate::types::{
    MoveCallTarget, ObjectDigest, ObjectId, ObjectRef, SuiAddress,
};

/// What the mock chain does when a transaction is submitted.
#[derive(Debug, Clone)]
pub enum SubmitBehavior {
    /// Execute successfully, echoing the content digest back.
    Execute,
    /// Report an on-chain abort with the given reason.
    Reject(String),
    /// Time out without revealing the outcome.
    Timeout,
    /// Accept the bytes, then drop the connection before replying.
    Interrupted,
    /// Fail at the transport layer before the node sees the bytes.
    Transport,
}

struct MockInner {
    gas_price: Mutex<u64>,
    coins: Mutex<Vec<GasCoin>>,
    behavior: Mutex<SubmitBehavior>,
    submissions: AtomicUsize,
}

/// A scriptable in-process [`ChainClient`].
#[derive(Clone)]
pub struct MockChainClient {
    inner: Arc<MockInner>,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MockInner {
                gas_price: Mutex::new(1_000),
                coins: Mutex::new(Vec::new()),
                behavior: Mutex::new(SubmitBehavior::Execute),
                submissions: AtomicUsize::new(0),
            }),
        }
    }

    pub fn set_gas_price(&self, price: u64) {
        *self.inner.gas_price.lock() = price;
    }

    pub fn set_coins(&self, coins: Vec<GasCoin>) {
        *self.inner.coins.lock() = coins;
    }

    pub fn set_behavior(&self, behavior: SubmitBehavior) {
        *self.inner.behavior.lock() = behavior;
    }

    /// How many transactions were actually submitted to this mock.
    pub fn submissions(&self) -> usize {
        self.inner.submissions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn reference_gas_price(&self) -> crate::Result<u64> {
        Ok(*self.inner.gas_price.lock())
    }

    async fn gas_coins(
        &self,
        _owner: SuiAddress,
        min_balance: u64,
    ) -> crate::Result<Vec<GasCoin>> {
        Ok(self
            .inner
            .coins
            .lock()
            .iter()
            .filter(|c| c.balance >= min_balance)
            .cloned()
            .collect())
    }

    async fn execute_transaction(
        &self,
        tx_bytes: &[u8],
        _signatures: &[crate::keys::SerializedSignature],
    ) -> crate::Result<SubmitOutcome> {
        let behavior = self.inner.behavior.lock().clone();
        match behavior {
            SubmitBehavior::Timeout => Err(Error::RpcTimeout { timeout_ms: 1 }),
            SubmitBehavior::Interrupted => {
                // the node received the bytes, so this counts as a
                // submission even though no reply arrived.
                self.inner.submissions.fetch_add(1, Ordering::SeqCst);
                Err(Error::SubmitInterrupted {
                    message: "connection reset by peer".to_string(),
                })
            }
            SubmitBehavior::Transport => {
                Err(Error::Generic("mock transport failure"))
            }
            SubmitBehavior::Execute => {
                self.inner.submissions.fetch_add(1, Ordering::SeqCst);
                Ok(SubmitOutcome::Executed {
                    digest: transaction_digest(tx_bytes),
                })
            }
            SubmitBehavior::Reject(reason) => {
                self.inner.submissions.fetch_add(1, Ordering::SeqCst);
                Ok(SubmitOutcome::Rejected { reason })
            }
        }
    }
}

/// A deterministic user keypair derived from a single seed byte.
pub fn user_keypair(seed: u8) -> Keypair {
    let secret = SecretKey::from_bytes(&[seed; 32]).unwrap();
    let public = PublicKey::from(&secret);
    Keypair { secret, public }
}

/// The address controlled by [`user_keypair`] for the same seed.
pub fn user_address(seed: u8) -> SuiAddress {
    address_for_public_key(&user_keypair(seed).public)
}

/// A fee payer with a fixed secret, stable across tests.
pub fn test_fee_payer() -> FeePayer {
    FeePayer::from_secret_bytes(&[7u8; 32]).unwrap()
}

/// A distinct, funded gas coin.
pub fn gas_coin(id_byte: u8, balance: u64) -> GasCoin {
    GasCoin {
        object_ref: ObjectRef {
            id: ObjectId(SuiAddress::new([id_byte; 32])),
            version: 1,
            digest: ObjectDigest::new([id_byte; 32]),
        },
        balance,
    }
}

/// Kind bytes splitting `amount` off the gas coin and sending it to
/// `recipient`.
pub fn transfer_kind_bytes(recipient: &SuiAddress, amount: u64) -> Vec<u8> {
    let kind = TransactionKind::ProgrammableTransaction(ProgrammableTransaction {
        inputs: vec![
            CallArg::Pure(bcs::to_bytes(&amount).unwrap()),
            CallArg::Pure(recipient.as_bytes().to_vec()),
        ],
        commands: vec![
            Command::SplitCoins(Argument::GasCoin, vec![Argument::Input(0)]),
            Command::TransferObjects(
                vec![Argument::NestedResult(0, 0)],
                Argument::Input(1),
            ),
        ],
    });
    bcs::to_bytes(&kind).unwrap()
}

/// Kind bytes invoking `target` with the caller's own address as the single
/// pure argument.
pub fn move_call_kind_bytes(target: &str, caller: &SuiAddress) -> Vec<u8> {
    let target: MoveCallTarget = target.parse().unwrap();
    let kind = TransactionKind::ProgrammableTransaction(ProgrammableTransaction {
        inputs: vec![CallArg::Pure(caller.as_bytes().to_vec())],
        commands: vec![Command::MoveCall(Box::new(ProgrammableMoveCall {
            package: ObjectId(target.package),
            module: target.module.clone(),
            function: target.function.clone(),
            type_arguments: vec![],
            arguments: vec![Argument::Input(0)],
        }))],
    });
    bcs::to_bytes(&kind).unwrap()
}

/// A configuration with short windows suitable for tests.
pub fn test_config() -> SuilensRelayerConfig {
    let mut config = SuilensRelayerConfig::default();
    config.sponsor.sponsorship_ttl_ms = 60_000;
    config.sponsor.gas_budget = 10_000_000;
    config
}

/// A context serving a single `testnet` network over the given mock.
pub fn test_context(chain: MockChainClient) -> RelayerContext {
    let mut clients: HashMap<String, Arc<dyn ChainClient>> = HashMap::new();
    clients.insert("testnet".to_string(), Arc::new(chain));
    RelayerContext::with_chain_clients(test_config(), test_fee_payer(), clients)
}
