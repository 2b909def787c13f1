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
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # Suilens Gas-Sponsorship Relay
//!
//! The relay lets Suilens users submit transactions without holding any SUI
//! for gas. The web client builds the *transaction kind* (the operations of
//! a transaction, without fee metadata), and the relay underwrites the gas
//! fee with its own funded coins and co-signs as the fee payer.
//!
//! ## Protocol
//!
//! 1. The client POSTs the unsigned transaction-kind bytes to `/api/v1/sponsor`,
//!    together with the sender address, the target network, and optional
//!    allow-lists restricting which Move entry points and which addresses the
//!    transaction may touch.
//! 2. The relay validates the request, decodes the kind, enforces the
//!    allow-lists, attaches one of its own gas coins, signs the sponsored
//!    transaction with the fee-payer key, and returns the transaction digest
//!    plus the sponsored bytes.
//! 3. The client countersigns the sponsored bytes with the user's wallet key
//!    and POSTs `{digest, signature}` to `/api/v1/execute`.
//! 4. The relay combines both signatures, submits the transaction to the
//!    chain, and reports the execution outcome.
//!
//! A sponsorship is executable at most once and only within a bounded expiry
//! window; a background sweep reclaims gas coins from sponsorships that were
//! never executed.

/// A module for talking to a Sui fullnode over JSON-RPC.
pub mod chain;
/// A module for loading and validating the relayer configuration.
pub mod config;
/// A module for managing the context of the relayer.
pub mod context;
/// Error and Result types of the relayer.
pub mod error;
/// A module for coordinating the execution of sponsored transactions.
pub mod execution;
/// A module for managing the pool of fee-payer gas coins.
pub mod gas_pool;
/// HTTP request handlers for the sponsorship API.
pub mod handler;
/// Fee-payer key handling and serialized signatures.
pub mod keys;
/// Allow-list policy enforcement for sponsored transactions.
pub mod policy;
/// A module used for debugging relayer lifecycle and sponsorship state.
pub mod probe;
/// A module for underwriting transactions with relay-owned gas.
pub mod sponsor;
/// A module for storing pending sponsorships.
pub mod store;
/// A module for building the web services and background tasks.
pub mod service;
/// The transaction wire model and decoder.
pub mod transaction;
/// Strongly-typed wire primitives (addresses, digests, targets).
pub mod types;

pub use error::{Error, Result};

#[cfg(test)]
mod test;
#[cfg(test)]
mod test_utils;
