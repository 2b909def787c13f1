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
//! The sponsorship flow: policy check, gas attachment and fee-payer signing.

use crate::context::RelayerContext;
use crate::error::Error;
use crate::policy::SponsorshipPolicy;
use crate::store::{now_millis, PendingSponsorship, PendingStore};
use crate::transaction::{
    self, DecodedTransaction, GasData, TransactionData, TransactionDataV1,
    TransactionExpiration,
};
use crate::types::{SuiAddress, TransactionDigest};

/// A validated request to sponsor a transaction.
#[derive(Debug)]
pub struct SponsorshipRequest {
    /// The decoded transaction kind the user wants executed.
    pub decoded: DecodedTransaction,
    /// The user that will countersign.
    pub sender: SuiAddress,
    /// The lowercased network name.
    pub network: String,
    /// The request's allow-lists.
    pub policy: SponsorshipPolicy,
}

/// The outcome of a successful sponsorship.
#[derive(Debug, Clone)]
pub struct SponsoredTransaction {
    /// The digest the user must quote when executing.
    pub digest: TransactionDigest,
    /// The full, fee-payer-backed transaction bytes the user must sign.
    pub sponsored_bytes: Vec<u8>,
}

/// Sponsors a transaction: checks policy, claims a gas coin, wraps the kind
/// into full transaction data with the relay as fee payer, signs it and
/// records it as pending.
///
/// On any failure past the claim the coin goes straight back to the pool, so
/// a rejected request leaves no state behind.
pub async fn sponsor_transaction<S: PendingStore>(
    ctx: &RelayerContext,
    store: &S,
    request: SponsorshipRequest,
) -> crate::Result<SponsoredTransaction> {
    let chain = ctx.chain_client(&request.network)?;
    let pool = ctx.gas_pool(&request.network)?;
    request
        .policy
        .check(&request.decoded, &request.sender, &ctx.config.sponsor)?;

    let gas_coin = pool.claim().ok_or(Error::InsufficientRelayFunds)?;
    let sponsored: crate::Result<SponsoredTransaction> = async {
        let price = chain.reference_gas_price().await?;
        let data = TransactionData::V1(TransactionDataV1 {
            kind: request.decoded.clone().into_kind(),
            sender: request.sender,
            gas_data: GasData {
                payment: vec![gas_coin.object_ref],
                owner: ctx.fee_payer().address(),
                price,
                budget: ctx.config.sponsor.gas_budget,
            },
            expiration: TransactionExpiration::None,
        });
        let sponsored_bytes = data.to_bcs_bytes()?;
        let digest = transaction::transaction_digest(&sponsored_bytes);
        let fee_payer_signature = ctx.fee_payer().sign(&sponsored_bytes);
        store.insert_pending(
            &digest,
            PendingSponsorship {
                sponsored_bytes: sponsored_bytes.clone(),
                fee_payer_signature,
                gas_coin: gas_coin.clone(),
                sender: request.sender,
                network: request.network.clone(),
                created_at_ms: now_millis(),
            },
        )?;
        Ok(SponsoredTransaction {
            digest,
            sponsored_bytes,
        })
    }
    .await;

    match sponsored {
        Ok(outcome) => {
            tracing::event!(
                target: crate::probe::TARGET,
                tracing::Level::DEBUG,
                kind = %crate::probe::Kind::Sponsorship,
                network = %request.network,
                digest = %outcome.digest,
                sender = %request.sender,
            );
            Ok(outcome)
        }
        Err(e) => {
            pool.release(gas_coin);
            Err(e)
        }
    }
}
