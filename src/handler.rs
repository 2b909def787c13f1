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
//! HTTP request handlers for the sponsorship API.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use warp::http::StatusCode;

use crate::context::RelayerContext;
use crate::error::Error;
use crate::execution::{self, ExecutionStatus};
use crate::keys::SerializedSignature;
use crate::policy::SponsorshipPolicy;
use crate::sponsor::{self, SponsorshipRequest};
use crate::store::PendingStore;
use crate::transaction::DecodedTransaction;
use crate::types::{MoveCallTarget, SuiAddress, TransactionDigest};

/// Body of `POST /api/v1/sponsor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorRequestBody {
    /// Base64-encoded BCS transaction kind.
    pub transaction_kind_bytes: String,
    /// The address that will countersign, as `0x…`.
    pub sender: String,
    /// The network to sponsor on.
    pub network: String,
    /// Optional allow-list of `package::module::function` targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_move_call_targets: Option<Vec<String>>,
    /// Optional allow-list of addresses; defaults to `[sender]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_addresses: Option<Vec<String>>,
}

/// Body of a successful `POST /api/v1/sponsor` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SponsorResponseBody {
    /// The digest to quote to `/execute`.
    pub digest: TransactionDigest,
    /// Base64-encoded BCS of the full sponsored transaction.
    pub sponsored_tx_bytes: String,
}

/// Body of `POST /api/v1/execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequestBody {
    /// The digest returned by `/sponsor`.
    pub digest: String,
    /// The user's base64 serialized signature over the sponsored bytes.
    pub signature: String,
}

/// Body of a `POST /api/v1/execute` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponseBody {
    /// The observed execution status.
    pub status: ExecutionStatus,
    /// The on-chain digest, when execution was observed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_digest: Option<TransactionDigest>,
    /// The chain's failure reason, for failed executions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Body of `GET /api/v1/health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponseBody {
    /// The relay's fee-payer address.
    pub fee_payer_address: SuiAddress,
    /// Gas pool stats per served network.
    pub networks: HashMap<String, NetworkHealth>,
    /// Number of sponsorships awaiting a countersignature.
    pub pending_sponsorships: usize,
}

/// Gas pool health of one network.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkHealth {
    /// Coins ready to back a sponsorship.
    pub available_gas_coins: usize,
    /// Coins currently attached to pending sponsorships.
    pub reserved_gas_coins: usize,
}

/// Structured error reply, carried on every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable description.
    pub error: String,
    /// Stable machine-readable error kind.
    pub kind: String,
}

/// Handles `POST /api/v1/sponsor`.
pub async fn handle_sponsor<S: PendingStore>(
    ctx: Arc<RelayerContext>,
    store: Arc<S>,
    body: SponsorRequestBody,
) -> Result<impl warp::Reply, Infallible> {
    match sponsor_inner(&ctx, store.as_ref(), body).await {
        Ok(response) => Ok(warp::reply::with_status(
            warp::reply::json(&response),
            StatusCode::OK,
        )),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn sponsor_inner<S: PendingStore>(
    ctx: &RelayerContext,
    store: &S,
    body: SponsorRequestBody,
) -> crate::Result<SponsorResponseBody> {
    let kind_bytes = base64::decode(&body.transaction_kind_bytes)?;
    let decoded = DecodedTransaction::decode(&kind_bytes)?;
    let sender: SuiAddress = body.sender.parse()?;
    let allowed_move_call_targets = body
        .allowed_move_call_targets
        .map(|targets| {
            targets
                .iter()
                .map(|t| t.parse::<MoveCallTarget>())
                .collect::<crate::Result<Vec<_>>>()
        })
        .transpose()?;
    let allowed_addresses = body
        .allowed_addresses
        .map(|addresses| {
            addresses
                .iter()
                .map(|a| a.parse::<SuiAddress>())
                .collect::<crate::Result<Vec<_>>>()
        })
        .transpose()?;
    let request = SponsorshipRequest {
        decoded,
        sender,
        network: body.network.to_lowercase(),
        policy: SponsorshipPolicy {
            allowed_move_call_targets,
            allowed_addresses,
        },
    };
    let sponsored = sponsor::sponsor_transaction(ctx, store, request).await?;
    Ok(SponsorResponseBody {
        digest: sponsored.digest,
        sponsored_tx_bytes: base64::encode(&sponsored.sponsored_bytes),
    })
}

/// Handles `POST /api/v1/execute`.
pub async fn handle_execute<S: PendingStore>(
    ctx: Arc<RelayerContext>,
    store: Arc<S>,
    body: ExecuteRequestBody,
) -> Result<impl warp::Reply, Infallible> {
    match execute_inner(&ctx, store.as_ref(), body).await {
        Ok(response) => Ok(warp::reply::with_status(
            warp::reply::json(&response),
            StatusCode::OK,
        )),
        Err(e) => Ok(error_reply(&e)),
    }
}

async fn execute_inner<S: PendingStore>(
    ctx: &RelayerContext,
    store: &S,
    body: ExecuteRequestBody,
) -> crate::Result<ExecuteResponseBody> {
    let digest: TransactionDigest = body.digest.parse()?;
    let signature = SerializedSignature::from_base64(&body.signature)?;
    let outcome =
        execution::execute_sponsored(ctx, store, &digest, &signature).await?;
    Ok(ExecuteResponseBody {
        status: outcome.status,
        transaction_digest: outcome.digest,
        reason: outcome.reason,
    })
}

/// Handles `GET /api/v1/health`.
pub async fn handle_health<S: PendingStore>(
    ctx: Arc<RelayerContext>,
    store: Arc<S>,
) -> Result<impl warp::Reply, Infallible> {
    let mut networks = HashMap::new();
    for name in ctx.networks() {
        // every name yielded by the context has a pool.
        if let Ok(pool) = ctx.gas_pool(name) {
            networks.insert(
                name.to_string(),
                NetworkHealth {
                    available_gas_coins: pool.available(),
                    reserved_gas_coins: pool.reserved(),
                },
            );
        }
    }
    let pending_sponsorships = match store.pending_count() {
        Ok(count) => count,
        Err(e) => return Ok(error_reply(&e)),
    };
    let body = HealthResponseBody {
        fee_payer_address: ctx.fee_payer().address(),
        networks,
        pending_sponsorships,
    };
    Ok(warp::reply::with_status(
        warp::reply::json(&body),
        StatusCode::OK,
    ))
}

/// Maps an error onto an HTTP status and a structured JSON body.
pub fn error_reply(error: &Error) -> warp::reply::WithStatus<warp::reply::Json> {
    let status = match error {
        Error::TransactionDecode { .. }
        | Error::InvalidAddress { .. }
        | Error::InvalidDigest { .. }
        | Error::InvalidMoveCallTarget { .. }
        | Error::InvalidSignature { .. }
        | Error::UnsupportedNetwork { .. }
        | Error::Base64(_) => StatusCode::BAD_REQUEST,
        Error::TargetNotAllowed { .. } | Error::AddressNotAllowed { .. } => {
            StatusCode::FORBIDDEN
        }
        Error::UnknownDigest { .. } => StatusCode::NOT_FOUND,
        Error::SponsorshipExpired { .. } | Error::AlreadyExecuted { .. } => {
            StatusCode::GONE
        }
        Error::InsufficientRelayFunds => StatusCode::SERVICE_UNAVAILABLE,
        Error::RpcTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        Error::ChainRpc { .. }
        | Error::SubmitInterrupted { .. }
        | Error::Http(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let body = ErrorResponse {
        error: error.to_string(),
        kind: error.kind().to_string(),
    };
    warp::reply::with_status(warp::reply::json(&body), status)
}
