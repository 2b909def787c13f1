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
//! Wires the HTTP routes and the background maintenance tasks.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::Future;
use warp::http::StatusCode;
use warp::Filter;

use crate::context::RelayerContext;
use crate::handler::{self, ErrorResponse};
use crate::store::{now_millis, PendingStore, Terminal};

/// Tombstones outlive the pending window by this factor, so clients polling
/// an expired or executed digest keep getting a precise answer for a while.
const TERMINAL_RETENTION_FACTOR: u64 = 10;

/// Builds the full `/api/v1` route tree over the given context and store.
///
/// Exposed separately from the server so tests can drive it through
/// `warp::test` without binding a socket.
pub fn routes<S: PendingStore + 'static>(
    ctx: Arc<RelayerContext>,
    store: Arc<S>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = Infallible> + Clone {
    let ctx_filter = warp::any().map(move || Arc::clone(&ctx));
    let store_filter = warp::any().map(move || Arc::clone(&store));

    let sponsor_filter = warp::path("sponsor")
        .and(warp::post())
        .and(ctx_filter.clone())
        .and(store_filter.clone())
        .and(warp::body::content_length_limit(1024 * 128))
        .and(warp::body::json())
        .and_then(handler::handle_sponsor)
        .boxed();

    let execute_filter = warp::path("execute")
        .and(warp::post())
        .and(ctx_filter.clone())
        .and(store_filter.clone())
        .and(warp::body::content_length_limit(1024 * 16))
        .and(warp::body::json())
        .and_then(handler::handle_execute)
        .boxed();

    let health_filter = warp::path("health")
        .and(warp::get())
        .and(ctx_filter)
        .and(store_filter)
        .and_then(handler::handle_health)
        .boxed();

    let routes = sponsor_filter.or(execute_filter).or(health_filter).boxed();
    warp::path("api")
        .and(warp::path("v1"))
        .and(routes)
        .recover(handle_rejection)
}

/// Renders rejections (unmatched routes, malformed JSON bodies) as the same
/// structured error body the handlers use.
async fn handle_rejection(
    rejection: warp::Rejection,
) -> Result<impl warp::Reply, Infallible> {
    let (status, error) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "no such route".to_string())
    } else if let Some(e) =
        rejection.find::<warp::filters::body::BodyDeserializeError>()
    {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if rejection
        .find::<warp::reject::PayloadTooLarge>()
        .is_some()
    {
        (StatusCode::PAYLOAD_TOO_LARGE, "payload too large".to_string())
    } else if rejection
        .find::<warp::reject::MethodNotAllowed>()
        .is_some()
    {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "method not allowed".to_string(),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "unhandled rejection".to_string(),
        )
    };
    let body = ErrorResponse {
        error,
        kind: "invalid-payload".to_string(),
    };
    Ok(warp::reply::with_status(warp::reply::json(&body), status))
}

/// Builds the HTTP server with graceful shutdown wired to the context.
pub fn build_web_services<S: PendingStore + 'static>(
    ctx: RelayerContext,
    store: Arc<S>,
) -> crate::Result<(SocketAddr, impl Future<Output = ()> + 'static)> {
    let port = ctx.config.port;
    let mut shutdown_signal = ctx.shutdown_signal();
    let shutdown_signal = async move {
        shutdown_signal.recv().await;
    };
    let cors = warp::cors().allow_any_origin();
    let service = routes(Arc::new(ctx), store)
        .with(cors)
        .with(warp::trace::request());
    warp::serve(service)
        .try_bind_with_graceful_shutdown(([0, 0, 0, 0], port), shutdown_signal)
        .map_err(Into::into)
}

/// Starts the background services: a gas refresh task per network and a
/// single expiry sweeper.
///
/// This does not block; each service runs on its own task until shutdown.
pub async fn ignite<S: PendingStore + 'static>(
    ctx: &RelayerContext,
    store: Arc<S>,
) -> crate::Result<()> {
    for network in ctx.networks() {
        start_gas_refresh(ctx, network.to_string())?;
    }
    start_expiry_sweeper(ctx, store);
    Ok(())
}

/// Periodically re-discovers the fee payer's funded coins and refills the
/// network's pool with the ones not attached to a pending sponsorship.
fn start_gas_refresh(
    ctx: &RelayerContext,
    network: String,
) -> crate::Result<()> {
    let chain = ctx.chain_client(&network)?;
    let pool = ctx.gas_pool(&network)?;
    let owner = ctx.fee_payer().address();
    let min_balance = ctx.config.sponsor.min_coin_balance;
    let interval =
        Duration::from_millis(ctx.config.sponsor.gas_refresh_interval_ms);
    let mut shutdown_signal = ctx.shutdown_signal();
    tracing::debug!("Gas refresh task for ({}) started.", network);
    let refresh = async move {
        loop {
            match chain.gas_coins(owner, min_balance).await {
                Ok(coins) => {
                    pool.refill(coins);
                    tracing::event!(
                        target: crate::probe::TARGET,
                        tracing::Level::TRACE,
                        kind = %crate::probe::Kind::GasPool,
                        network = %network,
                        available = pool.available(),
                        reserved = pool.reserved(),
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to refresh gas coins for ({}): {}",
                        network,
                        e
                    );
                }
            }
            tokio::time::sleep(interval).await;
        }
    };
    let task = async move {
        tokio::select! {
            _ = refresh => {},
            _ = shutdown_signal.recv() => {
                tracing::trace!("Stopping the gas refresh task");
            },
        }
    };
    tokio::task::spawn(task);
    Ok(())
}

/// Periodically expires stale sponsorships, returning their coins to the
/// pool, and prunes old tombstones.
fn start_expiry_sweeper<S: PendingStore + 'static>(
    ctx: &RelayerContext,
    store: Arc<S>,
) {
    let ctx = ctx.clone();
    let mut shutdown_signal = ctx.shutdown_signal();
    let ttl_ms = ctx.config.sponsor.sponsorship_ttl_ms;
    let retention_ms = ttl_ms.saturating_mul(TERMINAL_RETENTION_FACTOR);
    let interval = Duration::from_millis(ctx.config.sponsor.sweep_interval_ms);
    tracing::debug!("Expiry sweeper started.");
    let sweep = async move {
        loop {
            tokio::time::sleep(interval).await;
            let now = now_millis();
            if let Err(e) = sweep_once(&ctx, store.as_ref(), ttl_ms, now) {
                tracing::warn!("Expiry sweep failed: {}", e);
            }
            match store.prune_terminal(retention_ms, now) {
                Ok(0) => {}
                Ok(pruned) => {
                    tracing::trace!("Pruned {} old tombstones", pruned);
                }
                Err(e) => {
                    tracing::warn!("Tombstone pruning failed: {}", e);
                }
            }
        }
    };
    let task = async move {
        tokio::select! {
            _ = sweep => {},
            _ = shutdown_signal.recv() => {
                tracing::trace!("Stopping the expiry sweeper");
            },
        }
    };
    tokio::task::spawn(task);
}

fn sweep_once<S: PendingStore>(
    ctx: &RelayerContext,
    store: &S,
    ttl_ms: u64,
    now: u64,
) -> crate::Result<()> {
    for (digest, entry) in store.sweep_expired(ttl_ms, now)? {
        store.record_terminal(&digest, Terminal::Expired { at_ms: now })?;
        if let Ok(pool) = ctx.gas_pool(&entry.network) {
            pool.release(entry.gas_coin);
        }
        tracing::event!(
            target: crate::probe::TARGET,
            tracing::Level::DEBUG,
            kind = %crate::probe::Kind::Sweep,
            digest = %digest,
            sender = %entry.sender,
        );
    }
    Ok(())
}
