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
//! End-to-end tests driving the HTTP routes against a mock chain.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::json;
use warp::http::StatusCode;

use crate::chain::ChainClient;
use crate::context::RelayerContext;
use crate::execution::ExecutionStatus;
use crate::handler::{
    ErrorResponse, ExecuteResponseBody, HealthResponseBody, SponsorResponseBody,
};
use crate::keys::sign_transaction;
use crate::service;
use crate::store::mem::InMemoryStore;
use crate::store::PendingStore;
use crate::test_utils::*;
use crate::transaction::TransactionData;
use crate::types::SuiAddress;

struct Harness {
    ctx: Arc<RelayerContext>,
    store: Arc<InMemoryStore>,
    chain: MockChainClient,
}

impl Harness {
    fn new() -> Self {
        let chain = MockChainClient::new();
        let ctx = Arc::new(test_context(chain.clone()));
        let pool = ctx.gas_pool("testnet").unwrap();
        pool.refill(vec![
            gas_coin(0xa1, 10_000_000_000),
            gas_coin(0xa2, 10_000_000_000),
            gas_coin(0xa3, 10_000_000_000),
        ]);
        Self {
            ctx,
            store: Arc::new(InMemoryStore::default()),
            chain,
        }
    }

    fn routes(
        &self,
    ) -> impl warp::Filter<
        Extract = (impl warp::Reply,),
        Error = std::convert::Infallible,
    > + Clone {
        service::routes(self.ctx.clone(), self.store.clone())
    }

    async fn sponsor(
        &self,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let response = warp::test::request()
            .method("POST")
            .path("/api/v1/sponsor")
            .json(&body)
            .reply(&self.routes())
            .await;
        let status = response.status();
        (status, serde_json::from_slice(response.body()).unwrap())
    }

    async fn execute(
        &self,
        digest: &str,
        signature: &str,
    ) -> (StatusCode, serde_json::Value) {
        let response = warp::test::request()
            .method("POST")
            .path("/api/v1/execute")
            .json(&json!({ "digest": digest, "signature": signature }))
            .reply(&self.routes())
            .await;
        let status = response.status();
        (status, serde_json::from_slice(response.body()).unwrap())
    }

    /// Sponsors a transfer of `amount` to `recipient`, countersigned by the
    /// user behind `seed`, and returns the digest and the user signature.
    async fn sponsored_transfer(
        &self,
        seed: u8,
        recipient: &SuiAddress,
        amount: u64,
    ) -> (String, String) {
        let sender = user_address(seed);
        let (status, body) = self
            .sponsor(json!({
                "transactionKindBytes":
                    base64::encode(transfer_kind_bytes(recipient, amount)),
                "sender": sender.to_string(),
                "network": "testnet",
                "allowedAddresses": [recipient.to_string()],
            }))
            .await;
        assert_eq!(status, StatusCode::OK, "sponsor failed: {}", body);
        let sponsored: SponsorResponseBody =
            serde_json::from_value(body).unwrap();
        let sponsored_bytes =
            base64::decode(&sponsored.sponsored_tx_bytes).unwrap();
        let signature =
            sign_transaction(&user_keypair(seed), &sponsored_bytes);
        (sponsored.digest.to_string(), signature.to_base64())
    }
}

#[tokio::test]
async fn sponsors_a_transfer_back_to_the_sender() {
    let h = Harness::new();
    let sender = user_address(1);
    let (status, body) = h
        .sponsor(json!({
            "transactionKindBytes":
                base64::encode(transfer_kind_bytes(&sender, 1_000_000)),
            "sender": sender.to_string(),
            "network": "testnet",
        }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let sponsored: SponsorResponseBody = serde_json::from_value(body).unwrap();

    // the returned bytes decode to full transaction data carrying the relay
    // as fee payer.
    let bytes = base64::decode(&sponsored.sponsored_tx_bytes).unwrap();
    let TransactionData::V1(data) =
        TransactionData::from_bcs_bytes(&bytes).unwrap();
    assert_eq!(data.sender, sender);
    assert_eq!(data.gas_data.owner, test_fee_payer().address());
    assert_eq!(data.gas_data.budget, test_config().sponsor.gas_budget);
    assert_eq!(data.gas_data.payment.len(), 1);

    assert_eq!(h.store.pending_count().unwrap(), 1);
    let pool = h.ctx.gas_pool("testnet").unwrap();
    assert_eq!(pool.available(), 2);
    assert_eq!(pool.reserved(), 1);
}

#[tokio::test]
async fn allowed_addresses_gate_the_recipient() {
    let h = Harness::new();
    let sender = user_address(1);
    let recipient = user_address(2);
    let other = user_address(3);

    // "send 1000000 units to recipient" with the recipient allow-listed.
    let (status, _) = h
        .sponsor(json!({
            "transactionKindBytes":
                base64::encode(transfer_kind_bytes(&recipient, 1_000_000)),
            "sender": sender.to_string(),
            "network": "testnet",
            "allowedAddresses": [recipient.to_string()],
        }))
        .await;
    assert_eq!(status, StatusCode::OK);

    // same transfer, but the allow-list names a different address.
    let (status, body) = h
        .sponsor(json!({
            "transactionKindBytes":
                base64::encode(transfer_kind_bytes(&recipient, 1_000_000)),
            "sender": sender.to_string(),
            "network": "testnet",
            "allowedAddresses": [other.to_string()],
        }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let error: ErrorResponse = serde_json::from_value(body).unwrap();
    assert_eq!(error.kind, "address-not-allowed");
}

#[tokio::test]
async fn rejected_sponsorships_leave_no_state_behind() {
    let h = Harness::new();
    let sender = user_address(1);
    let (status, body) = h
        .sponsor(json!({
            "transactionKindBytes": base64::encode(move_call_kind_bytes(
                "0x2::coin::mint",
                &sender,
            )),
            "sender": sender.to_string(),
            "network": "testnet",
            "allowedMoveCallTargets": ["0x2::coin::burn"],
        }))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let error: ErrorResponse = serde_json::from_value(body).unwrap();
    assert_eq!(error.kind, "target-not-allowed");
    assert_eq!(h.store.pending_count().unwrap(), 0);
    let pool = h.ctx.gas_pool("testnet").unwrap();
    assert_eq!(pool.available(), 3);
    assert_eq!(pool.reserved(), 0);
}

#[tokio::test]
async fn sponsor_and_execute_round_trip() {
    let h = Harness::new();
    let recipient = user_address(2);
    let (digest, signature) = h.sponsored_transfer(1, &recipient, 1_000_000).await;

    let (status, body) = h.execute(&digest, &signature).await;
    assert_eq!(status, StatusCode::OK, "execute failed: {}", body);
    let executed: ExecuteResponseBody = serde_json::from_value(body).unwrap();
    assert_eq!(executed.status, ExecutionStatus::Success);
    assert!(executed.transaction_digest.is_some());
    assert_eq!(h.chain.submissions(), 1);

    // the coin is consumed, not returned.
    let pool = h.ctx.gas_pool("testnet").unwrap();
    assert_eq!(pool.available(), 2);
    assert_eq!(pool.reserved(), 0);
    assert_eq!(h.store.pending_count().unwrap(), 0);
}

#[tokio::test]
async fn a_digest_executes_at_most_once() {
    let h = Harness::new();
    let recipient = user_address(2);
    let (digest, signature) = h.sponsored_transfer(1, &recipient, 1_000_000).await;

    let (status, _) = h.execute(&digest, &signature).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = h.execute(&digest, &signature).await;
    assert_eq!(status, StatusCode::GONE);
    let error: ErrorResponse = serde_json::from_value(body).unwrap();
    assert_eq!(error.kind, "already-executed");
    // exactly one submission reached the chain.
    assert_eq!(h.chain.submissions(), 1);
}

#[tokio::test]
async fn unknown_digests_are_a_distinct_error() {
    let h = Harness::new();
    let recipient = user_address(2);
    let (_, signature) = h.sponsored_transfer(1, &recipient, 1_000_000).await;
    let bogus = bs58::encode([9u8; 32]).into_string();
    let (status, body) = h.execute(&bogus, &signature).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: ErrorResponse = serde_json::from_value(body).unwrap();
    assert_eq!(error.kind, "unknown-digest");
}

#[tokio::test]
async fn expired_sponsorships_report_expiry_and_release_the_coin() {
    let h = Harness::new();
    let recipient = user_address(2);
    let (digest, signature) = h.sponsored_transfer(1, &recipient, 1_000_000).await;

    // age the entry past the ttl.
    let parsed = digest.parse().unwrap();
    let mut entry = h.store.take_pending(&parsed).unwrap().unwrap();
    entry.created_at_ms -= test_config().sponsor.sponsorship_ttl_ms + 1;
    h.store.insert_pending(&parsed, entry).unwrap();

    let (status, body) = h.execute(&digest, &signature).await;
    assert_eq!(status, StatusCode::GONE);
    let error: ErrorResponse = serde_json::from_value(body).unwrap();
    assert_eq!(error.kind, "sponsorship-expired");
    assert_eq!(h.chain.submissions(), 0);

    // the coin went back to the pool, and the expiry sticks.
    let pool = h.ctx.gas_pool("testnet").unwrap();
    assert_eq!(pool.available(), 3);
    let (status, body) = h.execute(&digest, &signature).await;
    assert_eq!(status, StatusCode::GONE);
    let error: ErrorResponse = serde_json::from_value(body).unwrap();
    assert_eq!(error.kind, "sponsorship-expired");
}

#[tokio::test]
async fn a_wrong_countersignature_keeps_the_sponsorship_redeemable() {
    let h = Harness::new();
    let recipient = user_address(2);
    let (digest, _) = h.sponsored_transfer(1, &recipient, 1_000_000).await;

    // countersigned by the wrong user.
    let parsed = digest.parse().unwrap();
    let entry = h.store.take_pending(&parsed).unwrap().unwrap();
    let forged =
        sign_transaction(&user_keypair(9), &entry.sponsored_bytes).to_base64();
    let genuine =
        sign_transaction(&user_keypair(1), &entry.sponsored_bytes).to_base64();
    h.store.insert_pending(&parsed, entry).unwrap();

    let (status, body) = h.execute(&digest, &forged).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_value(body).unwrap();
    assert_eq!(error.kind, "invalid-signature");
    assert_eq!(h.chain.submissions(), 0);

    // the right signature still goes through.
    let (status, _) = h.execute(&digest, &genuine).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.chain.submissions(), 1);
}

#[tokio::test]
async fn wrong_countersignatures_never_block_a_valid_one() {
    let h = Harness::new();
    let recipient = user_address(2);
    let (digest, _) = h.sponsored_transfer(1, &recipient, 1_000_000).await;

    let parsed = digest.parse().unwrap();
    let entry = h.store.peek_pending(&parsed).unwrap().unwrap();
    let forged =
        sign_transaction(&user_keypair(9), &entry.sponsored_bytes).to_base64();
    let genuine =
        sign_transaction(&user_keypair(1), &entry.sponsored_bytes).to_base64();

    // a burst of forged attempts racing one genuine execute: the genuine
    // one must never observe the digest as missing.
    let mut handles = Vec::new();
    for _ in 0..8 {
        let routes = h.routes();
        let digest = digest.clone();
        let forged = forged.clone();
        handles.push(tokio::spawn(async move {
            warp::test::request()
                .method("POST")
                .path("/api/v1/execute")
                .json(&json!({ "digest": digest, "signature": forged }))
                .reply(&routes)
                .await
        }));
    }
    let genuine_handle = {
        let routes = h.routes();
        let digest = digest.clone();
        tokio::spawn(async move {
            warp::test::request()
                .method("POST")
                .path("/api/v1/execute")
                .json(&json!({ "digest": digest, "signature": genuine }))
                .reply(&routes)
                .await
        })
    };

    let response = genuine_handle.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let executed: ExecuteResponseBody =
        serde_json::from_slice(response.body()).unwrap();
    assert_eq!(executed.status, ExecutionStatus::Success);

    for handle in handles {
        let response = handle.await.unwrap();
        let error: ErrorResponse =
            serde_json::from_slice(response.body()).unwrap();
        // forged attempts fail on the signature, or on the tombstone once
        // the genuine execute went through. Never on a missing digest.
        match response.status() {
            StatusCode::BAD_REQUEST => {
                assert_eq!(error.kind, "invalid-signature")
            }
            StatusCode::GONE => assert_eq!(error.kind, "already-executed"),
            status => panic!("unexpected status {}: {}", status, error.error),
        }
    }
    assert_eq!(h.chain.submissions(), 1);
}

#[tokio::test]
async fn a_submission_timeout_consumes_the_digest_as_unknown() {
    let h = Harness::new();
    h.chain.set_behavior(SubmitBehavior::Timeout);
    let recipient = user_address(2);
    let (digest, signature) = h.sponsored_transfer(1, &recipient, 1_000_000).await;

    let (status, body) = h.execute(&digest, &signature).await;
    assert_eq!(status, StatusCode::OK);
    let executed: ExecuteResponseBody = serde_json::from_value(body).unwrap();
    assert_eq!(executed.status, ExecutionStatus::Unknown);
    assert!(executed.transaction_digest.is_none());

    // the digest must never be submittable again.
    h.chain.set_behavior(SubmitBehavior::Execute);
    let (status, body) = h.execute(&digest, &signature).await;
    assert_eq!(status, StatusCode::GONE);
    let error: ErrorResponse = serde_json::from_value(body).unwrap();
    assert_eq!(error.kind, "already-executed");
    assert_eq!(h.chain.submissions(), 0);
}

#[tokio::test]
async fn an_interrupted_submission_consumes_the_digest_as_unknown() {
    let h = Harness::new();
    h.chain.set_behavior(SubmitBehavior::Interrupted);
    let recipient = user_address(2);
    let (digest, signature) = h.sponsored_transfer(1, &recipient, 1_000_000).await;

    // the bytes reached the node but the reply never arrived.
    let (status, body) = h.execute(&digest, &signature).await;
    assert_eq!(status, StatusCode::OK);
    let executed: ExecuteResponseBody = serde_json::from_value(body).unwrap();
    assert_eq!(executed.status, ExecutionStatus::Unknown);
    assert!(executed.transaction_digest.is_none());
    assert_eq!(h.chain.submissions(), 1);

    // the digest is consumed and the coin is out of circulation.
    h.chain.set_behavior(SubmitBehavior::Execute);
    let (status, body) = h.execute(&digest, &signature).await;
    assert_eq!(status, StatusCode::GONE);
    let error: ErrorResponse = serde_json::from_value(body).unwrap();
    assert_eq!(error.kind, "already-executed");
    assert_eq!(h.chain.submissions(), 1);
    let pool = h.ctx.gas_pool("testnet").unwrap();
    assert_eq!(pool.reserved(), 0);
    assert_eq!(pool.available(), 2);
}

#[tokio::test]
async fn a_transport_failure_keeps_the_sponsorship_redeemable() {
    let h = Harness::new();
    h.chain.set_behavior(SubmitBehavior::Transport);
    let recipient = user_address(2);
    let (digest, signature) = h.sponsored_transfer(1, &recipient, 1_000_000).await;

    let (status, _) = h.execute(&digest, &signature).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(h.store.pending_count().unwrap(), 1);

    h.chain.set_behavior(SubmitBehavior::Execute);
    let (status, body) = h.execute(&digest, &signature).await;
    assert_eq!(status, StatusCode::OK, "retry failed: {}", body);
    assert_eq!(h.chain.submissions(), 1);
}

#[tokio::test]
async fn an_on_chain_rejection_is_a_failure_with_a_reason() {
    let h = Harness::new();
    h.chain
        .set_behavior(SubmitBehavior::Reject("MoveAbort(7)".to_string()));
    let recipient = user_address(2);
    let (digest, signature) = h.sponsored_transfer(1, &recipient, 1_000_000).await;

    let (status, body) = h.execute(&digest, &signature).await;
    assert_eq!(status, StatusCode::OK);
    let executed: ExecuteResponseBody = serde_json::from_value(body).unwrap();
    assert_eq!(executed.status, ExecutionStatus::Failure);
    assert_eq!(executed.reason.as_deref(), Some("MoveAbort(7)"));
}

#[tokio::test]
async fn an_empty_pool_is_service_unavailable() {
    let h = Harness::new();
    h.ctx.gas_pool("testnet").unwrap().refill(vec![]);
    let sender = user_address(1);
    let (status, body) = h
        .sponsor(json!({
            "transactionKindBytes":
                base64::encode(transfer_kind_bytes(&sender, 1_000_000)),
            "sender": sender.to_string(),
            "network": "testnet",
        }))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let error: ErrorResponse = serde_json::from_value(body).unwrap();
    assert_eq!(error.kind, "insufficient-relay-funds");
}

#[tokio::test]
async fn unsupported_networks_are_rejected() {
    let h = Harness::new();
    let sender = user_address(1);
    let (status, body) = h
        .sponsor(json!({
            "transactionKindBytes":
                base64::encode(transfer_kind_bytes(&sender, 1_000_000)),
            "sender": sender.to_string(),
            "network": "devnet",
        }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_value(body).unwrap();
    assert_eq!(error.kind, "unsupported-network");
}

#[tokio::test]
async fn malformed_kind_bytes_are_a_decode_failure() {
    let h = Harness::new();
    let sender = user_address(1);
    let (status, body) = h
        .sponsor(json!({
            "transactionKindBytes": base64::encode([0xff, 0x13, 0x37]),
            "sender": sender.to_string(),
            "network": "testnet",
        }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorResponse = serde_json::from_value(body).unwrap();
    assert_eq!(error.kind, "decode-failure");
}

#[tokio::test]
async fn malformed_json_bodies_get_a_structured_reply() {
    let h = Harness::new();
    let response = warp::test::request()
        .method("POST")
        .path("/api/v1/sponsor")
        .header("content-type", "application/json")
        .body("{not json")
        .reply(&h.routes())
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse =
        serde_json::from_slice(response.body()).unwrap();
    assert_eq!(error.kind, "invalid-payload");
}

#[tokio::test]
async fn concurrent_sponsorships_never_share_a_gas_coin() {
    let h = Harness::new();
    let sender = user_address(1);
    let body = json!({
        "transactionKindBytes":
            base64::encode(transfer_kind_bytes(&sender, 1_000_000)),
        "sender": sender.to_string(),
        "network": "testnet",
    });

    let mut handles = Vec::new();
    for _ in 0..3 {
        let routes = h.routes();
        let body = body.clone();
        handles.push(tokio::spawn(async move {
            warp::test::request()
                .method("POST")
                .path("/api/v1/sponsor")
                .json(&body)
                .reply(&routes)
                .await
        }));
    }

    let mut payment_ids = HashSet::new();
    for handle in handles {
        let response = handle.await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let sponsored: SponsorResponseBody =
            serde_json::from_slice(response.body()).unwrap();
        let bytes = base64::decode(&sponsored.sponsored_tx_bytes).unwrap();
        let TransactionData::V1(data) =
            TransactionData::from_bcs_bytes(&bytes).unwrap();
        payment_ids.insert(data.gas_data.payment[0].id);
    }
    assert_eq!(payment_ids.len(), 3);
}

#[tokio::test]
async fn the_reference_gas_price_lands_in_the_sponsored_bytes() {
    let h = Harness::new();
    h.chain.set_gas_price(765);
    let sender = user_address(1);
    let (status, body) = h
        .sponsor(json!({
            "transactionKindBytes":
                base64::encode(transfer_kind_bytes(&sender, 1_000_000)),
            "sender": sender.to_string(),
            "network": "testnet",
        }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let sponsored: SponsorResponseBody = serde_json::from_value(body).unwrap();
    let bytes = base64::decode(&sponsored.sponsored_tx_bytes).unwrap();
    let TransactionData::V1(data) =
        TransactionData::from_bcs_bytes(&bytes).unwrap();
    assert_eq!(data.gas_data.price, 765);
}

#[tokio::test]
async fn coin_discovery_filters_by_minimum_balance() {
    let h = Harness::new();
    h.chain
        .set_coins(vec![gas_coin(1, 10), gas_coin(2, 10_000_000_000)]);
    let coins = h
        .ctx
        .chain_client("testnet")
        .unwrap()
        .gas_coins(test_fee_payer().address(), 1_000_000)
        .await
        .unwrap();
    assert_eq!(coins.len(), 1);
    assert_eq!(coins[0].balance, 10_000_000_000);
}

#[tokio::test]
async fn health_reports_the_fee_payer_and_pool_state() {
    let h = Harness::new();
    let recipient = user_address(2);
    let _ = h.sponsored_transfer(1, &recipient, 1_000_000).await;

    let response = warp::test::request()
        .method("GET")
        .path("/api/v1/health")
        .reply(&h.routes())
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let health: HealthResponseBody =
        serde_json::from_slice(response.body()).unwrap();
    assert_eq!(health.fee_payer_address, test_fee_payer().address());
    assert_eq!(health.pending_sponsorships, 1);
    let testnet = &health.networks["testnet"];
    assert_eq!(testnet.available_gas_coins, 2);
    assert_eq!(testnet.reserved_gas_coins, 1);
}
