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
//! The execution flow: countersignature checks and at-most-once submission.

use serde::{Deserialize, Serialize};

use crate::chain::SubmitOutcome;
use crate::context::RelayerContext;
use crate::error::Error;
use crate::keys::SerializedSignature;
use crate::store::{now_millis, PendingStore, Terminal};
use crate::types::TransactionDigest;

/// What the relay observed happen to a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    /// The chain executed the transaction successfully.
    Success,
    /// The chain rejected or aborted the transaction.
    Failure,
    /// The submission was sent but its outcome was never observed.
    Unknown,
}

/// The result of an execute call.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// The observed status.
    pub status: ExecutionStatus,
    /// The executed transaction's digest, when one exists on-chain.
    pub digest: Option<TransactionDigest>,
    /// The chain's failure reason, for [`ExecutionStatus::Failure`].
    pub reason: Option<String>,
}

/// Executes a pending sponsorship: verifies the user's countersignature,
/// takes the entry out of the store (the at-most-once point), and submits
/// the dual-signed transaction.
///
/// The countersignature is checked against a peeked copy before the entry
/// is consumed, so a bad signature never removes it, not even transiently.
/// Once taken, a digest only re-enters the store if the connection to the
/// node failed outright and the bytes never left the relay.
pub async fn execute_sponsored<S: PendingStore>(
    ctx: &RelayerContext,
    store: &S,
    digest: &TransactionDigest,
    signature: &SerializedSignature,
) -> crate::Result<ExecutionOutcome> {
    // entries are immutable once inserted and content-addressed by their
    // digest, so verifying the peeked copy holds for the taken one.
    let signer = match store.peek_pending(digest)? {
        Some(peeked) => match signature.verify(&peeked.sponsored_bytes) {
            Ok(signer) if signer == peeked.sender => signer,
            Ok(signer) => {
                return Err(Error::InvalidSignature {
                    reason: format!(
                        "signed by {signer}, expected the sponsored sender"
                    ),
                })
            }
            Err(e) => return Err(e),
        },
        None => {
            return Err(consumed_digest_error(
                store.terminal_state(digest)?,
                digest,
            ))
        }
    };

    let entry = match store.take_pending(digest)? {
        Some(entry) => entry,
        // a racing execute or the sweeper got here first.
        None => {
            return Err(consumed_digest_error(
                store.terminal_state(digest)?,
                digest,
            ))
        }
    };

    let pool = ctx.gas_pool(&entry.network)?;
    let now = now_millis();
    if entry.is_expired(ctx.config.sponsor.sponsorship_ttl_ms, now) {
        store.record_terminal(digest, Terminal::Expired { at_ms: now })?;
        pool.release(entry.gas_coin);
        return Err(Error::SponsorshipExpired {
            digest: digest.to_string(),
        });
    }

    let chain = ctx.chain_client(&entry.network)?;
    let signatures =
        vec![signature.clone(), entry.fee_payer_signature.clone()];
    let submitted = chain
        .execute_transaction(&entry.sponsored_bytes, &signatures)
        .await;

    let outcome = match submitted {
        Ok(SubmitOutcome::Executed { digest: executed }) => {
            store.record_terminal(
                digest,
                Terminal::Executed { at_ms: now_millis() },
            )?;
            pool.forget(&entry.gas_coin.object_ref.id);
            ExecutionOutcome {
                status: ExecutionStatus::Success,
                digest: Some(executed),
                reason: None,
            }
        }
        Ok(SubmitOutcome::Rejected { reason }) => {
            store.record_terminal(
                digest,
                Terminal::Executed { at_ms: now_millis() },
            )?;
            pool.forget(&entry.gas_coin.object_ref.id);
            ExecutionOutcome {
                status: ExecutionStatus::Failure,
                digest: Some(*digest),
                reason: Some(reason),
            }
        }
        Err(Error::RpcTimeout { .. } | Error::SubmitInterrupted { .. }) => {
            // the transaction may or may not be on-chain. The coin cannot
            // be trusted at its recorded version, and the digest must not
            // be submittable twice.
            store.record_terminal(
                digest,
                Terminal::Unknown { at_ms: now_millis() },
            )?;
            pool.forget(&entry.gas_coin.object_ref.id);
            ExecutionOutcome {
                status: ExecutionStatus::Unknown,
                digest: None,
                reason: None,
            }
        }
        Err(e) => {
            // the connection never opened; the chain never saw the bytes.
            store.insert_pending(digest, entry)?;
            return Err(e);
        }
    };

    tracing::event!(
        target: crate::probe::TARGET,
        tracing::Level::DEBUG,
        kind = %crate::probe::Kind::Execution,
        digest = %digest,
        sender = %signer,
        status = ?outcome.status,
    );
    Ok(outcome)
}

/// The error for a digest with no pending entry, refined by its tombstone.
fn consumed_digest_error(
    terminal: Option<Terminal>,
    digest: &TransactionDigest,
) -> Error {
    match terminal {
        Some(Terminal::Expired { .. }) => Error::SponsorshipExpired {
            digest: digest.to_string(),
        },
        Some(Terminal::Executed { .. }) | Some(Terminal::Unknown { .. }) => {
            Error::AlreadyExecuted {
                digest: digest.to_string(),
            }
        }
        None => Error::UnknownDigest {
            digest: digest.to_string(),
        },
    }
}
