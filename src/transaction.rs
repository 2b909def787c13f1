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
//! The BCS wire model of the transactions the relay sponsors.
//!
//! Clients ship only the *transaction kind*: the ordered operations of a
//! programmable transaction, without any fee metadata. The relay decodes the
//! kind far enough to enforce policy (which Move entry points it invokes,
//! which addresses it pays), then wraps it into a full `TransactionData`
//! with the relay's own gas payment attached.
//!
//! Object inputs referenced by the kind are carried opaquely; their full
//! resolution happens on the fullnode at execution time. Call targets and
//! pure (literal) arguments are resolved here, since those are what policy
//! inspects.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{MoveCallTarget, ObjectId, ObjectRef, SuiAddress, TransactionDigest};

type Blake2b256 = Blake2b<U32>;

/// Domain separator mixed into transaction digests.
const DIGEST_SALT: &[u8] = b"TransactionData::";
/// The signing intent for user transaction data: scope, version, app-id.
const SIGNING_INTENT: [u8; 3] = [0, 0, 0];

/// An input value of a programmable transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallArg {
    /// A literal, BCS-encoded value chosen by the client.
    Pure(Vec<u8>),
    /// A reference to an on-chain object.
    Object(ObjectArg),
}

/// An object input of a programmable transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectArg {
    /// An owned (or immutable) object pinned at a version.
    ImmOrOwnedObject(ObjectRef),
    /// A shared object, resolved by the fullnode at execution time.
    SharedObject {
        /// The object identifier.
        id: ObjectId,
        /// The version at which the object became shared.
        initial_shared_version: u64,
        /// Whether the transaction takes the object mutably.
        mutable: bool,
    },
}

/// A reference to a value within a programmable transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Argument {
    /// The gas coin of the transaction.
    GasCoin,
    /// One of the transaction inputs, by index.
    Input(u16),
    /// The result of a previous command, by command index.
    Result(u16),
    /// One value out of a previous command's result tuple.
    NestedResult(u16, u16),
}

/// A single Move call within a programmable transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgrammableMoveCall {
    /// The package containing the module.
    pub package: ObjectId,
    /// The module name.
    pub module: String,
    /// The function name.
    pub function: String,
    /// Type arguments, rendered in their canonical string form.
    pub type_arguments: Vec<String>,
    /// Arguments to the call.
    pub arguments: Vec<Argument>,
}

impl ProgrammableMoveCall {
    /// The fully-qualified entry point this call invokes.
    pub fn target(&self) -> MoveCallTarget {
        MoveCallTarget {
            package: self.package.0,
            module: self.module.clone(),
            function: self.function.clone(),
        }
    }
}

/// A command of a programmable transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Invoke a Move entry point.
    MoveCall(Box<ProgrammableMoveCall>),
    /// Transfer the given objects to a recipient.
    TransferObjects(Vec<Argument>, Argument),
    /// Split amounts off a coin.
    SplitCoins(Argument, Vec<Argument>),
    /// Merge coins into the first one.
    MergeCoins(Argument, Vec<Argument>),
}

/// The fee-free portion of a transaction: inputs plus ordered commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgrammableTransaction {
    /// The input values the commands reference by index.
    pub inputs: Vec<CallArg>,
    /// The commands, executed in order.
    pub commands: Vec<Command>,
}

/// The kind of a transaction, as serialized by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    /// The only kind the relay sponsors.
    ProgrammableTransaction(ProgrammableTransaction),
}

/// The gas metadata a sponsor attaches to a transaction kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasData {
    /// The coins paying for execution, owned by the fee payer.
    pub payment: Vec<ObjectRef>,
    /// The fee payer address.
    pub owner: SuiAddress,
    /// The gas price, in MIST per unit.
    pub price: u64,
    /// The maximum gas budget, in MIST.
    pub budget: u64,
}

/// Expiry constraint of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionExpiration {
    /// The transaction never expires on-chain.
    None,
    /// The transaction is only valid up to (and including) the given epoch.
    Epoch(u64),
}

/// The complete, signable transaction: kind, sender and gas metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDataV1 {
    /// The operations of the transaction.
    pub kind: TransactionKind,
    /// The logical sender (the user), distinct from the fee payer.
    pub sender: SuiAddress,
    /// The sponsor-provided gas metadata.
    pub gas_data: GasData,
    /// Expiry constraint.
    pub expiration: TransactionExpiration,
}

/// Versioned envelope of [`TransactionDataV1`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionData {
    /// The only version currently on the wire.
    V1(TransactionDataV1),
}

impl TransactionData {
    /// BCS-encodes this transaction.
    pub fn to_bcs_bytes(&self) -> Result<Vec<u8>> {
        Ok(bcs::to_bytes(self)?)
    }

    /// Decodes a BCS-encoded sponsored transaction.
    pub fn from_bcs_bytes(bytes: &[u8]) -> Result<Self> {
        bcs::from_bytes(bytes).map_err(|e| Error::TransactionDecode {
            reason: e.to_string(),
        })
    }
}

/// Computes the content-addressed digest of a serialized transaction.
pub fn transaction_digest(tx_bytes: &[u8]) -> TransactionDigest {
    let mut hasher = Blake2b256::new();
    hasher.update(DIGEST_SALT);
    hasher.update(tx_bytes);
    TransactionDigest::new(hasher.finalize().into())
}

/// The 32-byte message both signers actually sign: the hash of the signing
/// intent followed by the serialized transaction.
pub fn signing_message(tx_bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(SIGNING_INTENT);
    hasher.update(tx_bytes);
    hasher.finalize().into()
}

/// A decoded, policy-inspectable view over client-supplied kind bytes.
#[derive(Debug, Clone)]
pub struct DecodedTransaction {
    kind: TransactionKind,
}

impl DecodedTransaction {
    /// Decodes opaque transaction-kind bytes.
    ///
    /// Malformed bytes (including unknown kinds or versions) yield a
    /// [`Error::TransactionDecode`], never a panic.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::TransactionDecode {
                reason: "empty transaction kind".to_string(),
            });
        }
        let kind: TransactionKind =
            bcs::from_bytes(bytes).map_err(|e| Error::TransactionDecode {
                reason: e.to_string(),
            })?;
        Ok(Self { kind })
    }

    fn programmable(&self) -> &ProgrammableTransaction {
        let TransactionKind::ProgrammableTransaction(pt) = &self.kind;
        pt
    }

    /// The ordered list of Move entry points this transaction invokes.
    pub fn move_call_targets(&self) -> Vec<MoveCallTarget> {
        self.programmable()
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::MoveCall(call) => Some(call.target()),
                _ => None,
            })
            .collect()
    }

    /// The literal addresses policy must check: transfer recipients and
    /// 32-byte pure arguments to Move calls.
    ///
    /// Fails with a decode error if a command references an input index out
    /// of range; the kind is malformed in that case.
    pub fn policy_addresses(&self) -> Result<Vec<SuiAddress>> {
        let pt = self.programmable();
        let mut addresses = Vec::new();
        for command in &pt.commands {
            match command {
                Command::TransferObjects(_, recipient) => {
                    if let Some(addr) =
                        self.resolve_pure_address(recipient)?
                    {
                        addresses.push(addr);
                    }
                }
                Command::MoveCall(call) => {
                    for arg in &call.arguments {
                        if let Some(addr) = self.resolve_pure_address(arg)? {
                            addresses.push(addr);
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(addresses)
    }

    /// Whether any transfer recipient is not a pure literal.
    ///
    /// Such a recipient is derived from on-chain state and cannot be matched
    /// against an address allow-list; policy rejects it.
    pub fn has_non_literal_recipient(&self) -> Result<bool> {
        let pt = self.programmable();
        for command in &pt.commands {
            if let Command::TransferObjects(_, recipient) = command {
                if self.resolve_pure_address(recipient)?.is_none() {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Number of on-chain objects referenced as transaction inputs.
    pub fn object_input_count(&self) -> usize {
        self.programmable()
            .inputs
            .iter()
            .filter(|i| matches!(i, CallArg::Object(_)))
            .count()
    }

    /// The decoded kind, consumed when building the sponsored transaction.
    pub fn into_kind(self) -> TransactionKind {
        self.kind
    }

    /// Resolves an argument to a literal address, if it is a 32-byte pure
    /// input. Object inputs and command results resolve to `None`.
    fn resolve_pure_address(
        &self,
        arg: &Argument,
    ) -> Result<Option<SuiAddress>> {
        let pt = self.programmable();
        match arg {
            Argument::Input(index) => {
                let input = pt.inputs.get(*index as usize).ok_or_else(|| {
                    Error::TransactionDecode {
                        reason: format!(
                            "input index {} out of range ({} inputs)",
                            index,
                            pt.inputs.len()
                        ),
                    }
                })?;
                match input {
                    CallArg::Pure(bytes) => {
                        Ok(SuiAddress::from_pure_bytes(bytes))
                    }
                    CallArg::Object(_) => Ok(None),
                }
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer_kind(recipient: SuiAddress, amount: u64) -> TransactionKind {
        // split `amount` off the gas coin and send it to `recipient`.
        TransactionKind::ProgrammableTransaction(ProgrammableTransaction {
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
        })
    }

    #[test]
    fn decodes_transfer_and_extracts_recipient() {
        let recipient: SuiAddress = "0xa11ce".parse().unwrap();
        let bytes = bcs::to_bytes(&transfer_kind(recipient, 1_000_000)).unwrap();
        let decoded = DecodedTransaction::decode(&bytes).unwrap();
        assert!(decoded.move_call_targets().is_empty());
        assert_eq!(decoded.policy_addresses().unwrap(), vec![recipient]);
        assert!(!decoded.has_non_literal_recipient().unwrap());
    }

    #[test]
    fn extracts_move_call_targets_in_order() {
        let kind = TransactionKind::ProgrammableTransaction(ProgrammableTransaction {
            inputs: vec![],
            commands: vec![
                Command::MoveCall(Box::new(ProgrammableMoveCall {
                    package: "0x2".parse().unwrap(),
                    module: "pay".to_string(),
                    function: "split".to_string(),
                    type_arguments: vec!["0x2::sui::SUI".to_string()],
                    arguments: vec![Argument::GasCoin],
                })),
                Command::MoveCall(Box::new(ProgrammableMoveCall {
                    package: "0xdead".parse().unwrap(),
                    module: "poap".to_string(),
                    function: "mint".to_string(),
                    type_arguments: vec![],
                    arguments: vec![],
                })),
            ],
        });
        let bytes = bcs::to_bytes(&kind).unwrap();
        let decoded = DecodedTransaction::decode(&bytes).unwrap();
        let targets = decoded.move_call_targets();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].to_string().split("::").nth(1), Some("pay"));
        assert_eq!(targets[1].function, "mint");
    }

    #[test]
    fn rejects_empty_and_garbage_bytes() {
        assert!(matches!(
            DecodedTransaction::decode(&[]),
            Err(Error::TransactionDecode { .. })
        ));
        assert!(matches!(
            DecodedTransaction::decode(&[0xff, 0x00, 0x13, 0x37]),
            Err(Error::TransactionDecode { .. })
        ));
    }

    #[test]
    fn out_of_range_input_is_a_decode_error() {
        let kind = TransactionKind::ProgrammableTransaction(ProgrammableTransaction {
            inputs: vec![],
            commands: vec![Command::TransferObjects(
                vec![Argument::GasCoin],
                Argument::Input(9),
            )],
        });
        let bytes = bcs::to_bytes(&kind).unwrap();
        let decoded = DecodedTransaction::decode(&bytes).unwrap();
        assert!(matches!(
            decoded.policy_addresses(),
            Err(Error::TransactionDecode { .. })
        ));
    }

    #[test]
    fn non_literal_recipient_is_flagged() {
        let kind = TransactionKind::ProgrammableTransaction(ProgrammableTransaction {
            inputs: vec![],
            commands: vec![
                Command::SplitCoins(Argument::GasCoin, vec![]),
                Command::TransferObjects(
                    vec![Argument::GasCoin],
                    Argument::Result(0),
                ),
            ],
        });
        let bytes = bcs::to_bytes(&kind).unwrap();
        let decoded = DecodedTransaction::decode(&bytes).unwrap();
        assert!(decoded.has_non_literal_recipient().unwrap());
    }

    #[test]
    fn digests_are_content_addressed() {
        let a = transaction_digest(b"tx-one");
        let b = transaction_digest(b"tx-two");
        assert_ne!(a, b);
        assert_eq!(a, transaction_digest(b"tx-one"));
        // the signing message is domain-separated from the digest.
        assert_ne!(signing_message(b"tx-one"), *transaction_digest(b"tx-one").as_bytes());
    }
}
