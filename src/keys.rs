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
//! Ed25519 fee-payer key handling and the flag-prefixed signature format
//! submitted to the chain.
//!
//! The relay exclusively owns the fee-payer key; the user's wallet key never
//! reaches this process. Nothing in this module implements `Serialize`,
//! `Display` or `Debug` in a way that could leak secret material.

use ed25519_dalek::{Keypair, PublicKey, SecretKey, Signature, Signer, Verifier};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transaction::signing_message;
use crate::types::SuiAddress;

/// The signature-scheme flag byte for Ed25519.
pub const ED25519_FLAG: u8 = 0x00;
/// flag (1) + signature (64) + public key (32).
const SERIALIZED_LENGTH: usize = 97;

/// A chain-format signature: `flag || signature || public_key`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedSignature(Vec<u8>);

impl SerializedSignature {
    /// Parses a base64 signature payload, checking shape and scheme flag.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let raw = base64::decode(encoded).map_err(|e| Error::InvalidSignature {
            reason: format!("bad base64: {}", e),
        })?;
        if raw.len() != SERIALIZED_LENGTH {
            return Err(Error::InvalidSignature {
                reason: format!(
                    "expected {} bytes, got {}",
                    SERIALIZED_LENGTH,
                    raw.len()
                ),
            });
        }
        if raw[0] != ED25519_FLAG {
            return Err(Error::InvalidSignature {
                reason: format!("unsupported signature scheme flag {:#04x}", raw[0]),
            });
        }
        Ok(Self(raw))
    }

    /// Renders the signature in the base64 form the chain RPC accepts.
    pub fn to_base64(&self) -> String {
        base64::encode(&self.0)
    }

    /// Verifies this signature over the given transaction bytes and returns
    /// the address derived from the embedded public key.
    pub fn verify(&self, tx_bytes: &[u8]) -> Result<SuiAddress> {
        let message = signing_message(tx_bytes);
        let signature = Signature::from_bytes(&self.0[1..65]).map_err(|e| {
            Error::InvalidSignature {
                reason: e.to_string(),
            }
        })?;
        let public = PublicKey::from_bytes(&self.0[65..]).map_err(|e| {
            Error::InvalidSignature {
                reason: e.to_string(),
            }
        })?;
        public
            .verify(&message, &signature)
            .map_err(|_| Error::InvalidSignature {
                reason: "signature does not verify over the transaction".to_string(),
            })?;
        Ok(address_for_public_key(&public))
    }
}

impl std::fmt::Debug for SerializedSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SerializedSignature({})", self.to_base64())
    }
}

/// Derives the account address controlled by an Ed25519 public key.
pub fn address_for_public_key(public: &PublicKey) -> SuiAddress {
    use blake2::digest::consts::U32;
    use blake2::{Blake2b, Digest};
    let mut hasher = Blake2b::<U32>::new();
    hasher.update([ED25519_FLAG]);
    hasher.update(public.as_bytes());
    SuiAddress::new(hasher.finalize().into())
}

/// Signs serialized transaction bytes with the given keypair, producing the
/// chain-format signature.
pub fn sign_transaction(keypair: &Keypair, tx_bytes: &[u8]) -> SerializedSignature {
    let message = signing_message(tx_bytes);
    let signature = keypair.sign(&message);
    let mut raw = Vec::with_capacity(SERIALIZED_LENGTH);
    raw.push(ED25519_FLAG);
    raw.extend_from_slice(&signature.to_bytes());
    raw.extend_from_slice(keypair.public.as_bytes());
    SerializedSignature(raw)
}

/// The relay's fee-payer identity: the Ed25519 keypair underwriting gas fees
/// and its derived address.
pub struct FeePayer {
    keypair: Keypair,
    address: SuiAddress,
}

impl FeePayer {
    /// Builds the fee payer from 32 raw secret-key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secret = SecretKey::from_bytes(bytes).map_err(|_| Error::MissingSecrets)?;
        let public = PublicKey::from(&secret);
        let address = address_for_public_key(&public);
        Ok(Self {
            keypair: Keypair { secret, public },
            address,
        })
    }

    /// The fee payer's on-chain address. Safe to expose (e.g. in `/health`).
    pub fn address(&self) -> SuiAddress {
        self.address
    }

    /// Co-signs a sponsored transaction as the fee payer.
    pub fn sign(&self, tx_bytes: &[u8]) -> SerializedSignature {
        sign_transaction(&self.keypair, tx_bytes)
    }
}

impl std::fmt::Debug for FeePayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never include key material.
        f.debug_struct("FeePayer")
            .field("address", &self.address)
            .finish()
    }
}
