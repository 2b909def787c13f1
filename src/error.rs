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

/// An enum of all possible errors that could be encountered during the
/// execution of the Suilens Relayer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON Error occurred.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// Error in the underlying Http server.
    #[error(transparent)]
    Warp(#[from] warp::Error),
    /// Sled database error.
    #[error(transparent)]
    Sled(#[from] sled::Error),
    /// Http client error while talking to the fullnode.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    /// BCS codec error.
    #[error(transparent)]
    Bcs(#[from] bcs::Error),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// Base64 payload could not be decoded.
    #[error("Invalid base64 payload: {}", _0)]
    Base64(#[from] base64::DecodeError),
    /// The client-supplied transaction-kind bytes could not be decoded.
    ///
    /// This is a client error, distinct from a policy violation.
    #[error("Failed to decode transaction bytes: {}", reason)]
    TransactionDecode {
        /// Why the bytes could not be decoded.
        reason: String,
    },
    /// A string is not a syntactically valid Sui address.
    #[error("Invalid Sui address: {}", address)]
    InvalidAddress {
        /// The offending address string.
        address: String,
    },
    /// A string is not a valid transaction digest.
    #[error("Invalid transaction digest: {}", digest)]
    InvalidDigest {
        /// The offending digest string.
        digest: String,
    },
    /// A string is not a valid `package::module::function` target.
    #[error("Invalid Move call target: {}", target)]
    InvalidMoveCallTarget {
        /// The offending target string.
        target: String,
    },
    /// A signature payload is malformed or does not verify.
    #[error("Invalid signature: {}", reason)]
    InvalidSignature {
        /// Why the signature was rejected.
        reason: String,
    },
    /// The requested network is not configured on this relayer.
    #[error("Network not supported: {}", network)]
    UnsupportedNetwork {
        /// The requested network name.
        network: String,
    },
    /// The decoded transaction invokes a Move entry point outside the
    /// allow-list.
    #[error("Move call target not allowed: {}", target)]
    TargetNotAllowed {
        /// The disallowed target.
        target: String,
    },
    /// The decoded transaction references an address outside the allow-list.
    #[error("Address not allowed: {}", address)]
    AddressNotAllowed {
        /// The disallowed address.
        address: String,
    },
    /// No funded gas coin is available to underwrite a sponsorship.
    #[error("No funded gas coin available for sponsorship")]
    InsufficientRelayFunds,
    /// The digest does not correspond to any sponsorship known to the relay.
    #[error("Unknown sponsorship digest: {}", digest)]
    UnknownDigest {
        /// The unknown digest.
        digest: String,
    },
    /// The sponsorship existed but was not executed within the expiry window.
    #[error("Sponsorship expired for digest: {}", digest)]
    SponsorshipExpired {
        /// The expired digest.
        digest: String,
    },
    /// The sponsorship was already consumed by a previous execute call.
    #[error("Sponsorship already executed for digest: {}", digest)]
    AlreadyExecuted {
        /// The consumed digest.
        digest: String,
    },
    /// The fullnode returned an error for an RPC call.
    #[error("Chain RPC error: {}", message)]
    ChainRpc {
        /// The error message reported by the node.
        message: String,
    },
    /// An RPC call did not complete within its bounded timeout.
    #[error("Chain RPC call timed out after {}ms", timeout_ms)]
    RpcTimeout {
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },
    /// A submission reached the wire but the reply never arrived intact;
    /// the on-chain outcome is unknown.
    #[error("Transaction submission interrupted: {}", message)]
    SubmitInterrupted {
        /// The transport error observed after the request was sent.
        message: String,
    },
    /// Missing Secrets in the config, i.e. the fee-payer private key.
    #[error("Missing required fee-payer private-key in the config")]
    MissingSecrets,
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
}

impl Error {
    /// A stable, machine-readable kind for this error.
    ///
    /// These strings are part of the HTTP error body and are matched by
    /// clients and by operators auditing rejected sponsorships; changing
    /// them is a breaking API change.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Base64(_) => "invalid-payload",
            Error::TransactionDecode { .. } => "decode-failure",
            Error::InvalidAddress { .. } => "invalid-address",
            Error::InvalidDigest { .. } => "invalid-digest",
            Error::InvalidMoveCallTarget { .. } => "invalid-target",
            Error::InvalidSignature { .. } => "invalid-signature",
            Error::UnsupportedNetwork { .. } => "unsupported-network",
            Error::TargetNotAllowed { .. } => "target-not-allowed",
            Error::AddressNotAllowed { .. } => "address-not-allowed",
            Error::InsufficientRelayFunds => "insufficient-relay-funds",
            Error::UnknownDigest { .. } => "unknown-digest",
            Error::SponsorshipExpired { .. } => "sponsorship-expired",
            Error::AlreadyExecuted { .. } => "already-executed",
            Error::ChainRpc { .. } => "chain-rpc",
            Error::RpcTimeout { .. } => "rpc-timeout",
            Error::SubmitInterrupted { .. } => "submit-interrupted",
            Error::MissingSecrets => "missing-secrets",
            _ => "internal",
        }
    }
}

/// A type alias for the result for the suilens relayer, that uses the
/// `Error` enum.
pub type Result<T> = std::result::Result<T, Error>;
