//! Error types exposed by this package.

use std::sync::Arc;

use tokio::time::error::Elapsed;

/// All errors returned by the transaction pipeline.
///
/// Every variant maps to a stable numeric code via [Error::code], so callers
/// can branch on the kind of failure without matching on message text.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Unknown message type {tag:?} for module {module:?}")]
    InvalidMessageType { module: String, tag: String },
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Insufficient parameters: {0} must be provided")]
    InsufficientParams(&'static str),
    #[error("Unable to parse {what}: {details}")]
    Parse { what: &'static str, details: String },
    #[error("Failed to marshal {what}: {details}")]
    FailedToMarshal { what: &'static str, details: String },
    #[error("Failed to unmarshal {what}: {details}")]
    FailedToUnmarshal { what: String, details: String },
    #[error("Unable to resolve account number and sequence for {address}: {source}")]
    AccountResolution { address: String, source: Box<Error> },
    #[error("Unable to estimate gas: {source}")]
    FeeEstimation { source: Box<Error> },
    #[error("Key not found: {0}")]
    KeyNotFound(String),
    #[error("Signature verification failed for signer {address}")]
    SignatureVerification { address: String },
    #[error("Error response from gRPC endpoint {grpc_url}: {source}")]
    GrpcRequest {
        grpc_url: Arc<String>,
        source: GrpcError,
    },
    #[error("HTTP request to {url} failed: {details}")]
    HttpRequest { url: String, details: String },
    #[error("EVM JSON-RPC call {method} failed: {details}")]
    EvmRpcRequest { method: &'static str, details: String },
    #[error("Transaction {txhash} failed with code {code} (codespace {codespace:?}). Raw log: {raw_log}")]
    TxFailed {
        txhash: String,
        code: u32,
        codespace: String,
        raw_log: String,
        /// Sequence number the chain reported it expected, if the failure was an account sequence mismatch.
        expected_sequence: Option<u64>,
    },
    #[error("No receipt found for EVM transaction {tx_hash} after {attempts} attempts")]
    ReceiptTimeout { tx_hash: String, attempts: u32 },
    #[error("EVM transaction {tx_hash} reverted")]
    EvmTxReverted { tx_hash: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable numeric code for this kind of error.
    pub fn code(&self) -> u32 {
        match self {
            Error::InvalidMessageType { .. } => 1,
            Error::InvalidRequest(_) => 2,
            Error::InsufficientParams(_) => 3,
            Error::Parse { .. } => 4,
            Error::FailedToMarshal { .. } => 5,
            Error::FailedToUnmarshal { .. } => 6,
            Error::AccountResolution { .. } => 7,
            Error::FeeEstimation { .. } => 8,
            Error::KeyNotFound(_) => 9,
            Error::SignatureVerification { .. } => 10,
            Error::GrpcRequest { .. } => 11,
            Error::HttpRequest { .. } => 12,
            Error::EvmRpcRequest { .. } => 13,
            Error::TxFailed { .. } => 14,
            Error::ReceiptTimeout { .. } => 15,
            Error::EvmTxReverted { .. } => 16,
            Error::Io(_) => 17,
        }
    }

    pub(crate) fn parse(what: &'static str, details: impl ToString) -> Self {
        Error::Parse {
            what,
            details: details.to_string(),
        }
    }

    pub(crate) fn unmarshal(what: impl Into<String>, details: impl ToString) -> Self {
        Error::FailedToUnmarshal {
            what: what.into(),
            details: details.to_string(),
        }
    }

    pub(crate) fn marshal(what: &'static str, details: impl ToString) -> Self {
        Error::FailedToMarshal {
            what,
            details: details.to_string(),
        }
    }
}

/// Failure modes of a single gRPC call.
#[derive(thiserror::Error, Debug)]
pub enum GrpcError {
    #[error("Invalid gRPC URL: {0}")]
    InvalidUrl(tonic::transport::Error),
    #[error("{0}")]
    Status(tonic::Status),
    #[error("Query timed out, total elapsed time: {0}")]
    Timeout(Elapsed),
}

/// Result type used throughout this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let errors = [
            Error::InvalidMessageType {
                module: "bank".to_owned(),
                tag: "burn".to_owned(),
            },
            Error::InvalidRequest("x".to_owned()),
            Error::InsufficientParams("gas price"),
            Error::parse("chain ID", "no underscore"),
            Error::marshal("wasm message", "bad"),
            Error::unmarshal("payload", "bad"),
            Error::KeyNotFound("cosmos1...".to_owned()),
            Error::SignatureVerification {
                address: "cosmos1...".to_owned(),
            },
            Error::HttpRequest {
                url: "http://localhost".to_owned(),
                details: "refused".to_owned(),
            },
            Error::EvmRpcRequest {
                method: "eth_estimateGas",
                details: "refused".to_owned(),
            },
            Error::ReceiptTimeout {
                tx_hash: "0x00".to_owned(),
                attempts: 3,
            },
        ];
        let mut codes = errors.iter().map(Error::code).collect::<Vec<_>>();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn wrapped_errors_keep_their_own_code() {
        let err = Error::FeeEstimation {
            source: Box::new(Error::HttpRequest {
                url: "http://localhost:1317".to_owned(),
                details: "connection refused".to_owned(),
            }),
        };
        assert_eq!(err.code(), 8);
        assert!(err.to_string().contains("connection refused"));
    }
}
