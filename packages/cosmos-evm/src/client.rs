mod grpc;
pub(crate) mod jsonrpc;
mod query;
mod rest;

use std::sync::Arc;

use cosmos_sdk_proto::cosmos::base::v1beta1::Coin;
use tonic::async_trait;

use crate::account::AccountState;
use crate::broadcast::{BroadcastMode, NativeTxResponse};
use crate::error::{Error, Result};
use crate::messages::PendingMessage;

pub use self::grpc::GrpcBackend;
pub use self::rest::RestBackend;

/// A chain endpoint able to answer the queries the transaction pipeline needs.
///
/// Implemented for gRPC and REST. Tests and embedders can supply their own
/// through [crate::ClientSession::set_backend].
#[async_trait]
pub trait CosmosBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Account number and sequence for the given bech32 address.
    async fn account(&self, address: &str) -> Result<AccountState>;

    /// Dry run the encoded transaction, returning the gas used.
    async fn simulate(&self, tx_bytes: Vec<u8>) -> Result<u64>;

    async fn broadcast(&self, tx_bytes: Vec<u8>, mode: BroadcastMode) -> Result<NativeTxResponse>;

    async fn all_balances(&self, address: &str) -> Result<Vec<Coin>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Grpc,
    Rest,
    Custom,
}

/// Which backend, if any, serves queries and broadcasts for a session.
///
/// gRPC is preferred when configured, then REST. With neither the session is
/// offline and the pipeline falls back to protocol defaults.
#[derive(Clone)]
pub enum BackendSelector {
    Offline,
    Grpc(Arc<GrpcBackend>),
    Rest(Arc<RestBackend>),
    Custom(Arc<dyn CosmosBackend>),
}

impl BackendSelector {
    pub(crate) fn from_endpoints(
        grpc: Option<Arc<GrpcBackend>>,
        rest: Option<Arc<RestBackend>>,
    ) -> Self {
        match (grpc, rest) {
            (Some(grpc), _) => BackendSelector::Grpc(grpc),
            (None, Some(rest)) => BackendSelector::Rest(rest),
            (None, None) => BackendSelector::Offline,
        }
    }

    pub fn backend(&self) -> Option<&dyn CosmosBackend> {
        match self {
            BackendSelector::Offline => None,
            BackendSelector::Grpc(grpc) => Some(grpc.as_ref()),
            BackendSelector::Rest(rest) => Some(rest.as_ref()),
            BackendSelector::Custom(custom) => Some(custom.as_ref()),
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, BackendSelector::Offline)
    }

    /// Like [Self::backend], but an offline session is an error.
    pub(crate) fn require(&self) -> Result<&dyn CosmosBackend> {
        self.backend()
            .ok_or(Error::InsufficientParams("a gRPC or REST endpoint"))
    }
}

impl std::fmt::Debug for BackendSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendSelector::Offline => f.write_str("Offline"),
            BackendSelector::Grpc(grpc) => write!(f, "Grpc({})", grpc.grpc_url()),
            BackendSelector::Rest(rest) => write!(f, "Rest({})", rest.base_url()),
            BackendSelector::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Which execution environment a set of messages targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionPath {
    Native,
    Evm,
}

impl ExecutionPath {
    /// Pick the path from the messages' module tags.
    ///
    /// EVM transactions carry exactly one message, native transactions carry
    /// only native messages.
    pub fn of(messages: &[PendingMessage]) -> Result<Self> {
        let evm = messages.iter().filter(|msg| msg.is_evm()).count();
        match (evm, messages.len()) {
            (_, 0) => Err(Error::InsufficientParams("at least one message")),
            (0, _) => Ok(ExecutionPath::Native),
            (1, 1) => Ok(ExecutionPath::Evm),
            _ => Err(Error::InvalidRequest(
                "An EVM message must be the only message in its transaction".to_owned(),
            )),
        }
    }
}

/// HTTP client shared by every REST and JSON-RPC user of a session.
///
/// The lock is held for a full request/response cycle.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: Arc<tokio::sync::Mutex<reqwest::Client>>,
}

impl HttpTransport {
    pub(crate) async fn send(
        &self,
        make_request: impl FnOnce(&reqwest::Client) -> reqwest::RequestBuilder,
    ) -> Result<(reqwest::StatusCode, String), reqwest::Error> {
        let client = self.client.lock().await;
        let res = make_request(&client).send().await?;
        let status = res.status();
        let body = res.text().await?;
        Ok((status, body))
    }

    /// Whether two transports share the same underlying client.
    pub fn same_as(&self, other: &HttpTransport) -> bool {
        Arc::ptr_eq(&self.client, &other.client)
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HttpTransport")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn bank_send() -> PendingMessage {
        PendingMessage::new(
            "bank",
            "send",
            json!({
                "from_address": "cosmos1a",
                "to_address": "cosmos1b",
                "amount": [{"denom": "uatom", "amount": "1"}]
            }),
        )
        .unwrap()
    }

    fn evm_transfer() -> PendingMessage {
        PendingMessage::new(
            "evm",
            "transfer",
            json!({"to": "0x0000000000000000000000000000000000000001", "amount": "1"}),
        )
        .unwrap()
    }

    #[test]
    fn path_from_module_tags() {
        assert_eq!(
            ExecutionPath::of(&[bank_send(), bank_send()]).unwrap(),
            ExecutionPath::Native
        );
        assert_eq!(
            ExecutionPath::of(&[evm_transfer()]).unwrap(),
            ExecutionPath::Evm
        );
        assert_eq!(
            ExecutionPath::of(&[bank_send(), evm_transfer()])
                .unwrap_err()
                .code(),
            2
        );
        assert_eq!(ExecutionPath::of(&[]).unwrap_err().code(), 3);
    }

    #[test]
    fn grpc_preferred_over_rest() {
        let transport = HttpTransport::default();
        let grpc = Arc::new(GrpcBackend::new(
            "http://localhost:9090",
            std::time::Duration::from_secs(5),
            3,
        ));
        let rest = Arc::new(RestBackend::new("http://localhost:1317", transport));
        let selector = BackendSelector::from_endpoints(Some(grpc), Some(rest.clone()));
        assert_eq!(selector.backend().map(|b| b.kind()), Some(BackendKind::Grpc));
        let selector = BackendSelector::from_endpoints(None, Some(rest));
        assert_eq!(selector.backend().map(|b| b.kind()), Some(BackendKind::Rest));
        let selector = BackendSelector::from_endpoints(None, None);
        assert!(selector.is_offline());
        assert_eq!(selector.require().err().map(|e| e.code()), Some(3));
    }
}
