//! Ethereum JSON-RPC methods used by the EVM path.

use serde::{Deserialize, Serialize};
use tonic::async_trait;

use crate::client::jsonrpc::make_jsonrpc_request;
use crate::client::HttpTransport;
use crate::error::{Error, Result};

/// The subset of the Ethereum JSON-RPC API needed to send transactions.
#[async_trait]
pub trait EvmRpc: Send + Sync {
    async fn estimate_gas(&self, call: &EvmCallRequest) -> Result<u64>;

    /// Submit signed transaction bytes, returning the transaction hash.
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String>;

    /// `None` while the transaction is still pending.
    async fn get_transaction_receipt(&self, tx_hash: &str) -> Result<Option<EvmReceipt>>;
}

/// Call object for `eth_estimateGas`. Quantities and data are 0x hex.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmCallRequest {
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// The fields of a transaction receipt this crate looks at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EvmReceipt {
    pub transaction_hash: String,
    pub block_number: u64,
    pub gas_used: u64,
    /// `false` when execution reverted.
    pub status: bool,
    /// Set for contract deployments.
    pub contract_address: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptJson {
    transaction_hash: String,
    block_number: String,
    gas_used: String,
    status: String,
    #[serde(default)]
    contract_address: Option<String>,
}

impl TryFrom<ReceiptJson> for EvmReceipt {
    type Error = Error;

    fn try_from(json: ReceiptJson) -> Result<Self> {
        Ok(EvmReceipt {
            block_number: parse_quantity("receipt block number", &json.block_number)?,
            gas_used: parse_quantity("receipt gas used", &json.gas_used)?,
            status: parse_quantity("receipt status", &json.status)? == 1,
            transaction_hash: json.transaction_hash,
            contract_address: json.contract_address,
        })
    }
}

/// Parse a JSON-RPC hex quantity such as `0x5208`.
pub(crate) fn parse_quantity(what: &'static str, s: &str) -> Result<u64> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| Error::parse(what, format!("{s:?} is missing the 0x prefix")))?;
    u64::from_str_radix(digits, 16).map_err(|e| Error::parse(what, format!("{s:?}: {e}")))
}

/// [EvmRpc] over HTTP, sharing the session's transport.
pub struct JsonRpcEvmClient {
    url: String,
    transport: HttpTransport,
}

impl JsonRpcEvmClient {
    pub fn new(url: String, transport: HttpTransport) -> Self {
        JsonRpcEvmClient { url, transport }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<P, R>(&self, method: &'static str, params: P) -> Result<R>
    where
        P: Serialize + Send,
        R: serde::de::DeserializeOwned,
    {
        tracing::debug!("Calling {method} on {}", self.url);
        make_jsonrpc_request(&self.transport, &self.url, method, params)
            .await
            .map_err(|e| Error::EvmRpcRequest {
                method,
                details: e.to_string(),
            })
    }
}

#[async_trait]
impl EvmRpc for JsonRpcEvmClient {
    async fn estimate_gas(&self, call: &EvmCallRequest) -> Result<u64> {
        let gas: String = self.call("eth_estimateGas", [call]).await?;
        parse_quantity("estimated gas", &gas)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String> {
        self.call(
            "eth_sendRawTransaction",
            [format!("0x{}", hex::encode(raw))],
        )
        .await
    }

    async fn get_transaction_receipt(&self, tx_hash: &str) -> Result<Option<EvmReceipt>> {
        let receipt: Option<ReceiptJson> =
            self.call("eth_getTransactionReceipt", [tx_hash]).await?;
        receipt.map(EvmReceipt::try_from).transpose()
    }
}

impl std::fmt::Debug for JsonRpcEvmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcEvmClient")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}
