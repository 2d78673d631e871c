use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

use super::HttpTransport;

#[derive(serde::Serialize)]
struct Request<'a, P> {
    jsonrpc: &'static str,
    method: &'a str,
    id: u64,
    params: P,
}

#[derive(serde::Deserialize)]
struct Response {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(serde::Deserialize, Debug)]
struct RpcErrorBody {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(thiserror::Error, Debug)]
pub(crate) enum JsonRpcError {
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    #[error("HTTP status {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("error {code}: {message}{}", .data.as_ref().map(|d| format!(" ({d})")).unwrap_or_default())]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    #[error("unable to parse response: {0}")]
    Decode(String),
}

/// Perform a single JSON-RPC 2.0 call and decode its result.
///
/// A `null` result decodes fine into an `Option`.
pub(crate) async fn make_jsonrpc_request<P, R>(
    transport: &HttpTransport,
    endpoint: &str,
    method: &str,
    params: P,
) -> Result<R, JsonRpcError>
where
    P: Serialize,
    R: DeserializeOwned,
{
    let req = Request {
        jsonrpc: "2.0",
        method,
        id: rand::random::<u32>().into(),
        params,
    };

    let (status, raw_body) = transport
        .send(|client| client.post(endpoint).json(&req))
        .await
        .map_err(JsonRpcError::Transport)?;
    if !status.is_success() {
        return Err(JsonRpcError::Status {
            status,
            body: raw_body,
        });
    }

    let res = serde_json::from_str::<Response>(&raw_body)
        .map_err(|e| JsonRpcError::Decode(format!("{e}: {raw_body}")))?;
    if let Some(RpcErrorBody {
        code,
        message,
        data,
    }) = res.error
    {
        return Err(JsonRpcError::Rpc {
            code,
            message,
            data,
        });
    }
    serde_json::from_value(res.result.unwrap_or(Value::Null))
        .map_err(|e| JsonRpcError::Decode(e.to_string()))
}

#[derive(serde::Deserialize)]
struct StatusResult {
    sync_info: SyncInfo,
}

#[derive(serde::Deserialize)]
struct SyncInfo {
    latest_block_height: String,
}

/// Latest block height reported by a Tendermint RPC endpoint's `status` method.
pub(crate) async fn latest_block_height(transport: &HttpTransport, endpoint: &str) -> Result<u64> {
    let make_error = |details: String| Error::HttpRequest {
        url: endpoint.to_owned(),
        details,
    };
    let status: StatusResult =
        make_jsonrpc_request(transport, endpoint, "status", serde_json::json!({}))
            .await
            .map_err(|e| make_error(e.to_string()))?;
    status
        .sync_info
        .latest_block_height
        .parse()
        .map_err(|e| Error::parse("latest block height", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_shape() {
        let req = Request {
            jsonrpc: "2.0",
            method: "eth_getTransactionReceipt",
            id: 7,
            params: ["0x01"],
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            serde_json::json!({
                "jsonrpc": "2.0",
                "method": "eth_getTransactionReceipt",
                "id": 7,
                "params": ["0x01"]
            })
        );
    }

    #[test]
    fn rpc_error_display_includes_data() {
        let err = JsonRpcError::Rpc {
            code: 3,
            message: "execution reverted".to_owned(),
            data: Some(Value::String("0x08c379a0".to_owned())),
        };
        assert_eq!(
            err.to_string(),
            "error 3: execution reverted (\"0x08c379a0\")"
        );
    }

    #[test]
    fn status_result_parses() {
        let status: StatusResult = serde_json::from_value(serde_json::json!({
            "node_info": {"network": "evmos_9001-2"},
            "sync_info": {"latest_block_height": "18023456", "catching_up": false}
        }))
        .unwrap();
        assert_eq!(status.sync_info.latest_block_height, "18023456");
    }
}
