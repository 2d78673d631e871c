use base64::Engine;
use cosmos_sdk_proto::cosmos::base::v1beta1::Coin;
use serde_json::{json, Value};
use tonic::async_trait;

use crate::account::AccountState;
use crate::broadcast::{BroadcastMode, NativeTxResponse};
use crate::error::{Error, Result};

use super::{BackendKind, CosmosBackend, HttpTransport};

/// Queries and broadcasts against a Cosmos REST (LCD) endpoint.
pub struct RestBackend {
    base_url: String,
    transport: HttpTransport,
}

impl RestBackend {
    pub fn new(base_url: impl Into<String>, transport: HttpTransport) -> Self {
        let base_url: String = base_url.into();
        RestBackend {
            base_url: base_url.trim_end_matches('/').to_owned(),
            transport,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let res = self
            .transport
            .send(|client| client.get(&url).query(query))
            .await;
        handle_response(&url, res)
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let res = self
            .transport
            .send(|client| client.post(&url).json(body))
            .await;
        handle_response(&url, res)
    }
}

fn handle_response(
    url: &str,
    res: Result<(reqwest::StatusCode, String), reqwest::Error>,
) -> Result<Value> {
    let make_error = |details: String| Error::HttpRequest {
        url: url.to_owned(),
        details,
    };
    let (status, body) = res.map_err(|e| make_error(e.to_string()))?;
    if !status.is_success() {
        // The gateway wraps gRPC errors as {"code": .., "message": ..}.
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_owned))
            .unwrap_or(body);
        return Err(make_error(format!("status {status}: {message}")));
    }
    serde_json::from_str(&body)
        .map_err(|e| Error::unmarshal(format!("response from {url}"), format!("{e}: {body}")))
}

/// REST encodes 64-bit integers as strings, but be lenient about plain numbers.
pub(crate) fn json_u64(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

fn account_from_json(value: &Value) -> Result<AccountState> {
    let account = value
        .get("account")
        .ok_or_else(|| Error::unmarshal("account response", "missing account"))?;
    // Ethermint accounts nest the base account.
    let base = account.get("base_account").unwrap_or(account);
    let field = |name: &str| {
        json_u64(&base[name]).ok_or_else(|| {
            Error::unmarshal("account response", format!("missing or invalid {name}"))
        })
    };
    Ok(AccountState {
        account_number: field("account_number")?,
        // Fresh accounts may omit the sequence entirely.
        sequence: if base.get("sequence").is_some() {
            field("sequence")?
        } else {
            0
        },
    })
}

fn tx_response_from_json(value: &Value) -> Result<NativeTxResponse> {
    let res = value
        .get("tx_response")
        .ok_or_else(|| Error::unmarshal("broadcast response", "missing tx_response"))?;
    let text = |name: &str| res[name].as_str().unwrap_or_default().to_owned();
    Ok(NativeTxResponse {
        txhash: text("txhash"),
        code: json_int(&res["code"], "broadcast result code")?,
        codespace: text("codespace"),
        raw_log: text("raw_log"),
        height: json_int(&res["height"], "broadcast height")?,
        gas_wanted: json_int(&res["gas_wanted"], "broadcast gas wanted")?,
        gas_used: json_int(&res["gas_used"], "broadcast gas used")?,
    })
}

/// Missing fields are zero, out of range values are an error.
fn json_int<T: TryFrom<u64> + Default>(value: &Value, what: &'static str) -> Result<T> {
    match json_u64(value) {
        None => Ok(T::default()),
        Some(n) => T::try_from(n).map_err(|_| Error::parse(what, format!("{n} is out of range"))),
    }
}

#[async_trait]
impl CosmosBackend for RestBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Rest
    }

    async fn account(&self, address: &str) -> Result<AccountState> {
        let value = self
            .get(&format!("/cosmos/auth/v1beta1/accounts/{address}"), &[])
            .await?;
        account_from_json(&value)
    }

    async fn simulate(&self, tx_bytes: Vec<u8>) -> Result<u64> {
        let body = json!({
            "tx_bytes": base64::engine::general_purpose::STANDARD.encode(tx_bytes),
        });
        let value = self.post("/cosmos/tx/v1beta1/simulate", &body).await?;
        json_u64(&value["gas_info"]["gas_used"])
            .ok_or_else(|| Error::unmarshal("simulate response", "missing gas_info.gas_used"))
    }

    async fn broadcast(&self, tx_bytes: Vec<u8>, mode: BroadcastMode) -> Result<NativeTxResponse> {
        let body = json!({
            "tx_bytes": base64::engine::general_purpose::STANDARD.encode(tx_bytes),
            "mode": mode.as_proto().as_str_name(),
        });
        let value = self.post("/cosmos/tx/v1beta1/txs", &body).await?;
        tx_response_from_json(&value)
    }

    async fn all_balances(&self, address: &str) -> Result<Vec<Coin>> {
        let path = format!("/cosmos/bank/v1beta1/balances/{address}");
        let mut coins = Vec::new();
        let mut next_key: Option<String> = None;
        loop {
            let query = match next_key.take() {
                Some(key) => vec![("pagination.key", key)],
                None => vec![],
            };
            let value = self.get(&path, &query).await?;
            let balances = value["balances"].as_array().ok_or_else(|| {
                Error::unmarshal("balances response", "missing balances array")
            })?;
            for balance in balances {
                coins.push(Coin {
                    denom: balance["denom"].as_str().unwrap_or_default().to_owned(),
                    amount: balance["amount"].as_str().unwrap_or_default().to_owned(),
                });
            }
            match value["pagination"]["next_key"].as_str() {
                Some(key) if !key.is_empty() => next_key = Some(key.to_owned()),
                _ => break Ok(coins),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_base_account() {
        let value = json!({
            "account": {
                "@type": "/cosmos.auth.v1beta1.BaseAccount",
                "address": "cosmos1...",
                "pub_key": null,
                "account_number": "42",
                "sequence": "7"
            }
        });
        assert_eq!(
            account_from_json(&value).unwrap(),
            AccountState {
                account_number: 42,
                sequence: 7
            }
        );
    }

    #[test]
    fn parses_eth_account() {
        let value = json!({
            "account": {
                "@type": "/ethermint.types.v1.EthAccount",
                "base_account": {
                    "address": "evmos1...",
                    "account_number": 9,
                    "sequence": "3"
                },
                "code_hash": "0xc5d2"
            }
        });
        assert_eq!(
            account_from_json(&value).unwrap(),
            AccountState {
                account_number: 9,
                sequence: 3
            }
        );
    }

    #[test]
    fn missing_account_is_unmarshal_error() {
        let err = account_from_json(&json!({"code": 5})).unwrap_err();
        assert_eq!(err.code(), 6);
    }

    #[test]
    fn parses_tx_response() {
        let value = json!({
            "tx_response": {
                "height": "0",
                "txhash": "ABCD",
                "codespace": "sdk",
                "code": 32,
                "raw_log": "account sequence mismatch, expected 5, got 4: incorrect account sequence",
                "gas_wanted": "0",
                "gas_used": "0"
            }
        });
        let res = tx_response_from_json(&value).unwrap();
        assert_eq!(res.code, 32);
        assert_eq!(res.codespace, "sdk");
        assert_eq!(res.txhash, "ABCD");
    }

    #[test]
    fn out_of_range_code_is_parse_error() {
        let value = json!({
            "tx_response": {
                "txhash": "ABCD",
                "code": 4_294_967_301u64,
                "gas_used": "100"
            }
        });
        assert_eq!(tx_response_from_json(&value).unwrap_err().code(), 4);

        let value = json!({
            "tx_response": {
                "txhash": "ABCD",
                "code": 0,
                "height": "18446744073709551615"
            }
        });
        assert_eq!(tx_response_from_json(&value).unwrap_err().code(), 4);

        let value = json!({"tx_response": {"txhash": "ABCD", "gas_used": "100"}});
        let res = tx_response_from_json(&value).unwrap();
        assert_eq!(res.code, 0);
        assert_eq!(res.gas_used, 100);
    }

    #[test]
    fn trims_trailing_slash() {
        let backend = RestBackend::new("http://localhost:1317/", HttpTransport::default());
        assert_eq!(backend.base_url(), "http://localhost:1317");
    }
}
