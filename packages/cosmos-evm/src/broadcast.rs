use std::convert::Infallible;
use std::fmt::Display;
use std::str::FromStr;

use cosmos_sdk_proto::cosmos::base::{abci::v1beta1::TxResponse, v1beta1::Coin};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::evm::EvmTxOutcome;
use crate::session::ClientSession;
use crate::sign::SignedTx;

/// How long a broadcast waits before returning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BroadcastMode {
    /// Wait for the CheckTx result.
    #[default]
    Sync,
    /// Return immediately.
    Async,
    /// Wait for the transaction to land in a block. On the EVM path this
    /// polls for the receipt.
    Block,
}

impl BroadcastMode {
    #[allow(deprecated)]
    pub fn as_proto(self) -> cosmos_sdk_proto::cosmos::tx::v1beta1::BroadcastMode {
        use cosmos_sdk_proto::cosmos::tx::v1beta1::BroadcastMode as Proto;
        match self {
            BroadcastMode::Sync => Proto::Sync,
            BroadcastMode::Async => Proto::Async,
            BroadcastMode::Block => Proto::Block,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BroadcastMode::Sync => "sync",
            BroadcastMode::Async => "async",
            BroadcastMode::Block => "block",
        }
    }
}

/// Never fails: anything unrecognized, including the empty string, is [BroadcastMode::Sync].
impl FromStr for BroadcastMode {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "sync" => BroadcastMode::Sync,
            "async" => BroadcastMode::Async,
            "block" => BroadcastMode::Block,
            other => {
                if !other.is_empty() {
                    tracing::warn!("Unrecognized broadcast mode {other:?}, falling back to sync");
                }
                BroadcastMode::Sync
            }
        })
    }
}

impl Display for BroadcastMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The parts of a node's `TxResponse` callers act on.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NativeTxResponse {
    pub txhash: String,
    pub code: u32,
    pub codespace: String,
    pub raw_log: String,
    pub height: i64,
    pub gas_wanted: i64,
    pub gas_used: i64,
}

impl From<TxResponse> for NativeTxResponse {
    fn from(res: TxResponse) -> Self {
        NativeTxResponse {
            txhash: res.txhash,
            code: res.code,
            codespace: res.codespace,
            raw_log: res.raw_log,
            height: res.height,
            gas_wanted: res.gas_wanted,
            gas_used: res.gas_used,
        }
    }
}

/// Result of [crate::TxBuilder::sign_and_broadcast], by execution path.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "path")]
pub enum TxResult {
    Native(NativeTxResponse),
    Evm(EvmTxOutcome),
}

impl TxResult {
    pub fn tx_hash(&self) -> &str {
        match self {
            TxResult::Native(res) => &res.txhash,
            TxResult::Evm(outcome) => &outcome.tx_hash,
        }
    }
}

/// Returned the expected account sequence mismatch based on an error message, if present
pub(crate) fn get_expected_sequence(message: &str) -> Option<u64> {
    for line in message.lines() {
        if let Some(x) = get_expected_sequence_single(line) {
            return Some(x);
        }
    }
    None
}

fn get_expected_sequence_single(message: &str) -> Option<u64> {
    let s = message.strip_prefix("account sequence mismatch, expected ")?;
    let comma = s.find(',')?;
    s[..comma].parse().ok()
}

pub(crate) fn check_tx_response(
    res: NativeTxResponse,
    skip_code_check: bool,
) -> Result<NativeTxResponse> {
    if res.code == 0 || skip_code_check {
        return Ok(res);
    }
    let expected_sequence = get_expected_sequence(&res.raw_log);
    if let Some(expected) = expected_sequence {
        tracing::warn!(
            "Transaction {} failed with an account sequence mismatch, chain expects sequence {expected}",
            res.txhash
        );
    }
    Err(Error::TxFailed {
        txhash: res.txhash,
        code: res.code,
        codespace: res.codespace,
        raw_log: res.raw_log,
        expected_sequence,
    })
}

impl ClientSession {
    /// Submit encoded transaction bytes through the session's backend and broadcast mode.
    pub async fn broadcast_tx_bytes(
        &self,
        tx_bytes: Vec<u8>,
        skip_code_check: bool,
    ) -> Result<NativeTxResponse> {
        let backend = self.backend_selector().require()?;
        let mode = self.broadcast_mode();
        tracing::debug!(
            "Broadcasting {} bytes in {mode} mode via {:?}",
            tx_bytes.len(),
            backend.kind()
        );
        let res = backend.broadcast(tx_bytes, mode).await?;
        tracing::debug!("Broadcast returned txhash {} with code {}", res.txhash, res.code);
        check_tx_response(res, skip_code_check)
    }

    pub async fn broadcast_signed(
        &self,
        signed: &SignedTx,
        skip_code_check: bool,
    ) -> Result<NativeTxResponse> {
        self.broadcast_tx_bytes(signed.to_bytes(), skip_code_check)
            .await
    }

    /// All balances held by an address, following pagination.
    pub async fn all_balances(&self, address: &str) -> Result<Vec<Coin>> {
        self.backend_selector().require()?.all_balances(address).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::testing::StubBackend;

    #[test]
    fn get_expected_sequence_good() {
        assert_eq!(
            get_expected_sequence("account sequence mismatch, expected 5, got 0"),
            Some(5)
        );
        assert_eq!(
            get_expected_sequence("account sequence mismatch, expected 2, got 7"),
            Some(2)
        );
        assert_eq!(
            get_expected_sequence("account sequence mismatch, expected 20000001, got 7"),
            Some(20000001)
        );
    }

    #[test]
    fn get_expected_sequence_extra_prelude() {
        assert_eq!(
            get_expected_sequence("blah blah blah\n\naccount sequence mismatch, expected 5, got 0"),
            Some(5)
        );
        assert_eq!(
            get_expected_sequence(
                "foajodifjaolkdfjas aiodjfaof\n\n\naccount sequence mismatch, expected 2, got 7"
            ),
            Some(2)
        );
    }

    #[test]
    fn get_expected_sequence_bad() {
        assert_eq!(
            get_expected_sequence("Totally different error message"),
            None
        );
        assert_eq!(
            get_expected_sequence("account sequence mismatch, expected XXXXX, got 7"),
            None
        );
    }

    #[test]
    fn unrecognized_modes_are_sync() {
        for s in ["", "bogus", "  ", "SYNC", "sync"] {
            assert_eq!(s.parse::<BroadcastMode>().unwrap(), BroadcastMode::Sync, "{s:?}");
        }
        assert_eq!("Block".parse::<BroadcastMode>().unwrap(), BroadcastMode::Block);
        assert_eq!("async".parse::<BroadcastMode>().unwrap(), BroadcastMode::Async);
        assert_eq!(BroadcastMode::default(), BroadcastMode::Sync);
    }

    #[test]
    fn failed_code_carries_expected_sequence() {
        let res = NativeTxResponse {
            txhash: "ABCD".to_owned(),
            code: 32,
            codespace: "sdk".to_owned(),
            raw_log: "account sequence mismatch, expected 6, got 5: incorrect account sequence"
                .to_owned(),
            ..Default::default()
        };
        match check_tx_response(res.clone(), false).unwrap_err() {
            Error::TxFailed {
                code,
                expected_sequence,
                ..
            } => {
                assert_eq!(code, 32);
                assert_eq!(expected_sequence, Some(6));
            }
            e => panic!("unexpected error {e}"),
        }
        assert_eq!(check_tx_response(res.clone(), true).unwrap(), res);
    }

    #[tokio::test]
    async fn broadcast_uses_session_mode() {
        let stub = Arc::new(StubBackend::default());
        let mut session = ClientSession::new("evmos_9001-2", "aevmos");
        session
            .set_backend(stub.clone())
            .set_broadcast_mode("".parse().unwrap());
        session.broadcast_tx_bytes(vec![1, 2, 3], false).await.unwrap();
        session.set_broadcast_mode(BroadcastMode::Async);
        session.broadcast_tx_bytes(vec![4], false).await.unwrap();
        assert_eq!(
            stub.calls(),
            vec!["broadcast sync".to_owned(), "broadcast async".to_owned()]
        );
    }

    #[tokio::test]
    async fn offline_broadcast_needs_an_endpoint() {
        let session = ClientSession::new("evmos_9001-2", "aevmos");
        let err = session.broadcast_tx_bytes(vec![], false).await.unwrap_err();
        assert_eq!(err.code(), 3);
    }
}
