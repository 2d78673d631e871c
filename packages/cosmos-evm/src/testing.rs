//! In-memory backends for unit tests.

use std::collections::VecDeque;

use cosmos_sdk_proto::cosmos::base::v1beta1::Coin;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tonic::async_trait;

use crate::account::AccountState;
use crate::broadcast::{BroadcastMode, NativeTxResponse};
use crate::client::{BackendKind, CosmosBackend};
use crate::error::{Error, Result};
use crate::evm::rpc::{EvmCallRequest, EvmReceipt, EvmRpc};

/// Records every call and answers from canned values.
pub(crate) struct StubBackend {
    account: AccountState,
    fail_account: bool,
    gas_used: u64,
    fail_simulate: bool,
    broadcast_code: u32,
    balances: Vec<Coin>,
    calls: Mutex<Vec<String>>,
    broadcasts: Mutex<Vec<Vec<u8>>>,
}

impl Default for StubBackend {
    fn default() -> Self {
        StubBackend {
            account: AccountState::default(),
            fail_account: false,
            gas_used: 100_000,
            fail_simulate: false,
            broadcast_code: 0,
            balances: vec![],
            calls: Mutex::new(vec![]),
            broadcasts: Mutex::new(vec![]),
        }
    }
}

fn unavailable(what: &str) -> Error {
    Error::HttpRequest {
        url: "stub://".to_owned(),
        details: format!("{what} unavailable"),
    }
}

impl StubBackend {
    pub(crate) fn with_account(mut self, account: AccountState) -> Self {
        self.account = account;
        self
    }

    pub(crate) fn failing_account(mut self) -> Self {
        self.fail_account = true;
        self
    }

    pub(crate) fn with_gas_used(mut self, gas_used: u64) -> Self {
        self.gas_used = gas_used;
        self
    }

    pub(crate) fn failing_simulate(mut self) -> Self {
        self.fail_simulate = true;
        self
    }

    /// Every broadcast comes back with this result code.
    pub(crate) fn with_broadcast_code(mut self, code: u32) -> Self {
        self.broadcast_code = code;
        self
    }

    pub(crate) fn with_balances(mut self, balances: Vec<Coin>) -> Self {
        self.balances = balances;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub(crate) fn broadcasts(&self) -> Vec<Vec<u8>> {
        self.broadcasts.lock().clone()
    }
}

#[async_trait]
impl CosmosBackend for StubBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Custom
    }

    async fn account(&self, address: &str) -> Result<AccountState> {
        self.calls.lock().push(format!("account {address}"));
        if self.fail_account {
            Err(unavailable("account"))
        } else {
            Ok(self.account)
        }
    }

    async fn simulate(&self, _tx_bytes: Vec<u8>) -> Result<u64> {
        self.calls.lock().push("simulate".to_owned());
        if self.fail_simulate {
            Err(unavailable("simulate"))
        } else {
            Ok(self.gas_used)
        }
    }

    async fn broadcast(&self, tx_bytes: Vec<u8>, mode: BroadcastMode) -> Result<NativeTxResponse> {
        self.calls.lock().push(format!("broadcast {mode}"));
        let txhash = hex::encode_upper(Sha256::digest(&tx_bytes));
        self.broadcasts.lock().push(tx_bytes);
        Ok(NativeTxResponse {
            txhash,
            code: self.broadcast_code,
            codespace: if self.broadcast_code == 0 {
                String::new()
            } else {
                "sdk".to_owned()
            },
            raw_log: if self.broadcast_code == 0 {
                String::new()
            } else {
                "account sequence mismatch, expected 6, got 5: incorrect account sequence"
                    .to_owned()
            },
            ..NativeTxResponse::default()
        })
    }

    async fn all_balances(&self, address: &str) -> Result<Vec<Coin>> {
        self.calls.lock().push(format!("balances {address}"));
        Ok(self.balances.clone())
    }
}

/// Receipt with placeholder block data.
pub(crate) fn receipt(status: bool) -> EvmReceipt {
    EvmReceipt {
        transaction_hash: "0x00".to_owned(),
        block_number: 1,
        gas_used: 21_000,
        status,
        contract_address: None,
    }
}

/// EVM JSON-RPC answering from canned values. Receipts are handed out in
/// order, then `None` forever.
#[derive(Default)]
pub(crate) struct StubEvmRpc {
    gas_estimate: u64,
    fail_estimate: bool,
    fail_receipts: bool,
    receipts: Mutex<VecDeque<Option<EvmReceipt>>>,
    calls: Mutex<Vec<String>>,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl StubEvmRpc {
    pub(crate) fn with_gas_estimate(mut self, gas: u64) -> Self {
        self.gas_estimate = gas;
        self
    }

    pub(crate) fn failing_estimate(mut self) -> Self {
        self.fail_estimate = true;
        self
    }

    /// Every receipt lookup errors.
    pub(crate) fn failing_receipts(mut self) -> Self {
        self.fail_receipts = true;
        self
    }

    pub(crate) fn with_receipts(self, receipts: Vec<Option<EvmReceipt>>) -> Self {
        *self.receipts.lock() = receipts.into();
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl EvmRpc for StubEvmRpc {
    async fn estimate_gas(&self, _call: &EvmCallRequest) -> Result<u64> {
        self.calls.lock().push("eth_estimateGas".to_owned());
        if self.fail_estimate {
            Err(Error::EvmRpcRequest {
                method: "eth_estimateGas",
                details: "execution reverted".to_owned(),
            })
        } else {
            Ok(self.gas_estimate)
        }
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String> {
        self.calls.lock().push("eth_sendRawTransaction".to_owned());
        self.sent.lock().push(raw.to_vec());
        Ok(format!(
            "0x{}",
            hex::encode(alloy::primitives::keccak256(raw))
        ))
    }

    async fn get_transaction_receipt(&self, _tx_hash: &str) -> Result<Option<EvmReceipt>> {
        self.calls.lock().push("eth_getTransactionReceipt".to_owned());
        if self.fail_receipts {
            return Err(Error::EvmRpcRequest {
                method: "eth_getTransactionReceipt",
                details: "connection refused".to_owned(),
            });
        }
        Ok(self.receipts.lock().pop_front().flatten())
    }
}
