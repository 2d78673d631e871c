use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::address::AddressHrp;
use crate::broadcast::BroadcastMode;
use crate::client::{BackendSelector, CosmosBackend, GrpcBackend, HttpTransport, RestBackend};
use crate::error::{Error, Result};
use crate::evm::retry::RetryPolicy;
use crate::evm::rpc::{EvmRpc, JsonRpcEvmClient};
use crate::sign::SignMode;
use crate::wallet::Wallet;

/// Everything the transaction pipeline needs to know about a chain and a signer.
///
/// Unset values fall back to defaults in their getters. Clones share
/// connection handles: the gRPC channel and the HTTP client.
#[derive(Clone)]
pub struct ClientSession {
    chain_id: String,
    fee_denom: String,
    hrp: AddressHrp,
    signer: Option<Wallet>,

    // Transaction parameters
    account_number: Option<u64>,
    sequence: Option<u64>,
    gas_limit: Option<u64>,
    gas_price: Option<String>,
    gas_adjustment: Option<f64>,
    fee_amount: Option<String>,
    fee_granter: Option<String>,
    sign_mode: Option<SignMode>,
    broadcast_mode: Option<BroadcastMode>,
    timeout_height: Option<u64>,
    timeout_blocks: Option<u64>,
    output_document: Option<PathBuf>,

    // Connections
    grpc_url: Option<String>,
    rest_url: Option<String>,
    tendermint_rpc_url: Option<String>,
    evm_rpc_url: Option<String>,
    query_timeout_seconds: Option<u32>,
    query_retries: Option<u32>,
    receipt_attempts: Option<u32>,
    receipt_interval: Option<Duration>,
    receipt_deadline: Option<Duration>,
    http: HttpTransport,
    backend: BackendSelector,
    custom_backend: Option<Arc<dyn CosmosBackend>>,
    evm_rpc: Option<Arc<dyn EvmRpc>>,
}

impl ClientSession {
    /// Create an offline session for the given chain.
    ///
    /// The address prefix defaults to `cosmos`, see [Self::set_hrp].
    pub fn new(chain_id: impl Into<String>, fee_denom: impl Into<String>) -> Self {
        ClientSession {
            chain_id: chain_id.into(),
            fee_denom: fee_denom.into(),
            hrp: AddressHrp::default(),
            signer: None,
            account_number: None,
            sequence: None,
            gas_limit: None,
            gas_price: None,
            gas_adjustment: None,
            fee_amount: None,
            fee_granter: None,
            sign_mode: None,
            broadcast_mode: None,
            timeout_height: None,
            timeout_blocks: None,
            output_document: None,
            grpc_url: None,
            rest_url: None,
            tendermint_rpc_url: None,
            evm_rpc_url: None,
            query_timeout_seconds: None,
            query_retries: None,
            receipt_attempts: None,
            receipt_interval: None,
            receipt_deadline: None,
            http: HttpTransport::default(),
            backend: BackendSelector::Offline,
            custom_backend: None,
            evm_rpc: None,
        }
    }

    fn refresh_backend(&mut self) {
        self.backend = match &self.custom_backend {
            Some(custom) => BackendSelector::Custom(custom.clone()),
            None => BackendSelector::from_endpoints(
                self.grpc_url.as_ref().map(|url| {
                    Arc::new(GrpcBackend::new(
                        url.clone(),
                        Duration::from_secs(self.query_timeout_seconds().into()),
                        self.query_retries(),
                    ))
                }),
                self.rest_url
                    .as_ref()
                    .map(|url| Arc::new(RestBackend::new(url.clone(), self.http.clone()))),
            ),
        };
    }

    /// Chain ID we want to communicate with
    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    /// See [Self::chain_id]
    pub fn set_chain_id(&mut self, chain_id: impl Into<String>) -> &mut Self {
        self.chain_id = chain_id.into();
        self
    }

    /// Denom fees are paid in
    pub fn fee_denom(&self) -> &str {
        &self.fee_denom
    }

    /// See [Self::fee_denom]
    pub fn set_fee_denom(&mut self, fee_denom: impl Into<String>) -> &mut Self {
        self.fee_denom = fee_denom.into();
        self
    }

    /// Human-readable part (HRP) of chain addresses
    pub fn hrp(&self) -> &AddressHrp {
        &self.hrp
    }

    /// See [Self::hrp]
    pub fn set_hrp(&mut self, hrp: AddressHrp) -> &mut Self {
        self.hrp = hrp;
        self
    }

    pub fn signer(&self) -> Option<&Wallet> {
        self.signer.as_ref()
    }

    pub(crate) fn require_signer(&self) -> Result<&Wallet> {
        self.signer
            .as_ref()
            .ok_or(Error::InsufficientParams("a signing key"))
    }

    /// See [Self::signer]
    pub fn set_signer(&mut self, signer: Wallet) -> &mut Self {
        self.signer = Some(signer);
        self
    }

    pub fn pinned_account_number(&self) -> Option<u64> {
        self.account_number
    }

    /// Pin the account number, skipping the account query for it.
    pub fn set_account_number(&mut self, account_number: u64) -> &mut Self {
        self.account_number = Some(account_number);
        self
    }

    pub fn pinned_sequence(&self) -> Option<u64> {
        self.sequence
    }

    /// Pin the sequence, skipping the account query for it.
    pub fn set_sequence(&mut self, sequence: u64) -> &mut Self {
        self.sequence = Some(sequence);
        self
    }

    /// Forget any pinned account number and sequence.
    pub fn clear_account_state(&mut self) -> &mut Self {
        self.account_number = None;
        self.sequence = None;
        self
    }

    /// Gas limit supplied by the caller. When set, no simulation or estimation runs.
    pub fn gas_limit(&self) -> Option<u64> {
        self.gas_limit
    }

    /// See [Self::gas_limit]
    pub fn set_gas_limit(&mut self, gas_limit: u64) -> &mut Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    /// Price per unit of gas, as a decimal integer string.
    pub fn gas_price(&self) -> Option<&str> {
        self.gas_price.as_deref()
    }

    /// See [Self::gas_price]
    pub fn set_gas_price(&mut self, gas_price: impl Into<String>) -> &mut Self {
        self.gas_price = Some(gas_price.into());
        self
    }

    /// Multiplier applied to simulated or estimated gas.
    ///
    /// Defaults to 1.3 following cosmjs and osmojs.
    pub fn gas_adjustment(&self) -> f64 {
        self.gas_adjustment.unwrap_or(crate::fee::DEFAULT_GAS_ADJUSTMENT)
    }

    /// See [Self::gas_adjustment]
    pub fn set_gas_adjustment(&mut self, gas_adjustment: f64) -> &mut Self {
        self.gas_adjustment = Some(gas_adjustment);
        self
    }

    /// Fee amount supplied by the caller, in [Self::fee_denom].
    pub fn fee_amount(&self) -> Option<&str> {
        self.fee_amount.as_deref()
    }

    /// See [Self::fee_amount]
    pub fn set_fee_amount(&mut self, fee_amount: impl Into<String>) -> &mut Self {
        self.fee_amount = Some(fee_amount.into());
        self
    }

    pub fn fee_granter(&self) -> Option<&str> {
        self.fee_granter.as_deref()
    }

    /// See [Self::fee_granter]
    pub fn set_fee_granter(&mut self, fee_granter: impl Into<String>) -> &mut Self {
        self.fee_granter = Some(fee_granter.into());
        self
    }

    /// Sign mode fixed by the caller, if any.
    pub fn sign_mode(&self) -> Option<SignMode> {
        self.sign_mode
    }

    /// See [Self::sign_mode]
    pub fn set_sign_mode(&mut self, sign_mode: SignMode) -> &mut Self {
        self.sign_mode = Some(sign_mode);
        self
    }

    /// Defaults to [BroadcastMode::Sync]
    pub fn broadcast_mode(&self) -> BroadcastMode {
        self.broadcast_mode.unwrap_or_default()
    }

    /// See [Self::broadcast_mode]
    pub fn set_broadcast_mode(&mut self, broadcast_mode: BroadcastMode) -> &mut Self {
        self.broadcast_mode = Some(broadcast_mode);
        self
    }

    /// Absolute block height after which the transaction is invalid.
    pub fn timeout_height(&self) -> Option<u64> {
        self.timeout_height
    }

    /// See [Self::timeout_height]
    pub fn set_timeout_height(&mut self, timeout_height: u64) -> &mut Self {
        self.timeout_height = Some(timeout_height);
        self
    }

    /// Timeout relative to the latest block, resolved through the Tendermint RPC.
    ///
    /// Ignored when an absolute [Self::timeout_height] is set.
    pub fn timeout_blocks(&self) -> Option<u64> {
        self.timeout_blocks
    }

    /// See [Self::timeout_blocks]
    pub fn set_timeout_blocks(&mut self, timeout_blocks: u64) -> &mut Self {
        self.timeout_blocks = Some(timeout_blocks);
        self
    }

    /// Where signed transactions get written, if anywhere.
    pub fn output_document(&self) -> Option<&Path> {
        self.output_document.as_deref()
    }

    /// See [Self::output_document]
    pub fn set_output_document(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.output_document = Some(path.into());
        self
    }

    pub fn grpc_url(&self) -> Option<&str> {
        self.grpc_url.as_deref()
    }

    /// Configure a gRPC endpoint. gRPC takes precedence over REST.
    pub fn set_grpc_url(&mut self, grpc_url: impl Into<String>) -> &mut Self {
        self.grpc_url = Some(grpc_url.into());
        self.refresh_backend();
        self
    }

    pub fn rest_url(&self) -> Option<&str> {
        self.rest_url.as_deref()
    }

    /// Configure a REST (LCD) endpoint, used when no gRPC endpoint is set.
    pub fn set_rest_url(&mut self, rest_url: impl Into<String>) -> &mut Self {
        self.rest_url = Some(rest_url.into());
        self.refresh_backend();
        self
    }

    /// Replace the gRPC/REST selection with a caller supplied backend.
    pub fn set_backend(&mut self, backend: Arc<dyn CosmosBackend>) -> &mut Self {
        self.custom_backend = Some(backend);
        self.refresh_backend();
        self
    }

    pub fn backend_selector(&self) -> &BackendSelector {
        &self.backend
    }

    pub fn tendermint_rpc_url(&self) -> Option<&str> {
        self.tendermint_rpc_url.as_deref()
    }

    /// See [Self::tendermint_rpc_url]
    pub fn set_tendermint_rpc_url(&mut self, url: impl Into<String>) -> &mut Self {
        self.tendermint_rpc_url = Some(url.into());
        self
    }

    pub fn evm_rpc_url(&self) -> Option<&str> {
        self.evm_rpc_url.as_deref()
    }

    /// See [Self::evm_rpc_url]
    pub fn set_evm_rpc_url(&mut self, url: impl Into<String>) -> &mut Self {
        let url = url.into();
        self.evm_rpc = Some(Arc::new(JsonRpcEvmClient::new(
            url.clone(),
            self.http.clone(),
        )));
        self.evm_rpc_url = Some(url);
        self
    }

    /// Replace the EVM JSON-RPC client with a caller supplied one.
    pub fn set_evm_rpc(&mut self, evm_rpc: Arc<dyn EvmRpc>) -> &mut Self {
        self.evm_rpc = Some(evm_rpc);
        self
    }

    pub(crate) fn evm_rpc(&self) -> Result<&dyn EvmRpc> {
        self.evm_rpc
            .as_deref()
            .ok_or(Error::InsufficientParams("an EVM JSON-RPC URL"))
    }

    pub(crate) fn http(&self) -> &HttpTransport {
        &self.http
    }

    /// Seconds before a single gRPC query times out
    ///
    /// Defaults to 5 seconds
    pub fn query_timeout_seconds(&self) -> u32 {
        self.query_timeout_seconds.unwrap_or(5)
    }

    /// See [Self::query_timeout_seconds]
    pub fn set_query_timeout_seconds(&mut self, seconds: u32) -> &mut Self {
        self.query_timeout_seconds = Some(seconds);
        self.refresh_backend();
        self
    }

    /// Number of retries for a failing gRPC query. Broadcasts are never retried.
    ///
    /// Defaults to 3
    pub fn query_retries(&self) -> u32 {
        self.query_retries.unwrap_or(3)
    }

    /// See [Self::query_retries]
    pub fn set_query_retries(&mut self, retries: u32) -> &mut Self {
        self.query_retries = Some(retries);
        self.refresh_backend();
        self
    }

    /// Retry policy used while waiting for EVM receipts
    pub fn receipt_retry_policy(&self) -> RetryPolicy {
        let default = RetryPolicy::default();
        RetryPolicy {
            max_attempts: self.receipt_attempts.unwrap_or(default.max_attempts),
            interval: self.receipt_interval.unwrap_or(default.interval),
            deadline: self.receipt_deadline.or(default.deadline),
        }
    }

    /// See [Self::receipt_retry_policy]
    pub fn set_receipt_attempts(&mut self, attempts: u32) -> &mut Self {
        self.receipt_attempts = Some(attempts);
        self
    }

    /// See [Self::receipt_retry_policy]
    pub fn set_receipt_interval(&mut self, interval: Duration) -> &mut Self {
        self.receipt_interval = Some(interval);
        self
    }

    /// See [Self::receipt_retry_policy]
    pub fn set_receipt_deadline(&mut self, deadline: Duration) -> &mut Self {
        self.receipt_deadline = Some(deadline);
        self
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("chain_id", &self.chain_id)
            .field("fee_denom", &self.fee_denom)
            .field("hrp", &self.hrp)
            .field("signer", &self.signer)
            .field("backend", &self.backend)
            .field("evm_rpc_url", &self.evm_rpc_url)
            .finish_non_exhaustive()
    }
}
