pub use account::{resolve_account_state, AccountState};
pub use address::{parse_raw_address, Address, AddressAnyHrp, AddressHrp, HasAddress, RawAddress};
pub use broadcast::{BroadcastMode, NativeTxResponse, TxResult};
pub use client::{
    BackendKind, BackendSelector, CosmosBackend, ExecutionPath, GrpcBackend, HttpTransport,
    RestBackend,
};
pub use cosmos_sdk_proto as proto;
pub use cosmos_sdk_proto::cosmos::base::v1beta1::Coin;
pub use draft::{DraftStage, SignerPublicKey, TransactionDraft};
pub use error::{Error, GrpcError, Result};
pub use evm::retry::{RetryExhausted, RetryPolicy};
pub use evm::rpc::{EvmCallRequest, EvmReceipt, EvmRpc, JsonRpcEvmClient};
pub use evm::{
    build_evm_draft, parse_evm_address, parse_evm_chain_id, sign_and_broadcast_evm, sign_evm,
    wait_for_receipt, EvmTransactionDraft, EvmTxOutcome, SignedEvmTx,
};
pub use fee::{
    compute_fee_amount, estimate_gas_and_fee, scale_gas, FeeEstimate, DEFAULT_GAS_ADJUSTMENT,
    DEFAULT_GAS_LIMIT, EVM_TRANSFER_GAS,
};
pub use messages::*;
pub use session::ClientSession;
pub use sign::multisig::{
    sign_multisig_part, MultisigAggregate, SignatureDescriptor, SignatureFile, ThresholdKey,
};
pub use sign::{sign_bytes, sign_single, SignMode, SignedTx, SignerData};
pub use txbuilder::TxBuilder;
pub use wallet::{verify_signature, KeyAlgorithm, RawWallet, Wallet};

mod account;
mod address;
mod broadcast;
mod client;
mod draft;
mod error;
pub mod evm;
mod fee;
mod messages;
mod session;
pub mod sign;
mod txbuilder;
mod wallet;

#[cfg(feature = "clap")]
pub mod clap;

#[cfg(test)]
mod testing;
