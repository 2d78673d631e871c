//! The EVM execution path: legacy EIP-155 transactions sent over JSON-RPC.

pub mod abi;
pub mod retry;
pub mod rpc;

use std::str::FromStr;

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{keccak256, Bytes, TxKind, U256};
use alloy::signers::SignerSync;
use serde::Serialize;

use crate::account::resolve_account_state;
use crate::address::Address;
use crate::broadcast::BroadcastMode;
use crate::error::{Error, Result};
use crate::fee::{parse_decimal_u256, scale_gas, EVM_TRANSFER_GAS};
use crate::messages::{EvmDeploy, EvmMsg};
use crate::session::ClientSession;
use crate::wallet::Wallet;

use self::rpc::{EvmCallRequest, EvmReceipt};

/// Numeric EIP-155 chain ID embedded in a Cosmos chain ID.
///
/// Chain IDs have the shape `<name>_<id>-<epoch>`, with the epoch optional.
/// The part after the first `_` up to the first `-` must be an integer:
/// `evmos_9001-2` is 9001, while `cronos_25_1` is rejected since `25_1` is
/// not.
pub fn parse_evm_chain_id(chain_id: &str) -> Result<u64> {
    let numeric = chain_id
        .split_once('_')
        .map(|(_, rest)| rest.split('-').next().unwrap_or(rest))
        .ok_or_else(|| Error::parse("EVM chain ID", format!("{chain_id:?} has no '_'")))?;
    numeric
        .parse()
        .map_err(|e| Error::parse("EVM chain ID", format!("{numeric:?} in {chain_id:?}: {e}")))
}

/// Parse a recipient given as 0x hex or as a bech32 address with a 20 byte payload.
pub fn parse_evm_address(s: &str) -> Result<alloy::primitives::Address> {
    if s.starts_with("0x") || s.starts_with("0X") {
        return alloy::primitives::Address::from_str(s).map_err(|e| Error::parse("EVM address", e));
    }
    Address::from_str(s)?
        .raw()
        .to_evm()
        .ok_or_else(|| Error::parse("EVM address", format!("{s} is not a 20 byte address")))
}

fn to_hex_quantity(value: impl std::fmt::LowerHex) -> String {
    format!("0x{value:x}")
}

/// An unsigned legacy EVM transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct EvmTransactionDraft {
    pub chain_id: u64,
    /// The account sequence.
    pub nonce: u64,
    /// `None` for a contract deployment.
    pub to: Option<alloy::primitives::Address>,
    pub value: U256,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub input: Vec<u8>,
    /// The deployment this transaction was built from, if any.
    pub deployment: Option<EvmDeploy>,
}

impl EvmTransactionDraft {
    pub fn to_tx(&self) -> TxLegacy {
        TxLegacy {
            chain_id: Some(self.chain_id),
            nonce: self.nonce,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
            to: match self.to {
                Some(to) => TxKind::Call(to),
                None => TxKind::Create,
            },
            value: self.value,
            input: Bytes::from(self.input.clone()),
        }
    }
}

/// A signed EVM transaction ready for `eth_sendRawTransaction`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedEvmTx {
    raw: Vec<u8>,
    tx_hash: String,
}

impl SignedEvmTx {
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// 0x prefixed Keccak-256 hash of the raw bytes.
    pub fn tx_hash(&self) -> &str {
        &self.tx_hash
    }
}

/// What happened to a broadcast EVM transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EvmTxOutcome {
    pub tx_hash: String,
    /// Only fetched in block mode.
    pub receipt: Option<EvmReceipt>,
}

fn gas_price(session: &ClientSession) -> Result<u128> {
    let price = session
        .gas_price()
        .ok_or(Error::InsufficientParams("a gas price"))?;
    parse_decimal_u256("gas price", price)?
        .try_into()
        .map_err(|_| Error::parse("gas price", format!("{price} does not fit in 128 bits")))
}

fn value(amount: Option<&str>) -> Result<U256> {
    amount.map_or(Ok(U256::ZERO), |amount| parse_decimal_u256("EVM amount", amount))
}

/// Build an unsigned EVM transaction for the session's signer.
///
/// The nonce comes from the account resolver. Contract calls without a gas
/// limit are estimated with `eth_estimateGas`.
pub async fn build_evm_draft(session: &ClientSession, msg: &EvmMsg) -> Result<EvmTransactionDraft> {
    let wallet = session.require_signer()?;
    let chain_id = parse_evm_chain_id(session.chain_id())?;
    let gas_price = gas_price(session)?;
    let nonce = resolve_account_state(session, &wallet.evm_account_address().to_string())
        .await?
        .sequence;

    let draft = match msg {
        EvmMsg::Transfer(transfer) => EvmTransactionDraft {
            chain_id,
            nonce,
            to: Some(parse_evm_address(&transfer.to)?),
            value: parse_decimal_u256("EVM amount", &transfer.amount)?,
            gas_limit: transfer
                .gas_limit
                .unwrap_or_else(|| scale_gas(EVM_TRANSFER_GAS, session.gas_adjustment())),
            gas_price,
            input: vec![],
            deployment: None,
        },
        EvmMsg::Call(call) => {
            let to = parse_evm_address(&call.contract)?;
            let value = value(call.amount.as_deref())?;
            let input = abi::encode_call(&call.abi, &call.method, &call.args)?;
            let gas_limit = match call.gas_limit {
                Some(gas_limit) => gas_limit,
                None => {
                    let request = EvmCallRequest {
                        from: wallet.evm_address().to_string(),
                        to: Some(to.to_string()),
                        gas_price: Some(to_hex_quantity(gas_price)),
                        value: Some(to_hex_quantity(value)),
                        data: Some(format!("0x{}", hex::encode(&input))),
                    };
                    let estimated = session
                        .evm_rpc()?
                        .estimate_gas(&request)
                        .await
                        .map_err(|source| Error::FeeEstimation {
                            source: Box::new(source),
                        })?;
                    let gas_limit = scale_gas(estimated, session.gas_adjustment());
                    tracing::debug!("eth_estimateGas returned {estimated}, using {gas_limit}");
                    gas_limit
                }
            };
            EvmTransactionDraft {
                chain_id,
                nonce,
                to: Some(to),
                value,
                gas_limit,
                gas_price,
                input,
                deployment: None,
            }
        }
        EvmMsg::Deploy(deploy) => {
            let gas_limit = deploy.gas_limit.unwrap_or_else(|| {
                tracing::warn!("No gas limit given for contract deployment, using 0");
                0
            });
            EvmTransactionDraft {
                chain_id,
                nonce,
                to: None,
                value: value(deploy.amount.as_deref())?,
                gas_limit,
                gas_price,
                input: abi::encode_deploy(&deploy.abi, &deploy.bytecode, &deploy.args)?,
                deployment: Some(deploy.clone()),
            }
        }
    };
    tracing::debug!(
        "Built EVM transaction: chain {}, nonce {}, gas {} at {}",
        draft.chain_id,
        draft.nonce,
        draft.gas_limit,
        draft.gas_price
    );
    Ok(draft)
}

/// Sign with EIP-155 replay protection over the legacy RLP envelope.
pub fn sign_evm(draft: &EvmTransactionDraft, wallet: &Wallet) -> Result<SignedEvmTx> {
    let tx = draft.to_tx();
    let signature = wallet
        .evm_signer()?
        .sign_hash_sync(&tx.signature_hash())
        .map_err(|e| Error::InvalidRequest(format!("Unable to sign EVM transaction: {e}")))?;
    let raw = TxEnvelope::from(tx.into_signed(signature)).encoded_2718();
    Ok(SignedEvmTx {
        tx_hash: format!("0x{}", hex::encode(keccak256(&raw))),
        raw,
    })
}

/// Poll for a receipt under the session's receipt retry policy.
pub async fn wait_for_receipt(session: &ClientSession, tx_hash: &str) -> Result<EvmReceipt> {
    let rpc = session.evm_rpc()?;
    session
        .receipt_retry_policy()
        .poll(|_| rpc.get_transaction_receipt(tx_hash))
        .await
        .map_err(|e| {
            tracing::warn!("No receipt for {tx_hash}: {e}");
            Error::ReceiptTimeout {
                tx_hash: tx_hash.to_owned(),
                attempts: e.attempts,
            }
        })
}

/// Build, sign and send one EVM message.
///
/// In block mode the receipt is awaited, and a reverted receipt is an error
/// unless `skip_code_check` is set.
pub async fn sign_and_broadcast_evm(
    session: &ClientSession,
    msg: &EvmMsg,
    skip_code_check: bool,
) -> Result<EvmTxOutcome> {
    let draft = build_evm_draft(session, msg).await?;
    let signed = sign_evm(&draft, session.require_signer()?)?;
    let rpc = session.evm_rpc()?;

    let returned = rpc.send_raw_transaction(signed.raw_bytes()).await?;
    let tx_hash = if returned.eq_ignore_ascii_case(signed.tx_hash()) {
        signed.tx_hash
    } else {
        tracing::warn!(
            "Node returned transaction hash {returned}, computed {}",
            signed.tx_hash
        );
        returned
    };
    tracing::info!("Sent EVM transaction {tx_hash}");

    let receipt = match session.broadcast_mode() {
        BroadcastMode::Block => {
            let receipt = wait_for_receipt(session, &tx_hash).await?;
            if !receipt.status && !skip_code_check {
                return Err(Error::EvmTxReverted { tx_hash });
            }
            Some(receipt)
        }
        BroadcastMode::Sync | BroadcastMode::Async => None,
    };
    Ok(EvmTxOutcome { tx_hash, receipt })
}
