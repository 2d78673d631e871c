use std::fmt::Display;

use serde_json::Value;

use crate::account::resolve_account_state;
use crate::broadcast::TxResult;
use crate::client::jsonrpc::latest_block_height;
use crate::client::ExecutionPath;
use crate::draft::{SignerPublicKey, TransactionDraft};
use crate::error::{Error, Result};
use crate::evm::sign_and_broadcast_evm;
use crate::fee::estimate_gas_and_fee;
use crate::messages::{PayloadCoin, PendingMessage};
use crate::session::ClientSession;
use crate::sign::multisig::ThresholdKey;
use crate::sign::{sign_single, SignMode, SignedTx};

/// Transaction builder
///
/// This is the core interface for producing, signing, and broadcasting
/// transactions. The memo belongs to the builder, not the session.
#[derive(Default, Clone, Debug)]
pub struct TxBuilder {
    messages: Vec<PendingMessage>,
    memo: Option<String>,
    skip_code_check: bool,
}

impl Display for TxBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for (idx, msg) in self.messages.iter().enumerate() {
            if idx > 0 {
                f.write_str("; ")?;
            }
            f.write_str(&msg.description())?;
        }
        if let Some(memo) = &self.memo {
            write!(f, " (memo: {memo})")?;
        }
        Ok(())
    }
}

impl TxBuilder {
    /// Add a message to this transaction.
    pub fn add_message(&mut self, msg: impl Into<PendingMessage>) -> &mut Self {
        self.messages.push(msg.into());
        self
    }

    /// Add a message from its module, type tag and JSON payload.
    pub fn try_add_message(&mut self, module: &str, tag: &str, payload: Value) -> Result<&mut Self> {
        self.messages.push(PendingMessage::new(module, tag, payload)?);
        Ok(self)
    }

    pub fn messages(&self) -> &[PendingMessage] {
        &self.messages
    }

    /// Set the memo field.
    pub fn set_memo(&mut self, memo: impl Into<String>) -> &mut Self {
        self.memo = Some(memo.into());
        self
    }

    /// Clear the memo field
    pub fn clear_memo(&mut self) -> &mut Self {
        self.memo = None;
        self
    }

    /// Either set or clear the memo field.
    pub fn set_optional_memo(&mut self, memo: impl Into<Option<String>>) -> &mut Self {
        self.memo = memo.into();
        self
    }

    /// When calling [TxBuilder::sign_and_broadcast], skip the check of whether the code is 0
    pub fn set_skip_code_check(&mut self, skip_code_check: bool) -> &mut Self {
        self.skip_code_check = skip_code_check;
        self
    }

    /// Run the native draft through every stage up to ready.
    pub async fn build_draft(
        &self,
        session: &ClientSession,
        public_key: SignerPublicKey,
        sign_mode: SignMode,
    ) -> Result<TransactionDraft> {
        let signer_address = public_key.address(session.hrp().clone())?.to_string();
        let mut draft = TransactionDraft::new();
        draft.set_messages(
            self.messages.clone(),
            signer_address.clone(),
            public_key,
            sign_mode,
        )?;

        let state = resolve_account_state(session, &signer_address).await?;
        draft.set_account_state(session.chain_id(), state)?;

        let estimate = estimate_gas_and_fee(session, &draft).await?;
        draft.set_fee(
            estimate.gas_limit,
            PayloadCoin {
                denom: session.fee_denom().to_owned(),
                amount: estimate.fee_amount,
            },
        )?;

        draft.finalize(
            self.memo.clone().unwrap_or_default(),
            resolve_timeout_height(session).await?,
            session.fee_granter().map(ToOwned::to_owned),
        )?;
        Ok(draft)
    }

    /// Build the unsigned multisig transaction document for offline signing.
    ///
    /// Written to the session's output document when one is set.
    pub async fn create_unsigned_tx(
        &self,
        session: &ClientSession,
        key: &ThresholdKey,
    ) -> Result<TransactionDraft> {
        if session.sign_mode() == Some(SignMode::Direct) {
            return Err(Error::InvalidRequest(
                "Multisig transactions are signed in amino-json mode, not direct".to_owned(),
            ));
        }
        let draft = self
            .build_draft(
                session,
                SignerPublicKey::Multisig(key.clone()),
                SignMode::LegacyAminoJson,
            )
            .await?;
        if let Some(path) = session.output_document() {
            draft.save(path)?;
        }
        Ok(draft)
    }

    /// Build and sign a native transaction with the session's signer.
    ///
    /// Written to the session's output document when one is set.
    pub async fn create_and_sign_tx(&self, session: &ClientSession) -> Result<SignedTx> {
        let wallet = session.require_signer()?;
        let draft = self
            .build_draft(
                session,
                SignerPublicKey::from(wallet),
                session.sign_mode().unwrap_or_default(),
            )
            .await?;
        let signer_data = draft
            .signer_data()
            .cloned()
            .ok_or_else(|| Error::InvalidRequest("Transaction draft has no signer data".to_owned()))?;
        let signed = sign_single(&draft, wallet, &signer_data)?;
        if let Some(path) = session.output_document() {
            signed.write_document(path)?;
        }
        Ok(signed)
    }

    /// Sign and broadcast on whichever path the messages target.
    pub async fn sign_and_broadcast(&self, session: &ClientSession) -> Result<TxResult> {
        match ExecutionPath::of(&self.messages)? {
            ExecutionPath::Native => {
                let signed = self.create_and_sign_tx(session).await?;
                let res = session
                    .broadcast_signed(&signed, self.skip_code_check)
                    .await?;
                tracing::info!("Broadcast transaction {}", res.txhash);
                Ok(TxResult::Native(res))
            }
            ExecutionPath::Evm => {
                let msg = self
                    .messages
                    .first()
                    .and_then(PendingMessage::as_evm)
                    .ok_or(Error::InsufficientParams("an EVM message"))?;
                sign_and_broadcast_evm(session, msg, self.skip_code_check)
                    .await
                    .map(TxResult::Evm)
            }
        }
    }
}

/// Absolute timeout height, else latest height plus the relative block count, else none.
async fn resolve_timeout_height(session: &ClientSession) -> Result<u64> {
    if let Some(height) = session.timeout_height() {
        return Ok(height);
    }
    let Some(blocks) = session.timeout_blocks() else {
        return Ok(0);
    };
    let url = session
        .tendermint_rpc_url()
        .ok_or(Error::InsufficientParams("a Tendermint RPC URL for a relative timeout"))?;
    let latest = latest_block_height(session.http(), url).await?;
    tracing::debug!("Latest block height {latest}, timing out after {blocks} more blocks");
    relative_timeout_height(latest, blocks)
}

fn relative_timeout_height(latest: u64, blocks: u64) -> Result<u64> {
    latest.checked_add(blocks).ok_or_else(|| {
        Error::InvalidRequest(format!(
            "Timeout of {blocks} blocks after height {latest} overflows"
        ))
    })
}
