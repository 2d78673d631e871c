//! The native transaction draft and its builder state machine.

use std::path::Path;

use cosmos_sdk_proto::cosmos::tx::v1beta1::{
    mode_info, AuthInfo, Fee, ModeInfo, SignerInfo, TxBody, TxRaw,
};
use cosmos_sdk_proto::Any;
use prost::Message;
use serde::{Deserialize, Serialize};

use crate::account::AccountState;
use crate::address::{Address, AddressHrp};
use crate::error::{Error, Result};
use crate::messages::{PayloadCoin, PendingMessage};
use crate::sign::multisig::ThresholdKey;
use crate::sign::{base64_bytes, SignMode, SignerData};
use crate::wallet::{KeyAlgorithm, Wallet};

/// How far a [TransactionDraft] has progressed. Stages only move forward, one at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DraftStage {
    #[default]
    Empty,
    MessagesSet,
    AccountResolved,
    FeeSet,
    Ready,
}

/// The public key a draft is signed with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum SignerPublicKey {
    Single {
        #[serde(with = "base64_bytes")]
        key: Vec<u8>,
        #[serde(default)]
        algorithm: KeyAlgorithm,
    },
    Multisig(ThresholdKey),
}

impl From<&Wallet> for SignerPublicKey {
    fn from(wallet: &Wallet) -> Self {
        SignerPublicKey::Single {
            key: wallet.public_key_bytes().to_vec(),
            algorithm: wallet.algorithm(),
        }
    }
}

impl SignerPublicKey {
    pub fn to_any(&self) -> Any {
        match self {
            SignerPublicKey::Single { key, algorithm } => algorithm.public_key_any(key),
            SignerPublicKey::Multisig(threshold_key) => threshold_key.to_any(),
        }
    }

    pub fn address(&self, hrp: AddressHrp) -> Result<Address> {
        match self {
            SignerPublicKey::Single { key, algorithm } => algorithm.address_for(key, hrp),
            SignerPublicKey::Multisig(threshold_key) => Ok(threshold_key.address(hrp)),
        }
    }

    /// Mode info before any real signature exists.
    ///
    /// A multisig placeholder has every member bit clear and no per-member modes.
    fn placeholder_mode_info(&self, sign_mode: SignMode) -> ModeInfo {
        match self {
            SignerPublicKey::Single { .. } => single_mode_info(sign_mode),
            SignerPublicKey::Multisig(threshold_key) => ModeInfo {
                sum: Some(mode_info::Sum::Multi(mode_info::Multi {
                    bitarray: Some(crate::sign::multisig::compact_bit_array(
                        threshold_key.members().len(),
                        &[],
                    )),
                    mode_infos: vec![],
                })),
            },
        }
    }
}

pub(crate) fn single_mode_info(sign_mode: SignMode) -> ModeInfo {
    ModeInfo {
        sum: Some(mode_info::Sum::Single(mode_info::Single {
            mode: sign_mode.as_proto() as i32,
        })),
    }
}

/// A native transaction under construction.
///
/// Populated in order through `Empty → MessagesSet → AccountResolved →
/// FeeSet → Ready`; each setter checks the stage it starts from. Serialized,
/// this is the unsigned transaction document passed between multisig
/// participants.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct TransactionDraft {
    stage: DraftStage,
    messages: Vec<PendingMessage>,
    signer_address: Option<String>,
    public_key: Option<SignerPublicKey>,
    sign_mode: SignMode,
    signer_data: Option<SignerData>,
    gas_limit: u64,
    fee: Vec<PayloadCoin>,
    memo: String,
    timeout_height: u64,
    fee_granter: Option<String>,
}

impl TransactionDraft {
    pub fn new() -> Self {
        TransactionDraft::default()
    }

    fn advance(&mut self, from: DraftStage, to: DraftStage) -> Result<()> {
        if self.stage != from {
            return Err(Error::InvalidRequest(format!(
                "Cannot move transaction draft to {to:?} from {:?}, it must be at {from:?}",
                self.stage
            )));
        }
        tracing::debug!("Transaction draft {from:?} -> {to:?}");
        self.stage = to;
        Ok(())
    }

    /// Attach the messages and the key that will sign them.
    pub fn set_messages(
        &mut self,
        messages: Vec<PendingMessage>,
        signer_address: String,
        public_key: SignerPublicKey,
        sign_mode: SignMode,
    ) -> Result<()> {
        self.advance(DraftStage::Empty, DraftStage::MessagesSet)?;
        if messages.is_empty() {
            self.stage = DraftStage::Empty;
            return Err(Error::InsufficientParams("at least one message"));
        }
        if let Some(evm) = messages.iter().find(|msg| msg.is_evm()) {
            self.stage = DraftStage::Empty;
            return Err(Error::InvalidMessageType {
                module: evm.module().to_owned(),
                tag: evm.tag().to_owned(),
            });
        }
        self.messages = messages;
        self.signer_address = Some(signer_address);
        self.public_key = Some(public_key);
        self.sign_mode = sign_mode;
        Ok(())
    }

    pub fn set_account_state(&mut self, chain_id: &str, state: AccountState) -> Result<()> {
        self.advance(DraftStage::MessagesSet, DraftStage::AccountResolved)?;
        self.signer_data = Some(SignerData {
            chain_id: chain_id.to_owned(),
            account_number: state.account_number,
            sequence: state.sequence,
        });
        Ok(())
    }

    pub fn set_fee(&mut self, gas_limit: u64, fee: PayloadCoin) -> Result<()> {
        self.advance(DraftStage::AccountResolved, DraftStage::FeeSet)?;
        self.gas_limit = gas_limit;
        self.fee = vec![fee];
        Ok(())
    }

    /// Set the ancillary fields, making the draft ready to sign.
    pub fn finalize(
        &mut self,
        memo: String,
        timeout_height: u64,
        fee_granter: Option<String>,
    ) -> Result<()> {
        self.advance(DraftStage::FeeSet, DraftStage::Ready)?;
        self.memo = memo;
        self.timeout_height = timeout_height;
        self.fee_granter = fee_granter;
        Ok(())
    }

    pub fn stage(&self) -> DraftStage {
        self.stage
    }

    pub fn messages(&self) -> &[PendingMessage] {
        &self.messages
    }

    pub fn signer_address(&self) -> Option<&str> {
        self.signer_address.as_deref()
    }

    pub fn public_key(&self) -> Option<&SignerPublicKey> {
        self.public_key.as_ref()
    }

    pub fn sign_mode(&self) -> SignMode {
        self.sign_mode
    }

    pub fn signer_data(&self) -> Option<&SignerData> {
        self.signer_data.as_ref()
    }

    pub fn gas_limit(&self) -> u64 {
        self.gas_limit
    }

    pub fn fee(&self) -> &[PayloadCoin] {
        &self.fee
    }

    pub fn memo(&self) -> &str {
        &self.memo
    }

    pub fn timeout_height(&self) -> u64 {
        self.timeout_height
    }

    pub fn fee_granter(&self) -> Option<&str> {
        self.fee_granter.as_deref()
    }

    pub(crate) fn require_ready(&self) -> Result<()> {
        if self.stage == DraftStage::Ready {
            Ok(())
        } else {
            Err(Error::InvalidRequest(format!(
                "Transaction draft must be Ready to sign, found {:?}",
                self.stage
            )))
        }
    }

    fn require_public_key(&self) -> Result<&SignerPublicKey> {
        self.public_key
            .as_ref()
            .ok_or_else(|| Error::InvalidRequest("Transaction draft has no signer".to_owned()))
    }

    pub fn tx_body(&self) -> Result<TxBody> {
        Ok(TxBody {
            messages: self
                .messages
                .iter()
                .map(PendingMessage::to_any)
                .collect::<Result<_>>()?,
            memo: self.memo.clone(),
            timeout_height: self.timeout_height,
            extension_options: vec![],
            non_critical_extension_options: vec![],
        })
    }

    pub(crate) fn auth_info(&self, mode_info: ModeInfo) -> Result<AuthInfo> {
        let public_key = self.require_public_key()?;
        let fee = Fee {
            amount: self.fee.iter().map(Into::into).collect(),
            gas_limit: self.gas_limit,
            payer: String::new(),
            granter: self.fee_granter.clone().unwrap_or_default(),
        };
        #[allow(deprecated)]
        let auth_info = AuthInfo {
            signer_infos: vec![SignerInfo {
                public_key: Some(public_key.to_any()),
                mode_info: Some(mode_info),
                sequence: self.signer_data.as_ref().map_or(0, |data| data.sequence),
            }],
            fee: Some(fee),
            tip: None,
        };
        Ok(auth_info)
    }

    /// Encoded transaction with its signature slot holding an empty placeholder.
    ///
    /// The same layout is used for simulation and then filled in by the signer.
    pub(crate) fn placeholder_raw(&self) -> Result<TxRaw> {
        let mode_info = self
            .require_public_key()?
            .placeholder_mode_info(self.sign_mode);
        Ok(TxRaw {
            body_bytes: self.tx_body()?.encode_to_vec(),
            auth_info_bytes: self.auth_info(mode_info)?.encode_to_vec(),
            signatures: vec![vec![]],
        })
    }

    /// Read an unsigned transaction document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs_err::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::unmarshal(format!("transaction draft {}", path.display()), e))
    }

    /// Write this draft as a pretty printed unsigned transaction document.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| Error::marshal("transaction draft", e))?;
        fs_err::write(path.as_ref(), text)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::messages::BankSend;
    use crate::wallet::tests::test_wallet;

    pub(crate) fn bank_send(from: &str, amount: &str) -> PendingMessage {
        BankSend {
            from_address: from.to_owned(),
            to_address: "evmos1qqqsyqcyq5rqwzqfpg9scrgwpugpzysn7hzdtn".to_owned(),
            amount: vec![PayloadCoin {
                denom: "aevmos".to_owned(),
                amount: amount.to_owned(),
            }],
        }
        .into()
    }

    pub(crate) fn ready_draft(wallet: &Wallet, sign_mode: SignMode, sequence: u64) -> TransactionDraft {
        let address = wallet.address().to_string();
        let mut draft = TransactionDraft::new();
        draft
            .set_messages(
                vec![bank_send(&address, "1000")],
                address,
                SignerPublicKey::from(wallet),
                sign_mode,
            )
            .unwrap();
        draft
            .set_account_state(
                "evmos_9001-2",
                AccountState {
                    account_number: 7,
                    sequence,
                },
            )
            .unwrap();
        draft
            .set_fee(
                200_000,
                PayloadCoin {
                    denom: "aevmos".to_owned(),
                    amount: "4000000000000000".to_owned(),
                },
            )
            .unwrap();
        draft.finalize(String::new(), 0, None).unwrap();
        draft
    }

    #[test]
    fn stages_move_in_order() {
        let wallet = test_wallet("evmos");
        let draft = ready_draft(&wallet, SignMode::Direct, 0);
        assert_eq!(draft.stage(), DraftStage::Ready);
    }

    #[test]
    fn out_of_order_transition_is_invalid_request() {
        let mut draft = TransactionDraft::new();
        let err = draft
            .set_fee(
                1,
                PayloadCoin {
                    denom: "aevmos".to_owned(),
                    amount: "1".to_owned(),
                },
            )
            .unwrap_err();
        assert_eq!(err.code(), 2);
        assert_eq!(draft.stage(), DraftStage::Empty);

        let wallet = test_wallet("evmos");
        let mut draft = ready_draft(&wallet, SignMode::Direct, 0);
        let err = draft
            .set_account_state("evmos_9001-2", AccountState::default())
            .unwrap_err();
        assert_eq!(err.code(), 2);
        assert_eq!(draft.stage(), DraftStage::Ready);
    }

    #[test]
    fn evm_messages_are_rejected() {
        let wallet = test_wallet("evmos");
        let evm = PendingMessage::new(
            "evm",
            "transfer",
            serde_json::json!({"to": "0x0000000000000000000000000000000000000001", "amount": "1"}),
        )
        .unwrap();
        let mut draft = TransactionDraft::new();
        let err = draft
            .set_messages(
                vec![evm],
                wallet.address().to_string(),
                SignerPublicKey::from(&wallet),
                SignMode::Direct,
            )
            .unwrap_err();
        assert_eq!(err.code(), 1);
        let err = draft
            .set_messages(
                vec![],
                wallet.address().to_string(),
                SignerPublicKey::from(&wallet),
                SignMode::Direct,
            )
            .unwrap_err();
        assert_eq!(err.code(), 3);
        assert_eq!(draft.stage(), DraftStage::Empty);
    }

    #[test]
    fn document_survives_json() {
        let wallet = test_wallet("evmos");
        let mut draft = ready_draft(&wallet, SignMode::LegacyAminoJson, 3);
        draft.memo = "hello".to_owned();
        let text = serde_json::to_string_pretty(&draft).unwrap();
        let parsed: TransactionDraft = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, draft);
        assert_eq!(
            parsed.placeholder_raw().unwrap(),
            draft.placeholder_raw().unwrap()
        );
    }

    #[test]
    fn placeholder_has_one_empty_signature() {
        let wallet = test_wallet("evmos");
        let draft = ready_draft(&wallet, SignMode::Direct, 5);
        let raw = draft.placeholder_raw().unwrap();
        assert_eq!(raw.signatures, vec![Vec::<u8>::new()]);
        let auth_info = AuthInfo::decode(raw.auth_info_bytes.as_slice()).unwrap();
        assert_eq!(auth_info.signer_infos[0].sequence, 5);
        assert_eq!(auth_info.fee.unwrap().gas_limit, 200_000);
    }
}
