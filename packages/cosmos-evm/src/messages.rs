//! Typed message payloads, one closed enum per chain module.
//!
//! Each native payload knows its protobuf type URL and encoding, its legacy
//! amino JSON form, and a human readable description.

use std::{fmt::Display, io::Write};

use base64::Engine;
use cosmos_sdk_proto::{
    cosmos::{
        bank::v1beta1::{Input, MsgMultiSend, MsgSend, Output},
        base::v1beta1::Coin,
        distribution::v1beta1::MsgWithdrawDelegatorReward,
        gov::v1beta1::{MsgVote, VoteOption},
        staking::v1beta1::{MsgBeginRedelegate, MsgDelegate, MsgUndelegate},
    },
    cosmwasm::wasm::v1::{
        MsgExecuteContract, MsgInstantiateContract, MsgMigrateContract, MsgStoreCode,
        MsgUpdateAdmin,
    },
    Any,
};
use flate2::{write::GzEncoder, Compression};
use prost::Message;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};

/// Every `(module, type)` pair [PendingMessage::new] accepts.
pub const SUPPORTED_MESSAGES: &[(&str, &[&str])] = &[
    ("bank", &["send", "multi-send"]),
    ("staking", &["delegate", "undelegate", "redelegate"]),
    ("distribution", &["withdraw-rewards"]),
    ("gov", &["vote"]),
    (
        "wasm",
        &["execute", "instantiate", "migrate", "update-admin", "store-code"],
    ),
    ("evm", &["transfer", "call", "deploy"]),
];

/// A message waiting to be put in a transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "module", content = "msg", rename_all = "kebab-case")]
pub enum PendingMessage {
    Bank(BankMsg),
    Staking(StakingMsg),
    Distribution(DistributionMsg),
    Gov(GovMsg),
    Wasm(WasmMsg),
    Evm(EvmMsg),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum BankMsg {
    Send(BankSend),
    MultiSend(BankMultiSend),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum StakingMsg {
    Delegate(StakingDelegate),
    Undelegate(StakingUndelegate),
    Redelegate(StakingRedelegate),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum DistributionMsg {
    WithdrawRewards(WithdrawRewards),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum GovMsg {
    Vote(GovVote),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum WasmMsg {
    Execute(WasmExecute),
    Instantiate(WasmInstantiate),
    Migrate(WasmMigrate),
    UpdateAdmin(WasmUpdateAdmin),
    StoreCode(WasmStoreCode),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum EvmMsg {
    Transfer(EvmTransfer),
    Call(EvmCall),
    Deploy(EvmDeploy),
}

/// A coin amount in a payload. Amounts are decimal integer strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PayloadCoin {
    pub denom: String,
    pub amount: String,
}

impl From<&PayloadCoin> for Coin {
    fn from(PayloadCoin { denom, amount }: &PayloadCoin) -> Self {
        Coin {
            denom: denom.clone(),
            amount: amount.clone(),
        }
    }
}

impl From<Coin> for PayloadCoin {
    fn from(Coin { denom, amount }: Coin) -> Self {
        PayloadCoin { denom, amount }
    }
}

impl Display for PayloadCoin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

fn coins_to_proto(coins: &[PayloadCoin]) -> Vec<Coin> {
    coins.iter().map(Coin::from).collect()
}

fn coins_from_proto(coins: Vec<Coin>) -> Vec<PayloadCoin> {
    coins.into_iter().map(PayloadCoin::from).collect()
}

fn describe_coins(coins: &[PayloadCoin]) -> String {
    coins
        .iter()
        .map(|coin| coin.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BankSend {
    pub from_address: String,
    pub to_address: String,
    pub amount: Vec<PayloadCoin>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BankIo {
    pub address: String,
    pub coins: Vec<PayloadCoin>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BankMultiSend {
    pub inputs: Vec<BankIo>,
    pub outputs: Vec<BankIo>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StakingDelegate {
    pub delegator_address: String,
    pub validator_address: String,
    pub amount: PayloadCoin,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StakingUndelegate {
    pub delegator_address: String,
    pub validator_address: String,
    pub amount: PayloadCoin,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StakingRedelegate {
    pub delegator_address: String,
    pub validator_src_address: String,
    pub validator_dst_address: String,
    pub amount: PayloadCoin,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WithdrawRewards {
    pub delegator_address: String,
    pub validator_address: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoteChoice {
    Yes,
    Abstain,
    No,
    NoWithVeto,
}

impl VoteChoice {
    fn as_proto(self) -> VoteOption {
        match self {
            VoteChoice::Yes => VoteOption::Yes,
            VoteChoice::Abstain => VoteOption::Abstain,
            VoteChoice::No => VoteOption::No,
            VoteChoice::NoWithVeto => VoteOption::NoWithVeto,
        }
    }

    fn from_proto(option: i32) -> Result<Self> {
        match VoteOption::try_from(option) {
            Ok(VoteOption::Yes) => Ok(VoteChoice::Yes),
            Ok(VoteOption::Abstain) => Ok(VoteChoice::Abstain),
            Ok(VoteOption::No) => Ok(VoteChoice::No),
            Ok(VoteOption::NoWithVeto) => Ok(VoteChoice::NoWithVeto),
            _ => Err(Error::unmarshal(
                "vote option",
                format!("unsupported option {option}"),
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GovVote {
    pub proposal_id: u64,
    pub voter: String,
    pub option: VoteChoice,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WasmExecute {
    pub sender: String,
    pub contract: String,
    pub msg: Value,
    #[serde(default)]
    pub funds: Vec<PayloadCoin>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WasmInstantiate {
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<String>,
    pub code_id: u64,
    pub label: String,
    pub msg: Value,
    #[serde(default)]
    pub funds: Vec<PayloadCoin>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WasmMigrate {
    pub sender: String,
    pub contract: String,
    pub code_id: u64,
    pub msg: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WasmUpdateAdmin {
    pub sender: String,
    pub new_admin: String,
    pub contract: String,
}

/// Upload contract code. `wasm_byte_code` is base64, raw or already gzipped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WasmStoreCode {
    pub sender: String,
    pub wasm_byte_code: String,
}

/// Send native EVM value to an address.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvmTransfer {
    pub to: String,
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
}

/// Call a contract method. Arguments are ABI values in their string form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvmCall {
    pub contract: String,
    pub abi: Value,
    pub method: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
}

/// Deploy a contract from hex bytecode plus constructor arguments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvmDeploy {
    pub abi: Value,
    pub bytecode: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
}

/// Protobuf and amino views of a native message.
pub(crate) trait NativePayload {
    fn type_url(&self) -> &'static str;
    fn amino_name(&self) -> &'static str;
    fn encode(&self) -> Result<Vec<u8>>;
    fn amino_value(&self) -> Result<Value>;
    fn description(&self) -> String;
}

fn to_amino<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::marshal("amino JSON", e))
}

fn contract_msg_bytes(msg: &Value) -> Result<Vec<u8>> {
    serde_json::to_vec(msg).map_err(|e| Error::marshal("contract message", e))
}

fn contract_msg_from_bytes(msg: &[u8]) -> Result<Value> {
    serde_json::from_slice(msg).map_err(|e| Error::unmarshal("contract message", e))
}

impl NativePayload for BankSend {
    fn type_url(&self) -> &'static str {
        "/cosmos.bank.v1beta1.MsgSend"
    }

    fn amino_name(&self) -> &'static str {
        "cosmos-sdk/MsgSend"
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(MsgSend {
            from_address: self.from_address.clone(),
            to_address: self.to_address.clone(),
            amount: coins_to_proto(&self.amount),
        }
        .encode_to_vec())
    }

    fn amino_value(&self) -> Result<Value> {
        to_amino(self)
    }

    fn description(&self) -> String {
        format!(
            "{} sending {} to {}",
            self.from_address,
            describe_coins(&self.amount),
            self.to_address
        )
    }
}

impl NativePayload for BankMultiSend {
    fn type_url(&self) -> &'static str {
        "/cosmos.bank.v1beta1.MsgMultiSend"
    }

    fn amino_name(&self) -> &'static str {
        "cosmos-sdk/MsgMultiSend"
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(MsgMultiSend {
            inputs: self
                .inputs
                .iter()
                .map(|input| Input {
                    address: input.address.clone(),
                    coins: coins_to_proto(&input.coins),
                })
                .collect(),
            outputs: self
                .outputs
                .iter()
                .map(|output| Output {
                    address: output.address.clone(),
                    coins: coins_to_proto(&output.coins),
                })
                .collect(),
        }
        .encode_to_vec())
    }

    fn amino_value(&self) -> Result<Value> {
        to_amino(self)
    }

    fn description(&self) -> String {
        let outputs = self
            .outputs
            .iter()
            .map(|output| format!("{} to {}", describe_coins(&output.coins), output.address))
            .collect::<Vec<_>>();
        format!(
            "Multi-send from {} inputs: {}",
            self.inputs.len(),
            outputs.join("; ")
        )
    }
}

impl NativePayload for StakingDelegate {
    fn type_url(&self) -> &'static str {
        "/cosmos.staking.v1beta1.MsgDelegate"
    }

    fn amino_name(&self) -> &'static str {
        "cosmos-sdk/MsgDelegate"
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(MsgDelegate {
            delegator_address: self.delegator_address.clone(),
            validator_address: self.validator_address.clone(),
            amount: Some((&self.amount).into()),
        }
        .encode_to_vec())
    }

    fn amino_value(&self) -> Result<Value> {
        to_amino(self)
    }

    fn description(&self) -> String {
        format!(
            "{} delegating {} to {}",
            self.delegator_address, self.amount, self.validator_address
        )
    }
}

impl NativePayload for StakingUndelegate {
    fn type_url(&self) -> &'static str {
        "/cosmos.staking.v1beta1.MsgUndelegate"
    }

    fn amino_name(&self) -> &'static str {
        "cosmos-sdk/MsgUndelegate"
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(MsgUndelegate {
            delegator_address: self.delegator_address.clone(),
            validator_address: self.validator_address.clone(),
            amount: Some((&self.amount).into()),
        }
        .encode_to_vec())
    }

    fn amino_value(&self) -> Result<Value> {
        to_amino(self)
    }

    fn description(&self) -> String {
        format!(
            "{} undelegating {} from {}",
            self.delegator_address, self.amount, self.validator_address
        )
    }
}

impl NativePayload for StakingRedelegate {
    fn type_url(&self) -> &'static str {
        "/cosmos.staking.v1beta1.MsgBeginRedelegate"
    }

    fn amino_name(&self) -> &'static str {
        "cosmos-sdk/MsgBeginRedelegate"
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(MsgBeginRedelegate {
            delegator_address: self.delegator_address.clone(),
            validator_src_address: self.validator_src_address.clone(),
            validator_dst_address: self.validator_dst_address.clone(),
            amount: Some((&self.amount).into()),
        }
        .encode_to_vec())
    }

    fn amino_value(&self) -> Result<Value> {
        to_amino(self)
    }

    fn description(&self) -> String {
        format!(
            "{} redelegating {} from {} to {}",
            self.delegator_address,
            self.amount,
            self.validator_src_address,
            self.validator_dst_address
        )
    }
}

impl NativePayload for WithdrawRewards {
    fn type_url(&self) -> &'static str {
        "/cosmos.distribution.v1beta1.MsgWithdrawDelegatorReward"
    }

    fn amino_name(&self) -> &'static str {
        "cosmos-sdk/MsgWithdrawDelegationReward"
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(MsgWithdrawDelegatorReward {
            delegator_address: self.delegator_address.clone(),
            validator_address: self.validator_address.clone(),
        }
        .encode_to_vec())
    }

    fn amino_value(&self) -> Result<Value> {
        to_amino(self)
    }

    fn description(&self) -> String {
        format!(
            "{} withdrawing rewards from {}",
            self.delegator_address, self.validator_address
        )
    }
}

impl NativePayload for GovVote {
    fn type_url(&self) -> &'static str {
        "/cosmos.gov.v1beta1.MsgVote"
    }

    fn amino_name(&self) -> &'static str {
        "cosmos-sdk/MsgVote"
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(MsgVote {
            proposal_id: self.proposal_id,
            voter: self.voter.clone(),
            option: self.option.as_proto() as i32,
        }
        .encode_to_vec())
    }

    fn amino_value(&self) -> Result<Value> {
        // Amino renders uint64 as a string and enums as their number.
        Ok(json!({
            "option": self.option.as_proto() as i32,
            "proposal_id": self.proposal_id.to_string(),
            "voter": self.voter,
        }))
    }

    fn description(&self) -> String {
        format!(
            "{} voting {:?} on proposal {}",
            self.voter, self.option, self.proposal_id
        )
    }
}

impl NativePayload for WasmExecute {
    fn type_url(&self) -> &'static str {
        "/cosmwasm.wasm.v1.MsgExecuteContract"
    }

    fn amino_name(&self) -> &'static str {
        "wasm/MsgExecuteContract"
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(MsgExecuteContract {
            sender: self.sender.clone(),
            contract: self.contract.clone(),
            msg: contract_msg_bytes(&self.msg)?,
            funds: coins_to_proto(&self.funds),
        }
        .encode_to_vec())
    }

    fn amino_value(&self) -> Result<Value> {
        to_amino(self)
    }

    fn description(&self) -> String {
        format!(
            "{} executing contract {} with message: {}",
            self.sender, self.contract, self.msg
        )
    }
}

impl NativePayload for WasmInstantiate {
    fn type_url(&self) -> &'static str {
        "/cosmwasm.wasm.v1.MsgInstantiateContract"
    }

    fn amino_name(&self) -> &'static str {
        "wasm/MsgInstantiateContract"
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(MsgInstantiateContract {
            sender: self.sender.clone(),
            admin: self.admin.clone().unwrap_or_default(),
            code_id: self.code_id,
            label: self.label.clone(),
            msg: contract_msg_bytes(&self.msg)?,
            funds: coins_to_proto(&self.funds),
        }
        .encode_to_vec())
    }

    fn amino_value(&self) -> Result<Value> {
        let mut value = json!({
            "sender": self.sender,
            "code_id": self.code_id.to_string(),
            "label": self.label,
            "msg": self.msg,
            "funds": to_amino(&self.funds)?,
        });
        if let Some(admin) = &self.admin {
            value["admin"] = Value::String(admin.clone());
        }
        Ok(value)
    }

    fn description(&self) -> String {
        format!(
            "{} instantiating code ID {} with label {} and message: {}",
            self.sender, self.code_id, self.label, self.msg
        )
    }
}

impl NativePayload for WasmMigrate {
    fn type_url(&self) -> &'static str {
        "/cosmwasm.wasm.v1.MsgMigrateContract"
    }

    fn amino_name(&self) -> &'static str {
        "wasm/MsgMigrateContract"
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(MsgMigrateContract {
            sender: self.sender.clone(),
            contract: self.contract.clone(),
            code_id: self.code_id,
            msg: contract_msg_bytes(&self.msg)?,
        }
        .encode_to_vec())
    }

    fn amino_value(&self) -> Result<Value> {
        Ok(json!({
            "sender": self.sender,
            "contract": self.contract,
            "code_id": self.code_id.to_string(),
            "msg": self.msg,
        }))
    }

    fn description(&self) -> String {
        format!(
            "{} migrating contract {} to code ID {} with message: {}",
            self.sender, self.contract, self.code_id, self.msg
        )
    }
}

impl NativePayload for WasmUpdateAdmin {
    fn type_url(&self) -> &'static str {
        "/cosmwasm.wasm.v1.MsgUpdateAdmin"
    }

    fn amino_name(&self) -> &'static str {
        "wasm/MsgUpdateAdmin"
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(MsgUpdateAdmin {
            sender: self.sender.clone(),
            new_admin: self.new_admin.clone(),
            contract: self.contract.clone(),
        }
        .encode_to_vec())
    }

    fn amino_value(&self) -> Result<Value> {
        to_amino(self)
    }

    fn description(&self) -> String {
        format!(
            "{} updating admin on {} to {}",
            self.sender, self.contract, self.new_admin
        )
    }
}

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

impl WasmStoreCode {
    /// The bytes sent on chain, gzipped the way cosmjs does it.
    fn compressed_code(&self) -> Result<Vec<u8>> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(&self.wasm_byte_code)
            .map_err(|e| Error::parse("wasm byte code", e))?;
        if raw.starts_with(&GZIP_MAGIC) {
            return Ok(raw);
        }
        let mut e = GzEncoder::new(Vec::new(), Compression::new(9));
        e.write_all(&raw)?;
        Ok(e.finish()?)
    }
}

impl NativePayload for WasmStoreCode {
    fn type_url(&self) -> &'static str {
        "/cosmwasm.wasm.v1.MsgStoreCode"
    }

    fn amino_name(&self) -> &'static str {
        "wasm/MsgStoreCode"
    }

    fn encode(&self) -> Result<Vec<u8>> {
        Ok(MsgStoreCode {
            sender: self.sender.clone(),
            wasm_byte_code: self.compressed_code()?,
            instantiate_permission: None,
        }
        .encode_to_vec())
    }

    fn amino_value(&self) -> Result<Value> {
        Ok(json!({
            "sender": self.sender,
            "wasm_byte_code": base64::engine::general_purpose::STANDARD.encode(self.compressed_code()?),
        }))
    }

    fn description(&self) -> String {
        format!(
            "{} storing {} bytes of WASM code",
            self.sender,
            self.wasm_byte_code.len() / 4 * 3
        )
    }
}

impl PendingMessage {
    /// Build a message from its module, type tag and JSON payload.
    pub fn new(module: &str, tag: &str, payload: Value) -> Result<Self> {
        let known = SUPPORTED_MESSAGES
            .iter()
            .any(|(m, tags)| *m == module && tags.contains(&tag));
        if !known {
            return Err(Error::InvalidMessageType {
                module: module.to_owned(),
                tag: tag.to_owned(),
            });
        }
        serde_json::from_value(json!({
            "module": module,
            "msg": {"type": tag, "payload": payload},
        }))
        .map_err(|e| Error::unmarshal(format!("{module} {tag} payload"), e))
    }

    pub fn module(&self) -> &'static str {
        match self {
            PendingMessage::Bank(_) => "bank",
            PendingMessage::Staking(_) => "staking",
            PendingMessage::Distribution(_) => "distribution",
            PendingMessage::Gov(_) => "gov",
            PendingMessage::Wasm(_) => "wasm",
            PendingMessage::Evm(_) => "evm",
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            PendingMessage::Bank(BankMsg::Send(_)) => "send",
            PendingMessage::Bank(BankMsg::MultiSend(_)) => "multi-send",
            PendingMessage::Staking(StakingMsg::Delegate(_)) => "delegate",
            PendingMessage::Staking(StakingMsg::Undelegate(_)) => "undelegate",
            PendingMessage::Staking(StakingMsg::Redelegate(_)) => "redelegate",
            PendingMessage::Distribution(DistributionMsg::WithdrawRewards(_)) => "withdraw-rewards",
            PendingMessage::Gov(GovMsg::Vote(_)) => "vote",
            PendingMessage::Wasm(WasmMsg::Execute(_)) => "execute",
            PendingMessage::Wasm(WasmMsg::Instantiate(_)) => "instantiate",
            PendingMessage::Wasm(WasmMsg::Migrate(_)) => "migrate",
            PendingMessage::Wasm(WasmMsg::UpdateAdmin(_)) => "update-admin",
            PendingMessage::Wasm(WasmMsg::StoreCode(_)) => "store-code",
            PendingMessage::Evm(EvmMsg::Transfer(_)) => "transfer",
            PendingMessage::Evm(EvmMsg::Call(_)) => "call",
            PendingMessage::Evm(EvmMsg::Deploy(_)) => "deploy",
        }
    }

    pub fn is_evm(&self) -> bool {
        matches!(self, PendingMessage::Evm(_))
    }

    pub fn as_evm(&self) -> Option<&EvmMsg> {
        match self {
            PendingMessage::Evm(msg) => Some(msg),
            _ => None,
        }
    }

    pub(crate) fn native(&self) -> Result<&dyn NativePayload> {
        let payload: &dyn NativePayload = match self {
            PendingMessage::Bank(BankMsg::Send(x)) => x,
            PendingMessage::Bank(BankMsg::MultiSend(x)) => x,
            PendingMessage::Staking(StakingMsg::Delegate(x)) => x,
            PendingMessage::Staking(StakingMsg::Undelegate(x)) => x,
            PendingMessage::Staking(StakingMsg::Redelegate(x)) => x,
            PendingMessage::Distribution(DistributionMsg::WithdrawRewards(x)) => x,
            PendingMessage::Gov(GovMsg::Vote(x)) => x,
            PendingMessage::Wasm(WasmMsg::Execute(x)) => x,
            PendingMessage::Wasm(WasmMsg::Instantiate(x)) => x,
            PendingMessage::Wasm(WasmMsg::Migrate(x)) => x,
            PendingMessage::Wasm(WasmMsg::UpdateAdmin(x)) => x,
            PendingMessage::Wasm(WasmMsg::StoreCode(x)) => x,
            PendingMessage::Evm(_) => {
                return Err(Error::InvalidMessageType {
                    module: self.module().to_owned(),
                    tag: self.tag().to_owned(),
                })
            }
        };
        Ok(payload)
    }

    /// Protobuf `Any` for a native message. EVM messages have none.
    pub fn to_any(&self) -> Result<Any> {
        let native = self.native()?;
        Ok(Any {
            type_url: native.type_url().to_owned(),
            value: native.encode()?,
        })
    }

    /// The `{"type", "value"}` object used in legacy amino sign docs.
    pub fn amino_json(&self) -> Result<Value> {
        let native = self.native()?;
        Ok(json!({
            "type": native.amino_name(),
            "value": native.amino_value()?,
        }))
    }

    pub fn description(&self) -> String {
        match self {
            PendingMessage::Evm(EvmMsg::Transfer(x)) => {
                format!("EVM transfer of {} to {}", x.amount, x.to)
            }
            PendingMessage::Evm(EvmMsg::Call(x)) => format!(
                "EVM call of {}({}) on {}",
                x.method,
                x.args.join(", "),
                x.contract
            ),
            PendingMessage::Evm(EvmMsg::Deploy(x)) => format!(
                "EVM deployment of {} bytes of bytecode",
                x.bytecode.trim_start_matches("0x").len() / 2
            ),
            _ => match self.native() {
                Ok(native) => native.description(),
                Err(e) => e.to_string(),
            },
        }
    }

    /// Decode a protobuf `Any` back into a typed message.
    pub fn from_any(any: &Any) -> Result<Self> {
        fn decode<M: Message + Default>(any: &Any) -> Result<M> {
            M::decode(any.value.as_slice()).map_err(|e| Error::unmarshal(any.type_url.clone(), e))
        }

        Ok(match any.type_url.as_str() {
            "/cosmos.bank.v1beta1.MsgSend" => {
                let MsgSend {
                    from_address,
                    to_address,
                    amount,
                } = decode(any)?;
                PendingMessage::Bank(BankMsg::Send(BankSend {
                    from_address,
                    to_address,
                    amount: coins_from_proto(amount),
                }))
            }
            "/cosmos.bank.v1beta1.MsgMultiSend" => {
                let MsgMultiSend { inputs, outputs } = decode(any)?;
                PendingMessage::Bank(BankMsg::MultiSend(BankMultiSend {
                    inputs: inputs
                        .into_iter()
                        .map(|Input { address, coins }| BankIo {
                            address,
                            coins: coins_from_proto(coins),
                        })
                        .collect(),
                    outputs: outputs
                        .into_iter()
                        .map(|Output { address, coins }| BankIo {
                            address,
                            coins: coins_from_proto(coins),
                        })
                        .collect(),
                }))
            }
            "/cosmos.staking.v1beta1.MsgDelegate" => {
                let MsgDelegate {
                    delegator_address,
                    validator_address,
                    amount,
                } = decode(any)?;
                PendingMessage::Staking(StakingMsg::Delegate(StakingDelegate {
                    delegator_address,
                    validator_address,
                    amount: required_coin(any, amount)?,
                }))
            }
            "/cosmos.staking.v1beta1.MsgUndelegate" => {
                let MsgUndelegate {
                    delegator_address,
                    validator_address,
                    amount,
                } = decode(any)?;
                PendingMessage::Staking(StakingMsg::Undelegate(StakingUndelegate {
                    delegator_address,
                    validator_address,
                    amount: required_coin(any, amount)?,
                }))
            }
            "/cosmos.staking.v1beta1.MsgBeginRedelegate" => {
                let MsgBeginRedelegate {
                    delegator_address,
                    validator_src_address,
                    validator_dst_address,
                    amount,
                } = decode(any)?;
                PendingMessage::Staking(StakingMsg::Redelegate(StakingRedelegate {
                    delegator_address,
                    validator_src_address,
                    validator_dst_address,
                    amount: required_coin(any, amount)?,
                }))
            }
            "/cosmos.distribution.v1beta1.MsgWithdrawDelegatorReward" => {
                let MsgWithdrawDelegatorReward {
                    delegator_address,
                    validator_address,
                } = decode(any)?;
                PendingMessage::Distribution(DistributionMsg::WithdrawRewards(WithdrawRewards {
                    delegator_address,
                    validator_address,
                }))
            }
            "/cosmos.gov.v1beta1.MsgVote" => {
                let MsgVote {
                    proposal_id,
                    voter,
                    option,
                } = decode(any)?;
                PendingMessage::Gov(GovMsg::Vote(GovVote {
                    proposal_id,
                    voter,
                    option: VoteChoice::from_proto(option)?,
                }))
            }
            "/cosmwasm.wasm.v1.MsgExecuteContract" => {
                let msg: MsgExecuteContract = decode(any)?;
                PendingMessage::Wasm(WasmMsg::Execute(WasmExecute {
                    sender: msg.sender,
                    contract: msg.contract,
                    msg: contract_msg_from_bytes(&msg.msg)?,
                    funds: coins_from_proto(msg.funds),
                }))
            }
            "/cosmwasm.wasm.v1.MsgInstantiateContract" => {
                let msg: MsgInstantiateContract = decode(any)?;
                PendingMessage::Wasm(WasmMsg::Instantiate(WasmInstantiate {
                    sender: msg.sender,
                    admin: Some(msg.admin).filter(|admin| !admin.is_empty()),
                    code_id: msg.code_id,
                    label: msg.label,
                    msg: contract_msg_from_bytes(&msg.msg)?,
                    funds: coins_from_proto(msg.funds),
                }))
            }
            "/cosmwasm.wasm.v1.MsgMigrateContract" => {
                let msg: MsgMigrateContract = decode(any)?;
                PendingMessage::Wasm(WasmMsg::Migrate(WasmMigrate {
                    sender: msg.sender,
                    contract: msg.contract,
                    code_id: msg.code_id,
                    msg: contract_msg_from_bytes(&msg.msg)?,
                }))
            }
            "/cosmwasm.wasm.v1.MsgUpdateAdmin" => {
                let MsgUpdateAdmin {
                    sender,
                    new_admin,
                    contract,
                } = decode(any)?;
                PendingMessage::Wasm(WasmMsg::UpdateAdmin(WasmUpdateAdmin {
                    sender,
                    new_admin,
                    contract,
                }))
            }
            "/cosmwasm.wasm.v1.MsgStoreCode" => {
                let msg: MsgStoreCode = decode(any)?;
                PendingMessage::Wasm(WasmMsg::StoreCode(WasmStoreCode {
                    sender: msg.sender,
                    wasm_byte_code: base64::engine::general_purpose::STANDARD
                        .encode(msg.wasm_byte_code),
                }))
            }
            other => {
                return Err(Error::unmarshal(
                    "message",
                    format!("unsupported type URL {other}"),
                ))
            }
        })
    }
}

fn required_coin(any: &Any, coin: Option<Coin>) -> Result<PayloadCoin> {
    coin.map(PayloadCoin::from)
        .ok_or_else(|| Error::unmarshal(any.type_url.clone(), "missing amount"))
}

impl Display for PendingMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.description())
    }
}

macro_rules! impl_from_payload {
    ($($payload:ident => $module:ident :: $variant:ident),* $(,)?) => {
        $(
            impl From<$payload> for PendingMessage {
                fn from(payload: $payload) -> Self {
                    PendingMessage::$module(payload.into())
                }
            }
        )*
    };
}

macro_rules! impl_from_inner {
    ($($payload:ident => $inner:ident :: $variant:ident),* $(,)?) => {
        $(
            impl From<$payload> for $inner {
                fn from(payload: $payload) -> Self {
                    $inner::$variant(payload)
                }
            }
        )*
    };
}

impl_from_inner! {
    BankSend => BankMsg::Send,
    BankMultiSend => BankMsg::MultiSend,
    StakingDelegate => StakingMsg::Delegate,
    StakingUndelegate => StakingMsg::Undelegate,
    StakingRedelegate => StakingMsg::Redelegate,
    WithdrawRewards => DistributionMsg::WithdrawRewards,
    GovVote => GovMsg::Vote,
    WasmExecute => WasmMsg::Execute,
    WasmInstantiate => WasmMsg::Instantiate,
    WasmMigrate => WasmMsg::Migrate,
    WasmUpdateAdmin => WasmMsg::UpdateAdmin,
    WasmStoreCode => WasmMsg::StoreCode,
    EvmTransfer => EvmMsg::Transfer,
    EvmCall => EvmMsg::Call,
    EvmDeploy => EvmMsg::Deploy,
}

impl_from_payload! {
    BankSend => Bank::Send,
    BankMultiSend => Bank::MultiSend,
    StakingDelegate => Staking::Delegate,
    StakingUndelegate => Staking::Undelegate,
    StakingRedelegate => Staking::Redelegate,
    WithdrawRewards => Distribution::WithdrawRewards,
    GovVote => Gov::Vote,
    WasmExecute => Wasm::Execute,
    WasmInstantiate => Wasm::Instantiate,
    WasmMigrate => Wasm::Migrate,
    WasmUpdateAdmin => Wasm::UpdateAdmin,
    WasmStoreCode => Wasm::StoreCode,
    EvmTransfer => Evm::Transfer,
    EvmCall => Evm::Call,
    EvmDeploy => Evm::Deploy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_pairs_are_rejected() {
        for (module, tag) in [("bank", "burn"), ("ibc", "transfer"), ("evm", "send")] {
            let err = PendingMessage::new(module, tag, json!({})).unwrap_err();
            assert_eq!(err.code(), 1, "{module} {tag}");
        }
    }

    #[test]
    fn mismatched_payload_is_unmarshal_error() {
        // Missing field
        let err = PendingMessage::new("bank", "send", json!({"from_address": "a"})).unwrap_err();
        assert_eq!(err.code(), 6);
        // Payload of a different message type
        let err = PendingMessage::new(
            "staking",
            "delegate",
            json!({"delegator_address": "a", "validator_address": "b"}),
        )
        .unwrap_err();
        assert_eq!(err.code(), 6);
        // Unknown field
        let err = PendingMessage::new(
            "distribution",
            "withdraw-rewards",
            json!({"delegator_address": "a", "validator_address": "b", "extra": 1}),
        )
        .unwrap_err();
        assert_eq!(err.code(), 6);
    }

    #[test]
    fn module_and_tag_survive_construction() {
        let msg = PendingMessage::new(
            "wasm",
            "update-admin",
            json!({"sender": "a", "new_admin": "b", "contract": "c"}),
        )
        .unwrap();
        assert_eq!(msg.module(), "wasm");
        assert_eq!(msg.tag(), "update-admin");
        assert_eq!(
            msg.to_any().unwrap().type_url,
            "/cosmwasm.wasm.v1.MsgUpdateAdmin"
        );
    }

    #[test]
    fn every_supported_pair_has_a_variant() {
        let samples = [
            PendingMessage::from(BankSend {
                from_address: "a".to_owned(),
                to_address: "b".to_owned(),
                amount: vec![],
            }),
            PendingMessage::from(GovVote {
                proposal_id: 1,
                voter: "a".to_owned(),
                option: VoteChoice::Yes,
            }),
            PendingMessage::from(EvmTransfer {
                to: "0x00".to_owned(),
                amount: "1".to_owned(),
                gas_limit: None,
            }),
        ];
        for msg in samples {
            let tags = SUPPORTED_MESSAGES
                .iter()
                .find(|(module, _)| *module == msg.module())
                .map(|(_, tags)| *tags)
                .unwrap();
            assert!(tags.contains(&msg.tag()));
        }
    }

    #[test]
    fn from_any_inverts_to_any() {
        let msgs = [
            PendingMessage::new(
                "staking",
                "redelegate",
                json!({
                    "delegator_address": "evmos1d",
                    "validator_src_address": "evmosvaloper1a",
                    "validator_dst_address": "evmosvaloper1b",
                    "amount": {"denom": "aevmos", "amount": "500"}
                }),
            )
            .unwrap(),
            PendingMessage::new(
                "wasm",
                "instantiate",
                json!({
                    "sender": "wasm1s",
                    "code_id": 12,
                    "label": "counter",
                    "msg": {"count": 0}
                }),
            )
            .unwrap(),
            PendingMessage::new(
                "gov",
                "vote",
                json!({"proposal_id": 7, "voter": "evmos1v", "option": "no-with-veto"}),
            )
            .unwrap(),
        ];
        for msg in msgs {
            let any = msg.to_any().unwrap();
            assert_eq!(PendingMessage::from_any(&any).unwrap(), msg);
        }
    }

    #[test]
    fn gov_vote_amino_json() {
        let msg = PendingMessage::from(GovVote {
            proposal_id: 42,
            voter: "cosmos1voter".to_owned(),
            option: VoteChoice::Abstain,
        });
        assert_eq!(
            msg.amino_json().unwrap(),
            json!({
                "type": "cosmos-sdk/MsgVote",
                "value": {"option": 2, "proposal_id": "42", "voter": "cosmos1voter"}
            })
        );
    }

    #[test]
    fn instantiate_amino_omits_empty_admin() {
        let msg = PendingMessage::from(WasmInstantiate {
            sender: "wasm1s".to_owned(),
            admin: None,
            code_id: 3,
            label: "x".to_owned(),
            msg: json!({}),
            funds: vec![],
        });
        let amino = msg.amino_json().unwrap();
        assert!(amino["value"].get("admin").is_none());
        assert_eq!(amino["value"]["code_id"], json!("3"));
    }

    #[test]
    fn store_code_is_gzipped_once() {
        let code = base64::engine::general_purpose::STANDARD.encode(b"\0asm\x01\0\0\0");
        let msg = PendingMessage::from(WasmStoreCode {
            sender: "wasm1s".to_owned(),
            wasm_byte_code: code,
        });
        let any = msg.to_any().unwrap();
        let decoded = PendingMessage::from_any(&any).unwrap();
        // Decoding yields the compressed bytes, which are not compressed again.
        assert_eq!(decoded.to_any().unwrap(), any);
        let stored = MsgStoreCode::decode(any.value.as_slice()).unwrap();
        assert!(stored.wasm_byte_code.starts_with(&GZIP_MAGIC));
    }

    #[test]
    fn evm_messages_have_no_native_encoding() {
        let msg = PendingMessage::new(
            "evm",
            "transfer",
            json!({"to": "0x0000000000000000000000000000000000000001", "amount": "10"}),
        )
        .unwrap();
        assert!(msg.is_evm());
        assert_eq!(msg.to_any().unwrap_err().code(), 1);
        assert_eq!(msg.amino_json().unwrap_err().code(), 1);
    }

    #[test]
    fn execute_with_non_json_message_fails_to_decode() {
        let any = Any {
            type_url: "/cosmwasm.wasm.v1.MsgExecuteContract".to_owned(),
            value: MsgExecuteContract {
                sender: "a".to_owned(),
                contract: "b".to_owned(),
                msg: b"not json".to_vec(),
                funds: vec![],
            }
            .encode_to_vec(),
        };
        assert_eq!(PendingMessage::from_any(&any).unwrap_err().code(), 6);
    }

    #[test]
    fn serialized_form_is_tagged() {
        let msg = PendingMessage::from(WithdrawRewards {
            delegator_address: "d".to_owned(),
            validator_address: "v".to_owned(),
        });
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "module": "distribution",
                "msg": {
                    "type": "withdraw-rewards",
                    "payload": {"delegator_address": "d", "validator_address": "v"}
                }
            })
        );
    }
}
