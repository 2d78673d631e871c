//! Signing native transactions.

pub(crate) mod amino;
pub mod multisig;

use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use base64::Engine;
use cosmos_sdk_proto::cosmos::tx::v1beta1::{AuthInfo, SignDoc, Tx, TxBody, TxRaw};
use prost::Message;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::address::HasAddress;
use crate::draft::{SignerPublicKey, TransactionDraft};
use crate::error::{Error, Result};
use crate::messages::PendingMessage;
use crate::wallet::{verify_signature, Wallet};

/// How the bytes a key signs are derived from a draft.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignMode {
    /// Protobuf `SignDoc`.
    #[default]
    Direct,
    /// Canonical amino JSON `StdSignDoc`, required for multisig.
    LegacyAminoJson,
}

impl SignMode {
    pub fn as_proto(self) -> cosmos_sdk_proto::cosmos::tx::signing::v1beta1::SignMode {
        use cosmos_sdk_proto::cosmos::tx::signing::v1beta1::SignMode as Proto;
        match self {
            SignMode::Direct => Proto::Direct,
            SignMode::LegacyAminoJson => Proto::LegacyAminoJson,
        }
    }
}

impl FromStr for SignMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" | "sign_mode_direct" => Ok(SignMode::Direct),
            "amino-json" | "legacy-amino-json" | "sign_mode_legacy_amino_json" => {
                Ok(SignMode::LegacyAminoJson)
            }
            _ => Err(Error::parse("sign mode", format!("unknown sign mode {s:?}"))),
        }
    }
}

impl Display for SignMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SignMode::Direct => "direct",
            SignMode::LegacyAminoJson => "amino-json",
        })
    }
}

/// The chain context a signature commits to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerData {
    pub chain_id: String,
    pub account_number: u64,
    pub sequence: u64,
}

impl Display for SignerData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "chain {}, account number {}, sequence {}",
            self.chain_id, self.account_number, self.sequence
        )
    }
}

/// Serialize byte vectors as standard base64 strings.
pub(crate) mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)
    }
}

pub(crate) fn check_signer_data(draft: &TransactionDraft, signer_data: &SignerData) -> Result<()> {
    match draft.signer_data() {
        Some(expected) if expected == signer_data => Ok(()),
        Some(expected) => Err(Error::InvalidRequest(format!(
            "Signer data mismatch: draft was built for {expected}, signing with {signer_data}"
        ))),
        None => Err(Error::InvalidRequest(
            "Transaction draft has no signer data".to_owned(),
        )),
    }
}

fn sign_bytes_for(draft: &TransactionDraft, raw: &TxRaw, signer_data: &SignerData) -> Result<Vec<u8>> {
    match draft.sign_mode() {
        SignMode::Direct => Ok(SignDoc {
            body_bytes: raw.body_bytes.clone(),
            auth_info_bytes: raw.auth_info_bytes.clone(),
            chain_id: signer_data.chain_id.clone(),
            account_number: signer_data.account_number,
        }
        .encode_to_vec()),
        SignMode::LegacyAminoJson => amino::std_sign_bytes(draft, signer_data),
    }
}

/// The exact bytes a signer signs for this draft under its sign mode.
pub fn sign_bytes(draft: &TransactionDraft, signer_data: &SignerData) -> Result<Vec<u8>> {
    sign_bytes_for(draft, &draft.placeholder_raw()?, signer_data)
}

/// Sign a ready draft with a single key.
///
/// The signer data must match the draft's and the wallet must hold the
/// draft's public key. The signature is verified before it is returned.
pub fn sign_single(
    draft: &TransactionDraft,
    wallet: &Wallet,
    signer_data: &SignerData,
) -> Result<SignedTx> {
    draft.require_ready()?;
    check_signer_data(draft, signer_data)?;
    match draft.public_key() {
        Some(SignerPublicKey::Single { key, algorithm })
            if key.as_slice() == wallet.public_key_bytes() && *algorithm == wallet.algorithm() => {}
        _ => return Err(Error::KeyNotFound(wallet.get_address_string())),
    }

    let mut raw = draft.placeholder_raw()?;
    let bytes = sign_bytes_for(draft, &raw, signer_data)?;
    let signature = wallet.sign_bytes(&bytes)?;
    if !verify_signature(
        wallet.algorithm(),
        &wallet.public_key_bytes(),
        &bytes,
        &signature,
    ) {
        return Err(Error::SignatureVerification {
            address: wallet.get_address_string(),
        });
    }
    raw.signatures = vec![signature];
    tracing::debug!(
        "Signed transaction for {} in {} mode, {signer_data}",
        wallet,
        draft.sign_mode()
    );
    Ok(SignedTx { raw })
}

/// A signed native transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct SignedTx {
    raw: TxRaw,
}

impl SignedTx {
    pub(crate) fn from_raw(raw: TxRaw) -> Self {
        SignedTx { raw }
    }

    pub fn raw(&self) -> &TxRaw {
        &self.raw
    }

    /// Protobuf encoding as broadcast to the chain.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.raw.encode_to_vec()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        TxRaw::decode(bytes)
            .map(|raw| SignedTx { raw })
            .map_err(|e| Error::unmarshal("TxRaw", e))
    }

    pub fn decode_tx(&self) -> Result<Tx> {
        Ok(Tx {
            body: Some(
                TxBody::decode(self.raw.body_bytes.as_slice())
                    .map_err(|e| Error::unmarshal("TxBody", e))?,
            ),
            auth_info: Some(
                AuthInfo::decode(self.raw.auth_info_bytes.as_slice())
                    .map_err(|e| Error::unmarshal("AuthInfo", e))?,
            ),
            signatures: self.raw.signatures.clone(),
        })
    }

    pub fn messages(&self) -> Result<Vec<PendingMessage>> {
        TxBody::decode(self.raw.body_bytes.as_slice())
            .map_err(|e| Error::unmarshal("TxBody", e))?
            .messages
            .iter()
            .map(PendingMessage::from_any)
            .collect()
    }

    /// Uppercase hex SHA-256 of the encoded transaction, as reported by nodes.
    pub fn txhash(&self) -> String {
        hex::encode_upper(Sha256::digest(self.to_bytes()))
    }

    /// Pretty printable document: the encoded bytes plus a readable view of them.
    pub fn to_json(&self) -> Result<Value> {
        let tx = self.decode_tx()?;
        let body = tx.body.unwrap_or_default();
        let auth_info = tx.auth_info.unwrap_or_default();
        let messages = body
            .messages
            .iter()
            .map(|any| match PendingMessage::from_any(any) {
                Ok(msg) => serde_json::to_value(msg).map_err(|e| Error::marshal("message", e)),
                Err(_) => Ok(json!({ "type_url": any.type_url })),
            })
            .collect::<Result<Vec<_>>>()?;
        let fee = auth_info.fee.unwrap_or_default();
        let b64 = |bytes: &[u8]| base64::engine::general_purpose::STANDARD.encode(bytes);
        Ok(json!({
            "txhash": self.txhash(),
            "tx_bytes": b64(&self.to_bytes()),
            "body": {
                "messages": messages,
                "memo": body.memo,
                "timeout_height": body.timeout_height.to_string(),
            },
            "auth_info": {
                "signer_infos": auth_info.signer_infos.iter().map(|info| json!({
                    "public_key": info.public_key.as_ref().map(|key| json!({
                        "type_url": key.type_url,
                        "value": b64(&key.value),
                    })),
                    "sequence": info.sequence.to_string(),
                })).collect::<Vec<_>>(),
                "fee": {
                    "amount": fee.amount.iter().map(|coin| json!({
                        "denom": coin.denom,
                        "amount": coin.amount,
                    })).collect::<Vec<_>>(),
                    "gas_limit": fee.gas_limit.to_string(),
                    "granter": fee.granter,
                },
            },
            "signatures": self.raw.signatures.iter().map(|sig| b64(sig)).collect::<Vec<_>>(),
        }))
    }

    /// Recover a transaction from a document written by [Self::write_document].
    pub fn from_json(value: &Value) -> Result<Self> {
        let tx_bytes = value["tx_bytes"]
            .as_str()
            .ok_or_else(|| Error::unmarshal("signed transaction document", "missing tx_bytes"))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(tx_bytes)
            .map_err(|e| Error::unmarshal("signed transaction document", e))?;
        SignedTx::from_bytes(&bytes)
    }

    pub fn write_document(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.to_json()?)
            .map_err(|e| Error::marshal("signed transaction", e))?;
        fs_err::write(path.as_ref(), text)?;
        tracing::debug!("Wrote signed transaction to {}", path.as_ref().display());
        Ok(())
    }

    pub fn read_document(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs_err::read_to_string(path)?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| Error::unmarshal(format!("signed transaction {}", path.display()), e))?;
        SignedTx::from_json(&value)
    }
}
