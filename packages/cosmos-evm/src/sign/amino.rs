//! Legacy amino JSON sign documents.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::draft::TransactionDraft;
use crate::error::{Error, Result};
use crate::messages::PendingMessage;

use super::SignerData;

/// Serializes a JSON value with object keys in sorted order, at every depth.
struct Sorted<'a>(&'a Value);

impl Serialize for Sorted<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Object(map) => {
                let mut entries = map.iter().collect::<Vec<_>>();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let mut out = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    out.serialize_entry(key, &Sorted(value))?;
                }
                out.end()
            }
            Value::Array(items) => {
                let mut out = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    out.serialize_element(&Sorted(item))?;
                }
                out.end()
            }
            other => other.serialize(serializer),
        }
    }
}

/// Sorted, compact JSON with HTML-sensitive characters escaped.
pub(crate) fn canonical_json(value: &Value) -> Result<Vec<u8>> {
    let text = serde_json::to_string(&Sorted(value))
        .map_err(|e| Error::marshal("amino JSON", e))?;
    Ok(text
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
        .into_bytes())
}

pub(crate) fn std_sign_doc(draft: &TransactionDraft, signer_data: &SignerData) -> Result<Value> {
    let mut fee = Map::new();
    fee.insert(
        "amount".to_owned(),
        serde_json::to_value(draft.fee()).map_err(|e| Error::marshal("fee", e))?,
    );
    fee.insert("gas".to_owned(), Value::String(draft.gas_limit().to_string()));
    if let Some(granter) = draft.fee_granter() {
        fee.insert("granter".to_owned(), Value::String(granter.to_owned()));
    }

    let mut doc = json!({
        "account_number": signer_data.account_number.to_string(),
        "chain_id": signer_data.chain_id,
        "fee": fee,
        "memo": draft.memo(),
        "msgs": draft
            .messages()
            .iter()
            .map(PendingMessage::amino_json)
            .collect::<Result<Vec<_>>>()?,
        "sequence": signer_data.sequence.to_string(),
    });
    if draft.timeout_height() != 0 {
        doc["timeout_height"] = Value::String(draft.timeout_height().to_string());
    }
    Ok(doc)
}

/// Bytes signed under `SIGN_MODE_LEGACY_AMINO_JSON`.
pub(crate) fn std_sign_bytes(draft: &TransactionDraft, signer_data: &SignerData) -> Result<Vec<u8>> {
    canonical_json(&std_sign_doc(draft, signer_data)?)
}
