//! Threshold multisig keys and offline signature aggregation.
//!
//! Each member signs the legacy amino JSON sign doc of the same unsigned
//! draft and writes a signature file. [MultisigAggregate] checks every
//! signature against the draft and folds the valid ones into one multisig
//! signature.

use std::collections::BTreeMap;
use std::path::Path;

use base64::Engine;
use cosmos_sdk_proto::cosmos::crypto::multisig::v1beta1::{CompactBitArray, MultiSignature};
use cosmos_sdk_proto::cosmos::crypto::multisig::LegacyAminoPubKey;
use cosmos_sdk_proto::cosmos::tx::v1beta1::{mode_info, ModeInfo};
use cosmos_sdk_proto::Any;
use prost::Message;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::address::{Address, AddressHrp, HasAddress, RawAddress};
use crate::draft::{single_mode_info, SignerPublicKey, TransactionDraft};
use crate::error::{Error, Result};
use crate::wallet::{verify_signature, KeyAlgorithm, Wallet};

use super::{amino, base64_bytes, check_signer_data, SignMode, SignedTx, SignerData};

const LEGACY_AMINO_PUBKEY_TYPE_URL: &str = "/cosmos.crypto.multisig.LegacyAminoPubKey";

// Amino registered type prefixes
const THRESHOLD_PUBKEY_PREFIX: [u8; 4] = [0x22, 0xc1, 0xf7, 0xe2];
const SECP256K1_PUBKEY_PREFIX: [u8; 4] = [0xeb, 0x5a, 0xe9, 0x87];

/// A `threshold`-of-N key over Cosmos `secp256k1` member keys.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdKey {
    threshold: u32,
    members: Vec<MemberKey>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
struct MemberKey(#[serde(with = "base64_bytes")] Vec<u8>);

impl ThresholdKey {
    /// Member keys are compressed secp256k1 public keys, in the order the chain knows them.
    pub fn new(threshold: u32, members: Vec<Vec<u8>>) -> Result<Self> {
        if threshold == 0 || threshold as usize > members.len() {
            return Err(Error::InvalidRequest(format!(
                "Invalid multisig threshold {threshold} for {} members",
                members.len()
            )));
        }
        for member in &members {
            KeyAlgorithm::Secp256k1.address_for(member, AddressHrp::default())?;
        }
        Ok(ThresholdKey {
            threshold,
            members: members.into_iter().map(MemberKey).collect(),
        })
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn members(&self) -> Vec<&[u8]> {
        self.members.iter().map(|m| m.0.as_slice()).collect()
    }

    pub fn member_index(&self, key: &[u8]) -> Option<usize> {
        self.members.iter().position(|m| m.0 == key)
    }

    pub fn to_any(&self) -> Any {
        Any {
            type_url: LEGACY_AMINO_PUBKEY_TYPE_URL.to_owned(),
            value: LegacyAminoPubKey {
                threshold: self.threshold,
                public_keys: self
                    .members
                    .iter()
                    .map(|m| KeyAlgorithm::Secp256k1.public_key_any(&m.0))
                    .collect(),
            }
            .encode_to_vec(),
        }
    }

    /// Amino binary encoding, the input to the multisig address.
    pub fn amino_bytes(&self) -> Vec<u8> {
        let mut out = THRESHOLD_PUBKEY_PREFIX.to_vec();
        out.push(0x08);
        prost::encoding::encode_varint(self.threshold.into(), &mut out);
        for MemberKey(key) in &self.members {
            let mut inner = SECP256K1_PUBKEY_PREFIX.to_vec();
            inner.push(key.len() as u8);
            inner.extend_from_slice(key);
            out.push(0x12);
            prost::encoding::encode_varint(inner.len() as u64, &mut out);
            out.extend_from_slice(&inner);
        }
        out
    }

    pub fn address(&self, hrp: AddressHrp) -> Address {
        let hash = Sha256::digest(self.amino_bytes());
        let mut raw = [0u8; 20];
        raw.copy_from_slice(&hash[..20]);
        RawAddress::from(raw).with_hrp(hrp)
    }
}

/// Bit array with the given member indices set, most significant bit first.
pub(crate) fn compact_bit_array(len: usize, set: &[usize]) -> CompactBitArray {
    let mut elems = vec![0u8; (len + 7) / 8];
    for &i in set {
        elems[i / 8] |= 1 << (7 - i % 8);
    }
    CompactBitArray {
        extra_bits_stored: (len % 8) as u32,
        elems,
    }
}

/// Signature file written by one multisig member, in the layout of
/// `tx sign --signature-only`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureFile {
    pub signatures: Vec<SignatureDescriptor>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureDescriptor {
    pub public_key: PublicKeyJson,
    pub data: SignatureData,
    /// Decimal string, as the chain's JSON renders uint64.
    pub sequence: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyJson {
    #[serde(rename = "@type")]
    pub type_url: String,
    #[serde(with = "base64_bytes")]
    pub key: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureData {
    pub single: SingleSignature,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleSignature {
    pub mode: String,
    #[serde(with = "base64_bytes")]
    pub signature: Vec<u8>,
}

impl SignatureFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs_err::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::unmarshal(format!("signature file {}", path.display()), e))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| Error::marshal("signature file", e))?;
        fs_err::write(path.as_ref(), text)?;
        Ok(())
    }
}

fn require_threshold_key(draft: &TransactionDraft) -> Result<&ThresholdKey> {
    match draft.public_key() {
        Some(SignerPublicKey::Multisig(key)) => Ok(key),
        _ => Err(Error::InvalidRequest(
            "Transaction draft is not for a multisig signer".to_owned(),
        )),
    }
}

fn require_amino(draft: &TransactionDraft) -> Result<()> {
    match draft.sign_mode() {
        SignMode::LegacyAminoJson => Ok(()),
        mode => Err(Error::InvalidRequest(format!(
            "Multisig transactions must use amino-json signing, draft uses {mode}"
        ))),
    }
}

/// Sign a multisig draft as one member, producing that member's signature file.
pub fn sign_multisig_part(
    draft: &TransactionDraft,
    wallet: &Wallet,
    signer_data: &SignerData,
) -> Result<SignatureFile> {
    draft.require_ready()?;
    check_signer_data(draft, signer_data)?;
    require_amino(draft)?;
    let key = require_threshold_key(draft)?;
    if wallet.algorithm() != KeyAlgorithm::Secp256k1
        || key.member_index(&wallet.public_key_bytes()).is_none()
    {
        return Err(Error::KeyNotFound(wallet.get_address_string()));
    }

    let bytes = amino::std_sign_bytes(draft, signer_data)?;
    let signature = wallet.sign_bytes(&bytes)?;
    if !verify_signature(
        KeyAlgorithm::Secp256k1,
        &wallet.public_key_bytes(),
        &bytes,
        &signature,
    ) {
        return Err(Error::SignatureVerification {
            address: wallet.get_address_string(),
        });
    }
    Ok(SignatureFile {
        signatures: vec![SignatureDescriptor {
            public_key: PublicKeyJson {
                type_url: KeyAlgorithm::Secp256k1.public_key_type_url().to_owned(),
                key: wallet.public_key_bytes().to_vec(),
            },
            data: SignatureData {
                single: SingleSignature {
                    mode: SignMode::LegacyAminoJson.as_proto().as_str_name().to_owned(),
                    signature,
                },
            },
            sequence: signer_data.sequence.to_string(),
        }],
    })
}

/// Partial multisig signatures for one draft, keyed by member index.
pub struct MultisigAggregate {
    draft: TransactionDraft,
    key: ThresholdKey,
    hrp: AddressHrp,
    sign_bytes: Vec<u8>,
    signatures: BTreeMap<usize, Vec<u8>>,
}

impl MultisigAggregate {
    /// The signer data every signature is checked against is rebuilt from the draft.
    pub fn new(draft: TransactionDraft, hrp: AddressHrp) -> Result<Self> {
        draft.require_ready()?;
        require_amino(&draft)?;
        let key = require_threshold_key(&draft)?.clone();
        let signer_data = draft
            .signer_data()
            .cloned()
            .ok_or_else(|| Error::InvalidRequest("Transaction draft has no signer data".to_owned()))?;
        let sign_bytes = amino::std_sign_bytes(&draft, &signer_data)?;
        Ok(MultisigAggregate {
            draft,
            key,
            hrp,
            sign_bytes,
            signatures: BTreeMap::new(),
        })
    }

    /// Fold in every valid signature from a member's file.
    ///
    /// Signatures made in another sign mode are skipped. Returns how many were added.
    pub fn add_signature_file(&mut self, file: &SignatureFile) -> Result<usize> {
        let amino_mode = SignMode::LegacyAminoJson.as_proto().as_str_name();
        let mut added = 0;
        for descriptor in &file.signatures {
            if descriptor.data.single.mode != amino_mode {
                tracing::warn!(
                    "Skipping signature made with {}, only {amino_mode} is used for multisig",
                    descriptor.data.single.mode
                );
                continue;
            }
            let member_key = &descriptor.public_key.key;
            let address = KeyAlgorithm::Secp256k1
                .address_for(member_key, self.hrp.clone())
                .map(|a| a.to_string())
                .unwrap_or_else(|_| base64::engine::general_purpose::STANDARD.encode(member_key));
            let index = self
                .key
                .member_index(member_key)
                .ok_or_else(|| Error::KeyNotFound(address.clone()))?;
            let sequence_matches = self
                .draft
                .signer_data()
                .is_some_and(|data| data.sequence.to_string() == descriptor.sequence);
            if !sequence_matches
                || !verify_signature(
                    KeyAlgorithm::Secp256k1,
                    member_key,
                    &self.sign_bytes,
                    &descriptor.data.single.signature,
                )
            {
                return Err(Error::SignatureVerification { address });
            }
            tracing::debug!("Accepted multisig signature from member {index} ({address})");
            self.signatures
                .insert(index, descriptor.data.single.signature.clone());
            added += 1;
        }
        Ok(added)
    }

    pub fn add_signature_file_path(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        self.add_signature_file(&SignatureFile::load(path)?)
    }

    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }

    pub fn draft(&self) -> &TransactionDraft {
        &self.draft
    }

    /// Combine the collected signatures into a broadcastable transaction.
    ///
    /// The threshold is left for the chain to enforce.
    pub fn combine(&self) -> Result<SignedTx> {
        if self.signatures.is_empty() {
            return Err(Error::InsufficientParams("at least one multisig signature"));
        }
        if self.signatures.len() < self.key.threshold as usize {
            tracing::warn!(
                "Combining {} signatures for a {}-of-{} multisig, the chain will reject it",
                self.signatures.len(),
                self.key.threshold,
                self.key.members.len()
            );
        }
        let indices = self.signatures.keys().copied().collect::<Vec<_>>();
        let mode_info = ModeInfo {
            sum: Some(mode_info::Sum::Multi(mode_info::Multi {
                bitarray: Some(compact_bit_array(self.key.members.len(), &indices)),
                mode_infos: indices
                    .iter()
                    .map(|_| single_mode_info(SignMode::LegacyAminoJson))
                    .collect(),
            })),
        };
        let multi = MultiSignature {
            signatures: self.signatures.values().cloned().collect(),
        };
        let mut raw = self.draft.placeholder_raw()?;
        raw.auth_info_bytes = self.draft.auth_info(mode_info)?.encode_to_vec();
        raw.signatures = vec![multi.encode_to_vec()];
        Ok(SignedTx::from_raw(raw))
    }
}

#[cfg(test)]
mod tests {
    use cosmos_sdk_proto::cosmos::tx::v1beta1::AuthInfo;

    use super::*;
    use crate::account::AccountState;
    use crate::draft::tests::bank_send;
    use crate::messages::PayloadCoin;
    use crate::wallet::RawWallet;

    const KEYS: [&str; 3] = [
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
        "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a",
    ];

    fn members() -> Vec<Wallet> {
        KEYS.iter()
            .map(|k| k.parse::<RawWallet>().unwrap().for_hrp("cosmos".parse().unwrap()))
            .collect()
    }

    fn threshold_key(members: &[Wallet]) -> ThresholdKey {
        ThresholdKey::new(
            2,
            members.iter().map(|w| w.public_key_bytes().to_vec()).collect(),
        )
        .unwrap()
    }

    fn multisig_draft(key: &ThresholdKey) -> TransactionDraft {
        let address = key.address("cosmos".parse().unwrap()).to_string();
        let mut draft = TransactionDraft::new();
        draft
            .set_messages(
                vec![bank_send(&address, "1000")],
                address,
                SignerPublicKey::Multisig(key.clone()),
                SignMode::LegacyAminoJson,
            )
            .unwrap();
        draft
            .set_account_state(
                "cosmoshub-4",
                AccountState {
                    account_number: 12,
                    sequence: 3,
                },
            )
            .unwrap();
        draft
            .set_fee(
                300_000,
                PayloadCoin {
                    denom: "uatom".to_owned(),
                    amount: "7500".to_owned(),
                },
            )
            .unwrap();
        draft.finalize("multisig".to_owned(), 0, None).unwrap();
        draft
    }

    #[test]
    fn bit_array_layout() {
        let bits = compact_bit_array(3, &[0, 2]);
        assert_eq!(bits.elems, vec![0b1010_0000]);
        assert_eq!(bits.extra_bits_stored, 3);
        let bits = compact_bit_array(9, &[8]);
        assert_eq!(bits.elems, vec![0, 0b1000_0000]);
        assert_eq!(bits.extra_bits_stored, 1);
    }

    #[test]
    fn amino_encoding_layout() {
        let members = members();
        let key = threshold_key(&members);
        let bytes = key.amino_bytes();
        assert_eq!(&bytes[..6], &[0x22, 0xc1, 0xf7, 0xe2, 0x08, 0x02]);
        assert_eq!(&bytes[6..8], &[0x12, 38]);
        assert_eq!(&bytes[8..13], &[0xeb, 0x5a, 0xe9, 0x87, 33]);
        assert_eq!(bytes.len(), 6 + 3 * 40);
        assert!(key
            .address("cosmos".parse().unwrap())
            .to_string()
            .starts_with("cosmos1"));
    }

    #[test]
    fn rejects_bad_threshold() {
        let members = members();
        let keys = members
            .iter()
            .map(|w| w.public_key_bytes().to_vec())
            .collect::<Vec<_>>();
        assert_eq!(ThresholdKey::new(0, keys.clone()).unwrap_err().code(), 2);
        assert_eq!(ThresholdKey::new(4, keys).unwrap_err().code(), 2);
        assert_eq!(ThresholdKey::new(1, vec![vec![1, 2, 3]]).unwrap_err().code(), 4);
    }

    #[test]
    fn two_of_three_aggregate() {
        let members = members();
        let key = threshold_key(&members);
        let draft = multisig_draft(&key);
        let signer_data = draft.signer_data().unwrap().clone();

        let file0 = sign_multisig_part(&draft, &members[0], &signer_data).unwrap();
        let file2 = sign_multisig_part(&draft, &members[2], &signer_data).unwrap();

        // A single signature still combines into a transaction.
        let mut aggregate = MultisigAggregate::new(draft.clone(), "cosmos".parse().unwrap()).unwrap();
        assert_eq!(aggregate.add_signature_file(&file2).unwrap(), 1);
        let single = aggregate.combine().unwrap();
        assert_eq!(single.raw().signatures.len(), 1);

        assert_eq!(aggregate.add_signature_file(&file0).unwrap(), 1);
        assert_eq!(aggregate.signature_count(), 2);
        let signed = aggregate.combine().unwrap();

        let auth_info = AuthInfo::decode(signed.raw().auth_info_bytes.as_slice()).unwrap();
        let info = &auth_info.signer_infos[0];
        assert_eq!(info.sequence, 3);
        assert_eq!(info.public_key.as_ref().unwrap(), &key.to_any());
        let Some(mode_info::Sum::Multi(multi)) = info.mode_info.as_ref().unwrap().sum.as_ref()
        else {
            panic!("expected multi mode info");
        };
        assert_eq!(multi.bitarray.as_ref().unwrap().elems, vec![0b1010_0000]);
        assert_eq!(multi.mode_infos.len(), 2);

        let sigs = MultiSignature::decode(signed.raw().signatures[0].as_slice()).unwrap();
        let bytes = amino::std_sign_bytes(&draft, &signer_data).unwrap();
        for (sig, member) in sigs.signatures.iter().zip([&members[0], &members[2]]) {
            assert!(verify_signature(
                KeyAlgorithm::Secp256k1,
                &member.public_key_bytes(),
                &bytes,
                sig
            ));
        }
        assert_eq!(signed.raw().body_bytes, single.raw().body_bytes);
    }

    #[test]
    fn outsider_is_key_not_found() {
        let members = members();
        let key = ThresholdKey::new(
            1,
            members[..2].iter().map(|w| w.public_key_bytes().to_vec()).collect(),
        )
        .unwrap();
        let draft = multisig_draft(&key);
        let signer_data = draft.signer_data().unwrap().clone();
        assert_eq!(
            sign_multisig_part(&draft, &members[2], &signer_data)
                .unwrap_err()
                .code(),
            9
        );

        // Forge a file from the outsider by signing with a wider key.
        let wide = threshold_key(&members);
        let wide_draft = multisig_draft(&wide);
        let wide_data = wide_draft.signer_data().unwrap().clone();
        let file = sign_multisig_part(&wide_draft, &members[2], &wide_data).unwrap();
        let mut aggregate = MultisigAggregate::new(draft, "cosmos".parse().unwrap()).unwrap();
        assert_eq!(aggregate.add_signature_file(&file).unwrap_err().code(), 9);
    }

    #[test]
    fn tampered_signature_fails_verification() {
        let members = members();
        let key = threshold_key(&members);
        let draft = multisig_draft(&key);
        let signer_data = draft.signer_data().unwrap().clone();
        let mut file = sign_multisig_part(&draft, &members[1], &signer_data).unwrap();
        file.signatures[0].data.single.signature[10] ^= 0xff;
        let mut aggregate = MultisigAggregate::new(draft, "cosmos".parse().unwrap()).unwrap();
        let err = aggregate.add_signature_file(&file).unwrap_err();
        assert_eq!(err.code(), 10);
        assert!(err.to_string().contains(&members[1].address().to_string()));
    }

    #[test]
    fn other_modes_are_skipped() {
        let members = members();
        let key = threshold_key(&members);
        let draft = multisig_draft(&key);
        let signer_data = draft.signer_data().unwrap().clone();
        let mut file = sign_multisig_part(&draft, &members[0], &signer_data).unwrap();
        file.signatures[0].data.single.mode = "SIGN_MODE_DIRECT".to_owned();
        let mut aggregate = MultisigAggregate::new(draft, "cosmos".parse().unwrap()).unwrap();
        assert_eq!(aggregate.add_signature_file(&file).unwrap(), 0);
        assert_eq!(aggregate.combine().unwrap_err().code(), 3);
    }

    #[test]
    fn signature_file_json_layout() {
        let members = members();
        let key = threshold_key(&members);
        let draft = multisig_draft(&key);
        let signer_data = draft.signer_data().unwrap().clone();
        let file = sign_multisig_part(&draft, &members[0], &signer_data).unwrap();
        let value = serde_json::to_value(&file).unwrap();
        let descriptor = &value["signatures"][0];
        assert_eq!(
            descriptor["public_key"]["@type"],
            "/cosmos.crypto.secp256k1.PubKey"
        );
        assert_eq!(
            descriptor["data"]["single"]["mode"],
            "SIGN_MODE_LEGACY_AMINO_JSON"
        );
        assert_eq!(descriptor["sequence"], "3");
        let parsed: SignatureFile = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, file);
    }
}
