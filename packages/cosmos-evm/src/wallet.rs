use std::fmt::Display;
use std::str::FromStr;

use bitcoin::hashes::{ripemd160, sha256, Hash};
use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use cosmos_sdk_proto::Any;
use once_cell::sync::OnceCell;
use prost::Message as _;
use serde::{Deserialize, Serialize};

use crate::address::{Address, AddressHrp, HasAddress, RawAddress};
use crate::error::{Error, Result};

const SECP256K1_TYPE_URL: &str = "/cosmos.crypto.secp256k1.PubKey";
const ETH_SECP256K1_TYPE_URL: &str = "/ethermint.crypto.v1.ethsecp256k1.PubKey";

/// How a secp256k1 key is presented to the chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyAlgorithm {
    /// Cosmos SDK `secp256k1`, SHA-256 digests and RIPEMD-160 addresses.
    #[default]
    Secp256k1,
    /// Ethermint `eth_secp256k1`, Keccak-256 digests and Ethereum addresses.
    EthSecp256k1,
}

impl KeyAlgorithm {
    pub fn public_key_type_url(self) -> &'static str {
        match self {
            KeyAlgorithm::Secp256k1 => SECP256K1_TYPE_URL,
            KeyAlgorithm::EthSecp256k1 => ETH_SECP256K1_TYPE_URL,
        }
    }

    pub(crate) fn from_type_url(type_url: &str) -> Option<Self> {
        match type_url {
            SECP256K1_TYPE_URL => Some(KeyAlgorithm::Secp256k1),
            ETH_SECP256K1_TYPE_URL => Some(KeyAlgorithm::EthSecp256k1),
            _ => None,
        }
    }

    fn digest(self, msg: &[u8]) -> [u8; 32] {
        match self {
            KeyAlgorithm::Secp256k1 => sha256::Hash::hash(msg).into_inner(),
            KeyAlgorithm::EthSecp256k1 => alloy::primitives::keccak256(msg).0,
        }
    }

    fn raw_address(self, public_key: &PublicKey) -> [u8; 20] {
        match self {
            KeyAlgorithm::Secp256k1 => {
                let sha = sha256::Hash::hash(&public_key.serialize());
                ripemd160::Hash::hash(sha.as_ref()).into_inner()
            }
            KeyAlgorithm::EthSecp256k1 => {
                let uncompressed = public_key.serialize_uncompressed();
                let hash = alloy::primitives::keccak256(&uncompressed[1..]);
                let mut out = [0; 20];
                out.copy_from_slice(&hash[12..]);
                out
            }
        }
    }

    /// Wrap compressed public key bytes in a protobuf `Any` for a signer info.
    pub(crate) fn public_key_any(self, key: &[u8]) -> Any {
        Any {
            type_url: self.public_key_type_url().to_owned(),
            value: cosmos_sdk_proto::cosmos::crypto::secp256k1::PubKey { key: key.to_vec() }
                .encode_to_vec(),
        }
    }

    /// Address for compressed public key bytes under this algorithm.
    pub fn address_for(self, key: &[u8], hrp: AddressHrp) -> Result<Address> {
        let public_key = PublicKey::from_slice(key)
            .map_err(|e| Error::parse("secp256k1 public key", e))?;
        Ok(RawAddress::from(self.raw_address(&public_key)).with_hrp(hrp))
    }
}

impl FromStr for KeyAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "secp256k1" => Ok(KeyAlgorithm::Secp256k1),
            "eth-secp256k1" | "eth_secp256k1" | "ethsecp256k1" => Ok(KeyAlgorithm::EthSecp256k1),
            _ => Err(Error::parse("key algorithm", format!("unknown algorithm {s:?}"))),
        }
    }
}

/// A private key not yet tied to an address prefix.
#[derive(Clone)]
pub struct RawWallet {
    secret_key: SecretKey,
    algorithm: KeyAlgorithm,
}

impl FromStr for RawWallet {
    type Err = Error;

    /// Parses a hex encoded private key, with or without a `0x` prefix.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| Error::parse("private key", e))?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|e| Error::parse("private key", e))?;
        Ok(RawWallet {
            secret_key,
            algorithm: KeyAlgorithm::default(),
        })
    }
}

impl RawWallet {
    pub fn with_algorithm(mut self, algorithm: KeyAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn for_hrp(&self, hrp: AddressHrp) -> Wallet {
        let public_key = PublicKey::from_secret_key(global_secp(), &self.secret_key);
        let address = RawAddress::from(self.algorithm.raw_address(&public_key)).with_hrp(hrp);
        Wallet {
            address,
            secret_key: self.secret_key,
            public_key,
            algorithm: self.algorithm,
        }
    }
}

/// A wallet capable of signing on a specific blockchain
#[derive(Clone)]
// Not deriving Copy since this is a pretty large data structure.
pub struct Wallet {
    address: Address,
    secret_key: SecretKey,
    public_key: PublicKey,
    algorithm: KeyAlgorithm,
}

fn global_secp() -> &'static Secp256k1<All> {
    static CELL: OnceCell<Secp256k1<All>> = OnceCell::new();
    CELL.get_or_init(Secp256k1::new)
}

impl Wallet {
    pub fn from_hex(key: &str, hrp: AddressHrp) -> Result<Self> {
        Ok(key.parse::<RawWallet>()?.for_hrp(hrp))
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    /// Compressed SEC1 encoding, 33 bytes.
    pub fn public_key_bytes(&self) -> [u8; 33] {
        self.public_key.serialize()
    }

    pub fn public_key_any(&self) -> Any {
        self.algorithm.public_key_any(&self.public_key_bytes())
    }

    /// Hash and sign the given bytes, returning the 64 byte compact signature.
    pub fn sign_bytes(&self, msg: &[u8]) -> Result<Vec<u8>> {
        let digest = self.algorithm.digest(msg);
        let msg = Message::from_slice(&digest)
            .map_err(|e| Error::InvalidRequest(format!("Unable to sign digest: {e}")))?;
        let signature: Signature = global_secp().sign_ecdsa(&msg, &self.secret_key);
        Ok(signature.serialize_compact().to_vec())
    }

    /// Signer for the EVM path, backed by the same private key.
    pub fn evm_signer(&self) -> Result<alloy::signers::local::PrivateKeySigner> {
        alloy::signers::local::PrivateKeySigner::from_slice(&self.secret_key.secret_bytes())
            .map_err(|e| Error::parse("EVM signing key", e))
    }

    /// The Ethereum address controlled by this key.
    pub fn evm_address(&self) -> alloy::primitives::Address {
        let raw = KeyAlgorithm::EthSecp256k1.raw_address(&self.public_key);
        alloy::primitives::Address::from(raw)
    }

    /// [Self::evm_address] under this wallet's HRP, whatever its algorithm.
    ///
    /// The account holding the EVM nonce.
    pub fn evm_account_address(&self) -> Address {
        RawAddress::from(self.evm_address().0 .0).with_hrp(self.address.hrp().clone())
    }
}

/// Check a compact signature over `msg` against a compressed public key.
pub fn verify_signature(
    algorithm: KeyAlgorithm,
    public_key: &[u8],
    msg: &[u8],
    signature: &[u8],
) -> bool {
    let Ok(public_key) = PublicKey::from_slice(public_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_compact(signature) else {
        return false;
    };
    let Ok(msg) = Message::from_slice(&algorithm.digest(msg)) else {
        return false;
    };
    global_secp()
        .verify_ecdsa(&msg, &signature, &public_key)
        .is_ok()
}

impl Display for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.address)
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl HasAddress for Wallet {
    fn get_address(&self) -> Address {
        self.address.clone()
    }
}
