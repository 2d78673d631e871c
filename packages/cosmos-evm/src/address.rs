use std::{
    convert::TryFrom,
    fmt::{Debug, Display},
    str::FromStr,
    sync::Arc,
};

use bech32::{FromBase32, ToBase32};
use serde::de::Visitor;

use crate::error::{Error, Result};

/// A raw address value not connected to a specific blockchain. You usually want [Address].
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum RawAddress {
    Twenty { raw_address: [u8; 20] },
    ThirtyTwo { raw_address: [u8; 32] },
}

/// Parse a raw address and its HRP from a string.
pub fn parse_raw_address(s: &str) -> Result<(String, RawAddress)> {
    let (hrp, data, variant) =
        bech32::decode(s).map_err(|e| Error::parse("bech32 address", format!("{s}: {e}")))?;
    match variant {
        bech32::Variant::Bech32 => (),
        bech32::Variant::Bech32m => {
            return Err(Error::parse(
                "bech32 address",
                format!("{s}: must use Bech32 variant"),
            ))
        }
    }
    let data = Vec::<u8>::from_base32(&data)
        .map_err(|e| Error::parse("bech32 address", format!("{s}: {e}")))?;
    let raw_address = RawAddress::try_from(data.as_slice())?;
    Ok((hrp, raw_address))
}

/// Note that using this instance throws away the Human Readable Part (HRP) of the address!
impl FromStr for RawAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_raw_address(s).map(|x| x.1)
    }
}

impl AsRef<[u8]> for RawAddress {
    fn as_ref(&self) -> &[u8] {
        match self {
            RawAddress::Twenty { raw_address } => raw_address,
            RawAddress::ThirtyTwo { raw_address } => raw_address,
        }
    }
}

impl From<[u8; 20]> for RawAddress {
    fn from(raw_address: [u8; 20]) -> Self {
        RawAddress::Twenty { raw_address }
    }
}

impl From<[u8; 32]> for RawAddress {
    fn from(raw_address: [u8; 32]) -> Self {
        RawAddress::ThirtyTwo { raw_address }
    }
}

impl TryFrom<&[u8]> for RawAddress {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        match value.try_into().ok() {
            Some(raw_address) => Ok(RawAddress::Twenty { raw_address }),
            None => value
                .try_into()
                .map(|raw_address| RawAddress::ThirtyTwo { raw_address })
                .map_err(|_| {
                    Error::parse(
                        "raw address",
                        format!("need either 20 or 32 bytes, found {}", value.len()),
                    )
                }),
        }
    }
}

impl RawAddress {
    pub fn with_hrp(self, hrp: AddressHrp) -> Address {
        Address {
            raw_address: self,
            hrp,
        }
    }

    /// View a 20-byte address as an EVM address.
    pub fn to_evm(&self) -> Option<alloy::primitives::Address> {
        match self {
            RawAddress::Twenty { raw_address } => {
                Some(alloy::primitives::Address::from(*raw_address))
            }
            RawAddress::ThirtyTwo { .. } => None,
        }
    }
}

/// The human readable part of a bech32 address, e.g. `evmos` or `cosmos`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AddressHrp(Arc<str>);

impl AddressHrp {
    pub fn new(hrp: &str) -> Result<Self> {
        // An empty payload is enough to exercise bech32's HRP validation.
        bech32::encode(hrp, Vec::<u8>::new().to_base32(), bech32::Variant::Bech32)
            .map_err(|e| Error::parse("address HRP", format!("{hrp:?}: {e}")))?;
        Ok(AddressHrp(hrp.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Defaults to `cosmos`.
impl Default for AddressHrp {
    fn default() -> Self {
        AddressHrp("cosmos".into())
    }
}

impl FromStr for AddressHrp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AddressHrp::new(s)
    }
}

impl Display for AddressHrp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Debug for AddressHrp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

/// An address on a Cosmos blockchain
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Address {
    raw_address: RawAddress,
    hrp: AddressHrp,
}

impl Address {
    pub fn raw(&self) -> &RawAddress {
        &self.raw_address
    }

    pub fn hrp(&self) -> &AddressHrp {
        &self.hrp
    }

    pub fn with_hrp(&self, hrp: AddressHrp) -> Self {
        Address {
            raw_address: self.raw_address,
            hrp,
        }
    }
}

impl Display for Address {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        AddressAnyHrp {
            raw_address: self.raw_address,
            hrp: self.hrp.as_str(),
        }
        .fmt(fmt)
    }
}

pub struct AddressAnyHrp<'a> {
    pub raw_address: RawAddress,
    pub hrp: &'a str,
}

impl<'a> Display for AddressAnyHrp<'a> {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        bech32::encode_to_fmt(
            fmt,
            self.hrp,
            self.raw_address.to_base32(),
            bech32::Variant::Bech32,
        )
        .map_err(|_| std::fmt::Error)?
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.to_string()
    }
}

impl From<&Address> for String {
    fn from(address: &Address) -> Self {
        address.to_string()
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hrp, raw_address) = parse_raw_address(s)?;
        let hrp = AddressHrp::new(&hrp)?;
        Ok(Address { raw_address, hrp })
    }
}

pub trait HasAddress {
    fn get_address(&self) -> Address;

    fn get_address_string(&self) -> String {
        self.get_address().to_string()
    }
}

impl HasAddress for Address {
    fn get_address(&self) -> Address {
        self.clone()
    }
}

impl<T: HasAddress> HasAddress for &T {
    fn get_address(&self) -> Address {
        HasAddress::get_address(*self)
    }
}

impl serde::Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(AddressVisitor)
    }
}

struct AddressVisitor;

impl<'de> Visitor<'de> for AddressVisitor {
    type Value = Address;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("Cosmos address")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        v.parse().map_err(|e| E::custom(e))
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{self}\"")
    }
}
