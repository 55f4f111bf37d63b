use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, hex};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AddressError;

/// Network prefix byte that precedes every 20-byte account id on TRON mainnet.
pub const ADDRESS_PREFIX: u8 = 0x41;

/// Length of a prefixed address in bytes (prefix + 20-byte account id).
const PREFIXED_LEN: usize = 21;

/// A validated TRON account address.
///
/// Internally this is the 20-byte account id shared with the EVM; the `0x41`
/// network prefix is implicit and re-attached whenever the address is rendered.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TronAddress(Address);

impl TronAddress {
    pub const fn new(address: Address) -> Self {
        Self(address)
    }

    /// Build from a 21-byte `0x41`-prefixed address.
    pub fn from_prefixed_bytes(bytes: &[u8]) -> Result<Self, AddressError> {
        match bytes {
            [ADDRESS_PREFIX, id @ ..] if id.len() == 20 => Ok(Self(Address::from_slice(id))),
            [prefix, ..] if bytes.len() == PREFIXED_LEN => Err(AddressError::InvalidPrefix {
                input: hex::encode(bytes),
                prefix: *prefix,
            }),
            _ => Err(AddressError::InvalidLength {
                input: hex::encode(bytes),
                len: bytes.len(),
            }),
        }
    }

    /// Parse any accepted textual form: base58check (`T...`), prefixed hex
    /// (`41...`), EVM-style hex (`0x...`, the `0x` standing in for `41`) or a bare
    /// 40-char hex account id.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(AddressError::Empty);
        }

        if let Some(stripped) = input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
            return Self::parse_prefixed_hex(input, &format!("41{stripped}"));
        }
        if is_hex_of_len(input, 2 * PREFIXED_LEN) {
            return Self::parse_prefixed_hex(input, input);
        }
        if is_hex_of_len(input, 40) {
            return Self::parse_account_id(input);
        }
        Self::parse_base58(input)
    }

    fn decode_hex(original: &str, digits: &str) -> Result<Vec<u8>, AddressError> {
        hex::decode(digits).map_err(|e| AddressError::InvalidHex {
            input: original.to_string(),
            reason: e.to_string(),
        })
    }

    fn parse_prefixed_hex(original: &str, digits: &str) -> Result<Self, AddressError> {
        let bytes = Self::decode_hex(original, digits)?;
        Self::from_prefixed_bytes(&bytes).map_err(|e| with_input(e, original))
    }

    /// A bare 40-char id is the only form without the network prefix.
    fn parse_account_id(input: &str) -> Result<Self, AddressError> {
        let bytes = Self::decode_hex(input, input)?;
        Ok(Self(Address::from_slice(&bytes)))
    }

    fn parse_base58(input: &str) -> Result<Self, AddressError> {
        let bytes = bs58::decode(input)
            .with_check(None)
            .into_vec()
            .map_err(|e| AddressError::InvalidBase58 {
                input: input.to_string(),
                reason: e.to_string(),
            })?;
        Self::from_prefixed_bytes(&bytes).map_err(|e| with_input(e, input))
    }

    pub fn as_address(&self) -> &Address {
        &self.0
    }

    pub fn to_prefixed_bytes(&self) -> [u8; PREFIXED_LEN] {
        let mut out = [0u8; PREFIXED_LEN];
        out[0] = ADDRESS_PREFIX;
        out[1..].copy_from_slice(self.0.as_slice());
        out
    }

    /// Base58check display form, e.g. `TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t`.
    pub fn to_base58(&self) -> String {
        bs58::encode(self.to_prefixed_bytes()).with_check().into_string()
    }

    /// Lower-case prefixed hex form, e.g. `41a614f8...`.
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_prefixed_bytes())
    }
}

fn is_hex_of_len(input: &str, len: usize) -> bool {
    input.len() == len && input.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Re-tag a byte-level error with the caller's original text.
fn with_input(err: AddressError, input: &str) -> AddressError {
    match err {
        AddressError::InvalidLength { len, .. } => AddressError::InvalidLength {
            input: input.to_string(),
            len,
        },
        AddressError::InvalidPrefix { prefix, .. } => AddressError::InvalidPrefix {
            input: input.to_string(),
            prefix,
        },
        other => other,
    }
}

/// Render a canonical 20-byte address in its display form.
pub fn to_display_form(raw: &Address) -> String {
    TronAddress::new(*raw).to_base58()
}

/// Recover the canonical 20-byte address from any accepted textual form.
pub fn to_canonical_form(display: &str) -> Result<Address, AddressError> {
    TronAddress::parse(display).map(|a| a.0)
}

impl fmt::Display for TronAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for TronAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TronAddress({})", self.to_base58())
    }
}

impl FromStr for TronAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Address> for TronAddress {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl Serialize for TronAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for TronAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Outcome of converting an address field taken from an indexer record.
///
/// Conversion failures are soft: the record keeps the original text and carries
/// the flag, instead of failing the whole page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressField {
    Converted(TronAddress),
    Passthrough { original: String, error: AddressError },
}

impl AddressField {
    pub fn convert(input: &str) -> Self {
        match TronAddress::parse(input) {
            Ok(address) => Self::Converted(address),
            Err(error) => {
                tracing::warn!(input, %error, "keeping unconvertible address as-is");
                Self::Passthrough {
                    original: input.to_string(),
                    error,
                }
            }
        }
    }

    pub fn is_soft_failure(&self) -> bool {
        matches!(self, Self::Passthrough { .. })
    }

    pub fn address(&self) -> Option<TronAddress> {
        match self {
            Self::Converted(address) => Some(*address),
            Self::Passthrough { .. } => None,
        }
    }

    /// True when this field names `wallet`, comparing decoded bytes where possible.
    pub fn matches(&self, wallet: &TronAddress) -> bool {
        match self {
            Self::Converted(address) => address == wallet,
            Self::Passthrough { original, .. } => original == &wallet.to_base58(),
        }
    }
}

impl From<TronAddress> for AddressField {
    fn from(address: TronAddress) -> Self {
        Self::Converted(address)
    }
}

impl fmt::Display for AddressField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converted(address) => write!(f, "{address}"),
            Self::Passthrough { original, .. } => f.write_str(original),
        }
    }
}

impl Serialize for AddressField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
