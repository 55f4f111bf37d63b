use std::sync::Arc;

use thiserror::Error;

use crate::data::types::Cursor;

/// A TRON address that could not be decoded from any of its textual forms.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address is empty")]
    Empty,

    #[error("invalid hex address '{input}': {reason}")]
    InvalidHex { input: String, reason: String },

    #[error("invalid base58check address '{input}': {reason}")]
    InvalidBase58 { input: String, reason: String },

    #[error("address '{input}' decodes to {len} bytes, expected 21")]
    InvalidLength { input: String, len: usize },

    #[error("address '{input}' has network prefix 0x{prefix:02x}, expected 0x41")]
    InvalidPrefix { input: String, prefix: u8 },
}

/// Smart-contract call data that does not fit the `transfer(address,uint256)` layout.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("call data is {len} hex chars, expected at least {min}")]
    TooShort { len: usize, min: usize },

    #[error("call data is not valid hex: {0}")]
    InvalidHex(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("{0} decimals exceeds the supported maximum of 77")]
    DecimalsTooLarge(u32),
}

/// Failure talking to one of the upstream HTTP services.
///
/// Cloneable so a single failed lookup can be handed to every caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum IndexError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: Arc<reqwest::Error>,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("unexpected response body from {url}: {reason}")]
    Body { url: String, reason: String },

    #[error("indexer rejected request: {0}")]
    Rejected(String),
}

/// A page request failed. `cursor` is the last cursor that produced a good page,
/// so the caller can resume from exactly where it stopped.
#[derive(Debug, Error)]
#[error("failed to fetch transaction page (resume cursor: {cursor:?}): {source}")]
pub struct FetchError {
    pub cursor: Option<Cursor>,
    #[source]
    pub source: IndexError,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("decimals lookup failed for contract {contract}: {reason}")]
pub struct MetadataLookupError {
    pub contract: String,
    pub reason: String,
}

/// Why a single transaction record was dropped from a classified page.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifyError {
    #[error(transparent)]
    Metadata(#[from] MetadataLookupError),

    #[error(transparent)]
    CallData(#[from] DecodeError),

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error("contract invocation has no call data")]
    MissingCallData,
}

/// A single-transaction lookup that produced no transfer.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("transaction {0} not found")]
    NotFound(String),

    #[error("signer of transaction {tx_id} is not a valid address: {source}")]
    Signer {
        tx_id: String,
        #[source]
        source: AddressError,
    },

    #[error("transaction {tx_id} was dropped: {source}")]
    Classify {
        tx_id: String,
        #[source]
        source: ClassifyError,
    },
}
