use std::fmt;

use alloy::primitives::{Address, U256, hex};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::address::{AddressField, TronAddress};
use crate::data::amount::TokenAmount;
use crate::data::decoder::TRANSFER_SELECTOR;
use crate::error::ClassifyError;

/// Opaque pagination token handed out by the indexer. Never built or inspected
/// locally, only echoed back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where one feed of a multi-page walk stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "cursor", rename_all = "camelCase")]
pub enum FeedState {
    /// Not requested yet. Starts from the cursor, or from the newest record.
    NotStarted(Option<Cursor>),
    /// Stopped between pages; the cursor continues the feed.
    Resumable(Cursor),
    Exhausted,
    /// Left out of the walk by the caller.
    Excluded,
}

impl Default for FeedState {
    fn default() -> Self {
        FeedState::NotStarted(None)
    }
}

impl FeedState {
    /// Whether nothing is left to read from this feed.
    pub fn is_finished(&self) -> bool {
        matches!(self, FeedState::Exhausted | FeedState::Excluded)
    }

    /// Cursor of the next page to request, if the feed continues mid-way.
    pub fn cursor(&self) -> Option<&Cursor> {
        match self {
            FeedState::NotStarted(cursor) => cursor.as_ref(),
            FeedState::Resumable(cursor) => Some(cursor),
            FeedState::Exhausted | FeedState::Excluded => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferType {
    NativeTransfer,
    AssetTransfer,
    ContractInvocationTransfer,
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferType::NativeTransfer => write!(f, "TRX"),
            TransferType::AssetTransfer => write!(f, "TRC-10"),
            TransferType::ContractInvocationTransfer => write!(f, "TRC-20"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TxStatus {
    Success,
    Failed,
    #[default]
    Unknown,
}

impl TxStatus {
    /// Map the node's `contractRet` code.
    pub fn from_contract_ret(code: Option<&str>) -> Self {
        match code {
            Some("SUCCESS") => TxStatus::Success,
            Some(_) => TxStatus::Failed,
            None => TxStatus::Unknown,
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxStatus::Success => write!(f, "Success"),
            TxStatus::Failed => write!(f, "Failed"),
            TxStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One operation inside a ledger transaction, decoded from the indexer's
/// untyped parameter bag. Address fields keep the indexer's raw text; they are
/// converted only when a transfer is normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractAction {
    NativeTransfer {
        owner_address: String,
        to_address: String,
        amount: u64,
    },
    AssetTransfer {
        owner_address: String,
        to_address: String,
        asset_name: String,
        amount: u64,
    },
    ContractInvocation {
        owner_address: String,
        contract_address: String,
        data: Option<String>,
        call_value: u64,
    },
    Other {
        type_name: String,
    },
}

impl ContractAction {
    pub fn transfer_type(&self) -> Option<TransferType> {
        match self {
            ContractAction::NativeTransfer { .. } => Some(TransferType::NativeTransfer),
            ContractAction::AssetTransfer { .. } => Some(TransferType::AssetTransfer),
            ContractAction::ContractInvocation { .. } => {
                Some(TransferType::ContractInvocationTransfer)
            }
            ContractAction::Other { .. } => None,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            ContractAction::NativeTransfer { .. } => "TransferContract",
            ContractAction::AssetTransfer { .. } => "TransferAssetContract",
            ContractAction::ContractInvocation { .. } => "TriggerSmartContract",
            ContractAction::Other { type_name } => type_name,
        }
    }

    /// Account that signed the action, as the indexer spelled it.
    pub fn owner_address(&self) -> Option<&str> {
        match self {
            ContractAction::NativeTransfer { owner_address, .. }
            | ContractAction::AssetTransfer { owner_address, .. }
            | ContractAction::ContractInvocation { owner_address, .. } => Some(owner_address),
            ContractAction::Other { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransactionRecord {
    pub tx_id: String,
    pub status: TxStatus,
    pub actions: Vec<ContractAction>,
    pub timestamp: Option<DateTime<Utc>>,
    pub block_number: Option<u64>,
}

impl RawTransactionRecord {
    pub fn leading_action(&self) -> Option<&ContractAction> {
        self.actions.first()
    }

    /// Whether the leading action is one the classifier can turn into a transfer.
    pub fn is_transfer_shaped(&self) -> bool {
        self.leading_action()
            .and_then(ContractAction::transfer_type)
            .is_some()
    }
}

/// A TRC-20 transfer as served by the indexer's token-transfer feed, already
/// decoded upstream and carrying its own token info.
#[derive(Debug, Clone, PartialEq)]
pub struct Trc20TransferRecord {
    pub tx_id: String,
    pub token: TokenMetadata,
    pub from: String,
    pub to: String,
    pub raw_value: U256,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedCallData {
    pub function_selector: [u8; 4],
    pub recipient_address: Address,
    pub raw_value: U256,
}

impl DecodedCallData {
    pub fn selector_hex(&self) -> String {
        hex::encode(self.function_selector)
    }

    pub fn is_transfer(&self) -> bool {
        self.function_selector == TRANSFER_SELECTOR
    }
}

/// Transfer-type specific part of a normalized transfer. Contract fields exist
/// only on contract invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "transferType")]
pub enum TransferKind {
    NativeTransfer,
    AssetTransfer {
        #[serde(rename = "assetName")]
        asset_name: String,
    },
    ContractInvocationTransfer {
        #[serde(rename = "contractAddress")]
        contract_address: AddressField,
        #[serde(rename = "contractDecimals")]
        contract_decimals: u8,
    },
}

impl TransferKind {
    pub fn transfer_type(&self) -> TransferType {
        match self {
            TransferKind::NativeTransfer => TransferType::NativeTransfer,
            TransferKind::AssetTransfer { .. } => TransferType::AssetTransfer,
            TransferKind::ContractInvocationTransfer { .. } => {
                TransferType::ContractInvocationTransfer
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Incoming,
    Outgoing,
    SelfTransfer,
    Unrelated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedTransfer {
    #[serde(rename = "txID")]
    pub tx_id: String,
    pub status: TxStatus,
    #[serde(flatten)]
    pub kind: TransferKind,
    pub amount: TokenAmount,
    #[serde(rename = "fromAddress")]
    pub from: AddressField,
    #[serde(rename = "toAddress")]
    pub to: AddressField,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl NormalizedTransfer {
    pub fn transfer_type(&self) -> TransferType {
        self.kind.transfer_type()
    }

    pub fn contract_address(&self) -> Option<&AddressField> {
        match &self.kind {
            TransferKind::ContractInvocationTransfer {
                contract_address, ..
            } => Some(contract_address),
            _ => None,
        }
    }

    pub fn contract_decimals(&self) -> Option<u8> {
        match &self.kind {
            TransferKind::ContractInvocationTransfer {
                contract_decimals, ..
            } => Some(*contract_decimals),
            _ => None,
        }
    }

    pub fn direction(&self, wallet: &TronAddress) -> Direction {
        match (self.from.matches(wallet), self.to.matches(wallet)) {
            (true, true) => Direction::SelfTransfer,
            (true, false) => Direction::Outgoing,
            (false, true) => Direction::Incoming,
            (false, false) => Direction::Unrelated,
        }
    }

    pub fn has_soft_address_failure(&self) -> bool {
        self.from.is_soft_failure()
            || self.to.is_soft_failure()
            || self
                .contract_address()
                .is_some_and(AddressField::is_soft_failure)
    }
}

/// Keep only transfers received by `wallet`.
pub fn incoming_only(transfers: Vec<NormalizedTransfer>, wallet: &TronAddress) -> Vec<NormalizedTransfer> {
    transfers
        .into_iter()
        .filter(|t| matches!(t.direction(wallet), Direction::Incoming | Direction::SelfTransfer))
        .collect()
}

/// A record that classification dropped, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedRecord {
    pub tx_id: String,
    pub error: ClassifyError,
}

#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    pub records: Vec<RawTransactionRecord>,
    pub next_cursor: Option<Cursor>,
    pub has_more: bool,
    /// Records on the indexer page whose leading action is not transfer-shaped.
    pub filtered_out: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Trc20Page {
    pub records: Vec<Trc20TransferRecord>,
    pub next_cursor: Option<Cursor>,
    pub has_more: bool,
    pub filtered_out: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ClassifiedPage {
    pub transfers: Vec<NormalizedTransfer>,
    pub dropped: Vec<DroppedRecord>,
    pub next_cursor: Option<Cursor>,
    pub has_more: bool,
}

/// Token metadata as published by the market-data source. `contract_address`
/// is free text because the native asset is listed under `_`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetadata {
    pub contract_address: String,
    pub symbol: String,
    pub display_name: String,
    pub decimal_precision: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_in_usd: Option<f64>,
}

impl TokenMetadata {
    pub fn is_native(&self) -> bool {
        self.contract_address == NATIVE_CONTRACT_PLACEHOLDER
    }
}

/// How the market-data source lists TRX among tokens.
pub const NATIVE_CONTRACT_PLACEHOLDER: &str = "_";

/// A token balance held by a wallet, as reported by the market-data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldToken {
    pub token_id: String,
    pub raw_balance: U256,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletToken {
    #[serde(flatten)]
    pub metadata: TokenMetadata,
    pub balance: TokenAmount,
    pub price_usd: f64,
    pub price_rub: f64,
}
