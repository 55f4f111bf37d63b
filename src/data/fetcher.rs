use std::sync::Arc;

use alloy::primitives::{U256, hex};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::data::address::TronAddress;
use crate::data::provider::{
    TransactionIndex, TransactionQuery, WireContract, WireTransaction, WireTrc20Transfer,
};
use crate::data::types::{
    ContractAction, Cursor, FetchedPage, RawTransactionRecord, TokenMetadata, Trc20Page,
    Trc20TransferRecord, TxStatus,
};
use crate::error::{FetchError, IndexError};

/// Event type the token-transfer feed uses for plain transfers.
const TRC20_TRANSFER_EVENT: &str = "Transfer";

#[derive(Deserialize)]
struct TransferValue {
    owner_address: String,
    to_address: String,
    #[serde(default)]
    amount: u64,
}

#[derive(Deserialize)]
struct TransferAssetValue {
    owner_address: String,
    to_address: String,
    asset_name: String,
    #[serde(default)]
    amount: u64,
}

#[derive(Deserialize)]
struct TriggerSmartContractValue {
    owner_address: String,
    contract_address: String,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    call_value: u64,
}

/// Issues one indexer request per call and turns the raw page into typed records.
///
/// The fetcher never loops on its own; aggregating pages is the caller's policy.
#[derive(Clone)]
pub struct Fetcher {
    index: Arc<dyn TransactionIndex>,
}

impl Fetcher {
    pub fn new(index: Arc<dyn TransactionIndex>) -> Self {
        Self { index }
    }

    /// Fetch one page of native transactions, keeping only records whose
    /// leading action is transfer-shaped.
    pub async fn fetch(
        &self,
        wallet: &TronAddress,
        page_size: u32,
        cursor: Option<&Cursor>,
    ) -> Result<FetchedPage, FetchError> {
        let query = TransactionQuery::page(page_size, cursor.cloned());
        let page = self
            .index
            .get_transactions(wallet, &query)
            .await
            .map_err(|source| FetchError {
                cursor: cursor.cloned(),
                source,
            })?;

        let total = page.data.len();
        let records: Vec<RawTransactionRecord> = page
            .data
            .iter()
            .filter_map(decode_transaction)
            .filter(RawTransactionRecord::is_transfer_shaped)
            .collect();
        let filtered_out = total - records.len();

        tracing::debug!(
            wallet = %wallet,
            total,
            kept = records.len(),
            has_more = page.next_cursor.is_some(),
            "fetched transaction page"
        );

        Ok(FetchedPage {
            records,
            has_more: page.next_cursor.is_some(),
            next_cursor: page.next_cursor,
            filtered_out,
        })
    }

    /// Fetch one page of the indexer's TRC-20 transfer feed.
    pub async fn fetch_trc20(
        &self,
        wallet: &TronAddress,
        page_size: u32,
        cursor: Option<&Cursor>,
    ) -> Result<Trc20Page, FetchError> {
        let query = TransactionQuery::page(page_size, cursor.cloned());
        let page = self
            .index
            .get_trc20_transactions(wallet, &query)
            .await
            .map_err(|source| FetchError {
                cursor: cursor.cloned(),
                source,
            })?;

        let total = page.data.len();
        let records: Vec<Trc20TransferRecord> =
            page.data.iter().filter_map(decode_trc20_transfer).collect();

        tracing::debug!(
            wallet = %wallet,
            total,
            kept = records.len(),
            has_more = page.next_cursor.is_some(),
            "fetched trc20 page"
        );

        Ok(Trc20Page {
            filtered_out: total - records.len(),
            records,
            has_more: page.next_cursor.is_some(),
            next_cursor: page.next_cursor,
        })
    }
}

impl Fetcher {
    /// Fetch a single transaction by id, whatever its action types.
    pub async fn fetch_transaction(
        &self,
        tx_id: &str,
    ) -> Result<Option<RawTransactionRecord>, IndexError> {
        let wire = self.index.get_transaction(tx_id).await?;
        let record = wire.as_ref().and_then(decode_transaction);
        tracing::debug!(tx_id, found = record.is_some(), "fetched transaction");
        Ok(record)
    }
}

/// Decode a wire transaction. Entries without an id or raw data (e.g. internal
/// transactions listed alongside regular ones) yield `None`.
pub fn decode_transaction(wire: &WireTransaction) -> Option<RawTransactionRecord> {
    let tx_id = wire.tx_id.clone()?;
    let raw_data = wire.raw_data.as_ref()?;

    Some(RawTransactionRecord {
        status: TxStatus::from_contract_ret(
            wire.ret.first().and_then(|r| r.contract_ret.as_deref()),
        ),
        actions: raw_data.contract.iter().map(decode_action).collect(),
        timestamp: wire
            .block_timestamp
            .or(raw_data.timestamp)
            .and_then(DateTime::<Utc>::from_timestamp_millis),
        block_number: wire.block_number,
        tx_id,
    })
}

/// Decode one contract action from its type tag and parameter bag. A
/// transfer-shaped tag with a malformed bag is demoted to `Other`.
pub fn decode_action(contract: &WireContract) -> ContractAction {
    let decoded = match contract.contract_type.as_str() {
        "TransferContract" => parameter::<TransferValue>(contract).map(|v| {
            ContractAction::NativeTransfer {
                owner_address: v.owner_address,
                to_address: v.to_address,
                amount: v.amount,
            }
        }),
        "TransferAssetContract" => parameter::<TransferAssetValue>(contract).map(|v| {
            ContractAction::AssetTransfer {
                owner_address: v.owner_address,
                to_address: v.to_address,
                asset_name: decode_asset_name(&v.asset_name),
                amount: v.amount,
            }
        }),
        "TriggerSmartContract" => parameter::<TriggerSmartContractValue>(contract).map(|v| {
            ContractAction::ContractInvocation {
                owner_address: v.owner_address,
                contract_address: v.contract_address,
                data: v.data,
                call_value: v.call_value,
            }
        }),
        _ => None,
    };

    decoded.unwrap_or_else(|| ContractAction::Other {
        type_name: contract.contract_type.clone(),
    })
}

fn parameter<T: DeserializeOwned>(contract: &WireContract) -> Option<T> {
    let value = contract.parameter.as_ref()?.value.clone();
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(error) => {
            tracing::warn!(
                contract_type = %contract.contract_type,
                %error,
                "malformed contract parameter"
            );
            None
        }
    }
}

/// TRC-10 asset names arrive hex-encoded; fall back to the raw text otherwise.
fn decode_asset_name(name: &str) -> String {
    hex::decode(name)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| name.to_string())
}

/// Decode a token-feed entry. Non-transfer events (approvals) and entries
/// with an unparseable value yield `None`.
pub fn decode_trc20_transfer(wire: &WireTrc20Transfer) -> Option<Trc20TransferRecord> {
    if wire
        .event_type
        .as_deref()
        .is_some_and(|t| t != TRC20_TRANSFER_EVENT)
    {
        return None;
    }
    let raw_value = match U256::from_str_radix(wire.value.trim(), 10) {
        Ok(v) => v,
        Err(error) => {
            tracing::warn!(tx_id = %wire.transaction_id, %error, "unparseable trc20 value");
            return None;
        }
    };

    Some(Trc20TransferRecord {
        tx_id: wire.transaction_id.clone(),
        token: TokenMetadata {
            contract_address: wire.token_info.address.clone(),
            symbol: wire.token_info.symbol.clone(),
            display_name: wire.token_info.name.clone(),
            decimal_precision: wire.token_info.decimals,
            icon_reference: None,
            price_in_usd: None,
        },
        from: wire.from.clone(),
        to: wire.to.clone(),
        raw_value,
        timestamp: wire.block_timestamp.and_then(DateTime::<Utc>::from_timestamp_millis),
    })
}
