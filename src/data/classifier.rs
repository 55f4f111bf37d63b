use std::sync::Arc;

use alloy::primitives::hex;
use futures::stream::{self, StreamExt};

use crate::data::address::{AddressField, TronAddress};
use crate::data::amount::{TokenAmount, normalize};
use crate::data::cache::MetadataCache;
use crate::data::decoder;
use crate::data::tronscan::TokenMetadataSource;
use crate::data::types::{
    ClassifiedPage, ContractAction, DroppedRecord, FetchedPage, NormalizedTransfer,
    RawTransactionRecord, TransferKind, Trc20Page, Trc20TransferRecord, TxStatus,
};
use crate::error::{ClassifyError, MetadataLookupError};

const NATIVE_SYMBOL: &str = "TRX";

/// Turns raw ledger records into normalized transfers.
///
/// Failures are per record: a record that cannot be classified is reported as
/// dropped and never fails the page it came from.
#[derive(Clone)]
pub struct Classifier {
    cache: Arc<MetadataCache>,
    metadata: Arc<dyn TokenMetadataSource>,
}

impl Classifier {
    pub fn new(cache: Arc<MetadataCache>, metadata: Arc<dyn TokenMetadataSource>) -> Self {
        Self { cache, metadata }
    }

    /// Classify one record by its leading action.
    ///
    /// Returns `Ok(None)` for records that are not transfers: non-transfer
    /// action types, and contract invocations calling anything other than
    /// `transfer(address,uint256)`.
    pub async fn classify(
        &self,
        record: &RawTransactionRecord,
        wallet: &TronAddress,
    ) -> Result<Option<NormalizedTransfer>, ClassifyError> {
        let Some(action) = record.leading_action() else {
            return Ok(None);
        };

        let transfer = match action {
            ContractAction::NativeTransfer {
                owner_address,
                to_address,
                amount,
            } => NormalizedTransfer {
                tx_id: record.tx_id.clone(),
                status: record.status,
                kind: TransferKind::NativeTransfer,
                amount: TokenAmount::native(*amount),
                from: AddressField::convert(owner_address),
                to: AddressField::convert(to_address),
                symbol: Some(NATIVE_SYMBOL.to_string()),
                timestamp: record.timestamp,
            },
            ContractAction::AssetTransfer {
                owner_address,
                to_address,
                asset_name,
                amount,
            } => NormalizedTransfer {
                tx_id: record.tx_id.clone(),
                status: record.status,
                kind: TransferKind::AssetTransfer {
                    asset_name: asset_name.clone(),
                },
                // TRC-10 precision is not carried on the record; use the native precision.
                amount: TokenAmount::native(*amount),
                from: AddressField::convert(owner_address),
                to: AddressField::convert(to_address),
                symbol: Some(asset_name.clone()),
                timestamp: record.timestamp,
            },
            ContractAction::ContractInvocation {
                contract_address,
                data,
                ..
            } => {
                let payload = data.as_deref().ok_or(ClassifyError::MissingCallData)?;
                let selector = decoder::extract_selector(payload);
                if selector.is_some_and(|s| s != decoder::TRANSFER_SELECTOR) {
                    tracing::debug!(
                        tx_id = %record.tx_id,
                        selector = ?selector.map(hex::encode),
                        "skipping non-transfer contract call"
                    );
                    return Ok(None);
                }
                let call = decoder::decode(payload)?;

                let contract_field = AddressField::convert(contract_address);
                let contract = contract_field.address().ok_or_else(|| MetadataLookupError {
                    contract: contract_address.clone(),
                    reason: "contract address is not a valid TRON address".to_string(),
                })?;
                let token = self
                    .cache
                    .contract_metadata(&contract, self.metadata.as_ref())
                    .await?;
                let amount = normalize(call.raw_value, token.decimal_precision.into())?;

                NormalizedTransfer {
                    tx_id: record.tx_id.clone(),
                    status: record.status,
                    kind: TransferKind::ContractInvocationTransfer {
                        contract_address: contract_field,
                        contract_decimals: token.decimal_precision,
                    },
                    amount,
                    // The wallet being inspected always initiates the invocation.
                    from: AddressField::Converted(*wallet),
                    to: AddressField::Converted(TronAddress::new(call.recipient_address)),
                    symbol: Some(token.symbol).filter(|s| !s.is_empty()),
                    timestamp: record.timestamp,
                }
            }
            ContractAction::Other { type_name } => {
                tracing::debug!(tx_id = %record.tx_id, %type_name, "skipping non-transfer action");
                return Ok(None);
            }
        };

        Ok(Some(transfer))
    }

    /// Classify a fetched page, `concurrency` records at a time. Output keeps
    /// the indexer's order.
    pub async fn classify_page(
        &self,
        page: FetchedPage,
        wallet: &TronAddress,
        concurrency: usize,
    ) -> ClassifiedPage {
        let outcomes: Vec<_> = stream::iter(page.records.iter())
            .map(|record| async move { (record, self.classify(record, wallet).await) })
            .buffered(concurrency.max(1))
            .collect()
            .await;

        let mut classified = ClassifiedPage {
            next_cursor: page.next_cursor,
            has_more: page.has_more,
            ..ClassifiedPage::default()
        };
        for (record, outcome) in outcomes {
            match outcome {
                Ok(Some(transfer)) => classified.transfers.push(transfer),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(tx_id = %record.tx_id, %error, "dropping unclassifiable record");
                    classified.dropped.push(DroppedRecord {
                        tx_id: record.tx_id.clone(),
                        error,
                    });
                }
            }
        }
        classified
    }

    /// Normalize a record from the token-transfer feed. Its embedded token info
    /// is authoritative for decimals and seeds the metadata cache.
    pub fn classify_trc20(
        &self,
        record: &Trc20TransferRecord,
    ) -> Result<NormalizedTransfer, ClassifyError> {
        let contract_field = AddressField::convert(&record.token.contract_address);
        if let Some(contract) = contract_field.address() {
            self.cache.seed_contract(contract, record.token.clone());
        }
        let decimals = record.token.decimal_precision;

        Ok(NormalizedTransfer {
            tx_id: record.tx_id.clone(),
            status: TxStatus::Success,
            kind: TransferKind::ContractInvocationTransfer {
                contract_address: contract_field,
                contract_decimals: decimals,
            },
            amount: normalize(record.raw_value, decimals.into())?,
            from: AddressField::convert(&record.from),
            to: AddressField::convert(&record.to),
            symbol: Some(record.token.symbol.clone()).filter(|s| !s.is_empty()),
            timestamp: record.timestamp,
        })
    }

    pub fn classify_trc20_page(&self, page: Trc20Page) -> ClassifiedPage {
        let mut classified = ClassifiedPage {
            next_cursor: page.next_cursor,
            has_more: page.has_more,
            ..ClassifiedPage::default()
        };
        for record in &page.records {
            match self.classify_trc20(record) {
                Ok(transfer) => classified.transfers.push(transfer),
                Err(error) => {
                    tracing::warn!(tx_id = %record.tx_id, %error, "dropping unclassifiable trc20 record");
                    classified.dropped.push(DroppedRecord {
                        tx_id: record.tx_id.clone(),
                        error,
                    });
                }
            }
        }
        classified
    }
}
