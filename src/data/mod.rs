pub mod address;
pub mod amount;
pub mod cache;
pub mod classifier;
pub mod decoder;
pub mod export;
pub mod fetcher;
pub mod provider;
pub mod tronscan;
pub mod types;

use std::sync::Arc;

use alloy::primitives::U256;

use crate::config::{DEFAULT_MAX_COUNT, PipelineSettings};
use crate::data::address::TronAddress;
use crate::data::amount::normalize;
use crate::data::cache::MetadataCache;
use crate::data::classifier::Classifier;
use crate::data::fetcher::Fetcher;
use crate::data::provider::TransactionIndex;
use crate::data::tronscan::{FxRateSource, TokenMetadataSource};
use crate::data::types::*;
use crate::error::{FetchError, IndexError, MetadataLookupError, TransactionError};

/// How far `collect_history` walks the indexer, and where each feed starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryOptions {
    /// Stop requesting pages once this many transfers are collected. Pages are
    /// kept whole, so the last page may carry the total past the cap.
    pub max_count: usize,
    pub native: FeedState,
    /// The token-transfer feed; `FeedState::Excluded` leaves it out.
    pub trc20: FeedState,
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            max_count: DEFAULT_MAX_COUNT,
            native: FeedState::default(),
            trc20: FeedState::default(),
        }
    }
}

/// Transfers accumulated across pages, plus where each feed stopped.
#[derive(Debug, Clone, Default)]
pub struct History {
    pub transfers: Vec<NormalizedTransfer>,
    pub dropped: Vec<DroppedRecord>,
    pub native: FeedState,
    pub trc20: FeedState,
    pub pages: usize,
    /// Whether a feed was left unfinished because `max_count` was reached.
    pub truncated: bool,
}

impl History {
    /// Options that continue this walk where it stopped.
    pub fn resume(&self, max_count: usize) -> HistoryOptions {
        HistoryOptions {
            max_count,
            native: self.native.clone(),
            trc20: self.trc20.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Feed {
    Native,
    Trc20,
}

/// Request-level entry point: fetches pages, classifies them, and answers
/// metadata queries through the shared cache.
pub struct LedgerService {
    fetcher: Fetcher,
    classifier: Classifier,
    cache: Arc<MetadataCache>,
    metadata: Arc<dyn TokenMetadataSource>,
    fx: Arc<dyn FxRateSource>,
    settings: PipelineSettings,
}

impl LedgerService {
    pub fn new(
        index: Arc<dyn TransactionIndex>,
        metadata: Arc<dyn TokenMetadataSource>,
        fx: Arc<dyn FxRateSource>,
        settings: PipelineSettings,
    ) -> Self {
        let cache = Arc::new(MetadataCache::new(&settings.cache));
        Self {
            fetcher: Fetcher::new(index),
            classifier: Classifier::new(Arc::clone(&cache), Arc::clone(&metadata)),
            cache,
            metadata,
            fx,
            settings,
        }
    }

    /// Fetch and classify one page of native transactions.
    pub async fn transactions_page(
        &self,
        wallet: &TronAddress,
        page_size: u32,
        cursor: Option<&Cursor>,
    ) -> Result<ClassifiedPage, FetchError> {
        let page = self.fetcher.fetch(wallet, page_size, cursor).await?;
        Ok(self
            .classifier
            .classify_page(page, wallet, self.settings.classify_concurrency)
            .await)
    }

    /// Fetch and normalize one page of the token-transfer feed.
    pub async fn trc20_page(
        &self,
        wallet: &TronAddress,
        page_size: u32,
        cursor: Option<&Cursor>,
    ) -> Result<ClassifiedPage, FetchError> {
        let page = self.fetcher.fetch_trc20(wallet, page_size, cursor).await?;
        Ok(self.classifier.classify_trc20_page(page))
    }

    /// Walk the native feed, then the token-transfer feed, until both are
    /// exhausted or `max_count` transfers are collected.
    ///
    /// Pages are requested one at a time and never split, so every returned
    /// feed state resumes exactly after the last transfer returned. A page
    /// failure returns the cursor to resume from.
    pub async fn collect_history(
        &self,
        wallet: &TronAddress,
        options: &HistoryOptions,
    ) -> Result<History, FetchError> {
        let mut history = History::default();

        let native = self
            .walk_feed(Feed::Native, wallet, options.native.clone(), options, &mut history)
            .await?;
        let trc20 = self
            .walk_feed(Feed::Trc20, wallet, options.trc20.clone(), options, &mut history)
            .await?;
        history.native = native;
        history.trc20 = trc20;
        history.truncated = !(history.native.is_finished() && history.trc20.is_finished());

        tracing::info!(
            wallet = %wallet,
            transfers = history.transfers.len(),
            dropped = history.dropped.len(),
            pages = history.pages,
            truncated = history.truncated,
            "collected history"
        );
        Ok(history)
    }

    async fn walk_feed(
        &self,
        feed: Feed,
        wallet: &TronAddress,
        start: FeedState,
        options: &HistoryOptions,
        history: &mut History,
    ) -> Result<FeedState, FetchError> {
        let mut cursor = match start {
            FeedState::NotStarted(cursor) => cursor,
            FeedState::Resumable(cursor) => Some(cursor),
            finished => return Ok(finished),
        };
        if history.transfers.len() >= options.max_count {
            return Ok(FeedState::NotStarted(cursor));
        }

        let page_size = self.settings.page_size;
        loop {
            let page = match feed {
                Feed::Native => self.transactions_page(wallet, page_size, cursor.as_ref()).await?,
                Feed::Trc20 => self.trc20_page(wallet, page_size, cursor.as_ref()).await?,
            };
            history.pages += 1;
            absorb(history, page.transfers, page.dropped);

            match page.next_cursor {
                None => return Ok(FeedState::Exhausted),
                Some(next) if history.transfers.len() >= options.max_count => {
                    tracing::debug!(?feed, cursor = %next, "stopping at max count");
                    return Ok(FeedState::Resumable(next));
                }
                Some(next) => cursor = Some(next),
            }
        }
    }

    /// Look up one transaction and classify it from its signer's side.
    ///
    /// `Ok(None)` means the transaction exists but is not a transfer.
    pub async fn transaction(
        &self,
        tx_id: &str,
    ) -> Result<Option<NormalizedTransfer>, TransactionError> {
        let record = self
            .fetcher
            .fetch_transaction(tx_id)
            .await?
            .ok_or_else(|| TransactionError::NotFound(tx_id.to_string()))?;

        let Some(owner) = record.leading_action().and_then(ContractAction::owner_address) else {
            return Ok(None);
        };
        let signer = TronAddress::parse(owner).map_err(|source| TransactionError::Signer {
            tx_id: record.tx_id.clone(),
            source,
        })?;

        self.classifier
            .classify(&record, &signer)
            .await
            .map_err(|source| TransactionError::Classify {
                tx_id: record.tx_id.clone(),
                source,
            })
    }

    pub async fn verified_tokens(&self) -> Result<Vec<TokenMetadata>, IndexError> {
        self.cache.verified_tokens(self.metadata.as_ref()).await
    }

    pub async fn contract_info(
        &self,
        contract: &TronAddress,
    ) -> Result<TokenMetadata, MetadataLookupError> {
        self.cache.contract_info(contract, self.metadata.as_ref()).await
    }

    pub async fn usd_rub_rate(&self) -> Result<f64, IndexError> {
        self.cache.usd_rub_rate(self.fx.as_ref()).await
    }

    /// Balances and prices for `contracts` held by `wallet`, in request order.
    ///
    /// Verified tokens are priced from the verified list. Other contracts fall
    /// back to contract info and are priced at zero; contracts without info are
    /// left out.
    pub async fn wallet_details(
        &self,
        wallet: &TronAddress,
        contracts: &[String],
    ) -> Result<Vec<WalletToken>, IndexError> {
        let rate = self.usd_rub_rate().await?;
        let held = self.metadata.wallet_tokens(wallet).await?;
        let verified = self.verified_tokens().await?;

        let mut details = Vec::with_capacity(contracts.len());
        for contract in contracts {
            let raw_balance = held
                .iter()
                .find(|t| &t.token_id == contract)
                .map_or(U256::ZERO, |t| t.raw_balance);

            let (metadata, price_usd) =
                match verified.iter().find(|t| &t.contract_address == contract) {
                    Some(token) => (token.clone(), token.price_in_usd.unwrap_or(0.0)),
                    None => match self.lookup_unverified(contract).await {
                        Some(info) => (info, 0.0),
                        None => continue,
                    },
                };

            let balance = match normalize(raw_balance, metadata.decimal_precision.into()) {
                Ok(balance) => balance,
                Err(error) => {
                    tracing::warn!(%contract, %error, "skipping token with unusable decimals");
                    continue;
                }
            };
            details.push(WalletToken {
                metadata,
                balance,
                price_usd,
                price_rub: price_usd * rate,
            });
        }
        Ok(details)
    }

    async fn lookup_unverified(&self, contract: &str) -> Option<TokenMetadata> {
        let address = match TronAddress::parse(contract) {
            Ok(address) => address,
            Err(error) => {
                tracing::warn!(contract, %error, "skipping unparseable contract");
                return None;
            }
        };
        match self.contract_info(&address).await {
            Ok(info) => Some(info),
            Err(error) => {
                tracing::warn!(%error, "skipping contract without info");
                None
            }
        }
    }
}

fn absorb(history: &mut History, transfers: Vec<NormalizedTransfer>, dropped: Vec<DroppedRecord>) {
    history.transfers.extend(transfers);
    history.dropped.extend(dropped);
}
