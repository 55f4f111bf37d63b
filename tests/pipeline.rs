use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use alloy::primitives::{Address, U256};
use async_trait::async_trait;

use tron_ledger::data::provider::{
    IndexerPage, TransactionIndex, TransactionQuery, WireEnvelope, WireTransaction,
    WireTrc20Transfer, into_page,
};
use tron_ledger::data::tronscan::{FxRateSource, TokenMetadataSource};
use tron_ledger::data::types::{
    Direction, HeldToken, TokenMetadata, TransferKind, TransferType, incoming_only,
};
use tron_ledger::{
    ClassifyError, Cursor, FeedState, HistoryOptions, IndexError, LedgerService,
    PipelineSettings, TransactionError, TronAddress,
};

const USDT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";
const ZERO: &str = "T9yD14Nj9j7xAB4dbGeiX9h8unkKHxuWwb";

const PAGE1: &str = include_str!("fixtures/transactions_page1.json");
const PAGE2: &str = include_str!("fixtures/transactions_page2.json");
const TRC20: &str = include_str!("fixtures/trc20_page.json");
const TRANSACTION: &str = include_str!("fixtures/transaction.json");
const TRANSACTION_ID: &str = "7c2d4206c03a883dd9066d620335dc1be272a8dc733cfa3f6d10308faa37facc";

/// Serves the fixture pages, keyed by the cursor it was asked for.
struct FixtureIndex {
    requests: AtomicUsize,
    fail_on_page2: bool,
}

impl FixtureIndex {
    fn new() -> Self {
        Self {
            requests: AtomicUsize::new(0),
            fail_on_page2: false,
        }
    }
}

fn page<T: serde::de::DeserializeOwned>(json: &str) -> Result<IndexerPage<T>, IndexError> {
    let envelope: WireEnvelope<T> = serde_json::from_str(json).unwrap();
    into_page(envelope)
}

#[async_trait]
impl TransactionIndex for FixtureIndex {
    async fn get_transactions(
        &self,
        _address: &TronAddress,
        query: &TransactionQuery,
    ) -> Result<IndexerPage<WireTransaction>, IndexError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        match query.cursor.as_ref().map(Cursor::as_str) {
            None => page(PAGE1),
            Some("page2") if self.fail_on_page2 => Err(IndexError::Status {
                url: "https://api.trongrid.io/v1/accounts".to_string(),
                status: 502,
            }),
            Some("page2") => page(PAGE2),
            Some(other) => Err(IndexError::Rejected(format!("unknown cursor {other}"))),
        }
    }

    async fn get_trc20_transactions(
        &self,
        _address: &TronAddress,
        _query: &TransactionQuery,
    ) -> Result<IndexerPage<WireTrc20Transfer>, IndexError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        page(TRC20)
    }

    async fn get_transaction(&self, tx_id: &str) -> Result<Option<WireTransaction>, IndexError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if tx_id == TRANSACTION_ID {
            return Ok(Some(serde_json::from_str(TRANSACTION).unwrap()));
        }
        let listed = page::<WireTransaction>(PAGE1)?
            .data
            .into_iter()
            .chain(page::<WireTransaction>(PAGE2)?.data)
            .find(|t| t.tx_id.as_deref() == Some(tx_id));
        Ok(listed)
    }
}

struct FakeMarket {
    contract_lookups: AtomicUsize,
}

fn token(contract: &str, symbol: &str, decimals: u8, price: Option<f64>) -> TokenMetadata {
    TokenMetadata {
        contract_address: contract.to_string(),
        symbol: symbol.to_string(),
        display_name: symbol.to_string(),
        decimal_precision: decimals,
        icon_reference: None,
        price_in_usd: price,
    }
}

#[async_trait]
impl TokenMetadataSource for FakeMarket {
    async fn contract_info(
        &self,
        contract: &TronAddress,
    ) -> Result<Option<TokenMetadata>, IndexError> {
        self.contract_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(match contract.to_base58().as_str() {
            USDT => Some(token(USDT, "USDT", 6, None)),
            ZERO => Some(token(ZERO, "ZRO", 18, None)),
            _ => None,
        })
    }

    async fn verified_tokens(&self) -> Result<Vec<TokenMetadata>, IndexError> {
        Ok(vec![
            token(USDT, "USDT", 6, Some(1.0)),
            token("_", "TRX", 6, Some(0.1)),
        ])
    }

    async fn wallet_tokens(&self, _wallet: &TronAddress) -> Result<Vec<HeldToken>, IndexError> {
        Ok(vec![
            HeldToken {
                token_id: "_".to_string(),
                raw_balance: U256::from(12_000_000u64),
            },
            HeldToken {
                token_id: USDT.to_string(),
                raw_balance: U256::from(5_000_000u64),
            },
        ])
    }
}

struct FixedRate(f64);

#[async_trait]
impl FxRateSource for FixedRate {
    async fn usd_rub(&self) -> Result<f64, IndexError> {
        Ok(self.0)
    }
}

fn wallet() -> TronAddress {
    TronAddress::new(Address::from_slice(&[0x11; 20]))
}

fn service(index: Arc<FixtureIndex>) -> (LedgerService, Arc<FakeMarket>) {
    let market = Arc::new(FakeMarket {
        contract_lookups: AtomicUsize::new(0),
    });
    let service = LedgerService::new(
        index,
        market.clone(),
        Arc::new(FixedRate(90.0)),
        PipelineSettings::default(),
    );
    (service, market)
}

#[tokio::test]
async fn test_single_page_classification() {
    let (service, _) = service(Arc::new(FixtureIndex::new()));
    let page = service
        .transactions_page(&wallet(), 200, None)
        .await
        .unwrap();

    let ids: Vec<_> = page.transfers.iter().map(|t| t.tx_id.as_str()).collect();
    assert_eq!(ids, vec!["n1", "c1"]);
    assert!(page.has_more);
    assert_eq!(page.next_cursor, Some(Cursor::new("page2")));

    let native = &page.transfers[0];
    assert_eq!(native.transfer_type(), TransferType::NativeTransfer);
    assert_eq!(native.amount.to_string(), "5");
    assert_eq!(native.direction(&wallet()), Direction::Incoming);
    assert_eq!(native.timestamp.unwrap().timestamp_millis(), 1_700_000_003_000);

    let token = &page.transfers[1];
    assert_eq!(token.transfer_type(), TransferType::ContractInvocationTransfer);
    assert_eq!(token.amount.to_string(), "2");
    assert_eq!(token.contract_decimals(), Some(6));
    assert_eq!(token.direction(&wallet()), Direction::Outgoing);
    assert_eq!(
        token.to.address(),
        Some(TronAddress::new(Address::from_slice(&[0x22; 20])))
    );

    assert_eq!(page.dropped.len(), 1);
    assert_eq!(page.dropped[0].tx_id, "c2");
    assert!(matches!(page.dropped[0].error, ClassifyError::Metadata(_)));
}

#[tokio::test]
async fn test_last_page_has_no_cursor() {
    let (service, _) = service(Arc::new(FixtureIndex::new()));
    let page = service
        .transactions_page(&wallet(), 200, Some(&Cursor::new("page2")))
        .await
        .unwrap();

    assert!(!page.has_more);
    assert!(page.next_cursor.is_none());
    assert_eq!(page.transfers.len(), 2);
    assert_eq!(
        page.transfers[1].kind,
        TransferKind::AssetTransfer {
            asset_name: "1002000".to_string()
        }
    );
    assert_eq!(page.transfers[1].amount.to_string(), "0.000042");
}

fn ids(history: &tron_ledger::History) -> Vec<&str> {
    history.transfers.iter().map(|t| t.tx_id.as_str()).collect()
}

#[tokio::test]
async fn test_collect_history_walks_both_feeds() {
    let index = Arc::new(FixtureIndex::new());
    let (service, _) = service(index.clone());
    let history = service
        .collect_history(&wallet(), &HistoryOptions::default())
        .await
        .unwrap();

    assert_eq!(ids(&history), vec!["n1", "c1", "n2", "a1", "t1"]);
    assert_eq!(history.dropped.len(), 1);
    assert_eq!(history.pages, 3);
    assert!(!history.truncated);
    assert_eq!(history.native, FeedState::Exhausted);
    assert_eq!(history.trc20, FeedState::Exhausted);
    assert_eq!(index.requests.load(Ordering::SeqCst), 3);

    let incoming: Vec<_> = incoming_only(history.transfers, &wallet())
        .into_iter()
        .map(|t| t.tx_id)
        .collect();
    assert_eq!(incoming, vec!["n1", "a1", "t1"]);
}

#[tokio::test]
async fn test_collect_history_stops_at_max_count() {
    let index = Arc::new(FixtureIndex::new());
    let (service, _) = service(index.clone());
    let options = HistoryOptions {
        max_count: 1,
        ..HistoryOptions::default()
    };
    let history = service.collect_history(&wallet(), &options).await.unwrap();

    // The first page is kept whole rather than cut at the cap.
    assert_eq!(ids(&history), vec!["n1", "c1"]);
    assert!(history.truncated);
    assert_eq!(history.native, FeedState::Resumable(Cursor::new("page2")));
    assert_eq!(history.trc20, FeedState::NotStarted(None));
    // No further pages once the cap is reached.
    assert_eq!(index.requests.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_resumed_history_loses_nothing() {
    let (service, _) = service(Arc::new(FixtureIndex::new()));
    let mut options = HistoryOptions {
        max_count: 1,
        ..HistoryOptions::default()
    };

    let mut collected = Vec::new();
    let mut walks = 0;
    loop {
        let history = service.collect_history(&wallet(), &options).await.unwrap();
        collected.extend(ids(&history).into_iter().map(str::to_string));
        walks += 1;
        if !history.truncated {
            break;
        }
        options = history.resume(1);
    }

    assert_eq!(collected, vec!["n1", "c1", "n2", "a1", "t1"]);
    assert_eq!(walks, 3);
}

#[tokio::test]
async fn test_unread_token_feed_is_reported() {
    let index = Arc::new(FixtureIndex::new());
    let (service, _) = service(index.clone());
    let options = HistoryOptions {
        max_count: 4,
        ..HistoryOptions::default()
    };
    let history = service.collect_history(&wallet(), &options).await.unwrap();

    assert_eq!(ids(&history), vec!["n1", "c1", "n2", "a1"]);
    assert_eq!(history.native, FeedState::Exhausted);
    assert_eq!(history.trc20, FeedState::NotStarted(None));
    assert!(history.truncated);

    // Resuming reads only the token feed.
    let rest = service
        .collect_history(&wallet(), &history.resume(4))
        .await
        .unwrap();
    assert_eq!(ids(&rest), vec!["t1"]);
    assert!(!rest.truncated);
    assert_eq!(index.requests.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_excluded_token_feed_is_not_truncation() {
    let index = Arc::new(FixtureIndex::new());
    let (service, _) = service(index.clone());
    let options = HistoryOptions {
        trc20: FeedState::Excluded,
        ..HistoryOptions::default()
    };
    let history = service.collect_history(&wallet(), &options).await.unwrap();

    assert_eq!(ids(&history), vec!["n1", "c1", "n2", "a1"]);
    assert_eq!(history.trc20, FeedState::Excluded);
    assert!(!history.truncated);
    assert_eq!(index.requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_collect_history_failure_carries_resume_cursor() {
    let index = Arc::new(FixtureIndex {
        requests: AtomicUsize::new(0),
        fail_on_page2: true,
    });
    let (service, _) = service(index);
    let err = service
        .collect_history(&wallet(), &HistoryOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.cursor, Some(Cursor::new("page2")));
    assert!(matches!(err.source, IndexError::Status { status: 502, .. }));
}

#[tokio::test]
async fn test_transaction_lookup_classifies_from_signer() {
    let (service, _) = service(Arc::new(FixtureIndex::new()));
    let transfer = service.transaction(TRANSACTION_ID).await.unwrap().unwrap();

    let signer = TronAddress::new(Address::from_slice(&[0x33; 20]));
    assert_eq!(transfer.tx_id, TRANSACTION_ID);
    assert_eq!(transfer.transfer_type(), TransferType::ContractInvocationTransfer);
    assert_eq!(transfer.amount.to_string(), "3");
    assert_eq!(transfer.symbol.as_deref(), Some("USDT"));
    assert_eq!(transfer.direction(&signer), Direction::Outgoing);
    assert_eq!(
        transfer.to.address(),
        Some(TronAddress::new(Address::from_slice(&[0x22; 20])))
    );
    // The node response has no block time; creation time stands in.
    assert_eq!(transfer.timestamp.unwrap().timestamp_millis(), 1_700_000_000_000);
}

#[tokio::test]
async fn test_transaction_lookup_outcomes() {
    let (service, _) = service(Arc::new(FixtureIndex::new()));

    let native = service.transaction("n1").await.unwrap().unwrap();
    assert_eq!(native.amount.to_string(), "5");

    // A vote is a real transaction but not a transfer.
    assert!(service.transaction("v1").await.unwrap().is_none());

    let err = service.transaction("missing").await.unwrap_err();
    assert!(matches!(err, TransactionError::NotFound(ref id) if id == "missing"));

    let err = service.transaction("c2").await.unwrap_err();
    assert!(matches!(
        err,
        TransactionError::Classify { source: ClassifyError::Metadata(_), .. }
    ));
}

#[tokio::test]
async fn test_trc20_feed_seeds_contract_cache() {
    let (service, market) = service(Arc::new(FixtureIndex::new()));
    let page = service.trc20_page(&wallet(), 200, None).await.unwrap();
    assert_eq!(page.transfers.len(), 1);
    assert_eq!(page.transfers[0].amount.to_string(), "3");
    assert_eq!(page.transfers[0].symbol.as_deref(), Some("USDT"));

    // USDT decimals are now known, so classifying the native feed skips that lookup.
    service.transactions_page(&wallet(), 200, None).await.unwrap();
    assert_eq!(market.contract_lookups.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_wallet_details() {
    let (service, _) = service(Arc::new(FixtureIndex::new()));
    let contracts = vec![
        "_".to_string(),
        USDT.to_string(),
        ZERO.to_string(),
        "not-a-contract".to_string(),
    ];
    let details = service.wallet_details(&wallet(), &contracts).await.unwrap();

    assert_eq!(details.len(), 3);

    assert_eq!(details[0].metadata.symbol, "TRX");
    assert_eq!(details[0].balance.to_string(), "12");
    assert!((details[0].price_rub - 9.0).abs() < 1e-9);

    assert_eq!(details[1].metadata.symbol, "USDT");
    assert_eq!(details[1].balance.to_string(), "5");
    assert_eq!(details[1].price_usd, 1.0);
    assert_eq!(details[1].price_rub, 90.0);

    assert_eq!(details[2].metadata.symbol, "ZRO");
    assert!(details[2].balance.is_zero());
    assert_eq!(details[2].price_usd, 0.0);
}

#[tokio::test]
async fn test_metadata_queries_are_cached() {
    let (service, market) = service(Arc::new(FixtureIndex::new()));
    let usdt = TronAddress::parse(USDT).unwrap();

    let first = service.contract_info(&usdt).await.unwrap();
    let second = service.contract_info(&usdt).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(market.contract_lookups.load(Ordering::SeqCst), 1);

    assert_eq!(service.usd_rub_rate().await.unwrap(), 90.0);
    assert_eq!(service.verified_tokens().await.unwrap().len(), 2);
}
