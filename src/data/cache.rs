use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::config::CachePolicy;
use crate::data::address::TronAddress;
use crate::data::tronscan::{FxRateSource, TokenMetadataSource};
use crate::data::types::TokenMetadata;
use crate::error::{IndexError, MetadataLookupError};

/// Cache sizes for keyed namespaces.
const CONTRACT_CACHE_SIZE: usize = 500;

/// One in-progress lookup, shared by every caller that missed on its key.
type Flight<V, E> = Arc<tokio::sync::OnceCell<Result<V, E>>>;

/// LRU store whose entries expire `ttl` after insertion.
///
/// Misses for the same key are collapsed: the first caller runs the lookup and
/// every concurrent caller receives its result, error included. Only successes
/// are stored.
pub struct TtlStore<K: Hash + Eq, V, E = Infallible> {
    entries: Mutex<LruCache<K, (Instant, V)>>,
    flights: Mutex<HashMap<K, Flight<V, E>>>,
    ttl: Duration,
}

impl<K, V, E> TtlStore<K, V, E>
where
    K: Hash + Eq + Clone,
    V: Clone,
    E: Clone,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            flights: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Get a cached value. Returns None if expired or missing.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().ok()?;
        let entry = entries.get(key)?;
        if entry.0.elapsed() < self.ttl {
            Some(entry.1.clone())
        } else {
            entries.pop(key);
            None
        }
    }

    pub fn put(&self, key: K, value: V) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(key, (Instant::now(), value));
        }
    }

    /// Return the cached value, or run `fetch` once for all concurrent callers
    /// missing on `key` and cache a successful result.
    pub async fn get_or_try_fetch<F, Fut>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let flight = self.join_flight(&key);
        let _landing = Landing {
            flights: &self.flights,
            key: &key,
            flight: &flight,
        };

        flight
            .get_or_init(|| async {
                // A previous flight may have landed between our miss and joining.
                if let Some(value) = self.get(&key) {
                    return Ok(value);
                }
                let result = fetch().await;
                if let Ok(value) = &result {
                    self.put(key.clone(), value.clone());
                }
                result
            })
            .await
            .clone()
    }

    fn join_flight(&self, key: &K) -> Flight<V, E> {
        match self.flights.lock() {
            Ok(mut flights) => Arc::clone(flights.entry(key.clone()).or_default()),
            // A poisoned map only loses the collapsing, not correctness.
            Err(_) => Arc::default(),
        }
    }

    #[cfg(test)]
    fn flights_in_progress(&self) -> usize {
        self.flights.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

/// Removes a flight from the map once it has a result, or once its last
/// caller goes away, on every exit path including cancellation.
struct Landing<'a, K: Hash + Eq, V, E> {
    flights: &'a Mutex<HashMap<K, Flight<V, E>>>,
    key: &'a K,
    flight: &'a Flight<V, E>,
}

impl<K: Hash + Eq, V, E> Drop for Landing<'_, K, V, E> {
    fn drop(&mut self) {
        let Ok(mut flights) = self.flights.lock() else {
            return;
        };
        let Some(current) = flights.get(self.key) else {
            return;
        };
        // The map holds one reference and this caller another.
        let last_caller = Arc::strong_count(self.flight) <= 2;
        if Arc::ptr_eq(current, self.flight) && (self.flight.initialized() || last_caller) {
            flights.remove(self.key);
        }
    }
}

/// Expiring snapshots of market and contract metadata, shared by every
/// request. Each namespace has its own TTL; there is no global invalidation.
pub struct MetadataCache {
    verified_tokens: TtlStore<(), Vec<TokenMetadata>, IndexError>,
    fx_rate: TtlStore<(), f64, IndexError>,
    contracts: TtlStore<TronAddress, TokenMetadata, MetadataLookupError>,
}

impl MetadataCache {
    pub fn new(policy: &CachePolicy) -> Self {
        Self {
            verified_tokens: TtlStore::new(1, policy.verified_tokens_ttl),
            fx_rate: TtlStore::new(1, policy.fx_rate_ttl),
            contracts: TtlStore::new(CONTRACT_CACHE_SIZE, policy.contract_info_ttl),
        }
    }

    // --- Verified tokens ---

    pub async fn verified_tokens(
        &self,
        source: &dyn TokenMetadataSource,
    ) -> Result<Vec<TokenMetadata>, IndexError> {
        self.verified_tokens
            .get_or_try_fetch((), || source.verified_tokens())
            .await
    }

    /// The verified list if it is cached and fresh; never triggers a fetch.
    pub fn cached_verified_tokens(&self) -> Option<Vec<TokenMetadata>> {
        self.verified_tokens.get(&())
    }

    // --- FX rate ---

    pub async fn usd_rub_rate(&self, source: &dyn FxRateSource) -> Result<f64, IndexError> {
        self.fx_rate.get_or_try_fetch((), || source.usd_rub()).await
    }

    // --- Contract metadata ---

    pub async fn contract_info(
        &self,
        contract: &TronAddress,
        source: &dyn TokenMetadataSource,
    ) -> Result<TokenMetadata, MetadataLookupError> {
        self.contracts
            .get_or_try_fetch(*contract, || async {
                match source.contract_info(contract).await {
                    Ok(Some(info)) => Ok(info),
                    Ok(None) => Err(MetadataLookupError {
                        contract: contract.to_string(),
                        reason: "contract not found".to_string(),
                    }),
                    Err(e) => Err(MetadataLookupError {
                        contract: contract.to_string(),
                        reason: e.to_string(),
                    }),
                }
            })
            .await
    }

    /// Metadata for a contract: contract cache, then a fresh verified list,
    /// then the metadata source.
    pub async fn contract_metadata(
        &self,
        contract: &TronAddress,
        source: &dyn TokenMetadataSource,
    ) -> Result<TokenMetadata, MetadataLookupError> {
        if let Some(info) = self.contracts.get(contract) {
            return Ok(info);
        }
        if let Some(verified) = self.cached_verified_tokens() {
            let text = contract.to_base58();
            if let Some(token) = verified.into_iter().find(|t| t.contract_address == text) {
                self.contracts.put(*contract, token.clone());
                return Ok(token);
            }
        }
        self.contract_info(contract, source).await
    }

    /// Record metadata learned elsewhere, e.g. from the token-transfer feed.
    pub fn seed_contract(&self, contract: TronAddress, metadata: TokenMetadata) {
        if self.contracts.get(&contract).is_none() {
            self.contracts.put(contract, metadata);
        }
    }

    /// Evict everything. Useful when switching networks.
    pub fn clear(&self) {
        self.verified_tokens.clear();
        self.fx_rate.clear();
        self.contracts.clear();
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new(&CachePolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use alloy::primitives::Address;
    use async_trait::async_trait;

    use super::*;
    use crate::data::types::HeldToken;

    struct CountingSource {
        lookups: AtomicUsize,
        decimals: Option<u8>,
    }

    impl CountingSource {
        fn new(decimals: Option<u8>) -> Self {
            Self {
                lookups: AtomicUsize::new(0),
                decimals,
            }
        }
    }

    #[async_trait]
    impl TokenMetadataSource for CountingSource {
        async fn contract_info(
            &self,
            contract: &TronAddress,
        ) -> Result<Option<TokenMetadata>, IndexError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(self.decimals.map(|d| make_metadata(contract, d)))
        }

        async fn verified_tokens(&self) -> Result<Vec<TokenMetadata>, IndexError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(vec![make_metadata(&contract(0x0a), 18)])
        }

        async fn wallet_tokens(&self, _wallet: &TronAddress) -> Result<Vec<HeldToken>, IndexError> {
            Ok(vec![])
        }
    }

    async fn decimals(
        cache: &MetadataCache,
        contract: &TronAddress,
        source: &dyn TokenMetadataSource,
    ) -> Result<u8, MetadataLookupError> {
        cache
            .contract_metadata(contract, source)
            .await
            .map(|info| info.decimal_precision)
    }

    fn contract(seed: u8) -> TronAddress {
        TronAddress::new(Address::from_slice(&[seed; 20]))
    }

    fn make_metadata(contract: &TronAddress, decimals: u8) -> TokenMetadata {
        TokenMetadata {
            contract_address: contract.to_base58(),
            symbol: "TST".to_string(),
            display_name: "Test Token".to_string(),
            decimal_precision: decimals,
            icon_reference: None,
            price_in_usd: None,
        }
    }

    #[test]
    fn test_put_and_get() {
        let store: TtlStore<u32, String> = TtlStore::new(10, Duration::from_secs(60));
        store.put(1, "one".to_string());
        assert_eq!(store.get(&1).as_deref(), Some("one"));
        assert!(store.get(&2).is_none());
    }

    #[test]
    fn test_expired_entry_is_evicted() {
        let store: TtlStore<u32, u32> = TtlStore::new(10, Duration::ZERO);
        store.put(1, 1);
        assert!(store.get(&1).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_lru_eviction() {
        let store: TtlStore<u32, u32> = TtlStore::new(2, Duration::from_secs(60));
        store.put(1, 1);
        store.put(2, 2);
        store.put(3, 3);
        assert!(store.get(&1).is_none());
        assert_eq!(store.get(&3), Some(3));
    }

    #[tokio::test]
    async fn test_concurrent_misses_trigger_one_lookup() {
        let cache = MetadataCache::default();
        let source = CountingSource::new(Some(6));
        let target = contract(0x01);

        let lookups = (0..10).map(|_| decimals(&cache, &target, &source));
        let results = futures::future::join_all(lookups).await;

        assert!(results.iter().all(|r| r == &Ok(6)));
        assert_eq!(source.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_fetch_independently() {
        let cache = MetadataCache::default();
        let source = CountingSource::new(Some(8));

        let first = contract(0x01);
        let second = contract(0x02);
        let (a, b) = tokio::join!(
            decimals(&cache, &first, &source),
            decimals(&cache, &second, &source),
        );
        assert_eq!((a, b), (Ok(8), Ok(8)));
        assert_eq!(source.lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_lookup_is_not_cached() {
        let cache = MetadataCache::default();
        let source = CountingSource::new(None);

        let err = decimals(&cache, &contract(0x03), &source).await.unwrap_err();
        assert_eq!(err.reason, "contract not found");
        assert!(decimals(&cache, &contract(0x03), &source).await.is_err());
        assert_eq!(source.lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_failing_misses_share_one_lookup() {
        let cache = MetadataCache::default();
        let source = CountingSource::new(None);
        let target = contract(0x04);

        let lookups = (0..10).map(|_| decimals(&cache, &target, &source));
        let results = futures::future::join_all(lookups).await;

        assert!(results.iter().all(|r| r.as_ref().is_err_and(|e| e.reason == "contract not found")));
        assert_eq!(source.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(cache.contracts.flights_in_progress(), 0);

        // The failure was not stored; the next miss asks again.
        assert!(decimals(&cache, &target, &source).await.is_err());
        assert_eq!(source.lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_flight_is_released_after_success() {
        let store: TtlStore<u32, u32, String> = TtlStore::new(4, Duration::from_secs(60));
        let value = store.get_or_try_fetch(7, || async { Ok(49) }).await;
        assert_eq!(value, Ok(49));
        assert_eq!(store.flights_in_progress(), 0);

        let err = store
            .get_or_try_fetch(8, || async { Err("upstream down".to_string()) })
            .await;
        assert_eq!(err, Err("upstream down".to_string()));
        assert_eq!(store.flights_in_progress(), 0);
        assert!(store.get(&8).is_none());
    }

    #[tokio::test]
    async fn test_decimals_from_cached_verified_list() {
        let cache = MetadataCache::default();
        let source = CountingSource::new(Some(6));

        cache.verified_tokens(&source).await.unwrap();
        assert_eq!(decimals(&cache, &contract(0x0a), &source).await, Ok(18));
        // Only the verified-list fetch hit the source.
        assert_eq!(source.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_seeded_contract_skips_lookup() {
        let cache = MetadataCache::default();
        let source = CountingSource::new(Some(6));
        cache.seed_contract(contract(0x05), make_metadata(&contract(0x05), 2));

        assert_eq!(decimals(&cache, &contract(0x05), &source).await, Ok(2));
        assert_eq!(source.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_clear_empties_all_namespaces() {
        let cache = MetadataCache::default();
        let source = CountingSource::new(Some(6));
        cache.verified_tokens(&source).await.unwrap();
        cache.seed_contract(contract(0x05), make_metadata(&contract(0x05), 2));

        cache.clear();

        assert!(cache.cached_verified_tokens().is_none());
        assert!(cache.contracts.is_empty());
    }
}
