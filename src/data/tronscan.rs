use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

use crate::data::address::TronAddress;
use crate::data::provider::API_KEY_HEADER;
use crate::data::types::{HeldToken, TokenMetadata};
use crate::error::IndexError;

pub const DEFAULT_TRONSCAN_URL: &str = "https://apilist.tronscanapi.com/api";
pub const DEFAULT_FX_URL: &str = "https://www.cbr-xml-daily.ru/daily_json.js";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Token and contract metadata, looked up on cache misses.
#[async_trait]
pub trait TokenMetadataSource: Send + Sync {
    /// Metadata for a single TRC-20 contract; `Ok(None)` when it is unknown.
    async fn contract_info(&self, contract: &TronAddress) -> Result<Option<TokenMetadata>, IndexError>;

    /// Curated list of verified tokens, native TRX included.
    async fn verified_tokens(&self) -> Result<Vec<TokenMetadata>, IndexError>;

    /// Raw token balances held by `wallet`.
    async fn wallet_tokens(&self, wallet: &TronAddress) -> Result<Vec<HeldToken>, IndexError>;
}

/// USD exchange-rate source.
#[async_trait]
pub trait FxRateSource: Send + Sync {
    /// Roubles per US dollar.
    async fn usd_rub(&self) -> Result<f64, IndexError>;
}

// --- Wire format ---

#[derive(Debug, Deserialize)]
struct OverviewResponse {
    #[serde(default)]
    tokens: Vec<OverviewToken>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OverviewToken {
    #[serde(default)]
    name: String,
    #[serde(default)]
    abbr: String,
    contract_address: String,
    #[serde(default)]
    decimal: u8,
    #[serde(default)]
    img_url: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    price_in_usd: Option<f64>,
}

impl From<OverviewToken> for TokenMetadata {
    fn from(token: OverviewToken) -> Self {
        TokenMetadata {
            contract_address: token.contract_address,
            symbol: token.abbr,
            display_name: token.name,
            decimal_precision: token.decimal,
            icon_reference: token.img_url,
            price_in_usd: token.price_in_usd,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Trc20InfoResponse {
    #[serde(default)]
    trc20_tokens: Vec<Trc20Info>,
}

#[derive(Debug, Deserialize)]
struct Trc20Info {
    contract_address: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    symbol: String,
    decimals: u8,
    #[serde(default)]
    icon_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WalletResponse {
    #[serde(default)]
    data: Vec<WalletEntry>,
}

#[derive(Debug, Deserialize)]
struct WalletEntry {
    token_id: String,
    #[serde(default, deserialize_with = "lenient_u256")]
    balance: U256,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DailyRates {
    valute: DailyValutes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
struct DailyValutes {
    usd: DailyRate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DailyRate {
    value: f64,
}

/// The market-data API sends numbers both as JSON numbers and as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(serde_json::Number),
    String(String),
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<NumberOrString>::deserialize(deserializer)? {
        Some(NumberOrString::Number(n)) => n.as_f64(),
        Some(NumberOrString::String(s)) => s.trim().parse().ok(),
        None => None,
    })
}

fn lenient_u256<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    let text = match Option::<NumberOrString>::deserialize(deserializer)? {
        Some(NumberOrString::Number(n)) => n.to_string(),
        Some(NumberOrString::String(s)) => s,
        None => return Ok(U256::ZERO),
    };
    U256::from_str_radix(text.trim(), 10).map_err(serde::de::Error::custom)
}

/// HTTP client for the TronScan market-data API.
pub struct TronScanClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl TronScanClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, IndexError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.client.get(&url).query(params);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }
        fetch_json(request, url).await
    }

    async fn overview(&self, filter: &str, limit: &str) -> Result<Vec<TokenMetadata>, IndexError> {
        let response: OverviewResponse = self
            .get_json(
                "/tokens/overview",
                &[
                    ("start", "0"),
                    ("limit", limit),
                    ("showAll", "0"),
                    ("filter", filter),
                    ("sort", "marketcap"),
                ],
            )
            .await?;
        Ok(response.tokens.into_iter().map(TokenMetadata::from).collect())
    }
}

async fn fetch_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    url: String,
) -> Result<T, IndexError> {
    let response = request.send().await.map_err(|source| IndexError::Http {
        url: url.clone(),
        source: Arc::new(source),
    })?;
    if !response.status().is_success() {
        return Err(IndexError::Status {
            url,
            status: response.status().as_u16(),
        });
    }
    response.json().await.map_err(|e| IndexError::Body {
        url,
        reason: e.to_string(),
    })
}

#[async_trait]
impl TokenMetadataSource for TronScanClient {
    async fn contract_info(&self, contract: &TronAddress) -> Result<Option<TokenMetadata>, IndexError> {
        let contract_text = contract.to_base58();
        let response: Trc20InfoResponse = self
            .get_json("/token_trc20", &[("contract", contract_text.as_str())])
            .await?;
        Ok(response
            .trc20_tokens
            .into_iter()
            .find(|t| t.contract_address == contract_text)
            .map(|t| TokenMetadata {
                contract_address: t.contract_address,
                symbol: t.symbol,
                display_name: t.name,
                decimal_precision: t.decimals,
                icon_reference: t.icon_url,
                price_in_usd: None,
            }))
    }

    async fn verified_tokens(&self) -> Result<Vec<TokenMetadata>, IndexError> {
        let mut tokens = self.overview("trc20", "100").await?;
        // TRX itself is only listed among the top tokens, under a placeholder address.
        let top = self.overview("top", "10").await?;
        if let Some(trx) = top.into_iter().find(TokenMetadata::is_native) {
            tokens.push(trx);
        } else {
            tracing::debug!("native token missing from top-token overview");
        }
        Ok(tokens)
    }

    async fn wallet_tokens(&self, wallet: &TronAddress) -> Result<Vec<HeldToken>, IndexError> {
        let wallet_text = wallet.to_base58();
        let response: WalletResponse = self
            .get_json(
                "/account/wallet",
                &[("address", wallet_text.as_str()), ("asset_type", "0")],
            )
            .await?;
        Ok(response
            .data
            .into_iter()
            .map(|entry| HeldToken {
                token_id: entry.token_id,
                raw_balance: entry.balance,
            })
            .collect())
    }
}

/// Daily USD/RUB rate published by the Central Bank of Russia, via its JSON mirror.
pub struct CbrRateClient {
    client: reqwest::Client,
    url: String,
}

impl CbrRateClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            url: url.into(),
        }
    }
}

impl Default for CbrRateClient {
    fn default() -> Self {
        Self::new(DEFAULT_FX_URL)
    }
}

#[async_trait]
impl FxRateSource for CbrRateClient {
    async fn usd_rub(&self) -> Result<f64, IndexError> {
        let rates: DailyRates = fetch_json(self.client.get(&self.url), self.url.clone()).await?;
        Ok(rates.valute.usd.value)
    }
}
