use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::data::address::TronAddress;
use crate::data::types::Cursor;
use crate::error::IndexError;

pub const DEFAULT_TRONGRID_URL: &str = "https://api.trongrid.io";
pub const API_KEY_HEADER: &str = "TRON-PRO-API-KEY";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The account endpoints are always read most-recent-first.
const ORDER_MOST_RECENT_FIRST: &str = "block_timestamp,desc";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionQuery {
    pub limit: u32,
    pub only_confirmed: bool,
    pub cursor: Option<Cursor>,
}

impl TransactionQuery {
    pub fn page(limit: u32, cursor: Option<Cursor>) -> Self {
        Self {
            limit,
            only_confirmed: true,
            cursor,
        }
    }

    fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("limit", self.limit.to_string()),
            ("only_confirmed", self.only_confirmed.to_string()),
            ("order_by", ORDER_MOST_RECENT_FIRST.to_string()),
        ];
        if let Some(cursor) = &self.cursor {
            params.push(("fingerprint", cursor.as_str().to_string()));
        }
        params
    }
}

/// One page of indexer results plus the cursor to continue from.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexerPage<T> {
    pub data: Vec<T>,
    pub next_cursor: Option<Cursor>,
}

// --- Wire format ---
//
// Shapes of the TronGrid v1 account endpoints. Everything below the contract
// `type` tag is left as raw JSON and decoded by the fetcher.

#[derive(Debug, Clone, Deserialize)]
pub struct WireEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub meta: Option<WireMeta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireMeta {
    #[serde(default)]
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireTransaction {
    #[serde(rename = "txID", default)]
    pub tx_id: Option<String>,
    #[serde(default)]
    pub ret: Vec<WireRet>,
    #[serde(default)]
    pub raw_data: Option<WireRawData>,
    #[serde(default)]
    pub block_timestamp: Option<i64>,
    #[serde(rename = "blockNumber", default)]
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireRet {
    #[serde(rename = "contractRet", default)]
    pub contract_ret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireRawData {
    #[serde(default)]
    pub contract: Vec<WireContract>,
    /// Creation time; the node endpoint omits `block_timestamp`.
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireContract {
    #[serde(rename = "type")]
    pub contract_type: String,
    #[serde(default)]
    pub parameter: Option<WireParameter>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireParameter {
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireTrc20Transfer {
    pub transaction_id: String,
    pub token_info: WireTokenInfo,
    #[serde(default)]
    pub block_timestamp: Option<i64>,
    pub from: String,
    pub to: String,
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireTokenInfo {
    pub address: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    pub decimals: u8,
}

/// Paged source of confirmed transaction history for an account.
#[async_trait]
pub trait TransactionIndex: Send + Sync {
    async fn get_transactions(
        &self,
        address: &TronAddress,
        query: &TransactionQuery,
    ) -> Result<IndexerPage<WireTransaction>, IndexError>;

    async fn get_trc20_transactions(
        &self,
        address: &TronAddress,
        query: &TransactionQuery,
    ) -> Result<IndexerPage<WireTrc20Transfer>, IndexError>;

    /// Look up one transaction by id. `None` when the ledger does not know it.
    async fn get_transaction(&self, tx_id: &str) -> Result<Option<WireTransaction>, IndexError>;
}

/// HTTP client for the TronGrid indexing API.
pub struct TronGridClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl TronGridClient {
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

    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &TransactionQuery,
    ) -> Result<IndexerPage<T>, IndexError> {
        let url = format!("{}{path}", self.base_url);
        let request = self.client.get(&url).query(&query.to_params());
        let envelope: WireEnvelope<T> = self.send(request, url).await?;
        into_page(envelope)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        mut request: reqwest::RequestBuilder,
        url: String,
    ) -> Result<T, IndexError> {
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

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
}

/// Unwrap an envelope, treating an explicit `success: false` as a rejection.
pub fn into_page<T>(envelope: WireEnvelope<T>) -> Result<IndexerPage<T>, IndexError> {
    if envelope.success == Some(false) {
        return Err(IndexError::Rejected(
            envelope.error.unwrap_or_else(|| "unspecified error".to_string()),
        ));
    }
    Ok(IndexerPage {
        data: envelope.data,
        next_cursor: envelope
            .meta
            .and_then(|m| m.fingerprint)
            .filter(|f| !f.is_empty())
            .map(Cursor::new),
    })
}

#[async_trait]
impl TransactionIndex for TronGridClient {
    async fn get_transactions(
        &self,
        address: &TronAddress,
        query: &TransactionQuery,
    ) -> Result<IndexerPage<WireTransaction>, IndexError> {
        self.get_page(&format!("/v1/accounts/{address}/transactions"), query)
            .await
    }

    async fn get_trc20_transactions(
        &self,
        address: &TronAddress,
        query: &TransactionQuery,
    ) -> Result<IndexerPage<WireTrc20Transfer>, IndexError> {
        self.get_page(&format!("/v1/accounts/{address}/transactions/trc20"), query)
            .await
    }

    async fn get_transaction(&self, tx_id: &str) -> Result<Option<WireTransaction>, IndexError> {
        let url = format!("{}/wallet/gettransactionbyid", self.base_url);
        let request = self.client.post(&url).json(&serde_json::json!({ "value": tx_id }));
        let wire: WireTransaction = self.send(request, url).await?;
        Ok(found_transaction(wire))
    }
}

/// The node answers an unknown id with an empty object.
fn found_transaction(wire: WireTransaction) -> Option<WireTransaction> {
    wire.tx_id.is_some().then_some(wire)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params_without_cursor() {
        let params = TransactionQuery::page(200, None).to_params();
        assert_eq!(
            params,
            vec![
                ("limit", "200".to_string()),
                ("only_confirmed", "true".to_string()),
                ("order_by", "block_timestamp,desc".to_string()),
            ]
        );
    }

    #[test]
    fn test_query_params_forward_cursor_verbatim() {
        let params = TransactionQuery::page(50, Some(Cursor::new("abc==")))
            .to_params();
        assert!(params.contains(&("fingerprint", "abc==".to_string())));
    }

    #[test]
    fn test_envelope_with_fingerprint() {
        let envelope: WireEnvelope<WireTransaction> = serde_json::from_str(
            r#"{"data":[{"txID":"aa","raw_data":{"contract":[]}}],"success":true,"meta":{"at":1,"fingerprint":"next","page_size":1}}"#,
        )
        .unwrap();
        let page = into_page(envelope).unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.next_cursor, Some(Cursor::new("next")));
    }

    #[test]
    fn test_envelope_without_fingerprint_ends_pagination() {
        let envelope: WireEnvelope<WireTransaction> =
            serde_json::from_str(r#"{"data":[],"success":true,"meta":{"at":1,"page_size":0}}"#)
                .unwrap();
        let page = into_page(envelope).unwrap();
        assert!(page.data.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_envelope_rejected() {
        let envelope: WireEnvelope<WireTransaction> =
            serde_json::from_str(r#"{"success":false,"error":"invalid address"}"#).unwrap();
        let err = into_page(envelope).unwrap_err();
        assert!(matches!(err, IndexError::Rejected(msg) if msg == "invalid address"));
    }

    #[test]
    fn test_node_transaction_lookup() {
        let wire: WireTransaction = serde_json::from_str(
            r#"{"txID":"ab12","ret":[{"contractRet":"SUCCESS"}],"raw_data":{"contract":[],"timestamp":1700000000000}}"#,
        )
        .unwrap();
        let found = found_transaction(wire).unwrap();
        assert_eq!(found.tx_id.as_deref(), Some("ab12"));
        assert_eq!(found.raw_data.and_then(|r| r.timestamp), Some(1_700_000_000_000));

        let unknown: WireTransaction = serde_json::from_str("{}").unwrap();
        assert!(found_transaction(unknown).is_none());
    }

    #[test]
    fn test_trc20_wire_record() {
        let record: WireTrc20Transfer = serde_json::from_str(
            r#"{"transaction_id":"t1","token_info":{"symbol":"USDT","address":"TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t","decimals":6,"name":"Tether USD"},"block_timestamp":1700000000000,"from":"TA","to":"TB","type":"Transfer","value":"1500000"}"#,
        )
        .unwrap();
        assert_eq!(record.token_info.decimals, 6);
        assert_eq!(record.event_type.as_deref(), Some("Transfer"));
        assert_eq!(record.value, "1500000");
    }
}
