use chrono::{DateTime, Utc};

use crate::data::types::{NormalizedTransfer, TokenMetadata, WalletToken};

/// Truncate an address to "TR7NHq...Lj6t" format
pub fn truncate_address(addr: &str) -> String {
    truncate_middle(addr, 6, 4)
}

/// Truncate a transaction id to "abcdef12...ef12" format
pub fn truncate_tx_id(tx_id: &str) -> String {
    truncate_middle(tx_id, 8, 4)
}

// Counts chars, not bytes; passthrough addresses may hold arbitrary text.
fn truncate_middle(s: &str, head: usize, tail: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > head + tail + 4 {
        let start: String = chars[..head].iter().collect();
        let end: String = chars[chars.len() - tail..].iter().collect();
        format!("{start}...{end}")
    } else {
        s.to_string()
    }
}

/// Format a number with comma separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Format a block timestamp as a datetime string
pub fn format_timestamp(timestamp: Option<DateTime<Utc>>) -> String {
    timestamp
        .map(|dt| dt.format("%b %d, %Y %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Format a price with precision that scales with magnitude
pub fn format_price(price: f64) -> String {
    if price == 0.0 {
        "0".to_string()
    } else if price < 0.01 {
        format!("{price:.6}")
    } else {
        format!("{price:.4}")
    }
}

pub fn transfer_table(transfers: &[NormalizedTransfer]) -> String {
    let mut out = format!(
        "{:<19} {:<10} {:<7} {:>24} {:<8} {:<15} {:<15} {}\n",
        "TX", "STATUS", "TYPE", "AMOUNT", "SYMBOL", "FROM", "TO", "TIME"
    );
    for t in transfers {
        out.push_str(&format!(
            "{:<19} {:<10} {:<7} {:>24} {:<8} {:<15} {:<15} {}\n",
            truncate_tx_id(&t.tx_id),
            t.status.to_string(),
            t.transfer_type().to_string(),
            t.amount.to_string(),
            t.symbol.as_deref().unwrap_or("-"),
            truncate_address(&t.from.to_string()),
            truncate_address(&t.to.to_string()),
            format_timestamp(t.timestamp),
        ));
    }
    out
}

pub fn token_table(tokens: &[TokenMetadata]) -> String {
    let mut out = format!(
        "{:<10} {:<24} {:<36} {:>8} {:>14}\n",
        "SYMBOL", "NAME", "CONTRACT", "DECIMALS", "PRICE (USD)"
    );
    for t in tokens {
        out.push_str(&format!(
            "{:<10} {:<24} {:<36} {:>8} {:>14}\n",
            t.symbol,
            t.display_name,
            t.contract_address,
            t.decimal_precision,
            t.price_in_usd.map(format_price).unwrap_or_else(|| "-".to_string()),
        ));
    }
    out
}

pub fn wallet_table(tokens: &[WalletToken]) -> String {
    let mut out = format!(
        "{:<10} {:<36} {:>24} {:>14} {:>14} {:>14}\n",
        "SYMBOL", "CONTRACT", "BALANCE", "PRICE (USD)", "PRICE (RUB)", "VALUE (USD)"
    );
    for t in tokens {
        out.push_str(&format!(
            "{:<10} {:<36} {:>24} {:>14} {:>14} {:>14.2}\n",
            t.metadata.symbol,
            t.metadata.contract_address,
            t.balance.to_string(),
            format_price(t.price_usd),
            format_price(t.price_rub),
            t.balance.to_f64() * t.price_usd,
        ));
    }
    out
}
