use std::fs;
use std::io::Write;

use serde::Serialize;

use crate::data::types::NormalizedTransfer;

const CSV_HEADER: [&str; 10] = [
    "tx_id",
    "status",
    "transfer_type",
    "amount",
    "symbol",
    "from",
    "to",
    "contract_address",
    "contract_decimals",
    "timestamp",
];

/// Write normalized transfers as CSV.
///
/// Contract columns are empty for native and TRC-10 transfers.
pub fn write_transfers_csv<W: Write>(
    transfers: &[NormalizedTransfer],
    writer: W,
) -> Result<(), String> {
    let mut wtr = csv::Writer::from_writer(writer);

    wtr.write_record(CSV_HEADER)
        .map_err(|e| format!("Failed to write CSV header: {e}"))?;

    for transfer in transfers {
        wtr.write_record(&[
            transfer.tx_id.clone(),
            transfer.status.to_string(),
            transfer.transfer_type().to_string(),
            transfer.amount.to_string(),
            transfer.symbol.clone().unwrap_or_default(),
            transfer.from.to_string(),
            transfer.to.to_string(),
            transfer
                .contract_address()
                .map(|a| a.to_string())
                .unwrap_or_default(),
            transfer
                .contract_decimals()
                .map(|d| d.to_string())
                .unwrap_or_default(),
            transfer
                .timestamp
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
        ])
        .map_err(|e| format!("Failed to write CSV row: {e}"))?;
    }

    wtr.flush().map_err(|e| format!("Failed to flush CSV: {e}"))
}

pub fn export_transfers_csv(transfers: &[NormalizedTransfer], path: &str) -> Result<String, String> {
    let file = fs::File::create(path).map_err(|e| format!("Failed to create file: {e}"))?;
    write_transfers_csv(transfers, file)?;
    Ok(format!("Exported {} transfers to {path}", transfers.len()))
}

/// Serialize any exportable value as pretty JSON.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("Failed to serialize JSON: {e}"))
}

pub fn export_json<T: Serialize + ?Sized>(value: &T, path: &str) -> Result<String, String> {
    let formatted = to_json(value)?;

    let mut file = fs::File::create(path).map_err(|e| format!("Failed to create file: {e}"))?;
    file.write_all(formatted.as_bytes())
        .map_err(|e| format!("Failed to write file: {e}"))?;

    Ok(format!("Exported JSON to {path}"))
}
