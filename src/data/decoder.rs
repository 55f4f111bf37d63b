use alloy::primitives::{Address, U256, hex};
use alloy::sol;
use alloy::sol_types::SolCall;

use crate::data::types::DecodedCallData;
use crate::error::DecodeError;

sol! {
    #[allow(missing_docs)]
    function transfer(address to, uint256 value) external returns (bool);
}

/// Selector of `transfer(address,uint256)`, `0xa9059cbb`.
pub const TRANSFER_SELECTOR: [u8; 4] = transferCall::SELECTOR;

const SELECTOR_HEX_LEN: usize = 8;
const SLOT_HEX_LEN: usize = 64;

/// selector + address slot + value slot, 136 hex chars
pub const MIN_CALL_DATA_HEX_LEN: usize = SELECTOR_HEX_LEN + 2 * SLOT_HEX_LEN;

/// Decode a TRC-20 `transfer(address,uint256)` invocation payload.
///
/// The layout is fixed: 4-byte selector, a 32-byte slot whose low 20 bytes hold
/// the recipient, then a 32-byte big-endian value. Other selectors are sliced at
/// the same offsets; checking the selector is up to the caller.
pub fn decode(payload: &str) -> Result<DecodedCallData, DecodeError> {
    let payload = strip_hex_prefix(payload);

    if payload.len() < MIN_CALL_DATA_HEX_LEN {
        return Err(DecodeError::TooShort {
            len: payload.len(),
            min: MIN_CALL_DATA_HEX_LEN,
        });
    }

    let body = payload
        .get(..MIN_CALL_DATA_HEX_LEN)
        .ok_or_else(|| DecodeError::InvalidHex("payload is not ASCII".to_string()))?;
    let bytes = hex::decode(body).map_err(|e| DecodeError::InvalidHex(e.to_string()))?;

    let mut function_selector = [0u8; 4];
    function_selector.copy_from_slice(&bytes[..4]);

    // Address slot is left-padded to 32 bytes; only the low 20 are the account id.
    let address_slot = &bytes[4..36];
    let recipient_address = Address::from_slice(&address_slot[12..]);

    let raw_value = U256::from_be_slice(&bytes[36..68]);

    Ok(DecodedCallData {
        function_selector,
        recipient_address,
        raw_value,
    })
}

/// Extract just the 4-byte selector from a hex payload, if there is one.
pub fn extract_selector(payload: &str) -> Option<[u8; 4]> {
    let payload = strip_hex_prefix(payload);
    let head = payload.get(..SELECTOR_HEX_LEN)?;
    let bytes = hex::decode(head).ok()?;
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&bytes);
    Some(selector)
}

fn strip_hex_prefix(payload: &str) -> &str {
    let payload = payload.trim();
    payload
        .strip_prefix("0x")
        .or_else(|| payload.strip_prefix("0X"))
        .unwrap_or(payload)
}

/// Encode a `transfer(address,uint256)` payload as lower-case hex without `0x`.
#[cfg(test)]
pub(crate) fn encode_transfer(to: Address, value: U256) -> String {
    hex::encode(transferCall { to, value }.abi_encode())
}
