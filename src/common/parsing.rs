// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::error::AppError;
use alloy::primitives::{Address, U256};

pub fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

pub fn parse_hex_bytes(s: &str) -> Option<Vec<u8>> {
    hex::decode(strip_0x(s)).ok()
}

/// Parse a wei amount given either as decimal or `0x`-prefixed hex.
pub fn parse_wei(raw: &str, field: &str) -> Result<U256, AppError> {
    let trimmed = raw.trim();
    let parsed = if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        U256::from_str_radix(strip_0x(trimmed), 16)
    } else {
        U256::from_str_radix(trimmed, 10)
    };
    parsed.map_err(|e| AppError::Validation {
        field: field.to_string(),
        message: format!("invalid wei amount '{trimmed}': {e}"),
    })
}

/// Validate a request address as emitted by a bucket watch.
///
/// Returns `Ok(None)` for the null address, which watches may emit for empty
/// slots. Anything that is not a 20-byte hex address is an error.
pub fn parse_request_address(raw: &str) -> Result<Option<Address>, AppError> {
    let trimmed = raw.trim();
    let bytes = parse_hex_bytes(trimmed)
        .filter(|b| b.len() == 20)
        .ok_or_else(|| AppError::InvalidAddress(trimmed.to_string()))?;
    let address = Address::from_slice(&bytes);
    if address.is_zero() {
        return Ok(None);
    }
    Ok(Some(address))
}

/// Split a comma/whitespace separated list, dropping empty parts.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.trim_matches(|c| c == '`' || c == '"' || c == '\'')
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(ToString::to_string)
        .collect()
}
