// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright OXIDOS AUTOMOTIVE 2024.

use crate::errors::TockloaderError;

pub const KEY_LENGTH: usize = 8;
pub const MAX_VALUE_LENGTH: usize = 55;
/// Size of one attribute slot in flash: key, length byte and the longest value.
pub const ATTRIBUTE_SIZE: usize = KEY_LENGTH + 1 + MAX_VALUE_LENGTH;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAttribute {
    pub key: String,
    pub value: String,
}

impl DecodedAttribute {
    pub(crate) fn new(decoded_key: String, decoded_value: String) -> DecodedAttribute {
        DecodedAttribute {
            key: decoded_key,
            value: decoded_value,
        }
    }
}

/// Decode one raw attribute slot.
///
/// Slot layout: an 8 byte key padded with NULs, one length byte, then the
/// value. Empty or corrupt slots are common on blank boards, so anything that
/// does not decode cleanly is reported as `None` instead of an error.
pub fn decode_attribute(step: &[u8]) -> Option<DecodedAttribute> {
    if step.len() <= KEY_LENGTH {
        return None;
    }

    let key = bytes_to_string(&step[0..KEY_LENGTH])?
        .trim_end_matches('\0')
        .to_string();

    let vlen = step[KEY_LENGTH] as usize;
    if vlen == 0 || vlen > MAX_VALUE_LENGTH {
        return None;
    }

    let raw_value = step.get(KEY_LENGTH + 1..KEY_LENGTH + 1 + vlen)?;
    let value = bytes_to_string(raw_value)?;

    Some(DecodedAttribute::new(key, value))
}

/// Build the raw slot for `key` and `value`, padded with zeroes.
pub fn encode_attribute(
    key: &str,
    value: &str,
) -> Result<[u8; ATTRIBUTE_SIZE], TockloaderError> {
    if key.is_empty() || key.len() > KEY_LENGTH || key.contains('\0') {
        return Err(TockloaderError::InvalidAttribute(format!(
            "key {key:?} must be 1 to {KEY_LENGTH} bytes without NUL"
        )));
    }
    if value.is_empty() || value.len() > MAX_VALUE_LENGTH {
        return Err(TockloaderError::InvalidAttribute(format!(
            "value for {key:?} must be 1 to {MAX_VALUE_LENGTH} bytes, got {}",
            value.len()
        )));
    }

    let mut raw = [0u8; ATTRIBUTE_SIZE];
    raw[..key.len()].copy_from_slice(key.as_bytes());
    raw[KEY_LENGTH] = value.len() as u8;
    raw[KEY_LENGTH + 1..KEY_LENGTH + 1 + value.len()].copy_from_slice(value.as_bytes());
    Ok(raw)
}

pub(crate) fn bytes_to_string(raw: &[u8]) -> Option<String> {
    utf8_decode::Decoder::new(raw.iter().cloned())
        .collect::<Result<String, _>>()
        .ok()
}

/// Parse an integer literal the way addresses are written in attributes.
///
/// Accepts decimal as well as `0x`, `0o` and `0b` prefixed literals, with `_`
/// allowed between digits.
pub fn parse_address(literal: &str) -> Option<u64> {
    let literal = literal.trim();
    let lower = literal.to_ascii_lowercase();

    let (digits, radix) = if let Some(rest) = lower.strip_prefix("0x") {
        (rest, 16)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (rest, 8)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (rest, 2)
    } else {
        (lower.as_str(), 10)
    };

    // A single underscore may follow the prefix ("0x_10"), never lead a decimal.
    let digits = if radix != 10 {
        digits.strip_prefix('_').unwrap_or(digits)
    } else {
        digits
    };

    if digits.is_empty()
        || digits.starts_with('_')
        || digits.ends_with('_')
        || digits.contains("__")
    {
        return None;
    }

    let digits = digits.replace('_', "");

    // Leading zeroes are ambiguous in decimal, so only all-zero literals pass.
    if radix == 10 && digits.len() > 1 && digits.starts_with('0') {
        return digits.bytes().all(|b| b == b'0').then_some(0);
    }

    if !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }

    u64::from_str_radix(&digits, radix).ok()
}
