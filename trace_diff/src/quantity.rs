//! Numeric fields arrive as JSON numbers, `0x` hex strings, decimal strings or
//! (from the Python client) byte-string literals like `b'12'`. They all end up
//! as minimal lower-case `0x` hex.

use ethereum_types::U256;
use lazy_regex::regex;
use serde::Deserialize;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub(crate) enum Quantity {
    Number(u64),
    Text(String),
}

impl Quantity {
    /// Canonical hex, or [`None`] if the value is not a number at all.
    pub(crate) fn to_hex(&self) -> Option<String> {
        match self {
            Quantity::Number(n) => Some(format!("0x{n:x}")),
            Quantity::Text(text) => hex_quantity(text),
        }
    }

    pub(crate) fn to_u64(&self) -> Option<u64> {
        match self {
            Quantity::Number(n) => Some(*n),
            Quantity::Text(text) => {
                let value = parse_int_or_hex(text)?;
                (value <= U256::from(u64::MAX)).then(|| value.low_u64())
            }
        }
    }

    /// Interpret a Python byte-string literal (`b'12'`) as a decimal.
    pub(crate) fn unwrap_py_bytes(self) -> Self {
        match self {
            Quantity::Text(text) => {
                let inner = text
                    .strip_prefix("b'")
                    .and_then(|rest| rest.strip_suffix('\''))
                    .map(str::to_owned);
                Quantity::Text(inner.unwrap_or(text))
            }
            number => number,
        }
    }
}

pub(crate) fn parse_int_or_hex(text: &str) -> Option<U256> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some("") => Some(U256::zero()),
        Some(hex) => U256::from_str_radix(hex, 16).ok(),
        None => U256::from_dec_str(text).ok(),
    }
}

fn hex_quantity(text: &str) -> Option<String> {
    let text = text.trim().to_ascii_lowercase();
    match text.strip_prefix("0x") {
        Some("") => Some("0x0".to_owned()),
        Some(digits) if digits.bytes().all(|b| b.is_ascii_hexdigit()) => {
            Some(strip_leading_zeros(&text))
        }
        Some(_) => None,
        None => parse_int_or_hex(&text).map(|value| format!("0x{value:x}")),
    }
}

/// `0x00007bb8` -> `0x7bb8`, `0x0000` -> `0x0`. Works on the text so words
/// wider than 256 bits survive untouched.
pub(crate) fn strip_leading_zeros(hex: &str) -> String {
    regex!(r"^0x0+([0-9a-f]+)$").replace(hex, "0x$1").into_owned()
}

/// `0x` + lower-case digits, whatever the client's spelling. The digits
/// themselves are kept as reported.
pub(crate) fn normalize_root(root: &str) -> String {
    let root = root.trim().to_ascii_lowercase();
    match root.strip_prefix("0x") {
        Some(_) => root,
        None => format!("0x{root}"),
    }
}
