//! Human readable byte quantities.
//!
//! Sizes such as `512MB`, `1GiB` or `1.5G` are parsed as base-2 quantities
//! (`1KB == 1024` bytes). Compound values like `1GB512MB` are summed. A bare
//! number is rejected unless it is `0`.

use crate::error::{NanoError, Result};

const UNITS: &[(&str, u64)] = &[
    ("EiB", 1 << 60),
    ("PiB", 1 << 50),
    ("TiB", 1 << 40),
    ("GiB", 1 << 30),
    ("MiB", 1 << 20),
    ("KiB", 1 << 10),
    ("EB", 1 << 60),
    ("PB", 1 << 50),
    ("TB", 1 << 40),
    ("GB", 1 << 30),
    ("MB", 1 << 20),
    ("KB", 1 << 10),
    ("E", 1 << 60),
    ("P", 1 << 50),
    ("T", 1 << 40),
    ("G", 1 << 30),
    ("M", 1 << 20),
    ("K", 1 << 10),
    ("B", 1),
];

/// Parse a base-2 byte quantity into a number of bytes.
pub fn parse_bytes(input: &str) -> Result<u64> {
    let value = input.trim();
    if value.is_empty() {
        return Err(NanoError::invalid_size(input, "empty value"));
    }
    if value == "0" {
        return Ok(0);
    }

    let mut rest = value;
    let mut total: f64 = 0.0;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return Err(NanoError::invalid_size(input, "expected a number"));
        }
        let number: f64 = rest[..number_len]
            .parse()
            .map_err(|_| NanoError::invalid_size(input, "malformed number"))?;
        rest = &rest[number_len..];

        let (unit, multiplier) = UNITS
            .iter()
            .find(|(unit, _)| rest.starts_with(unit))
            .ok_or_else(|| {
                if rest.is_empty() {
                    NanoError::invalid_size(input, "missing unit")
                } else {
                    NanoError::invalid_size(input, format!("unknown unit in {}", rest))
                }
            })?;
        rest = &rest[unit.len()..];

        total += number * (*multiplier as f64);
    }

    if !total.is_finite() || total > u64::MAX as f64 {
        return Err(NanoError::invalid_size(input, "value out of range"));
    }

    Ok(total as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_common_sizes() {
        assert_eq!(parse_bytes("512MB").unwrap(), 536_870_912);
        assert_eq!(parse_bytes("768MB").unwrap(), 805_306_368);
        assert_eq!(parse_bytes("1GB").unwrap(), 1_073_741_824);
        assert_eq!(parse_bytes("1GiB").unwrap(), 1_073_741_824);
        assert_eq!(parse_bytes("4GB").unwrap(), 4 * 1_073_741_824);
        assert_eq!(parse_bytes("10G").unwrap(), 10 * 1_073_741_824);
        assert_eq!(parse_bytes("100B").unwrap(), 100);
    }

    #[test]
    fn test_parse_fraction_and_compound() {
        assert_eq!(parse_bytes("1.5KB").unwrap(), 1536);
        assert_eq!(parse_bytes("1GB512MB").unwrap(), 1_073_741_824 + 536_870_912);
    }

    #[test]
    fn test_zero_is_allowed_without_unit() {
        assert_eq!(parse_bytes("0").unwrap(), 0);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            parse_bytes("512"),
            Err(NanoError::InvalidSize { .. })
        ));
        assert!(parse_bytes("").is_err());
        assert!(parse_bytes("12XB").is_err());
        assert!(parse_bytes("MB").is_err());

        let err = parse_bytes("10Q").unwrap_err();
        assert!(err.to_string().contains("10Q"));
    }
}
