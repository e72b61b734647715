//! Partition size parsing and unit helpers.
//!
//! Units are binary: `GB` and `GiB` both mean 2^30 bytes, `MB` and `MiB` both
//! mean 2^20. A bare number is MiB, `B` is bytes and any percentage means
//! "the remaining space on the disk".

use thiserror::Error;

pub const KIB: u64 = 1 << 10;
pub const MIB: u64 = 1 << 20;
pub const GIB: u64 = 1 << 30;
pub const TIB: u64 = 1 << 40;

/// A parsed partition size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeSpec {
    Bytes(u64),
    Remaining,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SizeParseError {
    #[error("empty size")]
    Empty,
    #[error("unparsable size '{0}'")]
    Invalid(String),
    #[error("size '{0}' must be greater than zero")]
    NotPositive(String),
}

/// Parse a declared size such as `20GB`, `512MiB`, `1.5 gb`, `2048` or `100%`.
pub fn parse_size(input: &str) -> Result<SizeSpec, SizeParseError> {
    let text = input.trim();
    if text.is_empty() {
        return Err(SizeParseError::Empty);
    }
    if text.ends_with('%') {
        return Ok(SizeSpec::Remaining);
    }

    let upper = text.to_ascii_uppercase();
    let split = upper
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(upper.len());
    let (number, unit) = upper.split_at(split);

    let multiplier = match unit.trim() {
        "" | "M" | "MB" | "MIB" => MIB,
        "B" => 1,
        "K" | "KB" | "KIB" => KIB,
        "G" | "GB" | "GIB" => GIB,
        "T" | "TB" | "TIB" => TIB,
        _ => return Err(SizeParseError::Invalid(text.to_string())),
    };

    let value: f64 = number
        .parse()
        .map_err(|_| SizeParseError::Invalid(text.to_string()))?;
    if !value.is_finite() {
        return Err(SizeParseError::Invalid(text.to_string()));
    }

    let bytes = (value * multiplier as f64).round();
    if bytes < 1.0 {
        return Err(SizeParseError::NotPositive(text.to_string()));
    }

    Ok(SizeSpec::Bytes(bytes as u64))
}

/// Whole MiB contained in `bytes`, rounded down.
pub fn bytes_to_mib(bytes: u64) -> u64 {
    bytes / MIB
}

/// Bytes in `gib` gibibytes, rounded to the nearest byte.
pub fn gib_to_bytes(gib: f64) -> u64 {
    if gib <= 0.0 || !gib.is_finite() {
        0
    } else {
        (gib * GIB as f64).round() as u64
    }
}

/// Bytes expressed as GiB.
pub fn bytes_to_gib(bytes: u64) -> f64 {
    bytes as f64 / GIB as f64
}

/// Human readable size with two decimals, e.g. `20.00 GB`.
pub fn format_gib(bytes: u64) -> String {
    format!("{:.2} GB", bytes_to_gib(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_binary_units() {
        assert_eq!(parse_size("20GB"), Ok(SizeSpec::Bytes(20 * GIB)));
        assert_eq!(parse_size("20GiB"), Ok(SizeSpec::Bytes(20 * GIB)));
        assert_eq!(parse_size("512MB"), Ok(SizeSpec::Bytes(512 * MIB)));
        assert_eq!(parse_size("512 mib"), Ok(SizeSpec::Bytes(512 * MIB)));
        assert_eq!(parse_size("4096B"), Ok(SizeSpec::Bytes(4096)));
    }

    #[test]
    fn test_bare_number_is_mib() {
        assert_eq!(parse_size("2048"), Ok(SizeSpec::Bytes(2048 * MIB)));
    }

    #[test]
    fn test_fractional_sizes() {
        assert_eq!(parse_size("1.5GB"), Ok(SizeSpec::Bytes(GIB + GIB / 2)));
    }

    #[test]
    fn test_percent_is_remaining() {
        assert_eq!(parse_size("100%"), Ok(SizeSpec::Remaining));
        assert_eq!(parse_size(" 50% "), Ok(SizeSpec::Remaining));
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(parse_size(""), Err(SizeParseError::Empty));
        assert!(matches!(parse_size("big"), Err(SizeParseError::Invalid(_))));
        assert!(matches!(parse_size("10XB"), Err(SizeParseError::Invalid(_))));
        assert!(matches!(parse_size("1.2.3GB"), Err(SizeParseError::Invalid(_))));
        assert!(matches!(parse_size("0"), Err(SizeParseError::NotPositive(_))));
    }

    #[test]
    fn test_unit_helpers() {
        assert_eq!(bytes_to_mib(GIB), 1024);
        assert_eq!(bytes_to_mib(MIB + 1), 1);
        assert_eq!(gib_to_bytes(1.0), GIB);
        assert_eq!(gib_to_bytes(-1.0), 0);
        assert_eq!(format_gib(20 * GIB), "20.00 GB");
    }
}
