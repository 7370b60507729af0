//! Human-readable byte sizes and durations.
//!
//! Byte sizes accept SI (`MB`, powers of 1000) and IEC (`MiB`/`Mi`, powers
//! of 1024) units, case-insensitively. Durations accept a sequence of
//! `<decimal><unit>` terms such as `1m30s` or `250ms`.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

/// Errors produced while parsing human-readable quantities.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitError {
    #[error("invalid byte size '{0}'")]
    InvalidSize(String),

    #[error("invalid duration '{0}'")]
    InvalidDuration(String),

    #[error("value '{0}' is out of range")]
    OutOfRange(String),
}

const IEC_UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];

fn byte_multiplier(unit: &str) -> Option<u64> {
    let multiplier = match unit.to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => 1_000,
        "ki" | "kib" => 1 << 10,
        "m" | "mb" => 1_000_000,
        "mi" | "mib" => 1 << 20,
        "g" | "gb" => 1_000_000_000,
        "gi" | "gib" => 1 << 30,
        "t" | "tb" => 1_000_000_000_000,
        "ti" | "tib" => 1 << 40,
        "p" | "pb" => 1_000_000_000_000_000,
        "pi" | "pib" => 1 << 50,
        "e" | "eb" => 1_000_000_000_000_000_000,
        "ei" | "eib" => 1 << 60,
        _ => return None,
    };
    Some(multiplier)
}

/// Parses a byte size such as `128Mi`, `1.5 GB` or `4096`.
pub fn parse_bytes(input: &str) -> Result<u64, UnitError> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == ','))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);

    let number: String = number.chars().filter(|c| *c != ',').collect();
    if number.is_empty() {
        return Err(UnitError::InvalidSize(input.to_string()));
    }
    let value: f64 = number
        .parse()
        .map_err(|_| UnitError::InvalidSize(input.to_string()))?;
    let multiplier =
        byte_multiplier(unit.trim()).ok_or_else(|| UnitError::InvalidSize(input.to_string()))?;

    let bytes = value * multiplier as f64;
    if !bytes.is_finite() || bytes >= u64::MAX as f64 {
        return Err(UnitError::OutOfRange(input.to_string()));
    }
    Ok(bytes as u64)
}

/// Formats a byte count with IEC units, e.g. `128 MiB`.
pub fn format_bytes_iec(bytes: u64) -> String {
    if bytes < 10 {
        return format!("{bytes} B");
    }
    let mut exponent = 0;
    let mut base = 1u64;
    while exponent < IEC_UNITS.len() - 1 && bytes / base >= 1024 {
        base *= 1024;
        exponent += 1;
    }
    let scaled = bytes as f64 / base as f64;
    let rounded = (scaled * 10.0 + 0.5).floor() / 10.0;
    if rounded < 10.0 {
        format!("{rounded:.1} {}", IEC_UNITS[exponent])
    } else {
        format!("{rounded:.0} {}", IEC_UNITS[exponent])
    }
}

const DURATION_TERM: &str = r"(\d+\.?\d*|\.\d+)(ns|us|µs|μs|ms|s|m|h)";

fn duration_patterns() -> &'static (Regex, Regex) {
    static PATTERNS: OnceLock<(Regex, Regex)> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let whole = Regex::new(&format!("^(?:{DURATION_TERM})+$")).expect("valid duration regex");
        let term = Regex::new(DURATION_TERM).expect("valid duration term regex");
        (whole, term)
    })
}

/// Parses a duration such as `10s`, `1m30s` or `1.5h`.
///
/// A bare `0` is accepted; negative durations are rejected.
pub fn parse_duration(input: &str) -> Result<Duration, UnitError> {
    let trimmed = input.trim();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    if unsigned == "0" {
        return Ok(Duration::ZERO);
    }

    let (whole, term) = duration_patterns();
    if !whole.is_match(unsigned) {
        return Err(UnitError::InvalidDuration(input.to_string()));
    }

    let mut nanos = 0f64;
    for caps in term.captures_iter(unsigned) {
        let value: f64 = caps[1]
            .parse()
            .map_err(|_| UnitError::InvalidDuration(input.to_string()))?;
        let unit_nanos = match &caps[2] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3_600e9,
            _ => return Err(UnitError::InvalidDuration(input.to_string())),
        };
        nanos += value * unit_nanos;
    }

    if nanos >= u64::MAX as f64 {
        return Err(UnitError::OutOfRange(input.to_string()));
    }
    Ok(Duration::from_nanos(nanos.round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bytes_units() {
        assert_eq!(parse_bytes("128Mi").unwrap(), 128 * 1024 * 1024);
        assert_eq!(parse_bytes("128MiB").unwrap(), 128 * 1024 * 1024);
        assert_eq!(parse_bytes("128M").unwrap(), 128_000_000);
        assert_eq!(parse_bytes("1.5 GB").unwrap(), 1_500_000_000);
        assert_eq!(parse_bytes("1,024").unwrap(), 1024);
        assert_eq!(parse_bytes("4096").unwrap(), 4096);
        assert_eq!(parse_bytes("2kib").unwrap(), 2048);
    }

    #[test]
    fn test_parse_bytes_rejects_garbage() {
        assert_eq!(
            parse_bytes("not-a-size"),
            Err(UnitError::InvalidSize("not-a-size".to_string()))
        );
        assert!(parse_bytes("").is_err());
        assert!(parse_bytes("12 parsecs").is_err());
        assert!(parse_bytes("1.2.3M").is_err());
        assert!(matches!(
            parse_bytes("100000EiB"),
            Err(UnitError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_format_bytes_iec() {
        assert_eq!(format_bytes_iec(5), "5 B");
        assert_eq!(format_bytes_iec(1024), "1.0 KiB");
        assert_eq!(format_bytes_iec(128 * 1024 * 1024), "128 MiB");
        assert_eq!(format_bytes_iec(1536 * 1024 * 1024), "1.5 GiB");
    }

    #[test]
    fn test_parse_duration_terms() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("50ms").unwrap(), Duration::from_millis(50));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("250us").unwrap(), Duration::from_micros(250));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("+2s").unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert_eq!(
            parse_duration("not-a-duration"),
            Err(UnitError::InvalidDuration("not-a-duration".to_string()))
        );
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("-5s").is_err());
        assert!(parse_duration("5 s").is_err());
        assert!(parse_duration("").is_err());
    }
}
