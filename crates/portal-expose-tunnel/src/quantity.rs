//! Kubernetes resource quantity comparison.
//!
//! The API server canonicalizes quantities on write (`1000m` is stored as `1`),
//! so drift detection has to compare values rather than strings.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

/// Nano-units per whole unit.
const NANO: i128 = 1_000_000_000;

/// Compare two quantities by value.
///
/// Falls back to string equality when either side cannot be parsed.
#[must_use]
pub fn quantities_equal(a: &Quantity, b: &Quantity) -> bool {
    match (parse_quantity(&a.0), parse_quantity(&b.0)) {
        (Some(a), Some(b)) => a == b,
        _ => a.0 == b.0,
    }
}

/// Parse a quantity string into nano-units.
///
/// Supports plain and decimal numbers, decimal SI suffixes (`n`, `u`, `m`,
/// `k`, `M`, `G`, `T`, `P`, `E`), binary suffixes (`Ki` .. `Ei`) and decimal
/// exponents (`1e3`). Precision below one nano-unit is truncated.
#[must_use]
pub fn parse_quantity(s: &str) -> Option<i128> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);

    let (negative, number) = match number.as_bytes().first() {
        Some(b'-') => (true, &number[1..]),
        Some(b'+') => (false, &number[1..]),
        _ => (false, number),
    };

    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let whole: i128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut fraction_digits: String = fraction.chars().take(9).collect();
    while fraction_digits.len() < 9 {
        fraction_digits.push('0');
    }
    let fraction: i128 = fraction_digits.parse().ok()?;

    let base = whole.checked_mul(NANO)?.checked_add(fraction)?;
    let (numerator, denominator) = suffix_scale(suffix)?;
    let value = base.checked_mul(numerator)? / denominator;

    Some(if negative { -value } else { value })
}

/// Multiplier for a suffix, as a `(numerator, denominator)` pair.
fn suffix_scale(suffix: &str) -> Option<(i128, i128)> {
    let scale = match suffix {
        "" => (1, 1),
        "n" => (1, 1_000_000_000),
        "u" => (1, 1_000_000),
        "m" => (1, 1_000),
        "k" => (1_000, 1),
        "M" => (1_000_000, 1),
        "G" => (1_000_000_000, 1),
        "T" => (1_000_000_000_000, 1),
        "P" => (1_000_000_000_000_000, 1),
        "E" => (1_000_000_000_000_000_000, 1),
        "Ki" => (1 << 10, 1),
        "Mi" => (1 << 20, 1),
        "Gi" => (1 << 30, 1),
        "Ti" => (1 << 40, 1),
        "Pi" => (1 << 50, 1),
        "Ei" => (1 << 60, 1),
        _ => {
            let exponent = suffix
                .strip_prefix('e')
                .or_else(|| suffix.strip_prefix('E'))?;
            let exponent: u32 = exponent.parse().ok()?;
            (10_i128.checked_pow(exponent)?, 1)
        }
    };
    Some(scale)
}
