//! Kubernetes resource quantity parsing
//!
//! Supports the suffix forms the API server accepts: binary (`Ki`..`Ei`),
//! decimal (`n`, `u`, `m`, `k`..`E`) and exponent (`1e3`, `5E-1`).

use crate::error::QuantityError;

const BINARY_SUFFIXES: &[(&str, f64)] = &[
    ("Ki", 1024.0),
    ("Mi", 1_048_576.0),
    ("Gi", 1_073_741_824.0),
    ("Ti", 1_099_511_627_776.0),
    ("Pi", 1_125_899_906_842_624.0),
    ("Ei", 1_152_921_504_606_846_976.0),
];

const DECIMAL_SUFFIXES: &[(&str, f64)] = &[
    ("n", 1e-9),
    ("u", 1e-6),
    ("m", 1e-3),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
    ("E", 1e18),
];

fn parse(raw: &str) -> Result<f64, QuantityError> {
    let err = || QuantityError(raw.to_string());
    let s = raw.trim();
    if s.is_empty() {
        return Err(err());
    }

    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
        .unwrap_or(s.len());
    let (number, suffix) = s.split_at(split);
    let number: f64 = number.parse().map_err(|_| err())?;

    let multiplier = if suffix.is_empty() {
        1.0
    } else if let Some((_, m)) = BINARY_SUFFIXES.iter().find(|(sfx, _)| *sfx == suffix) {
        *m
    } else if let Some((_, m)) = DECIMAL_SUFFIXES.iter().find(|(sfx, _)| *sfx == suffix) {
        *m
    } else if let Some(exp) = suffix.strip_prefix(|c: char| c == 'e' || c == 'E') {
        let exp: i32 = exp.parse().map_err(|_| err())?;
        10f64.powi(exp)
    } else {
        return Err(err());
    };

    let value = number * multiplier;
    if !value.is_finite() || value < 0.0 {
        return Err(err());
    }
    Ok(value)
}

/// Value of the quantity rounded up to an integer (bytes, counts).
pub fn parse_value(raw: &str) -> Result<i64, QuantityError> {
    // Rounding error from f64 must not turn 1Gi into 1Gi + 1.
    let value = parse(raw)?;
    Ok((value - 1e-9).ceil().max(0.0) as i64)
}

/// Value of the quantity in thousandths, rounded up (CPU millicores).
pub fn parse_milli_value(raw: &str) -> Result<i64, QuantityError> {
    let value = parse(raw)? * 1000.0;
    Ok((value - 1e-6).ceil().max(0.0) as i64)
}
