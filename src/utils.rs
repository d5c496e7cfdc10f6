use crate::error::{ForecastError, Result};
use chrono::{Local, NaiveDate};
use serde_json::Value;

/// Placeholder label for points without a usable date key.
pub const EMPTY_LABEL: &str = "\u{2014}";

/// Numeric interpretation of a JSON value, or `0.0` when it is missing,
/// non-numeric or not finite.
///
/// Strings are trimmed and parsed (an empty string is `0.0`), booleans map to
/// `1.0`/`0.0`. Never panics.
pub fn to_finite_number(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Some(0.0)
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };

    finite_or_zero(parsed.unwrap_or(0.0))
}

pub fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// True iff `s` is shaped exactly like `YYYY-MM-DD`.
pub fn is_iso_date(s: &str) -> bool {
    s.len() == 10
        && s.is_char_boundary(4)
        && s.is_char_boundary(5)
        && s.is_char_boundary(7)
        && s.is_char_boundary(8)
        && all_digits(&s[0..4])
        && &s[4..5] == "-"
        && all_digits(&s[5..7])
        && &s[7..8] == "-"
        && all_digits(&s[8..10])
}

/// True iff `s` is shaped exactly like `YYYY-MM`.
pub fn is_year_month(s: &str) -> bool {
    s.len() == 7
        && s.is_char_boundary(4)
        && s.is_char_boundary(5)
        && all_digits(&s[0..4])
        && &s[4..5] == "-"
        && all_digits(&s[5..7])
}

pub fn parse_iso_date(s: &str) -> Result<NaiveDate> {
    if !is_iso_date(s) {
        return Err(ForecastError::DateError(format!(
            "Invalid date format: {}. Expected YYYY-MM-DD",
            s
        )));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
        ForecastError::DateError(format!("Date {} is not a valid calendar day", s))
    })
}

pub fn format_date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Display label for a date key.
///
/// - ISO date: short day/month (`31/01`)
/// - year-month: `MM/YYYY`
/// - anything else: returned as-is
/// - missing or blank: an em-dash placeholder
pub fn format_label(key: Option<&str>) -> String {
    let key = match key.map(str::trim) {
        Some(k) if !k.is_empty() => k,
        _ => return EMPTY_LABEL.to_string(),
    };

    if is_iso_date(key) {
        return match parse_iso_date(key) {
            Ok(date) => date.format("%d/%m").to_string(),
            Err(_) => key.to_string(),
        };
    }

    if is_year_month(key) {
        return format!("{}/{}", &key[5..7], &key[0..4]);
    }

    key.to_string()
}

fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted
}

/// Median of the finite subset of `values`; `0.0` when nothing is left.
/// Works on a sorted copy, the input is never reordered.
pub fn median(values: &[f64]) -> f64 {
    let sorted = sorted_finite(values);
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Nearest-rank percentile without interpolation: the element at
/// `floor(k * (n - 1))` of the sorted finite values. `k` is clamped to
/// `[0, 1]`; an empty input yields `0.0`.
pub fn percentile(values: &[f64], k: f64) -> f64 {
    let sorted = sorted_finite(values);
    if sorted.is_empty() {
        return 0.0;
    }
    let k = if k.is_finite() { k.clamp(0.0, 1.0) } else { 0.0 };
    let idx = (k * (sorted.len() - 1) as f64).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

pub fn today_local() -> NaiveDate {
    Local::now().date_naive()
}
