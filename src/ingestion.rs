use crate::config::EngineConfig;
use crate::schema::HistoryPoint;
use crate::utils::{format_date_key, parse_iso_date, to_finite_number};
use chrono::{Days, NaiveDate};
use log::debug;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    /// Account transaction (income or expense)
    #[default]
    Cash,
    /// Credit card purchase
    Card,
}

/// One row of the combined statement: cash transactions and card purchases
/// side by side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionRecord {
    #[serde(default)]
    pub source: RecordSource,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub date: String,
    /// `income`, `expense` or `card_purchase`
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient_number")]
    pub amount: f64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl TransactionRecord {
    pub fn is_income(&self) -> bool {
        self.source == RecordSource::Cash && self.kind.eq_ignore_ascii_case("income")
    }

    /// Card purchases always count; cash rows only when typed `expense`.
    pub fn is_expense(&self) -> bool {
        match self.source {
            RecordSource::Card => true,
            RecordSource::Cash => self.kind.eq_ignore_ascii_case("expense"),
        }
    }

    pub fn category_name(&self) -> Option<&str> {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Cash expense that settles a card invoice.
    pub fn is_card_payment(&self, card_payment_category: Option<&str>) -> bool {
        match (self.source, card_payment_category, self.category_name()) {
            (RecordSource::Cash, Some(payment), Some(category)) => category == payment,
            _ => false,
        }
    }
}

fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(to_finite_number(&value))
}

/// Daily income/expense totals for the `history_window_days` ending at
/// `today`, oldest first, with quiet days filled with zeros. Records dated
/// after `today` or before the window are ignored; when none fall inside it
/// there is no history at all.
pub fn build_daily_history(
    records: &[TransactionRecord],
    today: NaiveDate,
    config: &EngineConfig,
) -> Vec<HistoryPoint> {
    let window = config.history_window_days as u64;
    let Some(start) = today.checked_sub_days(Days::new(window.saturating_sub(1))) else {
        return Vec::new();
    };

    let card_payment = config.card_payment_category.as_deref();
    let mut by_day: BTreeMap<NaiveDate, (f64, f64)> = BTreeMap::new();
    let mut skipped = 0usize;
    let mut outside = 0usize;

    for record in records {
        let Ok(date) = parse_iso_date(record.date.trim()) else {
            skipped += 1;
            continue;
        };
        if date < start || date > today {
            outside += 1;
            continue;
        }

        let amount = record.amount;
        let totals = by_day.entry(date).or_insert((0.0, 0.0));
        if record.is_income() {
            totals.0 += amount;
        } else if record.is_expense() && !record.is_card_payment(card_payment) {
            totals.1 += amount;
        }
    }

    if skipped > 0 {
        debug!("Skipped {} records without a valid date", skipped);
    }
    if outside > 0 {
        debug!(
            "Ignored {} records outside {}..={}",
            outside,
            format_date_key(start),
            format_date_key(today)
        );
    }

    if by_day.is_empty() {
        return Vec::new();
    }

    start
        .iter_days()
        .take_while(|d| *d <= today)
        .map(|date| {
            let (income, expense) = by_day.get(&date).copied().unwrap_or((0.0, 0.0));
            HistoryPoint {
                date_key: format_date_key(date),
                income,
                expense,
            }
        })
        .collect()
}
