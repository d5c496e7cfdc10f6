use crate::config::EngineConfig;
use crate::ingestion::TransactionRecord;
use crate::schema::{CategoryAmount, NormalizedForecast};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AttributionSource {
    /// Categories supplied with the forecast
    Producer,
    /// Aggregated from cached transactions and card purchases
    LocalHistory,
    /// Nothing to attribute
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct CategoryAttribution {
    pub source: AttributionSource,
    pub categories: Vec<CategoryAmount>,
}

pub struct CategoryAttributor<'a> {
    config: &'a EngineConfig,
}

impl<'a> CategoryAttributor<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Producer categories when any have a positive amount, otherwise local
    /// expense totals per category. Both are ranked descending and truncated.
    pub fn attribute(
        &self,
        forecast: &NormalizedForecast,
        records: &[TransactionRecord],
    ) -> CategoryAttribution {
        let from_producer = self.rank(
            forecast
                .top_categories
                .iter()
                .filter(|c| c.amount.is_finite() && c.amount > 0.0)
                .cloned()
                .collect(),
        );
        if !from_producer.is_empty() {
            return CategoryAttribution {
                source: AttributionSource::Producer,
                categories: from_producer,
            };
        }

        let from_history = self.rank(self.aggregate_local(records));
        debug!(
            "Producer sent no usable categories; {} derived from local history",
            from_history.len()
        );

        let source = if from_history.is_empty() {
            AttributionSource::None
        } else {
            AttributionSource::LocalHistory
        };
        CategoryAttribution {
            source,
            categories: from_history,
        }
    }

    fn aggregate_local(&self, records: &[TransactionRecord]) -> Vec<CategoryAmount> {
        let card_payment = self.config.card_payment_category.as_deref();
        let mut totals: BTreeMap<String, f64> = BTreeMap::new();

        for record in records {
            if !record.is_expense() || record.is_card_payment(card_payment) {
                continue;
            }
            if !(record.amount.is_finite() && record.amount > 0.0) {
                continue;
            }
            let category = record
                .category_name()
                .unwrap_or(self.config.uncategorized_label.as_str());
            *totals.entry(category.to_string()).or_insert(0.0) += record.amount;
        }

        totals
            .into_iter()
            .map(|(category, amount)| CategoryAmount { category, amount })
            .collect()
    }

    /// Stable descending sort, so equal amounts keep their incoming order.
    fn rank(&self, mut categories: Vec<CategoryAmount>) -> Vec<CategoryAmount> {
        categories.sort_by(|a, b| b.amount.total_cmp(&a.amount));
        categories.truncate(self.config.max_top_categories);
        categories
    }
}

pub fn attribute(
    forecast: &NormalizedForecast,
    records: &[TransactionRecord],
    config: &EngineConfig,
) -> CategoryAttribution {
    CategoryAttributor::new(config).attribute(forecast, records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CARD_PAYMENT_CATEGORY;
    use crate::ingestion::RecordSource;
    use crate::schema::ContractKind;

    fn record(
        source: RecordSource,
        kind: &str,
        amount: f64,
        category: Option<&str>,
    ) -> TransactionRecord {
        TransactionRecord {
            source,
            id: None,
            date: "2026-01-05".to_string(),
            kind: kind.to_string(),
            amount,
            category: category.map(str::to_string),
            description: None,
        }
    }

    fn category(name: &str, amount: f64) -> CategoryAmount {
        CategoryAmount {
            category: name.to_string(),
            amount,
        }
    }

    fn empty_forecast() -> NormalizedForecast {
        NormalizedForecast::empty(ContractKind::BackendV2, 7)
    }

    #[test]
    fn test_producer_categories_preferred() {
        let mut forecast = empty_forecast();
        forecast.top_categories = vec![
            category("Zero", 0.0),
            category("Casa", 300.0),
            category("Lazer", 500.0),
        ];
        let records = vec![record(RecordSource::Card, "card_purchase", 999.0, Some("Viagem"))];

        let result = attribute(&forecast, &records, &EngineConfig::default());
        assert_eq!(result.source, AttributionSource::Producer);
        let names: Vec<_> = result.categories.iter().map(|c| c.category.as_str()).collect();
        assert_eq!(names, vec!["Lazer", "Casa"]);
    }

    #[test]
    fn test_local_fallback_aggregates_expenses() {
        let mut forecast = empty_forecast();
        forecast.top_categories = vec![category("Neg", -5.0)];
        let records = vec![
            record(RecordSource::Cash, "expense", 100.0, Some("Mercado")),
            record(RecordSource::Cash, "expense", 50.0, Some("Mercado")),
            record(RecordSource::Card, "card_purchase", 120.0, Some("Lazer")),
            record(RecordSource::Cash, "income", 5000.0, Some("Salário")),
            record(RecordSource::Cash, "expense", 900.0, Some(DEFAULT_CARD_PAYMENT_CATEGORY)),
            record(RecordSource::Card, "card_purchase", 30.0, None),
            record(RecordSource::Cash, "expense", 0.0, Some("Vazio")),
        ];

        let result = attribute(&forecast, &records, &EngineConfig::default());
        assert_eq!(result.source, AttributionSource::LocalHistory);
        assert_eq!(
            result.categories,
            vec![
                category("Mercado", 150.0),
                category("Lazer", 120.0),
                category("Outros", 30.0),
            ]
        );
    }

    #[test]
    fn test_truncates_to_limit() {
        let records: Vec<TransactionRecord> = (1..=15)
            .map(|i| {
                let name = format!("cat{:02}", i);
                record(RecordSource::Cash, "expense", i as f64, Some(&name))
            })
            .collect();
        let result = attribute(&empty_forecast(), &records, &EngineConfig::default());
        assert_eq!(result.categories.len(), 10);
        assert_eq!(result.categories[0].category, "cat15");
        assert_eq!(result.categories[9].category, "cat06");
    }

    #[test]
    fn test_nothing_to_attribute() {
        let result = attribute(&empty_forecast(), &[], &EngineConfig::default());
        assert_eq!(result.source, AttributionSource::None);
        assert!(result.categories.is_empty());
    }
}
