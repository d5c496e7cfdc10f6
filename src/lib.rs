//! # Cash-Flow Forecast
//!
//! Turns a cash-flow forecast response from a remote prediction service into
//! one canonical model, lines it up with locally observed daily totals, and
//! derives a bounded risk signal and a category ranking from it.
//!
//! ## Core Concepts
//!
//! - **Contract normalization**: the producer has shipped three incompatible
//!   response shapes (`series`+`kpis`, `predictions`+`metrics`, bare
//!   `predictions`). Each is detected structurally and mapped to
//!   [`NormalizedForecast`]. Malformed input yields an empty result, never an error.
//! - **Timeline reconciliation**: predicted dates are only kept when enough of
//!   them are well formed and plausibly close to today; otherwise they are
//!   replaced by `today + 1 ..` and the timeline is flagged.
//! - **Risk scoring**: negative-net days plus anomaly days, measured against
//!   the history median or, when history is short, the forecast's own 80th
//!   percentile.
//! - **Category attribution**: producer categories, falling back to local
//!   expense totals.
//!
//! ## Example
//!
//! ```rust,ignore
//! use cashflow_forecast::*;
//! use chrono::NaiveDate;
//! use serde_json::json;
//!
//! let raw = json!({
//!     "series": [
//!         { "date": "2026-01-01", "income_pred": 100, "expense_pred": 40 },
//!         { "date": "2026-01-02", "income_pred": 90, "expense_pred": 150 }
//!     ],
//!     "kpis": { "income_pred_total": 190, "expense_pred_total": 190, "net_pred_total": 0 }
//! });
//!
//! let engine = ForecastEngine::default();
//! let run = engine.run(&raw, &[], NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
//! assert_eq!(run.forecast.series[1].net, -60.0);
//! assert_eq!(run.risk.negative_net_days, 1);
//! ```

pub mod categories;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod normalizer;
pub mod risk;
pub mod schema;
pub mod state;
pub mod timeline;
pub mod utils;

#[cfg(feature = "remote")]
pub mod client;

pub use categories::{attribute, AttributionSource, CategoryAttribution, CategoryAttributor};
pub use config::{DateTrustPolicy, EngineConfig, RiskPolicy};
pub use error::{ForecastError, Result};
pub use ingestion::{build_daily_history, RecordSource, TransactionRecord};
pub use normalizer::{normalize, normalize_str, ContractNormalizer};
pub use risk::{score, scoring_mode, RiskScorer};
pub use schema::*;
pub use state::ForecastState;
pub use timeline::{reconcile, TimelineReconciler};
pub use utils::*;

#[cfg(feature = "remote")]
pub use client::{ForecastClient, ForecastRequest};

use chrono::NaiveDate;
use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Everything one forecast run hands to the rendering layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ForecastRun {
    pub forecast: NormalizedForecast,
    pub timeline: Timeline,
    pub risk: RiskAssessment,
    pub categories: CategoryAttribution,
}

impl ForecastRun {
    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ForecastRun)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ForecastEngine {
    config: EngineConfig,
}

impl ForecastEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Normalizes `raw`, reconciles it against the history built from
    /// `records`, and scores it. Pure: the same inputs give the same run.
    pub fn run(
        &self,
        raw: &Value,
        records: &[TransactionRecord],
        today: NaiveDate,
    ) -> ForecastRun {
        let history = build_daily_history(records, today, &self.config);
        self.run_with_history(raw, &history, records, today)
    }

    /// Like [`ForecastEngine::run`] for callers that already hold daily totals.
    pub fn run_with_history(
        &self,
        raw: &Value,
        history: &[HistoryPoint],
        records: &[TransactionRecord],
        today: NaiveDate,
    ) -> ForecastRun {
        let forecast = normalize(raw, &self.config);
        debug!(
            "Normalized {:?} forecast: {} points over {} days",
            forecast.contract_kind,
            forecast.series.len(),
            forecast.horizon_days
        );

        let timeline = reconcile(&forecast, history, today, &self.config);
        let risk = score(&forecast, &timeline, &self.config);
        let categories = attribute(&forecast, records, &self.config);

        info!(
            "Forecast run: {} predicted points (synthetic dates: {}), risk {}",
            timeline.predicted.len(),
            timeline.used_synthetic_dates,
            risk.level.as_str()
        );

        ForecastRun {
            forecast,
            timeline,
            risk,
            categories,
        }
    }

    pub fn run_today(&self, raw: &Value, records: &[TransactionRecord]) -> ForecastRun {
        self.run(raw, records, today_local())
    }
}

pub fn process_forecast(raw: &Value, records: &[TransactionRecord]) -> ForecastRun {
    ForecastEngine::default().run_today(raw, records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, 31).unwrap()
    }

    #[test]
    fn test_end_to_end_run() {
        let raw = json!({
            "meta": { "basis": "cash_daily_sklearn" },
            "series": [
                { "date": "2026-01-01", "income_pred": 100, "expense_pred": 40, "net_pred": 60,
                  "expense_by_category": { "Mercado": 40 } },
                { "date": "2026-01-02", "income_pred": 90, "expense_pred": 150, "net_pred": -60 }
            ],
            "kpis": { "income_pred_total": 190, "expense_pred_total": 190, "net_pred_total": 0 },
            "top_categories": [{ "category": "Mercado", "amount": 190 }]
        });

        let run = ForecastEngine::default().run(&raw, &[], today());
        assert_eq!(run.forecast.contract_kind, ContractKind::New);
        assert!(!run.timeline.used_synthetic_dates);
        assert_eq!(run.timeline.predicted.len(), 2);
        assert_eq!(run.risk.mode, ScoringMode::Daily);
        assert_eq!(run.risk.negative_net_days, 1);
        assert_eq!(run.categories.source, AttributionSource::Producer);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            history_window_days: 0,
            ..EngineConfig::default()
        };
        assert!(ForecastEngine::new(config).is_err());
    }

    #[test]
    fn test_run_uses_local_history() {
        let records: Vec<TransactionRecord> = serde_json::from_value(json!([
            { "source": "cash", "date": "2025-12-20", "type": "expense", "amount": 50, "category": "Mercado" },
            { "source": "card", "date": "2025-12-22", "type": "card_purchase", "amount": 80, "category": "Lazer" }
        ]))
        .unwrap();

        let run = ForecastEngine::default().run(&json!({ "predictions": [] }), &records, today());
        assert_eq!(run.timeline.history.len(), 30);
        assert_eq!(run.timeline.history[18].date_key, "2025-12-20");
        assert_eq!(run.timeline.history[18].expense, 50.0);
        assert!(run.forecast.is_empty());
        assert_eq!(run.risk.level, RiskLevel::Low);
        assert_eq!(run.categories.source, AttributionSource::LocalHistory);
        assert_eq!(run.categories.categories[0].category, "Lazer");
    }

    #[test]
    fn test_run_schema_covers_categories() {
        let schema = ForecastRun::schema_as_json().unwrap();
        assert!(schema.contains("\"categories\""));
        assert!(schema.contains("AttributionSource"));
        assert!(schema.contains("local_history"));
        assert!(schema.contains("usedSyntheticDates"));
    }
}
