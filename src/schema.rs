use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    #[schemars(description = "Top-level `series` plus `kpis` (current daily producer)")]
    New,

    #[schemars(description = "Top-level `predictions` plus a `metrics` object")]
    BackendV2,

    #[schemars(
        description = "Anything else carrying a `predictions` array (or a bare array); totals are summed locally"
    )]
    Legacy,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct Kpis {
    pub income: f64,
    pub expense: f64,
    pub net: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPoint {
    #[schemars(description = "ISO date, year-month, or null for offset-only points")]
    pub date_key: Option<String>,
    pub label: String,
    pub income: f64,
    pub expense: f64,
    /// Producer value when supplied, otherwise `income - expense`.
    pub net: f64,
    /// Whether the producer supplied `net` directly.
    pub net_reported: bool,
    pub income_low: f64,
    pub income_high: f64,
    pub expense_low: f64,
    pub expense_high: f64,
    pub expense_by_category: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct CategoryAmount {
    pub category: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct Alert {
    #[schemars(description = "Lower-cased producer level, e.g. `info` or `warn`")]
    pub level: String,
    pub message: String,
}

/// Canonical forecast model, independent of which producer contract was received.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedForecast {
    pub contract_kind: ContractKind,
    #[schemars(description = "Opaque producer metadata (model identifiers, training basis)")]
    pub meta: Map<String, Value>,
    pub basis: String,
    pub horizon_days: u32,
    pub kpis: Kpis,
    pub series: Vec<ForecastPoint>,
    pub top_categories: Vec<CategoryAmount>,
    pub alerts: Vec<Alert>,
    #[schemars(description = "Producer-reported score in [0, 10]; 0 when absent")]
    pub risk_score: f64,
    #[schemars(description = "Producer-reported error message, if any")]
    pub error: Option<String>,
}

impl NormalizedForecast {
    /// A structurally valid result with no data.
    pub fn empty(contract_kind: ContractKind, horizon_days: u32) -> Self {
        Self {
            contract_kind,
            meta: Map::new(),
            basis: String::new(),
            horizon_days,
            kpis: Kpis::default(),
            series: Vec::new(),
            top_categories: Vec::new(),
            alerts: Vec::new(),
            risk_score: 0.0,
            error: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(NormalizedForecast)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }
}

/// Observed daily totals derived from local transaction records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPoint {
    pub date_key: String,
    pub income: f64,
    pub expense: f64,
}

impl HistoryPoint {
    pub fn net(&self) -> f64 {
        self.income - self.expense
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DateTrust {
    /// Producer ISO dates were kept.
    IsoDates,
    /// Producer year-month keys were kept.
    YearMonth,
    /// Producer dates were replaced by `today + 1 ..`.
    Synthetic,
    /// Nothing predicted.
    Empty,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub history: Vec<HistoryPoint>,
    pub predicted: Vec<ForecastPoint>,
    pub used_synthetic_dates: bool,
    pub date_trust: DateTrust,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    /// Per-point net is meaningful; anomalies are large absolute swings.
    Daily,
    /// Aggregate income/expense only; anomalies are expense spikes.
    Periodic,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdSource {
    History,
    InSeries,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub total_signal_count: u32,
    pub negative_net_days: u32,
    pub anomaly_days: u32,
    pub mode: ScoringMode,
    pub threshold_source: ThresholdSource,
    pub anomaly_threshold: f64,
}
