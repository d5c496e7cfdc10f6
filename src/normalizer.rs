use crate::config::EngineConfig;
use crate::schema::{Alert, CategoryAmount, ContractKind, ForecastPoint, Kpis, NormalizedForecast};
use crate::utils::{format_label, is_iso_date, to_finite_number};
use log::{debug, warn};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A recognized producer payload, borrowing the parts its mapping reads.
/// Variants are tried in declaration order; the first whose required fields
/// are all present wins.
enum RawContract<'a> {
    New {
        series: &'a [Value],
        kpis: &'a Value,
    },
    BackendV2 {
        predictions: &'a [Value],
        metrics: &'a Map<String, Value>,
    },
    Legacy {
        predictions: &'a [Value],
    },
    Unrecognized,
}

impl<'a> RawContract<'a> {
    fn detect(raw: &'a Value) -> Self {
        // V1 "list" responses are the bare prediction array.
        if let Some(entries) = raw.as_array() {
            return RawContract::Legacy {
                predictions: entries.as_slice(),
            };
        }

        let series = raw
            .get("series")
            .and_then(Value::as_array)
            .filter(|s| !s.is_empty());
        let kpis = present(raw, "kpis");
        if let (Some(series), Some(kpis)) = (series, kpis) {
            return RawContract::New {
                series: series.as_slice(),
                kpis,
            };
        }

        let predictions = raw.get("predictions").and_then(Value::as_array);
        let metrics = raw.get("metrics").and_then(Value::as_object);
        if let (Some(predictions), Some(metrics)) = (predictions, metrics) {
            if !predictions.is_empty() {
                return RawContract::BackendV2 {
                    predictions: predictions.as_slice(),
                    metrics,
                };
            }
        }

        match predictions {
            Some(predictions) => RawContract::Legacy {
                predictions: predictions.as_slice(),
            },
            None => RawContract::Unrecognized,
        }
    }

    fn kind(&self) -> ContractKind {
        match self {
            RawContract::New { .. } => ContractKind::New,
            RawContract::BackendV2 { .. } => ContractKind::BackendV2,
            RawContract::Legacy { .. } | RawContract::Unrecognized => ContractKind::Legacy,
        }
    }
}

/// Field-name fallback chains for a point; first present key wins.
struct PointFields {
    income: &'static [&'static str],
    expense: &'static [&'static str],
    net: &'static [&'static str],
}

const SERIES_FIELDS: PointFields = PointFields {
    income: &["income_pred"],
    expense: &["expense_pred"],
    net: &["net_pred"],
};

const PREDICTION_FIELDS: PointFields = PointFields {
    income: &["income_pred", "income"],
    expense: &["expense_pred", "expense", "expense_total"],
    net: &["net_pred", "net", "balance_pred"],
};

const KPI_INCOME: &[&str] = &["income_pred_total", "income_total"];
const KPI_EXPENSE: &[&str] = &["expense_pred_total", "expense_total"];
const KPI_NET: &[&str] = &["net_pred_total", "net_total", "balance_pred_total"];

const HORIZON_KEYS: [&str; 2] = ["horizon_days", "horizon"];

pub struct ContractNormalizer<'a> {
    config: &'a EngineConfig,
}

impl<'a> ContractNormalizer<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Maps any payload to a [`NormalizedForecast`]. Unrecognized or malformed
    /// input yields an empty series with zeroed KPIs.
    pub fn normalize(&self, raw: &Value) -> NormalizedForecast {
        let contract = RawContract::detect(raw);
        let kind = contract.kind();
        debug!("Detected forecast contract {:?}", kind);

        let mut forecast = NormalizedForecast::empty(kind, self.config.default_horizon_days);
        forecast.meta = raw
            .get("meta")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        forecast.error = first_string(raw, &["error", "detail"]);

        match contract {
            RawContract::New { series, kpis } => {
                forecast.series = series
                    .iter()
                    .filter_map(|entry| {
                        let date = string_field(entry, "date").filter(|d| is_iso_date(d))?;
                        Some(map_point(entry, Some(date), &SERIES_FIELDS))
                    })
                    .collect();
                let dropped = series.len() - forecast.series.len();
                if dropped > 0 {
                    debug!("Dropped {} series entries without an ISO date", dropped);
                }

                forecast.kpis = read_kpis(Some(kpis));
                forecast.top_categories = self.read_top_categories(raw.get("top_categories"));
                forecast.alerts = read_alerts(raw.get("alerts"));
                forecast.risk_score = read_risk_score(raw.get("risk_score"));
                forecast.basis = read_basis(raw, &forecast.meta, None);
                forecast.horizon_days = self.resolve_horizon(raw, None, forecast.series.len());
            }
            RawContract::BackendV2 {
                predictions,
                metrics,
            } => {
                forecast.series = map_predictions(predictions);
                forecast.kpis = read_kpis(metrics.get("kpis"));
                forecast.top_categories =
                    self.read_top_categories(metrics.get("top_categories"));
                forecast.alerts = read_alerts(metrics.get("alerts"));
                forecast.risk_score = read_risk_score(metrics.get("risk_score"));
                forecast.basis = read_basis(raw, &forecast.meta, Some(metrics));
                forecast.horizon_days =
                    self.resolve_horizon(raw, Some(metrics), forecast.series.len());
            }
            RawContract::Legacy { predictions } => {
                forecast.series = map_predictions(predictions);
                forecast.kpis = sum_kpis(&forecast.series);
                forecast.basis = read_basis(raw, &forecast.meta, None);
                forecast.horizon_days = self.resolve_horizon(raw, None, forecast.series.len());
            }
            RawContract::Unrecognized => {
                warn!("Unrecognized forecast payload; returning an empty forecast");
                forecast.basis = read_basis(raw, &forecast.meta, None);
                forecast.horizon_days = self.resolve_horizon(raw, None, 0);
            }
        }

        forecast
    }

    /// Explicit positive horizon field, then the point count, then the default.
    fn resolve_horizon(
        &self,
        raw: &Value,
        metrics: Option<&Map<String, Value>>,
        series_len: usize,
    ) -> u32 {
        let explicit = HORIZON_KEYS
            .iter()
            .find_map(|key| positive_days(raw.get(*key)))
            .or_else(|| {
                let metrics = metrics?;
                HORIZON_KEYS
                    .iter()
                    .find_map(|key| positive_days(metrics.get(*key)))
            });

        if let Some(days) = explicit {
            return days;
        }
        if series_len > 0 {
            return u32::try_from(series_len).unwrap_or(u32::MAX);
        }
        self.config.default_horizon_days
    }

    fn read_top_categories(&self, value: Option<&Value>) -> Vec<CategoryAmount> {
        let mut categories: Vec<CategoryAmount> = value
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| {
                        let category = string_field(entry, "category")?;
                        let amount = entry.get("amount").map(to_finite_number).unwrap_or(0.0);
                        Some(CategoryAmount { category, amount })
                    })
                    .collect()
            })
            .unwrap_or_default();

        categories.sort_by(|a, b| b.amount.total_cmp(&a.amount));
        categories.truncate(self.config.max_top_categories);
        categories
    }
}

pub fn normalize(raw: &Value, config: &EngineConfig) -> NormalizedForecast {
    ContractNormalizer::new(config).normalize(raw)
}

/// Parses `text` as JSON and normalizes it. Text that is not JSON is treated
/// like any other unrecognized payload.
pub fn normalize_str(text: &str, config: &EngineConfig) -> NormalizedForecast {
    match serde_json::from_str::<Value>(text) {
        Ok(raw) => normalize(&raw, config),
        Err(e) => {
            warn!("Forecast response is not valid JSON: {}", e);
            normalize(&Value::Null, config)
        }
    }
}

fn map_predictions(predictions: &[Value]) -> Vec<ForecastPoint> {
    predictions
        .iter()
        .filter(|entry| entry.is_object())
        .map(|entry| {
            let date_key = string_field(entry, "date").or_else(|| string_field(entry, "ym"));
            map_point(entry, date_key, &PREDICTION_FIELDS)
        })
        .collect()
}

fn map_point(entry: &Value, date_key: Option<String>, fields: &PointFields) -> ForecastPoint {
    let income = number_chain(entry, fields.income).unwrap_or(0.0);
    let expense = number_chain(entry, fields.expense).unwrap_or(0.0);
    let reported_net = number_chain(entry, fields.net);

    ForecastPoint {
        label: format_label(date_key.as_deref()),
        date_key,
        income,
        expense,
        net: reported_net.unwrap_or(income - expense),
        net_reported: reported_net.is_some(),
        income_low: number_chain(entry, &["income_low"]).unwrap_or(0.0),
        income_high: number_chain(entry, &["income_high"]).unwrap_or(0.0),
        expense_low: number_chain(entry, &["expense_low"]).unwrap_or(0.0),
        expense_high: number_chain(entry, &["expense_high"]).unwrap_or(0.0),
        expense_by_category: entry
            .get("expense_by_category")
            .and_then(Value::as_object)
            .map(|by_cat| {
                by_cat
                    .iter()
                    .map(|(cat, amount)| (cat.clone(), to_finite_number(amount)))
                    .collect::<BTreeMap<_, _>>()
            }),
    }
}

fn read_kpis(kpis: Option<&Value>) -> Kpis {
    let Some(kpis) = kpis else {
        return Kpis::default();
    };
    let income = number_chain(kpis, KPI_INCOME).unwrap_or(0.0);
    let expense = number_chain(kpis, KPI_EXPENSE).unwrap_or(0.0);
    let net = number_chain(kpis, KPI_NET).unwrap_or(income - expense);
    Kpis {
        income,
        expense,
        net,
    }
}

fn sum_kpis(series: &[ForecastPoint]) -> Kpis {
    series.iter().fold(Kpis::default(), |acc, p| Kpis {
        income: acc.income + p.income,
        expense: acc.expense + p.expense,
        net: acc.net + p.net,
    })
}

fn read_alerts(value: Option<&Value>) -> Vec<Alert> {
    let Some(entries) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            if let Some(message) = entry.as_str() {
                let message = message.trim();
                return (!message.is_empty()).then(|| Alert {
                    level: "info".to_string(),
                    message: message.to_string(),
                });
            }
            let message = string_field(entry, "message")?;
            let level = string_field(entry, "level")
                .map(|l| l.to_lowercase())
                .unwrap_or_else(|| "info".to_string());
            Some(Alert { level, message })
        })
        .collect()
}

fn read_risk_score(value: Option<&Value>) -> f64 {
    value.map(to_finite_number).unwrap_or(0.0).clamp(0.0, 10.0)
}

fn read_basis(
    raw: &Value,
    meta: &Map<String, Value>,
    metrics: Option<&Map<String, Value>>,
) -> String {
    let from_map = |map: &Map<String, Value>| {
        map.get("basis")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    string_field(raw, "basis")
        .or_else(|| from_map(meta))
        .or_else(|| metrics.and_then(from_map))
        .unwrap_or_default()
}

fn positive_days(value: Option<&Value>) -> Option<u32> {
    let days = to_finite_number(value?);
    (days >= 1.0).then(|| days.trunc().min(f64::from(u32::MAX)) as u32)
}

/// The value under `key` unless it is missing or `null`.
fn present<'v>(value: &'v Value, key: &str) -> Option<&'v Value> {
    value.get(key).filter(|v| !v.is_null())
}

fn number_chain(value: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|key| present(value, key))
        .map(to_finite_number)
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn first_string(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| string_field(value, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(raw: Value) -> NormalizedForecast {
        normalize(&raw, &EngineConfig::default())
    }

    #[test]
    fn test_new_contract_mapping() {
        let forecast = run(json!({
            "meta": { "basis": "cash_daily_sklearn", "income_algo": "ridge" },
            "horizon_days": 3,
            "kpis": { "income_pred_total": 190, "expense_pred_total": 190, "net_pred_total": 0 },
            "series": [
                { "date": "2026-01-01", "income_pred": 100, "expense_pred": 40,
                  "income_low": 80, "income_high": 120, "expense_by_category": { "Mercado": 40 } },
                { "date": "2026-01-02", "income_pred": 90, "expense_pred": 150, "net_pred": -59 },
                { "income_pred": 5, "expense_pred": 1 },
                { "date": "02/01/2026", "income_pred": 5, "expense_pred": 1 }
            ],
            "top_categories": [
                { "category": "Lazer", "amount": 10, "share": 0.1 },
                { "category": "Mercado", "amount": 40, "share": 0.4 }
            ],
            "alerts": [{ "level": "WARN", "message": "Saldo negativo" }],
            "risk_score": 4
        }));

        assert_eq!(forecast.contract_kind, ContractKind::New);
        assert_eq!(forecast.basis, "cash_daily_sklearn");
        assert_eq!(forecast.horizon_days, 3);
        assert_eq!(forecast.series.len(), 2);
        assert_eq!(forecast.series[0].net, 60.0);
        assert!(!forecast.series[0].net_reported);
        assert_eq!(forecast.series[0].income_low, 80.0);
        assert_eq!(forecast.series[0].expense_high, 0.0);
        assert_eq!(
            forecast.series[0].expense_by_category.as_ref().unwrap()["Mercado"],
            40.0
        );
        // Producer net wins over income - expense.
        assert_eq!(forecast.series[1].net, -59.0);
        assert!(forecast.series[1].net_reported);
        assert_eq!(forecast.top_categories[0].category, "Mercado");
        assert_eq!(forecast.alerts[0].level, "warn");
        assert_eq!(forecast.risk_score, 4.0);
        assert_eq!(forecast.meta["income_algo"], "ridge");
    }

    #[test]
    fn test_new_contract_kpi_net_falls_back_to_difference() {
        let forecast = run(json!({
            "kpis": { "income_pred_total": 300, "expense_pred_total": 120 },
            "series": [{ "date": "2026-01-01", "income_pred": 300, "expense_pred": 120 }]
        }));
        assert_eq!(forecast.kpis.net, 180.0);
        assert_eq!(forecast.horizon_days, 1);
    }

    #[test]
    fn test_series_without_kpis_is_not_new_contract() {
        let forecast = run(json!({
            "series": [{ "date": "2026-01-01", "income_pred": 1 }],
            "kpis": null
        }));
        assert_eq!(forecast.contract_kind, ContractKind::Legacy);
        assert!(forecast.series.is_empty());
    }

    #[test]
    fn test_backend_v2_fallback_chains() {
        let forecast = run(json!({
            "predictions": [
                { "date": "2026-02-01", "income": 50, "expense_total": 20 },
                { "income_pred": 10, "expense": 30, "net": -25 },
                { "ym": "2026-03", "income_pred": 1, "expense_pred": 1, "balance_pred": 7 },
                "garbage"
            ],
            "metrics": {
                "kpis": { "income_total": 61, "expense_pred_total": 51, "expense_total": 999 },
                "top_categories": [{ "category": "Casa", "amount": "12.5" }, { "amount": 3 }],
                "alerts": ["Incerteza elevada"],
                "risk_score": 42,
                "horizon_days": 14
            }
        }));

        assert_eq!(forecast.contract_kind, ContractKind::BackendV2);
        assert_eq!(forecast.series.len(), 3);
        assert_eq!(forecast.series[0].net, 30.0);
        assert_eq!(forecast.series[1].date_key, None);
        assert_eq!(forecast.series[1].net, -25.0);
        assert_eq!(forecast.series[2].date_key.as_deref(), Some("2026-03"));
        assert_eq!(forecast.series[2].label, "03/2026");
        assert_eq!(forecast.series[2].net, 7.0);

        assert_eq!(forecast.kpis.income, 61.0);
        assert_eq!(forecast.kpis.expense, 51.0);
        assert_eq!(forecast.kpis.net, 10.0);
        assert_eq!(forecast.top_categories.len(), 1);
        assert_eq!(forecast.top_categories[0].amount, 12.5);
        assert_eq!(forecast.alerts[0].level, "info");
        assert_eq!(forecast.risk_score, 10.0);
        assert_eq!(forecast.horizon_days, 14);
    }

    #[test]
    fn test_legacy_sums_totals() {
        let forecast = run(json!({
            "predictions": [
                { "date": "2026-02-01", "income_pred": 100, "expense_pred": 30 },
                { "date": "2026-02-02", "income_pred": 0, "expense_pred": 50, "net_pred": -45 }
            ],
            "top_categories": [{ "category": "Ignored", "amount": 1 }],
            "risk_score": 9
        }));

        assert_eq!(forecast.contract_kind, ContractKind::Legacy);
        assert_eq!(forecast.kpis.income, 100.0);
        assert_eq!(forecast.kpis.expense, 80.0);
        assert_eq!(forecast.kpis.net, 25.0);
        assert!(forecast.top_categories.is_empty());
        assert_eq!(forecast.risk_score, 0.0);
        assert_eq!(forecast.horizon_days, 2);
    }

    #[test]
    fn test_bare_list_is_legacy() {
        let forecast = run(json!([
            { "date": "2026-02-01", "income_pred": 3, "expense_pred": 1 }
        ]));
        assert_eq!(forecast.contract_kind, ContractKind::Legacy);
        assert_eq!(forecast.kpis.net, 2.0);
    }

    #[test]
    fn test_unrecognized_payload_is_empty_with_error() {
        let forecast = run(json!({ "detail": "Modelo ainda não treinado." }));
        assert!(forecast.is_empty());
        assert_eq!(forecast.kpis, Kpis::default());
        assert_eq!(forecast.horizon_days, 7);
        assert_eq!(forecast.error.as_deref(), Some("Modelo ainda não treinado."));

        for raw in [json!(null), json!(42), json!("text"), json!({})] {
            let forecast = run(raw);
            assert!(forecast.is_empty());
            assert_eq!(forecast.risk_score, 0.0);
        }
    }

    #[test]
    fn test_normalize_str_tolerates_invalid_json() {
        let forecast = normalize_str("<html>502</html>", &EngineConfig::default());
        assert!(forecast.is_empty());

        let forecast = normalize_str(
            r#"{"predictions":[{"income":1,"expense":2}]}"#,
            &EngineConfig::default(),
        );
        assert_eq!(forecast.series[0].net, -1.0);
    }

    #[test]
    fn test_non_positive_horizon_ignored() {
        let forecast = run(json!({
            "horizon_days": 0,
            "horizon": -3,
            "predictions": [{ "income": 1 }, { "income": 2 }]
        }));
        assert_eq!(forecast.horizon_days, 2);
    }

    #[test]
    fn test_top_categories_truncated() {
        let categories: Vec<Value> = (0..15)
            .map(|i| json!({ "category": format!("c{}", i), "amount": i }))
            .collect();
        let forecast = run(json!({
            "predictions": [{ "income": 1 }],
            "metrics": { "top_categories": categories }
        }));
        assert_eq!(forecast.top_categories.len(), 10);
        assert_eq!(forecast.top_categories[0].category, "c14");
    }
}
