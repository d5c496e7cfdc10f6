use crate::config::{DateTrustPolicy, EngineConfig};
use crate::schema::{DateTrust, ForecastPoint, HistoryPoint, NormalizedForecast, Timeline};
use crate::utils::{format_date_key, format_label, is_iso_date, is_year_month, parse_iso_date};
use chrono::{Days, NaiveDate};
use log::{debug, warn};

pub struct TimelineReconciler<'a> {
    config: &'a EngineConfig,
}

impl<'a> TimelineReconciler<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Pairs the trailing history window with the predicted series, replacing
    /// producer dates with `today + 1, today + 2, ..` when they cannot be trusted.
    pub fn reconcile(
        &self,
        forecast: &NormalizedForecast,
        history: &[HistoryPoint],
        today: NaiveDate,
    ) -> Timeline {
        let history = self.trailing_history(history, today);
        let policy = &self.config.date_trust;
        let series = &forecast.series;

        let trust = match choose_key_kind(series, policy) {
            DateTrust::IsoDates
                if !iso_dates_plausible(series, forecast.horizon_days, today, policy) =>
            {
                warn!("Predicted dates fall outside the plausible horizon; using synthetic dates");
                DateTrust::Synthetic
            }
            other => other,
        };
        debug!("Predicted date trust resolved to {:?}", trust);

        let predicted = match trust {
            DateTrust::Empty => Vec::new(),
            DateTrust::IsoDates => keep_keyed(series, is_iso_date),
            DateTrust::YearMonth => keep_keyed(series, is_year_month),
            DateTrust::Synthetic => synthesize_dates(series, today),
        };

        if predicted.len() < series.len() {
            debug!(
                "Dropped {} predicted points without a usable date key",
                series.len() - predicted.len()
            );
        }

        Timeline {
            history,
            predicted,
            used_synthetic_dates: trust == DateTrust::Synthetic,
            date_trust: trust,
        }
    }

    /// History points dated inside `(today - window, today]`, oldest first.
    /// Keys that are not calendar days are dropped.
    fn trailing_history(&self, history: &[HistoryPoint], today: NaiveDate) -> Vec<HistoryPoint> {
        let window = Days::new(self.config.history_window_days as u64);
        let earliest = today.checked_sub_days(window);

        let mut kept: Vec<HistoryPoint> = history
            .iter()
            .filter(|h| {
                parse_iso_date(&h.date_key)
                    .is_ok_and(|d| d <= today && earliest.map_or(true, |e| d > e))
            })
            .cloned()
            .collect();
        if kept.len() < history.len() {
            debug!(
                "Dropped {} history points outside the {}-day window",
                history.len() - kept.len(),
                self.config.history_window_days
            );
        }

        kept.sort_by(|a, b| a.date_key.cmp(&b.date_key));
        kept
    }
}

pub fn reconcile(
    forecast: &NormalizedForecast,
    history: &[HistoryPoint],
    today: NaiveDate,
    config: &EngineConfig,
) -> Timeline {
    TimelineReconciler::new(config).reconcile(forecast, history, today)
}

fn share(count: usize, total: usize) -> f64 {
    count as f64 / total as f64
}

fn count_keys(series: &[ForecastPoint], is_valid: fn(&str) -> bool) -> usize {
    series
        .iter()
        .filter(|p| p.date_key.as_deref().is_some_and(is_valid))
        .count()
}

/// Step 1-2: which key kind covers enough of the series to be believed.
fn choose_key_kind(series: &[ForecastPoint], policy: &DateTrustPolicy) -> DateTrust {
    if series.is_empty() {
        return DateTrust::Empty;
    }
    let total = series.len();
    if share(count_keys(series, is_iso_date), total) >= policy.min_valid_share {
        DateTrust::IsoDates
    } else if share(count_keys(series, is_year_month), total) >= policy.min_valid_share {
        DateTrust::YearMonth
    } else {
        DateTrust::Synthetic
    }
}

/// Step 3: trust is revoked when at least `revoke_share` of the ISO-dated
/// points lie too far ahead or too far behind `today`. ISO-shaped keys that
/// are not calendar days count as implausible.
fn iso_dates_plausible(
    series: &[ForecastPoint],
    horizon_days: u32,
    today: NaiveDate,
    policy: &DateTrustPolicy,
) -> bool {
    let future_limit = policy.future_window_days(horizon_days);
    let past_limit = -policy.max_past_days;

    let mut checked = 0usize;
    let mut implausible = 0usize;
    for key in series.iter().filter_map(|p| p.date_key.as_deref()) {
        if !is_iso_date(key) {
            continue;
        }
        checked += 1;
        let plausible = parse_iso_date(key).is_ok_and(|date| {
            let offset = (date - today).num_days();
            offset <= future_limit && offset >= past_limit
        });
        if !plausible {
            implausible += 1;
        }
    }

    checked == 0 || share(implausible, checked) < policy.revoke_share
}

fn relabel(point: &ForecastPoint, date_key: Option<String>) -> ForecastPoint {
    ForecastPoint {
        label: format_label(date_key.as_deref()),
        date_key,
        ..point.clone()
    }
}

/// Points whose key passes `is_valid`, in chronological key order.
fn keep_keyed(series: &[ForecastPoint], is_valid: fn(&str) -> bool) -> Vec<ForecastPoint> {
    let mut kept: Vec<ForecastPoint> = series
        .iter()
        .filter(|p| p.date_key.as_deref().is_some_and(is_valid))
        .map(|p| relabel(p, p.date_key.clone()))
        .collect();
    kept.sort_by(|a, b| a.date_key.cmp(&b.date_key));
    kept
}

/// One key per entry, in array order, starting tomorrow.
fn synthesize_dates(series: &[ForecastPoint], today: NaiveDate) -> Vec<ForecastPoint> {
    series
        .iter()
        .enumerate()
        .filter_map(|(i, point)| {
            let date = today.checked_add_days(Days::new(i as u64 + 1))?;
            Some(relabel(point, Some(format_date_key(date))))
        })
        .collect()
}
