//! Ordinal risk from the reconciled timeline.
//!
//! Two signals are counted over the predicted points:
//!
//! - **negative days**: `net < 0`
//! - **anomaly days**: magnitude above a data-dependent threshold. In daily
//!   mode the magnitude is `|net|` against `median(|history net|) * 1.8`; in
//!   periodic mode it is `expense` against `median(history expense) * 1.6`.
//!   Without enough history (or with a zero median) the threshold is the
//!   in-series 80th percentile instead.
//!
//! All multipliers and cutoffs come from [`RiskPolicy`].

use crate::config::{EngineConfig, RiskPolicy};
use crate::schema::{
    ForecastPoint, HistoryPoint, NormalizedForecast, RiskAssessment, RiskLevel, ScoringMode,
    ThresholdSource, Timeline,
};
use crate::utils::{median, percentile};
use log::debug;

pub struct RiskScorer<'a> {
    policy: &'a RiskPolicy,
}

impl<'a> RiskScorer<'a> {
    pub fn new(policy: &'a RiskPolicy) -> Self {
        Self { policy }
    }

    pub fn score(&self, forecast: &NormalizedForecast, timeline: &Timeline) -> RiskAssessment {
        let mode = scoring_mode(&forecast.basis, &timeline.predicted);
        let predicted = &timeline.predicted;

        let negative_net_days = count(predicted.iter().filter(|p| p.net < 0.0));

        let (magnitudes, baseline, multiplier) = match mode {
            ScoringMode::Daily => (
                predicted.iter().map(|p| p.net.abs()).collect::<Vec<_>>(),
                timeline
                    .history
                    .iter()
                    .map(|h| h.net().abs())
                    .collect::<Vec<_>>(),
                self.policy.daily_swing_multiplier,
            ),
            ScoringMode::Periodic => (
                predicted.iter().map(|p| p.expense).collect(),
                timeline.history.iter().map(|h: &HistoryPoint| h.expense).collect(),
                self.policy.periodic_expense_multiplier,
            ),
        };

        let (threshold_source, threshold) =
            self.anomaly_threshold(&magnitudes, &baseline, multiplier);
        let anomaly_days = match threshold_source {
            ThresholdSource::None => 0,
            _ => count(magnitudes.iter().filter(|m| **m > threshold)),
        };
        debug!(
            "Risk signals ({:?}): {} negative, {} anomalous over threshold {:.2} from {:?}",
            mode, negative_net_days, anomaly_days, threshold, threshold_source
        );

        let total_signal_count = negative_net_days + anomaly_days;
        RiskAssessment {
            level: self.level(mode, negative_net_days, anomaly_days, total_signal_count),
            total_signal_count,
            negative_net_days,
            anomaly_days,
            mode,
            threshold_source,
            anomaly_threshold: threshold,
        }
    }

    fn anomaly_threshold(
        &self,
        magnitudes: &[f64],
        baseline: &[f64],
        multiplier: f64,
    ) -> (ThresholdSource, f64) {
        if baseline.len() >= self.policy.min_history_points {
            let base = median(baseline);
            if base > 0.0 {
                return (ThresholdSource::History, base * multiplier);
            }
        }

        if magnitudes.is_empty() {
            return (ThresholdSource::None, 0.0);
        }
        (
            ThresholdSource::InSeries,
            percentile(magnitudes, self.policy.fallback_percentile),
        )
    }

    fn level(&self, mode: ScoringMode, negative: u32, anomalies: u32, total: u32) -> RiskLevel {
        let p = self.policy;
        let high = match mode {
            ScoringMode::Daily => {
                negative >= p.daily_high_negative_days || anomalies >= p.daily_high_anomaly_days
            }
            ScoringMode::Periodic => {
                negative >= p.periodic_high_negative_days || total >= p.periodic_high_total_signals
            }
        };

        if high {
            RiskLevel::High
        } else if negative >= p.medium_negative_days || anomalies >= p.medium_anomaly_days {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

pub fn score(
    forecast: &NormalizedForecast,
    timeline: &Timeline,
    config: &EngineConfig,
) -> RiskAssessment {
    RiskScorer::new(&config.risk).score(forecast, timeline)
}

/// Daily when the basis says so or the producer reported a per-point net.
pub fn scoring_mode(basis: &str, predicted: &[ForecastPoint]) -> ScoringMode {
    if basis.to_lowercase().contains("daily") || predicted.iter().any(|p| p.net_reported) {
        ScoringMode::Daily
    } else {
        ScoringMode::Periodic
    }
}

fn count<I: Iterator>(iter: I) -> u32 {
    u32::try_from(iter.count()).unwrap_or(u32::MAX)
}
