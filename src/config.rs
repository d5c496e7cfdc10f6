use crate::error::{ForecastError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CARD_PAYMENT_CATEGORY: &str = "Cartão de Crédito (Pagamento)";
pub const DEFAULT_UNCATEGORIZED_LABEL: &str = "Outros";

/// When producer dates are believed, and when they are replaced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct DateTrustPolicy {
    #[schemars(
        description = "Minimum share of predicted entries that must carry a valid key before that key kind is trusted (0.6 = 60%)"
    )]
    pub min_valid_share: f64,

    #[schemars(
        description = "Share of trusted ISO dates that must be implausible to revoke trust (0.5 = at least half)"
    )]
    pub revoke_share: f64,

    #[schemars(description = "Lower bound of the forward plausibility window, in days")]
    pub min_future_window_days: i64,

    #[schemars(description = "Days added to the horizon to form the forward plausibility window")]
    pub future_slack_days: i64,

    #[schemars(description = "How many days in the past a predicted date may lie")]
    pub max_past_days: i64,
}

impl Default for DateTrustPolicy {
    fn default() -> Self {
        Self {
            min_valid_share: 0.6,
            revoke_share: 0.5,
            min_future_window_days: 45,
            future_slack_days: 14,
            max_past_days: 7,
        }
    }
}

impl DateTrustPolicy {
    /// Furthest acceptable offset into the future for a horizon.
    pub fn future_window_days(&self, horizon_days: u32) -> i64 {
        self.min_future_window_days
            .max(i64::from(horizon_days) + self.future_slack_days)
    }
}

/// Heuristic cutoffs for the risk scorer. These were tuned empirically and are
/// expected to be recalibrated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct RiskPolicy {
    #[schemars(description = "History points required before the history median is used")]
    pub min_history_points: usize,

    #[schemars(description = "Multiple of the historical |net| median that marks a high-swing day")]
    pub daily_swing_multiplier: f64,

    #[schemars(description = "Multiple of the historical expense median that marks an expense spike")]
    pub periodic_expense_multiplier: f64,

    #[schemars(description = "In-series percentile used when history is insufficient")]
    pub fallback_percentile: f64,

    pub daily_high_negative_days: u32,
    pub daily_high_anomaly_days: u32,
    pub periodic_high_negative_days: u32,
    pub periodic_high_total_signals: u32,
    pub medium_negative_days: u32,
    pub medium_anomaly_days: u32,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            min_history_points: 6,
            daily_swing_multiplier: 1.8,
            periodic_expense_multiplier: 1.6,
            fallback_percentile: 0.8,
            daily_high_negative_days: 3,
            daily_high_anomaly_days: 3,
            periodic_high_negative_days: 2,
            periodic_high_total_signals: 4,
            medium_negative_days: 1,
            medium_anomaly_days: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    #[schemars(description = "Horizon used when the payload carries neither a horizon nor any points")]
    pub default_horizon_days: u32,

    #[schemars(description = "Number of most recent history days kept in the timeline")]
    pub history_window_days: usize,

    pub max_top_categories: usize,

    pub date_trust: DateTrustPolicy,

    pub risk: RiskPolicy,

    #[schemars(
        description = "Cash expense category used for card invoice payments; excluded from expense totals because the card purchases are already counted"
    )]
    pub card_payment_category: Option<String>,

    pub uncategorized_label: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_horizon_days: 7,
            history_window_days: 30,
            max_top_categories: 10,
            date_trust: DateTrustPolicy::default(),
            risk: RiskPolicy::default(),
            card_payment_category: Some(DEFAULT_CARD_PAYMENT_CATEGORY.to_string()),
            uncategorized_label: DEFAULT_UNCATEGORIZED_LABEL.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_horizon_days == 0 {
            return Err(invalid("default_horizon_days", "must be positive"));
        }
        if self.history_window_days == 0 {
            return Err(invalid("history_window_days", "must be positive"));
        }
        if self.max_top_categories == 0 {
            return Err(invalid("max_top_categories", "must be positive"));
        }

        validate_share("date_trust.min_valid_share", self.date_trust.min_valid_share)?;
        validate_share("date_trust.revoke_share", self.date_trust.revoke_share)?;
        if self.date_trust.min_future_window_days < 0
            || self.date_trust.future_slack_days < 0
            || self.date_trust.max_past_days < 0
        {
            return Err(invalid(
                "date_trust",
                "plausibility windows must not be negative",
            ));
        }

        let risk = &self.risk;
        if !(risk.daily_swing_multiplier.is_finite() && risk.daily_swing_multiplier >= 0.0) {
            return Err(invalid(
                "risk.daily_swing_multiplier",
                &format!("{} must be a non-negative number", risk.daily_swing_multiplier),
            ));
        }
        if !(risk.periodic_expense_multiplier.is_finite()
            && risk.periodic_expense_multiplier >= 0.0)
        {
            return Err(invalid(
                "risk.periodic_expense_multiplier",
                &format!(
                    "{} must be a non-negative number",
                    risk.periodic_expense_multiplier
                ),
            ));
        }
        if !(0.0..=1.0).contains(&risk.fallback_percentile) {
            return Err(invalid(
                "risk.fallback_percentile",
                &format!("{} must be between 0.0 and 1.0", risk.fallback_percentile),
            ));
        }

        if self.uncategorized_label.trim().is_empty() {
            return Err(invalid("uncategorized_label", "must not be blank"));
        }

        Ok(())
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&schemars::schema_for!(EngineConfig))
    }
}

fn validate_share(field: &str, value: f64) -> Result<()> {
    if !(value > 0.0 && value <= 1.0) {
        return Err(invalid(
            field,
            &format!("{} must be in (0.0, 1.0]", value),
        ));
    }
    Ok(())
}

fn invalid(field: &str, details: &str) -> ForecastError {
    ForecastError::InvalidConfig {
        field: field.to_string(),
        details: details.to_string(),
    }
}
