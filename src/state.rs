use crate::ForecastRun;
use std::sync::Arc;

/// Holder for the most recent forecast run.
///
/// A single writer replaces the whole run; readers get a shared handle and
/// keep seeing the run they took even after a newer one lands. Runs are
/// never merged.
#[derive(Debug, Default, Clone)]
pub struct ForecastState {
    last: Option<Arc<ForecastRun>>,
}

impl ForecastState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `run` as the latest result and returns the one it replaced.
    pub fn replace(&mut self, run: ForecastRun) -> Option<Arc<ForecastRun>> {
        self.last.replace(Arc::new(run))
    }

    pub fn last(&self) -> Option<Arc<ForecastRun>> {
        self.last.clone()
    }

    pub fn has_result(&self) -> bool {
        self.last.is_some()
    }

    pub fn clear(&mut self) -> Option<Arc<ForecastRun>> {
        self.last.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ForecastEngine;
    use chrono::NaiveDate;
    use serde_json::json;

    fn run_with_income(income: f64) -> ForecastRun {
        let today = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap();
        ForecastEngine::default().run(
            &json!({ "predictions": [{ "income": income }] }),
            &[],
            today,
        )
    }

    #[test]
    fn test_replace_is_wholesale() {
        let mut state = ForecastState::new();
        assert!(!state.has_result());

        assert!(state.replace(run_with_income(10.0)).is_none());
        let first = state.last().unwrap();

        let previous = state.replace(run_with_income(20.0)).unwrap();
        assert!(Arc::ptr_eq(&first, &previous));

        // Earlier readers keep their snapshot.
        assert_eq!(first.forecast.kpis.income, 10.0);
        assert_eq!(state.last().unwrap().forecast.kpis.income, 20.0);

        assert!(state.clear().is_some());
        assert!(state.last().is_none());
    }
}
