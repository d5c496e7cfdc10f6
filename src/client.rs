use crate::error::{ForecastError, Result};
use log::{debug, warn};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(20);
/// Training-backed runs refit the model before predicting.
const DEFAULT_TRAINING_TIMEOUT: Duration = Duration::from_secs(120);

/// Query for one forecast run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastRequest {
    pub horizon_days: u32,
    pub account_id: Option<i64>,
    /// Whether the endpoint retrains before predicting (uses the long timeout).
    pub training: bool,
}

impl ForecastRequest {
    pub fn new(horizon_days: u32) -> Self {
        Self {
            horizon_days,
            account_id: None,
            training: false,
        }
    }

    #[must_use]
    pub fn with_account(mut self, account_id: i64) -> Self {
        self.account_id = Some(account_id);
        self
    }

    #[must_use]
    pub fn with_training(mut self) -> Self {
        self.training = true;
        self
    }

    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("days", self.horizon_days.to_string())];
        if let Some(account_id) = self.account_id {
            pairs.push(("account_id", account_id.to_string()));
        }
        pairs
    }
}

#[derive(Clone)]
pub struct ForecastClient {
    client: Client,
    endpoint: String,
    read_timeout: Duration,
    training_timeout: Duration,
}

impl ForecastClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            training_timeout: DEFAULT_TRAINING_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeouts(mut self, read_timeout: Duration, training_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self.training_timeout = training_timeout;
        self
    }

    pub fn timeout_for(&self, request: &ForecastRequest) -> Duration {
        if request.training {
            self.training_timeout
        } else {
            self.read_timeout
        }
    }

    /// Fetches the raw response body as JSON. Dropping the returned future
    /// aborts the request.
    pub async fn fetch(&self, request: &ForecastRequest) -> Result<Value> {
        let timeout = self.timeout_for(request);
        debug!(
            "Requesting forecast from {} ({:?}, timeout {}s)",
            self.endpoint,
            request,
            timeout.as_secs()
        );

        let response = self
            .client
            .get(&self.endpoint)
            .query(&request.query_pairs())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Forecast service returned {}", status);
            let body = response
                .text()
                .await
                .map_err(|e| map_transport_error(e, timeout))?;
            return Err(ForecastError::RemoteStatus {
                status: status.as_u16(),
                body,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| map_transport_error(e, timeout))?;
        Ok(serde_json::from_str(&text)?)
    }
}

fn map_transport_error(error: reqwest::Error, timeout: Duration) -> ForecastError {
    if error.is_timeout() {
        ForecastError::Timeout(timeout.as_secs())
    } else {
        ForecastError::Http(error)
    }
}
