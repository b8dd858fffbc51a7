use std::time::Duration;

use reqwest::Client;

use crate::error::ControlError;
use crate::metrics::StepMetric;

use super::wire::{PushStatusRequest, PushStatusResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP client for the coordinator endpoints.
pub struct CoordinatorClient {
    http: Client,
    base_url: String,
}

impl CoordinatorClient {
    /// Builds a client for the coordinator at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, ControlError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .pool_max_idle_per_host(0)
            .pool_idle_timeout(Some(Duration::from_secs(0)))
            .build()
            .map_err(|err| ControlError::BuildClient { source: err })?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// Pushes the worker's status and returns the coordinator's directive
    /// payload, when one is present.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or an undecodable response;
    /// callers treat both as transient and retry on the next cycle.
    pub async fn push_status(
        &self,
        request: &PushStatusRequest,
    ) -> Result<PushStatusResponse, ControlError> {
        let url = format!("{}/worker/push_status", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|err| ControlError::Request {
                url: url.clone(),
                source: err,
            })?;
        response
            .json::<PushStatusResponse>()
            .await
            .map_err(|err| ControlError::Decode { url, source: err })
    }

    /// Ships one metric batch; the response body is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure.
    pub async fn send_step_metrics(&self, batch: &[StepMetric]) -> Result<(), ControlError> {
        let url = format!("{}/worker/send_step_metrics", self.base_url);
        self.http
            .post(&url)
            .json(&batch)
            .send()
            .await
            .map_err(|err| ControlError::Request { url, source: err })?;
        Ok(())
    }
}
