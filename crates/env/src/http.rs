//! JSON-over-HTTP environment client.
//!
//! Protocol:
//! - `POST {base}/reset` → [`ResetOutcome`]
//! - `POST {base}/step` with `{"actions": {...}}` → [`StepOutcome`]
//! - `POST {base}/close`

use std::time::Duration;
use async_trait::async_trait;
use gridparley_core::environment::{ActionMap, Environment, ResetOutcome, StepOutcome};
use gridparley_core::error::EnvironmentError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// A simulator reached over HTTP.
pub struct HttpEnvironment {
    base_url: String,
    client: reqwest::Client,
    closed: bool,
}

#[derive(Serialize)]
struct StepRequest<'a> {
    actions: &'a ActionMap,
}

impl HttpEnvironment {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            closed: false,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, EnvironmentError> {
        if self.closed {
            return Err(EnvironmentError::Closed);
        }

        let url = self.endpoint(path);
        debug!(url = %url, "Calling simulator");

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| EnvironmentError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Simulator returned error");
            return Err(EnvironmentError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| EnvironmentError::Transport(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| EnvironmentError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Environment for HttpEnvironment {
    async fn reset(&mut self) -> Result<ResetOutcome, EnvironmentError> {
        self.post("reset", &serde_json::json!({})).await
    }

    async fn step(&mut self, actions: &ActionMap) -> Result<StepOutcome, EnvironmentError> {
        self.post("step", &StepRequest { actions }).await
    }

    async fn close(&mut self) -> Result<(), EnvironmentError> {
        if self.closed {
            return Ok(());
        }
        let _: serde_json::Value = self.post("close", &serde_json::json!({})).await?;
        self.closed = true;
        Ok(())
    }
}
