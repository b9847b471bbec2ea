//! Resilient completion query client.
//!
//! One `QueryClient` is bound to each agent. Every call builds a fresh
//! request from the instruction head, the windowed dialogue history and the
//! current user message, then drives it through two retry layers:
//!
//! 1. **Outer** ([`RetryPolicy`]): transient failures (network, timeout,
//!    rate limit) restart the whole attempt after an exponential delay.
//! 2. **Inner** ([`ServiceRetryPolicy`]): server-side failures are retried
//!    inside the attempt with a linear delay. Running out is terminal.
//!
//! Fatal failures surface as configuration errors without retrying.
//! Replies the client cannot interpret degrade to an empty payload, which the
//! agent's decision policy handles.

use std::sync::Arc;
use gridparley_core::error::{Error, ErrorClass, ProviderError, Result};
use gridparley_core::message::Message;
use gridparley_core::model::ModelSpec;
use gridparley_core::provider::{Provider, ProviderRequest};
use tracing::{debug, warn};

use crate::history::DialogueHistory;
use crate::retry::{RetryPolicy, ServiceRetryPolicy};
use crate::token::estimate_messages_tokens;

/// Appended to the user message of a context-free query.
pub const REPLAN_SUFFIX: &str =
    " Based on the failure explanation and scene description, analyze and plan again.";

/// How one attempt ended when it did not produce a payload.
enum AttemptError {
    /// Retry the whole attempt under the outer policy.
    Transient(ProviderError),
    /// Stop querying.
    Terminal(Error),
}

pub struct QueryClient {
    provider: Arc<dyn Provider>,
    model: ModelSpec,
    retry: RetryPolicy,
    service_retry: ServiceRetryPolicy,
    max_tokens: Option<u32>,
    stop: Vec<String>,
}

impl QueryClient {
    pub fn new(provider: Arc<dyn Provider>, model: ModelSpec) -> Self {
        Self {
            provider,
            model,
            retry: RetryPolicy::default(),
            service_retry: ServiceRetryPolicy::default(),
            max_tokens: Some(256),
            stop: Vec::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_service_retry(mut self, service_retry: ServiceRetryPolicy) -> Self {
        self.service_retry = service_retry;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    pub fn model(&self) -> &ModelSpec {
        &self.model
    }

    /// Assemble the ordered request messages.
    ///
    /// With `use_trace == false` no history is sent and the user message
    /// carries [`REPLAN_SUFFIX`].
    pub fn compose(
        head: &[Message],
        history: &DialogueHistory,
        user_message: &str,
        use_trace: bool,
    ) -> Vec<Message> {
        let k = if use_trace { history.policy().k() } else { 0 };
        let window = history.windowed_view(k);

        let mut messages = Vec::with_capacity(head.len() + window.len() + 1);
        messages.extend_from_slice(head);
        messages.extend_from_slice(window);
        if use_trace {
            messages.push(Message::user(user_message));
        } else {
            messages.push(Message::user(format!("{user_message}{REPLAN_SUFFIX}")));
        }
        messages
    }

    /// Query the completion service and return its text payload.
    pub async fn query(
        &self,
        head: &[Message],
        history: &DialogueHistory,
        user_message: &str,
        temperature: f32,
        use_trace: bool,
    ) -> Result<String> {
        let messages = Self::compose(head, history, user_message, use_trace);
        let request_tokens = estimate_messages_tokens(&messages);
        if request_tokens >= self.model.context_limit {
            debug!(
                model = %self.model.id,
                request_tokens,
                limit = self.model.context_limit,
                use_trace,
                "Request exceeds the context limit"
            );
        }
        let request = ProviderRequest {
            model: self.model.id.clone(),
            messages,
            temperature,
            max_tokens: self.max_tokens,
            stop: self.stop.clone(),
        };

        let mut retries = 0u32;
        loop {
            match self.attempt(&request).await {
                Ok(payload) => return Ok(payload),
                Err(AttemptError::Terminal(e)) => return Err(e),
                Err(AttemptError::Transient(e)) => {
                    retries += 1;
                    if retries > self.retry.max_retries {
                        warn!(
                            provider = self.provider.name(),
                            attempts = retries,
                            "Maximum number of retries exceeded: {e}"
                        );
                        return Err(Error::QueryExhausted {
                            attempts: retries,
                            last_error: e.to_string(),
                        });
                    }
                    let delay = self.retry.delay(retries);
                    warn!(
                        provider = self.provider.name(),
                        attempt = retries,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Transient query failure, backing off: {e}"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One outer attempt, including its inner service-error retries.
    async fn attempt(&self, request: &ProviderRequest) -> std::result::Result<String, AttemptError> {
        let mut service_retries = 0u32;
        loop {
            let err = match self.provider.complete(request.clone()).await {
                Ok(response) => {
                    if let Some(usage) = &response.usage {
                        debug!(
                            model = %response.model,
                            prompt_tokens = usage.prompt_tokens,
                            completion_tokens = usage.completion_tokens,
                            "Query completed"
                        );
                    }
                    return Ok(response.message.content);
                }
                Err(e) => e,
            };

            match err.class() {
                ErrorClass::Transient => return Err(AttemptError::Transient(err)),
                ErrorClass::Fatal => {
                    return Err(AttemptError::Terminal(Error::config(format!(
                        "{} rejected the request for model {}: {err}",
                        self.provider.name(),
                        self.model.id
                    ))));
                }
                ErrorClass::Unstructured => {
                    warn!(provider = self.provider.name(), "Unreadable reply, using empty payload: {err}");
                    return Ok(String::new());
                }
                ErrorClass::Service => {
                    service_retries += 1;
                    if service_retries > self.service_retry.max_retries {
                        return Err(AttemptError::Terminal(Error::QueryExhausted {
                            attempts: service_retries,
                            last_error: err.to_string(),
                        }));
                    }
                    let delay = self.service_retry.delay(service_retries);
                    warn!(
                        provider = self.provider.name(),
                        attempt = service_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Service error, retrying: {err}"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{SequentialMockProvider, text_response};
    use std::time::Duration;

    fn client(provider: Arc<SequentialMockProvider>, max_retries: u32) -> QueryClient {
        let model = ModelSpec::resolve("gpt-4o-mini").unwrap();
        QueryClient::new(provider, model).with_retry(RetryPolicy {
            initial_delay: Duration::from_secs(1),
            exponential_base: 2.0,
            jitter: false,
            max_retries,
        })
    }

    fn network() -> ProviderError {
        ProviderError::Network("connection reset".into())
    }

    fn history() -> DialogueHistory {
        let mut history = DialogueHistory::recent_k(4);
        for i in 0..8 {
            history.append_turn(Message::user(format!("turn {i}")));
        }
        history
    }

    #[test]
    fn compose_with_trace_uses_window() {
        let head = [Message::system("You are carpenter_0.")];
        let messages = QueryClient::compose(&head, &history(), "Step 2.", true);
        assert_eq!(messages.len(), 1 + 4 + 1);
        assert_eq!(messages[1].content, "turn 4");
        assert_eq!(messages[5].content, "Step 2.");
    }

    #[test]
    fn compose_without_trace_is_context_free() {
        let head = [Message::system("You are carpenter_0.")];
        let messages = QueryClient::compose(&head, &history(), "Step 2.", false);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, format!("Step 2.{REPLAN_SUFFIX}"));
    }

    #[tokio::test]
    async fn over_limit_request_is_still_sent() {
        let provider = Arc::new(SequentialMockProvider::new(vec![Ok(text_response("ok"))]));
        let model = ModelSpec {
            context_limit: 16,
            ..ModelSpec::resolve("gpt-4o-mini").unwrap()
        };
        let client = QueryClient::new(provider.clone(), model);
        let head = [Message::system("You are carpenter_0. ".repeat(8))];

        let payload = client.query(&head, &history(), "Step 2.", 0.0, false).await.unwrap();

        assert_eq!(payload, "ok");
        let sent = &provider.requests()[0].messages;
        assert_eq!(sent.len(), 2);
        assert!(estimate_messages_tokens(sent) >= 16);
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let provider = Arc::new(SequentialMockProvider::new(vec![Ok(text_response("hi"))]));
        let client = client(provider.clone(), 3);
        let payload = client.query(&[], &history(), "go", 0.0, true).await.unwrap();
        assert_eq!(payload, "hi");
        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.requests()[0].model, "gpt-4o-mini");
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_back_off_then_succeed() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            Err(network()),
            Err(network()),
            Ok(text_response("{\"action\": \"move_up\"}")),
        ]));
        let client = client(provider.clone(), 3);

        let start = tokio::time::Instant::now();
        let payload = client.query(&[], &history(), "go", 0.0, true).await.unwrap();

        assert_eq!(payload, "{\"action\": \"move_up\"}");
        assert_eq!(provider.call_count(), 3);
        // Exactly two delays: 1 * 2^1 + 1 * 2^2.
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_transient_failure_exhausts_retries() {
        let provider = Arc::new(SequentialMockProvider::new(
            (0..10).map(|_| Err(network())).collect(),
        ));
        let client = client(provider.clone(), 3);

        let err = client.query(&[], &history(), "go", 0.0, true).await.unwrap_err();

        assert!(matches!(err, Error::QueryExhausted { attempts: 4, .. }));
        assert_eq!(provider.call_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn service_errors_use_linear_backoff() {
        let server_error = || ProviderError::ApiError {
            status_code: 503,
            message: "overloaded".into(),
        };
        let provider = Arc::new(SequentialMockProvider::new(vec![
            Err(server_error()),
            Err(server_error()),
            Ok(text_response("ok")),
        ]));
        let client = client(provider.clone(), 3);

        let start = tokio::time::Instant::now();
        let payload = client.query(&[], &history(), "go", 0.0, true).await.unwrap();

        assert_eq!(payload, "ok");
        assert_eq!(start.elapsed(), Duration::from_secs(20 + 40));
    }

    #[tokio::test(start_paused = true)]
    async fn service_retries_are_bounded() {
        let provider = Arc::new(SequentialMockProvider::new(
            (0..10)
                .map(|_| {
                    Err(ProviderError::ApiError {
                        status_code: 500,
                        message: "internal".into(),
                    })
                })
                .collect(),
        ));
        let client = client(provider.clone(), 3);

        let err = client.query(&[], &history(), "go", 0.0, true).await.unwrap_err();

        assert!(matches!(err, Error::QueryExhausted { attempts: 4, .. }));
        // Initial call plus three service retries; the outer layer does not retry.
        assert_eq!(provider.call_count(), 4);
    }

    #[tokio::test]
    async fn fatal_error_is_configuration_error() {
        let provider = Arc::new(SequentialMockProvider::new(vec![Err(
            ProviderError::AuthenticationFailed("bad key".into()),
        )]));
        let client = client(provider.clone(), 3);

        let err = client.query(&[], &history(), "go", 0.0, true).await.unwrap_err();

        assert!(matches!(err, Error::Config { .. }));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn malformed_reply_degrades_to_empty_payload() {
        let provider = Arc::new(SequentialMockProvider::new(vec![Err(
            ProviderError::MalformedResponse("no choices".into()),
        )]));
        let client = client(provider, 3);
        let payload = client.query(&[], &history(), "go", 0.0, true).await.unwrap();
        assert!(payload.is_empty());
    }
}
