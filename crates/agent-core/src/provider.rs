use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

use crate::errors::AgentError;

/// Abstraction over the AI side of recovery so agents can plug into the orchestrator.
///
/// Implementations exchange raw JSON: the request as built by the
/// orchestrator and the response exactly as the agent produced it. Shape
/// checks happen in the orchestrator, never here.
#[async_trait]
pub trait RecoveryAgent: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Send one recovery request and return the raw answer.
    async fn propose(&self, request: &Value) -> Result<Value, AgentError>;
}

/// Deterministic agent used for tests and offline development.
///
/// Answers from a scripted queue; an exhausted queue is a transport failure.
#[derive(Debug, Default)]
pub struct MockRecoveryAgent {
    answers: Mutex<VecDeque<Result<Value, String>>>,
    requests: Mutex<Vec<Value>>,
    delay: Option<Duration>,
}

impl MockRecoveryAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a raw response.
    pub fn with_response(self, response: Value) -> Self {
        self.answers.lock().push_back(Ok(response));
        self
    }

    /// Queue a transport failure.
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.answers.lock().push_back(Err(message.into()));
        self
    }

    /// Delay every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.answers.lock().len()
    }
}

#[async_trait]
impl RecoveryAgent for MockRecoveryAgent {
    fn name(&self) -> &str {
        "mock"
    }

    async fn propose(&self, request: &Value) -> Result<Value, AgentError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.requests.lock().push(request.clone());
        match self.answers.lock().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(AgentError::transport(message)),
            None => Err(AgentError::transport("mock agent has no scripted response")),
        }
    }
}

/// Agent reached over HTTP: the request is POSTed as JSON and the response
/// body is the raw answer.
#[derive(Debug, Clone)]
pub struct HttpRecoveryAgent {
    client: Client,
    endpoint: String,
}

impl HttpRecoveryAgent {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AgentError::transport(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RecoveryAgent for HttpRecoveryAgent {
    fn name(&self) -> &str {
        "http"
    }

    async fn propose(&self, request: &Value) -> Result<Value, AgentError> {
        debug!(endpoint = %self.endpoint, "Posting recovery request");
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|err| AgentError::transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| AgentError::transport(format!("unreadable response body: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn mock_replays_queue_then_fails() {
        let agent = MockRecoveryAgent::new()
            .with_response(json!({"kind": "terminal", "reason": "done"}))
            .with_failure("connection reset");

        let first = agent.propose(&json!({"n": 1})).await.unwrap();
        assert_eq!(first["kind"], "terminal");
        assert!(matches!(
            agent.propose(&json!({"n": 2})).await,
            Err(AgentError::Transport(message)) if message == "connection reset"
        ));
        assert!(agent.propose(&json!({"n": 3})).await.is_err());
        assert_eq!(agent.requests().len(), 3);
        assert_eq!(agent.remaining(), 0);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_transport_error() {
        let agent = HttpRecoveryAgent::new("http://127.0.0.1:9/recover", Duration::from_millis(500))
            .unwrap();
        let err = agent.propose(&json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::Transport(_)));
    }
}
