use crate::error::{AssistantError, Result};
use crate::intent::types::Intent;
use crate::turn::state::TurnContext;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Runs the task selected by the router and returns the answer text.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(
        &self,
        intent: Intent,
        params: &BTreeMap<String, String>,
        context: &TurnContext,
    ) -> Result<String>;
}

/// One recorded `execute` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedTask {
    pub intent: Intent,
    pub params: BTreeMap<String, String>,
    pub question: String,
}

/// Mock executor for testing
#[derive(Debug, Clone)]
pub struct MockTaskExecutor {
    response: String,
    should_fail: bool,
    delay: Duration,
    calls: Arc<Mutex<Vec<ExecutedTask>>>,
}

impl MockTaskExecutor {
    pub fn new() -> Self {
        Self {
            response: "mock answer".to_string(),
            should_fail: false,
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Simulated agent latency.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Calls so far, shared between clones.
    pub fn calls(&self) -> Vec<ExecutedTask> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Default for MockTaskExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskExecutor for MockTaskExecutor {
    async fn execute(
        &self,
        intent: Intent,
        params: &BTreeMap<String, String>,
        context: &TurnContext,
    ) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(ExecutedTask {
                intent,
                params: params.clone(),
                question: context.user_question.clone(),
            });
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.should_fail {
            return Err(AssistantError::TaskExecution {
                message: "mock task failure".to_string(),
            });
        }
        Ok(self.response.clone())
    }
}
