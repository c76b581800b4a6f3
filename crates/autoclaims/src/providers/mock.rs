use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;

use crate::models::message::Message;
use crate::models::tool::Tool;
use crate::providers::base::{Provider, Usage};

/// One recorded call to the mock provider
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub system: String,
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

/// A mock provider that returns pre-configured responses for testing
pub struct MockProvider {
    responses: Arc<Mutex<Vec<Message>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<Message>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn complete(
        &self,
        model: &str,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        self.calls.lock().unwrap().push(RecordedCall {
            model: model.to_string(),
            system: system.to_string(),
            messages: messages.to_vec(),
            tool_names: tools.iter().map(|t| t.name.clone()).collect(),
        });

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Err(anyhow!("mock provider has no more responses"))
        } else {
            Ok((responses.remove(0), Usage::new(Some(1), Some(1), Some(2))))
        }
    }
}
