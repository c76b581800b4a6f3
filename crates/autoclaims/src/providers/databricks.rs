use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

use super::base::{Provider, Usage};
use super::configs::DatabricksProviderConfig;
use super::utils::{
    build_chat_payload, check_openai_context_length_error, get_usage, openai_response_to_message,
};
use crate::models::message::Message;
use crate::models::tool::Tool;

/// Chat completions through a Databricks model serving endpoint
pub struct DatabricksProvider {
    client: Client,
    config: DatabricksProviderConfig,
}

impl DatabricksProvider {
    pub fn new(config: DatabricksProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self { client, config })
    }

    async fn post(&self, endpoint: &str, payload: Value) -> Result<Value> {
        let url = format!(
            "{}/serving-endpoints/{}/invocations",
            self.config.host.trim_end_matches('/'),
            endpoint
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.token))
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() => {
                Err(anyhow!("Server error: {}", status))
            }
            status => {
                let err_text = response.text().await.unwrap_or_default();
                Err(anyhow!("Request failed: {}: {}", status, err_text))
            }
        }
    }
}

#[async_trait]
impl Provider for DatabricksProvider {
    async fn complete(
        &self,
        model: &str,
        system: &str,
        messages: &[Message],
        tools: &[Tool],
    ) -> Result<(Message, Usage)> {
        // The serving endpoint is addressed by URL, so the model stays out of the body
        let payload = build_chat_payload(
            None,
            system,
            messages,
            tools,
            self.config.temperature,
            self.config.max_tokens,
        )?;

        let response = self.post(model, payload).await?;

        if let Some(error) = response.get("error") {
            if let Some(err) = check_openai_context_length_error(error) {
                return Err(err.into());
            }
            return Err(anyhow!("Databricks API error: {}", error));
        }

        let message = openai_response_to_message(&response)?;
        let usage = get_usage(&response);
        tracing::debug!(endpoint = model, ?usage, "databricks completion");

        Ok((message, usage))
    }
}
