use std::fmt;

/// Unified enum to wrap the supported provider configurations
#[derive(Debug, Clone)]
pub enum ProviderConfig {
    OpenAi(OpenAiProviderConfig),
    Databricks(DatabricksProviderConfig),
}

#[derive(Clone)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

impl fmt::Debug for OpenAiProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProviderConfig")
            .field("host", &self.host)
            .field("api_key", &"***")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Databricks model serving. Agents name the serving endpoint as their model.
#[derive(Clone)]
pub struct DatabricksProviderConfig {
    pub host: String,
    pub token: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

impl fmt::Debug for DatabricksProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabricksProviderConfig")
            .field("host", &self.host)
            .field("token", &"***")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}
