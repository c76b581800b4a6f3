use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::functions::FunctionName;
use crate::providers::configs::{DatabricksProviderConfig, OpenAiProviderConfig, ProviderConfig};
use crate::providers::openai::OPENAI_HOST;
use crate::runner::RunnerConfig;

pub const ENV_PREFIX: &str = "AUTOCLAIMS";
const CONFIG_FILE: &str = "autoclaims";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration, set {env_var}")]
    MissingEnvVar { env_var: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Other(#[from] config::ConfigError),
}

/// The environment variable that sets a dotted configuration key,
/// e.g. `workspace.host` -> `AUTOCLAIMS_WORKSPACE__HOST`
pub fn to_env_var(key: &str) -> String {
    format!("{}_{}", ENV_PREFIX, key.to_uppercase().replace('.', "__"))
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        #[serde(default = "default_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
    /// Model serving on the workspace. `model` is the serving endpoint name and
    /// `host` defaults to the workspace host.
    Databricks {
        #[serde(default)]
        host: Option<String>,
        #[serde(default = "default_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
}

impl ProviderSettings {
    pub fn model(&self) -> &str {
        match self {
            ProviderSettings::OpenAi { model, .. } => model,
            ProviderSettings::Databricks { model, .. } => model,
        }
    }

    pub fn is_openai(&self) -> bool {
        matches!(self, ProviderSettings::OpenAi { .. })
    }

    /// Combine with the loaded credentials into a provider configuration
    pub fn into_config(
        self,
        workspace: &WorkspaceSettings,
        openai_api_key: Option<String>,
        databricks_token: String,
    ) -> Result<ProviderConfig, ConfigError> {
        match self {
            ProviderSettings::OpenAi {
                host,
                temperature,
                max_tokens,
                ..
            } => {
                let api_key = openai_api_key.ok_or_else(|| ConfigError::MissingEnvVar {
                    env_var: "OPENAI_API_KEY".to_string(),
                })?;
                Ok(ProviderConfig::OpenAi(OpenAiProviderConfig {
                    host,
                    api_key,
                    temperature,
                    max_tokens,
                }))
            }
            ProviderSettings::Databricks {
                host,
                temperature,
                max_tokens,
                ..
            } => Ok(ProviderConfig::Databricks(DatabricksProviderConfig {
                host: host.unwrap_or_else(|| workspace.host.clone()),
                token: databricks_token,
                temperature,
                max_tokens,
            })),
        }
    }
}

/// The data platform workspace hosting the governed functions
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkspaceSettings {
    pub host: String,
    pub warehouse_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FunctionSettings {
    #[serde(default = "default_catalog")]
    pub catalog: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_claims_lookup")]
    pub claims_lookup: String,
    #[serde(default = "default_policy_search")]
    pub policy_search: String,
}

impl FunctionSettings {
    pub fn claims_lookup_name(&self) -> Result<FunctionName, ConfigError> {
        self.function_name(&self.claims_lookup)
    }

    pub fn policy_search_name(&self) -> Result<FunctionName, ConfigError> {
        self.function_name(&self.policy_search)
    }

    fn function_name(&self, function: &str) -> Result<FunctionName, ConfigError> {
        FunctionName::new(&self.catalog, &self.schema, function)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ResourceSettings {
    #[serde(default = "default_vector_search_index")]
    pub vector_search_index: String,
    #[serde(default = "default_serving_endpoint")]
    pub serving_endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RunnerSettings {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    #[serde(default = "default_max_handoffs")]
    pub max_handoffs: usize,
    #[serde(default)]
    pub turn_timeout_secs: Option<u64>,
}

impl From<&RunnerSettings> for RunnerConfig {
    fn from(settings: &RunnerSettings) -> Self {
        RunnerConfig {
            max_turns: settings.max_turns,
            max_handoffs: settings.max_handoffs,
            turn_timeout: settings.turn_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub provider: ProviderSettings,
    pub workspace: WorkspaceSettings,
    pub functions: FunctionSettings,
    pub resources: ResourceSettings,
    pub runner: RunnerSettings,
}

impl Settings {
    /// Load from `./autoclaims.toml` (if present) and the environment
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_config(&load_config(None)?)
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            provider: section(config, "provider")?,
            workspace: section(config, "workspace")?,
            functions: section(config, "functions")?,
            resources: section(config, "resources")?,
            runner: section(config, "runner")?,
        })
    }

    /// The model serving endpoint the agent calls. With the Databricks provider
    /// this is the provider's model, otherwise `resources.serving_endpoint`.
    pub fn serving_endpoint(&self) -> &str {
        match &self.provider {
            ProviderSettings::Databricks { model, .. } => model,
            ProviderSettings::OpenAi { .. } => &self.resources.serving_endpoint,
        }
    }
}

/// Build the layered configuration: defaults, then the config file, then
/// `AUTOCLAIMS_*` environment variables. Binaries read their own sections from
/// the same layers.
pub fn load_config(file: Option<&Path>) -> Result<Config, ConfigError> {
    let file = match file {
        Some(path) => File::from(path).required(true),
        None => File::with_name(CONFIG_FILE).required(false),
    };

    let config = Config::builder()
        .set_default("provider.type", "openai")?
        .set_default("functions.catalog", default_catalog())?
        .set_default("resources.vector_search_index", default_vector_search_index())?
        .set_default("runner.max_turns", default_max_turns() as i64)?
        .add_source(file)
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    Ok(config)
}

/// Deserialize one section, naming the environment variable to set when a
/// required value is missing
pub fn section<T: DeserializeOwned>(config: &Config, key: &str) -> Result<T, ConfigError> {
    config.get::<T>(key).map_err(|err| {
        tracing::debug!("Configuration error in {}: {:?}", key, &err);

        let message = err.to_string();
        if let Some(rest) = message.strip_prefix("missing field `") {
            let field = rest.split('`').next().unwrap_or_default();
            ConfigError::MissingEnvVar {
                env_var: to_env_var(&format!("{}.{}", key, field)),
            }
        } else if let config::ConfigError::NotFound(missing) = &err {
            ConfigError::MissingEnvVar {
                env_var: to_env_var(missing),
            }
        } else {
            ConfigError::Other(err)
        }
    })
}

fn default_openai_host() -> String {
    OPENAI_HOST.to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_catalog() -> String {
    "main".to_string()
}

fn default_schema() -> String {
    "insurance_agent".to_string()
}

fn default_claims_lookup() -> String {
    "lookup_claims".to_string()
}

fn default_policy_search() -> String {
    "search_policy_docs".to_string()
}

fn default_vector_search_index() -> String {
    "main.insurance_agent.policy_docs_index".to_string()
}

fn default_serving_endpoint() -> String {
    "databricks-meta-llama-3-3-70b-instruct".to_string()
}

fn default_max_turns() -> usize {
    10
}

fn default_max_handoffs() -> usize {
    4
}
