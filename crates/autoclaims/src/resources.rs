//! External resources the deployed agent depends on.
//!
//! The serving platform reads this list to pass the caller's credentials
//! through to each resource. Nothing here is executed at request time.

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, Settings};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Resource {
    VectorSearchIndex { name: String },
    ServingEndpoint { name: String },
    Function { name: String },
}

impl Resource {
    pub fn name(&self) -> &str {
        match self {
            Resource::VectorSearchIndex { name }
            | Resource::ServingEndpoint { name }
            | Resource::Function { name } => name,
        }
    }
}

/// One vector search index, one serving endpoint and the two governed
/// functions behind the agent tools
pub fn declared_resources(settings: &Settings) -> Result<Vec<Resource>, ConfigError> {
    Ok(vec![
        Resource::VectorSearchIndex {
            name: settings.resources.vector_search_index.clone(),
        },
        Resource::ServingEndpoint {
            name: settings.serving_endpoint().to_string(),
        },
        Resource::Function {
            name: settings.functions.claims_lookup_name()?.to_string(),
        },
        Resource::Function {
            name: settings.functions.policy_search_name()?.to_string(),
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        FunctionSettings, ProviderSettings, ResourceSettings, RunnerSettings, WorkspaceSettings,
    };
    use serde_json::json;

    fn settings() -> Settings {
        Settings {
            provider: ProviderSettings::Databricks {
                host: None,
                model: "databricks-meta-llama-3-3-70b-instruct".to_string(),
                temperature: None,
                max_tokens: None,
            },
            workspace: WorkspaceSettings {
                host: "https://adb-123.azuredatabricks.net".to_string(),
                warehouse_id: "abc123".to_string(),
            },
            functions: FunctionSettings {
                catalog: "main".to_string(),
                schema: "insurance_agent".to_string(),
                claims_lookup: "lookup_claims".to_string(),
                policy_search: "search_policy_docs".to_string(),
            },
            resources: ResourceSettings {
                vector_search_index: "main.insurance_agent.policy_docs_index".to_string(),
                serving_endpoint: "databricks-meta-llama-3-3-70b-instruct".to_string(),
            },
            runner: RunnerSettings {
                max_turns: 10,
                max_handoffs: 4,
                turn_timeout_secs: None,
            },
        }
    }

    #[test]
    fn test_declared_resources() {
        let resources = declared_resources(&settings()).unwrap();

        assert_eq!(resources.len(), 4);
        let functions: Vec<_> = resources
            .iter()
            .filter(|r| matches!(r, Resource::Function { .. }))
            .map(Resource::name)
            .collect();
        assert_eq!(
            functions,
            vec![
                "main.insurance_agent.lookup_claims",
                "main.insurance_agent.search_policy_docs"
            ]
        );
        assert_eq!(
            resources[0],
            Resource::VectorSearchIndex {
                name: "main.insurance_agent.policy_docs_index".to_string()
            }
        );
    }

    #[test]
    fn test_serving_endpoint_follows_databricks_model() {
        let mut settings = settings();
        settings.provider = ProviderSettings::Databricks {
            host: None,
            model: "databricks-claude-sonnet".to_string(),
            temperature: None,
            max_tokens: None,
        };

        let resources = declared_resources(&settings).unwrap();
        assert_eq!(
            resources[1],
            Resource::ServingEndpoint {
                name: "databricks-claude-sonnet".to_string()
            }
        );
    }

    #[test]
    fn test_openai_provider_declares_configured_endpoint() {
        let mut settings = settings();
        settings.provider = ProviderSettings::OpenAi {
            host: "https://api.openai.com".to_string(),
            model: "gpt-4o".to_string(),
            temperature: None,
            max_tokens: None,
        };

        let resources = declared_resources(&settings).unwrap();
        assert_eq!(
            resources[1].name(),
            "databricks-meta-llama-3-3-70b-instruct"
        );
    }

    #[test]
    fn test_resource_serialization() {
        let resource = Resource::ServingEndpoint {
            name: "databricks-meta-llama-3-3-70b-instruct".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&resource).unwrap(),
            json!({"type": "serving_endpoint", "name": "databricks-meta-llama-3-3-70b-instruct"})
        );
    }

    #[test]
    fn test_invalid_function_is_rejected() {
        let mut settings = settings();
        settings.functions.schema = "insurance agent".to_string();
        assert!(declared_resources(&settings).is_err());
    }
}
