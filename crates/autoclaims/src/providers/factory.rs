use super::{
    base::Provider, configs::ProviderConfig, databricks::DatabricksProvider,
    openai::OpenAiProvider,
};
use anyhow::Result;
use std::sync::Arc;

pub fn get_provider(config: ProviderConfig) -> Result<Arc<dyn Provider>> {
    match config {
        ProviderConfig::OpenAi(openai_config) => Ok(Arc::new(OpenAiProvider::new(openai_config)?)),
        ProviderConfig::Databricks(databricks_config) => {
            Ok(Arc::new(DatabricksProvider::new(databricks_config)?))
        }
    }
}
