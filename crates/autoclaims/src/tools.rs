use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::context::RunContext;
use crate::errors::{AgentError, AgentResult};
use crate::functions::{FunctionClient, FunctionName};
use crate::models::tool::Tool;

/// A capability an agent may invoke during a run
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// The schema advertised to the model
    fn tool(&self) -> &Tool;

    /// Run the tool. `ExecutionError` aborts the run; every other error is
    /// reported back to the model.
    async fn call(&self, context: &RunContext, arguments: Value) -> AgentResult<Value>;
}

/// Read a scalar argument as text. Numbers are accepted because models often
/// send policy numbers unquoted.
fn text_arg(arguments: &Value, key: &str) -> AgentResult<String> {
    match arguments.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(AgentError::InvalidParameters(format!(
            "The '{}' argument is required",
            key
        ))),
    }
}

async fn execute(
    client: &dyn FunctionClient,
    function: &FunctionName,
    parameters: Map<String, Value>,
) -> AgentResult<Value> {
    let result = client
        .execute(function, parameters)
        .await
        .map_err(|e| AgentError::ExecutionError(format!("{:#}", e)))?;
    serde_json::to_value(result).map_err(|e| AgentError::Internal(e.to_string()))
}

/// Looks up the claims filed under a policy number
pub struct ClaimsLookupTool {
    tool: Tool,
    function: FunctionName,
    client: Arc<dyn FunctionClient>,
}

impl ClaimsLookupTool {
    pub fn new(function: FunctionName, client: Arc<dyn FunctionClient>) -> Self {
        let tool = Tool::new(
            "lookup_claims",
            "Returns the claims filed under a policy number, with their status, dates and amounts.",
            json!({
                "type": "object",
                "properties": {
                    "policy_no": {
                        "type": "string",
                        "description": "The customer's policy number, e.g. 102070455. \
                            Omit it to use the policy number already known for this conversation."
                    }
                }
            }),
        );
        Self {
            tool,
            function,
            client,
        }
    }
}

#[async_trait]
impl ToolHandler for ClaimsLookupTool {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    async fn call(&self, context: &RunContext, arguments: Value) -> AgentResult<Value> {
        let policy_no = match arguments.get("policy_no") {
            None | Some(Value::Null) => context.policy_number().ok_or_else(|| {
                AgentError::InvalidParameters(
                    "The 'policy_no' argument is required, no policy number is known yet"
                        .to_string(),
                )
            })?,
            Some(_) => text_arg(&arguments, "policy_no")?,
        };
        // Later tools and turns reuse the policy number without asking again
        context.set_policy_number(&policy_no);

        let mut parameters = Map::new();
        parameters.insert("policy_no".to_string(), Value::String(policy_no));
        execute(self.client.as_ref(), &self.function, parameters).await
    }
}

/// Searches the policy documents for passages relevant to a question
pub struct PolicyDocSearchTool {
    tool: Tool,
    function: FunctionName,
    client: Arc<dyn FunctionClient>,
}

impl PolicyDocSearchTool {
    pub fn new(function: FunctionName, client: Arc<dyn FunctionClient>) -> Self {
        let tool = Tool::new(
            "search_policy_docs",
            "Searches the insurance policy documents and returns the most relevant passages.",
            json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "A natural language question about coverage or terms"
                    }
                }
            }),
        );
        Self {
            tool,
            function,
            client,
        }
    }
}

#[async_trait]
impl ToolHandler for PolicyDocSearchTool {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    async fn call(&self, _context: &RunContext, arguments: Value) -> AgentResult<Value> {
        let query = text_arg(&arguments, "query")?;

        let mut parameters = Map::new();
        parameters.insert("query".to_string(), Value::String(query));
        execute(self.client.as_ref(), &self.function, parameters).await
    }
}
