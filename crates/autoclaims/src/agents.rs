//! Agent definitions and the insurance agent graph.
//!
//! An agent is a name, a system prompt, the tools it may call and the agents it
//! may hand the conversation to. Handoffs form a directed graph whose entry
//! point is the triage agent. Each handoff is advertised to the model as a
//! parameterless tool named `transfer_to_<agent>`.

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::models::tool::Tool;
use crate::prompt_template::load_prompt_file;
use crate::tools::ToolHandler;

pub const TRIAGE_AGENT: &str = "Triage Agent";
pub const CLAIMS_AGENT: &str = "Claims Agent";
pub const POLICY_AGENT: &str = "Policy Agent";

pub struct AgentDefinition {
    name: String,
    instructions: String,
    handoff_description: String,
    model: String,
    tools: Vec<Arc<dyn ToolHandler>>,
    handoffs: Vec<Arc<AgentDefinition>>,
}

impl AgentDefinition {
    pub fn new(
        name: impl Into<String>,
        instructions: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            instructions: instructions.into(),
            handoff_description: String::new(),
            model: model.into(),
            tools: Vec::new(),
            handoffs: Vec::new(),
        }
    }

    /// Shown to agents that can hand off to this one
    pub fn with_handoff_description(mut self, description: impl Into<String>) -> Self {
        self.handoff_description = description.into();
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn ToolHandler>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_handoff(mut self, agent: Arc<AgentDefinition>) -> Self {
        self.handoffs.push(agent);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn handoff_description(&self) -> &str {
        &self.handoff_description
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tools(&self) -> &[Arc<dyn ToolHandler>] {
        &self.tools
    }

    pub fn handoffs(&self) -> &[Arc<AgentDefinition>] {
        &self.handoffs
    }

    /// Name of the tool other agents call to transfer control to this one
    pub fn handoff_tool_name(&self) -> String {
        format!("transfer_to_{}", snake_case(&self.name))
    }

    fn handoff_tool(&self) -> Tool {
        let description = if self.handoff_description.is_empty() {
            format!("Handoff to the {} agent to handle the request.", self.name)
        } else {
            format!(
                "Handoff to the {} agent to handle the request. {}",
                self.name, self.handoff_description
            )
        };
        Tool::new(
            self.handoff_tool_name(),
            description,
            json!({"type": "object", "properties": {}, "additionalProperties": false}),
        )
    }

    /// Every tool the model sees while this agent is active: its own tools
    /// followed by one transfer tool per handoff
    pub fn advertised_tools(&self) -> Vec<Tool> {
        self.tools
            .iter()
            .map(|handler| handler.tool().clone())
            .chain(self.handoffs.iter().map(|agent| agent.handoff_tool()))
            .collect()
    }

    pub fn find_tool(&self, name: &str) -> Option<&Arc<dyn ToolHandler>> {
        self.tools.iter().find(|handler| handler.tool().name == name)
    }

    /// Resolve a transfer tool name to the handoff target
    pub fn find_handoff(&self, tool_name: &str) -> Option<&Arc<AgentDefinition>> {
        self.handoffs
            .iter()
            .find(|agent| agent.handoff_tool_name() == tool_name)
    }

    /// All agents reachable from `start` through handoffs, `start` first,
    /// in breadth-first order. Each agent appears once even if the graph has cycles.
    pub fn reachable(start: &Arc<AgentDefinition>) -> Vec<Arc<AgentDefinition>> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = std::collections::VecDeque::from([start.clone()]);

        while let Some(agent) = queue.pop_front() {
            if !seen.insert(agent.name.clone()) {
                continue;
            }
            queue.extend(agent.handoffs.iter().cloned());
            order.push(agent);
        }
        order
    }
}

impl fmt::Debug for AgentDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentDefinition")
            .field("name", &self.name)
            .field("model", &self.model)
            .field(
                "tools",
                &self
                    .tools
                    .iter()
                    .map(|t| t.tool().name.as_str())
                    .collect::<Vec<_>>(),
            )
            .field(
                "handoffs",
                &self.handoffs.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

#[derive(Serialize)]
struct HandoffInfo<'a> {
    name: &'a str,
    description: &'a str,
}

/// Build the insurance agent graph, triage → {claims, policy}, and return its
/// entry point
pub fn insurance_agents(
    model: &str,
    claims_tool: Arc<dyn ToolHandler>,
    policy_tool: Arc<dyn ToolHandler>,
) -> Result<Arc<AgentDefinition>> {
    let claims_instructions =
        load_prompt_file("claims.md", &json!({ "tool": claims_tool.tool().name }))?;
    let claims_agent = Arc::new(
        AgentDefinition::new(CLAIMS_AGENT, claims_instructions, model)
            .with_handoff_description(
                "Looks up the status and details of a customer's existing claims by policy number.",
            )
            .with_tool(claims_tool),
    );

    let policy_instructions =
        load_prompt_file("policy.md", &json!({ "tool": policy_tool.tool().name }))?;
    let policy_agent = Arc::new(
        AgentDefinition::new(POLICY_AGENT, policy_instructions, model)
            .with_handoff_description(
                "Answers questions about what the customer's policy covers, its limits and exclusions.",
            )
            .with_tool(policy_tool),
    );

    let handoffs: Vec<HandoffInfo> = [claims_agent.as_ref(), policy_agent.as_ref()]
        .into_iter()
        .map(|agent| HandoffInfo {
            name: agent.name(),
            description: agent.handoff_description(),
        })
        .collect();
    let triage_instructions = load_prompt_file("triage.md", &json!({ "handoffs": handoffs }))?;

    let triage = AgentDefinition::new(TRIAGE_AGENT, triage_instructions, model)
        .with_handoff(claims_agent)
        .with_handoff(policy_agent);

    Ok(Arc::new(triage))
}
