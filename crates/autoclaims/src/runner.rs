//! The orchestration loop.
//!
//! A run starts at one agent and alternates between asking the provider for the
//! next message and acting on the tool requests in it. A request for one of the
//! active agent's transfer tools switches the active agent; any other request
//! is dispatched to the agent's tool handlers. The run ends with the first
//! reply that requests no tools, and its text is the run's final output.

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::agents::AgentDefinition;
use crate::context::RunContext;
use crate::errors::{AgentError, AgentResult, RunError};
use crate::models::content::Content;
use crate::models::message::{Message, ToolRequest};
use crate::models::tool::ToolCall;
use crate::providers::base::{Provider, Usage};

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Provider calls allowed in one run
    pub max_turns: usize,
    /// Agent switches allowed in one run
    pub max_handoffs: usize,
    /// Wall clock limit for a whole run
    pub turn_timeout: Option<Duration>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_turns: 10,
            max_handoffs: 4,
            turn_timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub final_output: String,
    /// Name of the agent that produced the final output
    pub last_agent: String,
    /// The full history of the run, input included
    pub messages: Vec<Message>,
    pub usage: Usage,
}

pub struct Runner {
    provider: Arc<dyn Provider>,
    config: RunnerConfig,
}

impl Runner {
    pub fn new(provider: Arc<dyn Provider>, config: RunnerConfig) -> Self {
        Self { provider, config }
    }

    /// Drive a run from `starting_agent` to its final output
    pub async fn run(
        &self,
        starting_agent: Arc<AgentDefinition>,
        input: Vec<Message>,
        context: RunContext,
    ) -> Result<RunResult> {
        match self.config.turn_timeout {
            Some(limit) => tokio::time::timeout(limit, self.run_loop(starting_agent, input, context))
                .await
                .map_err(|_| RunError::Timeout {
                    seconds: limit.as_secs(),
                })?,
            None => self.run_loop(starting_agent, input, context).await,
        }
    }

    async fn run_loop(
        &self,
        starting_agent: Arc<AgentDefinition>,
        mut messages: Vec<Message>,
        context: RunContext,
    ) -> Result<RunResult> {
        let mut agent = starting_agent;
        let mut usage = Usage::default();
        let mut turns = 0;
        let mut handoffs = 0;

        loop {
            turns += 1;
            if turns > self.config.max_turns {
                return Err(RunError::MaxTurnsExceeded {
                    max_turns: self.config.max_turns,
                }
                .into());
            }
            debug!(turn = turns, agent = agent.name(), "starting turn");

            let system = system_prompt(&agent, &context);
            let (response, turn_usage) = self
                .provider
                .complete(
                    agent.model(),
                    &system,
                    &messages,
                    &agent.advertised_tools(),
                )
                .await?;
            usage.add(&turn_usage);
            messages.push(response.clone());

            let requests = response.tool_requests();
            if requests.is_empty() {
                info!(agent = agent.name(), turns, "run finished");
                return Ok(RunResult {
                    final_output: response.text(),
                    last_agent: agent.name().to_string(),
                    messages,
                    usage,
                });
            }

            if let Some((handoff_id, target)) = find_handoff(&agent, &requests) {
                handoffs += 1;
                if handoffs > self.config.max_handoffs {
                    return Err(RunError::MaxHandoffsExceeded {
                        max_handoffs: self.config.max_handoffs,
                    }
                    .into());
                }
                info!(from = agent.name(), to = target.name(), "handoff");

                // Every request needs an answer before the next provider call
                let mut reply = Message::user();
                for request in &requests {
                    let output = if request.id == handoff_id {
                        Ok(vec![Content::data(
                            json!({ "assistant": target.name(), "handoff": "accepted" }),
                        )])
                    } else {
                        Ok(vec![Content::text(
                            "Skipped: the conversation was handed off before this call ran.",
                        )])
                    };
                    reply = reply.with_tool_response(request.id.clone(), output);
                }
                messages.push(reply);
                agent = target;
                continue;
            }

            let outputs = futures::future::join_all(
                requests
                    .iter()
                    .map(|request| self.dispatch_tool_call(&agent, &context, request)),
            )
            .await;

            let mut reply = Message::user();
            for (request, output) in requests.iter().zip(outputs) {
                if let Err(err @ AgentError::ExecutionError(_)) = &output {
                    warn!(agent = agent.name(), error = %err, "tool execution failed");
                    return Err(err.clone().into());
                }
                reply = reply.with_tool_response(request.id.clone(), output);
            }
            messages.push(reply);
        }
    }

    async fn dispatch_tool_call(
        &self,
        agent: &AgentDefinition,
        context: &RunContext,
        request: &ToolRequest,
    ) -> AgentResult<Vec<Content>> {
        let ToolCall { name, arguments } = request.tool_call.clone()?;
        let handler = agent.find_tool(&name).ok_or_else(|| {
            AgentError::ToolNotFound(format!("{} has no tool named {}", agent.name(), name))
        })?;

        debug!(agent = agent.name(), tool = %name, id = %request.id, "dispatching tool call");
        let output = handler.call(context, arguments).await?;
        Ok(vec![Content::data(output)])
    }
}

/// The agent's instructions followed by what is already known about the customer
fn system_prompt(agent: &AgentDefinition, context: &RunContext) -> String {
    match context.known_details() {
        Some(details) => format!(
            "{}\n\nKnown customer details:\n{}",
            agent.instructions(),
            details
        ),
        None => agent.instructions().to_string(),
    }
}

/// The first request in the reply that names one of the agent's transfer tools
fn find_handoff(
    agent: &AgentDefinition,
    requests: &[&ToolRequest],
) -> Option<(String, Arc<AgentDefinition>)> {
    requests.iter().find_map(|request| {
        let call = request.tool_call.as_ref().ok()?;
        agent
            .find_handoff(&call.name)
            .map(|target| (request.id.clone(), target.clone()))
    })
}
