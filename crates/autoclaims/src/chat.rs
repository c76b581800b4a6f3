//! Chat interface around the insurance agents.
//!
//! Callers send the whole visible history plus optional conversation metadata;
//! each turn runs the triage agent on the latest user message and answers with
//! a single assistant message.

use anyhow::Result;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::agents::{insurance_agents, AgentDefinition};
use crate::config::Settings;
use crate::context::{RunContext, UserContext};
use crate::functions::{DatabricksFunctionClient, DatabricksFunctionClientConfig, FunctionClient};
use crate::key_manager::Secrets;
use crate::models::message::Message;
use crate::providers::factory::get_provider;
use crate::runner::{Runner, RunnerConfig};
use crate::tools::{ClaimsLookupTool, PolicyDocSearchTool};

pub const USER_ROLE: &str = "user";
pub const ASSISTANT_ROLE: &str = "assistant";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAgentMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ChatAgentMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: USER_ROLE.to_string(),
            content: content.into(),
            id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ASSISTANT_ROLE.to_string(),
            content: content.into(),
            id: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatContext {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatAgentRequest {
    pub messages: Vec<ChatAgentMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ChatContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_inputs: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAgentResponse {
    pub messages: Vec<ChatAgentMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAgentChunk {
    pub delta: ChatAgentMessage,
}

/// Content of the most recent user message, or an empty string if there is none
pub fn extract_last_user_text(history: &[ChatAgentMessage]) -> String {
    history
        .iter()
        .rev()
        .find(|message| message.role == USER_ROLE)
        .map(|message| message.content.clone())
        .unwrap_or_default()
}

/// Per-turn context from the request metadata. Identifiers are copied as given.
pub fn build_context(metadata: Option<&ChatContext>) -> UserContext {
    UserContext {
        conversation_id: metadata.and_then(|m| m.conversation_id.clone()),
        user_id: metadata.and_then(|m| m.user_id.clone()),
        ..Default::default()
    }
}

/// Conversations remembered by [`ContextStore::default`]
pub const DEFAULT_CONTEXT_CAPACITY: usize = 1024;

/// Customer details learned in earlier turns, keyed by conversation id.
///
/// Holds at most `capacity` conversations; saving a new one when full evicts
/// the conversation that was used least recently.
#[derive(Debug, Clone)]
pub struct ContextStore {
    inner: Arc<Mutex<StoredContexts>>,
}

#[derive(Debug)]
struct StoredContexts {
    capacity: usize,
    tick: u64,
    entries: HashMap<String, (UserContext, u64)>,
}

impl StoredContexts {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CONTEXT_CAPACITY)
    }
}

impl ContextStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoredContexts {
                capacity: capacity.max(1),
                tick: 0,
                entries: HashMap::new(),
            })),
        }
    }

    pub async fn get(&self, conversation_id: &str) -> Option<UserContext> {
        let mut inner = self.inner.lock().await;
        let tick = inner.next_tick();
        inner.entries.get_mut(conversation_id).map(|(context, used)| {
            *used = tick;
            context.clone()
        })
    }

    pub async fn save(&self, conversation_id: &str, context: UserContext) {
        let mut inner = self.inner.lock().await;
        let tick = inner.next_tick();

        if !inner.entries.contains_key(conversation_id) && inner.entries.len() >= inner.capacity {
            let oldest = inner
                .entries
                .iter()
                .min_by_key(|(_, (_, used))| *used)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                debug!(conversation_id = %id, "evicting conversation context");
                inner.entries.remove(&id);
            }
        }
        inner
            .entries
            .insert(conversation_id.to_string(), (context, tick));
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

pub struct InsuranceChatAgent {
    runner: Runner,
    starting_agent: Arc<AgentDefinition>,
    store: Option<ContextStore>,
}

impl InsuranceChatAgent {
    pub fn new(runner: Runner, starting_agent: Arc<AgentDefinition>) -> Self {
        Self {
            runner,
            starting_agent,
            store: None,
        }
    }

    /// Carry customer details across turns of the same conversation
    pub fn with_context_store(mut self, store: ContextStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Wire the provider, the function client and the agent graph from settings
    pub fn from_settings(settings: &Settings, secrets: &Secrets) -> Result<Self> {
        let provider_config = settings.provider.clone().into_config(
            &settings.workspace,
            secrets.openai_api_key.clone(),
            secrets.databricks_token.clone(),
        )?;
        let provider = get_provider(provider_config)?;

        let client: Arc<dyn FunctionClient> = Arc::new(DatabricksFunctionClient::new(
            DatabricksFunctionClientConfig::new(
                settings.workspace.host.clone(),
                secrets.databricks_token.clone(),
                settings.workspace.warehouse_id.clone(),
            ),
        )?);
        let claims_tool = Arc::new(ClaimsLookupTool::new(
            settings.functions.claims_lookup_name()?,
            client.clone(),
        ));
        let policy_tool = Arc::new(PolicyDocSearchTool::new(
            settings.functions.policy_search_name()?,
            client,
        ));

        let triage = insurance_agents(settings.provider.model(), claims_tool, policy_tool)?;
        let agents: Vec<_> = AgentDefinition::reachable(&triage)
            .iter()
            .map(|agent| agent.name().to_string())
            .collect();
        info!(?agents, model = settings.provider.model(), "agent graph ready");

        let runner = Runner::new(provider, RunnerConfig::from(&settings.runner));
        Ok(Self::new(runner, triage))
    }

    /// Run one turn to completion and return the final answer text
    pub async fn run_turn(
        &self,
        history: &[ChatAgentMessage],
        metadata: Option<&ChatContext>,
    ) -> Result<String> {
        let text = extract_last_user_text(history);
        let mut user_context = build_context(metadata);

        if let (Some(store), Some(id)) = (&self.store, user_context.conversation_id.clone()) {
            if let Some(saved) = store.get(&id).await {
                debug!(conversation_id = %id, "restoring conversation context");
                user_context.customer_id = user_context.customer_id.or(saved.customer_id);
                user_context.policy_number = user_context.policy_number.or(saved.policy_number);
            }
        }

        let context = RunContext::new(user_context);
        let result = self
            .runner
            .run(
                self.starting_agent.clone(),
                vec![Message::user().with_text(text)],
                context.clone(),
            )
            .await?;
        info!(agent = %result.last_agent, usage = ?result.usage, "turn complete");

        let snapshot = context.snapshot();
        if let (Some(store), Some(id)) = (&self.store, snapshot.conversation_id.clone()) {
            store.save(&id, snapshot).await;
        }

        Ok(result.final_output)
    }

    pub async fn predict(&self, request: &ChatAgentRequest) -> Result<ChatAgentResponse> {
        let text = self
            .run_turn(&request.messages, request.context.as_ref())
            .await?;

        Ok(ChatAgentResponse {
            messages: vec![ChatAgentMessage {
                role: ASSISTANT_ROLE.to_string(),
                content: text,
                id: Some(Uuid::new_v4().to_string()),
            }],
        })
    }

    /// The whole answer arrives as a single chunk once the turn is complete
    pub fn predict_stream(&self, request: ChatAgentRequest) -> BoxStream<'_, Result<ChatAgentChunk>> {
        Box::pin(async_stream::try_stream! {
            let response = self.predict(&request).await?;
            for message in response.messages {
                yield ChatAgentChunk { delta: message };
            }
        })
    }
}
