use anyhow::Result;
use autoclaims::chat::{
    ChatAgentMessage, ChatAgentRequest, ChatContext, ContextStore, InsuranceChatAgent,
};
use autoclaims::config::{
    FunctionSettings, ProviderSettings, ResourceSettings, RunnerSettings, Settings,
    WorkspaceSettings,
};
use autoclaims::key_manager::Secrets;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SCENARIO: &str = "hi, I'd like to check on my existing claims and my policy number: 102070455";

fn settings(host: &str) -> Settings {
    Settings {
        provider: ProviderSettings::OpenAi {
            host: host.to_string(),
            model: "gpt-4o".to_string(),
            temperature: Some(0.0),
            max_tokens: None,
        },
        workspace: WorkspaceSettings {
            host: host.to_string(),
            warehouse_id: "wh-42".to_string(),
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
            turn_timeout_secs: Some(30),
        },
    }
}

fn secrets() -> Secrets {
    Secrets {
        openai_api_key: Some("sk-test".to_string()),
        databricks_token: "dapi-test".to_string(),
    }
}

fn tool_call_completion(id: &str, name: &str, arguments: Value) -> Value {
    json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": id,
                    "type": "function",
                    "function": {"name": name, "arguments": arguments.to_string()}
                }]
            }
        }],
        "usage": {"prompt_tokens": 20, "completion_tokens": 5, "total_tokens": 25}
    })
}

fn text_completion(text: &str) -> Value {
    json!({
        "choices": [{"message": {"role": "assistant", "content": text}}],
        "usage": {"prompt_tokens": 40, "completion_tokens": 15, "total_tokens": 55}
    })
}

async fn mount_completion(server: &MockServer, body: Value) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .up_to_n_times(1)
        .expect(1)
        .mount(server)
        .await;
}

/// Triage hands off, the claims agent looks up the policy, then answers
async fn mount_claims_conversation(server: &MockServer) {
    mount_completion(
        server,
        tool_call_completion("call_1", "transfer_to_claims_agent", json!({})),
    )
    .await;
    mount_completion(
        server,
        tool_call_completion("call_2", "lookup_claims", json!({"policy_no": "102070455"})),
    )
    .await;
    mount_completion(
        server,
        text_completion("Your claim CLM-7781 is open with an amount of $1250.00."),
    )
    .await;
}

#[tokio::test]
async fn test_claims_lookup_conversation() -> Result<()> {
    let server = MockServer::start().await;
    mount_claims_conversation(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/2.0/sql/statements"))
        .and(header("Authorization", "Bearer dapi-test"))
        .and(body_partial_json(json!({
            "warehouse_id": "wh-42",
            "statement": "SELECT * FROM main.insurance_agent.lookup_claims(policy_no => :policy_no)",
            "parameters": [{"name": "policy_no", "value": "102070455"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "statement_id": "01ef-claims",
            "status": {"state": "SUCCEEDED"},
            "manifest": {
                "schema": {"columns": [
                    {"name": "claim_id"}, {"name": "claim_status"}, {"name": "claim_amount"}
                ]},
                "truncated": false
            },
            "result": {"data_array": [["CLM-7781", "Open", "1250.00"]]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = ContextStore::default();
    let agent = InsuranceChatAgent::from_settings(&settings(&server.uri()), &secrets())?
        .with_context_store(store.clone());

    let request = ChatAgentRequest {
        messages: vec![ChatAgentMessage::user(SCENARIO)],
        context: Some(ChatContext {
            conversation_id: Some("123".to_string()),
            user_id: Some("123".to_string()),
        }),
        custom_inputs: None,
    };
    let response = agent.predict(&request).await?;

    assert_eq!(response.messages.len(), 1);
    assert!(response.messages[0].content.contains("CLM-7781"));
    assert_eq!(response.messages[0].role, "assistant");

    let saved = store.get("123").await.expect("context saved");
    assert_eq!(saved.policy_number.as_deref(), Some("102070455"));

    // The function result is handed back to the model as the tool output
    let requests = server.received_requests().await.expect("requests recorded");
    let completions: Vec<_> = requests
        .iter()
        .filter(|r| r.url.path() == "/v1/chat/completions")
        .collect();
    assert_eq!(completions.len(), 3);
    let last: Value = serde_json::from_slice(&completions[2].body)?;
    assert!(last["messages"].to_string().contains("CLM-7781"));
    assert_eq!(last["tools"][0]["function"]["name"], "lookup_claims");
    Ok(())
}

#[tokio::test]
async fn test_remote_function_failure_fails_the_turn() -> Result<()> {
    let server = MockServer::start().await;
    mount_completion(
        &server,
        tool_call_completion("call_1", "transfer_to_claims_agent", json!({})),
    )
    .await;
    mount_completion(
        &server,
        tool_call_completion("call_2", "lookup_claims", json!({"policy_no": "102070455"})),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/api/2.0/sql/statements"))
        .respond_with(ResponseTemplate::new(500).set_body_string("warehouse unavailable"))
        .mount(&server)
        .await;

    let agent = InsuranceChatAgent::from_settings(&settings(&server.uri()), &secrets())?;
    let err = agent
        .run_turn(&[ChatAgentMessage::user(SCENARIO)], None)
        .await
        .unwrap_err();

    let message = format!("{:#}", err);
    assert!(message.contains("main.insurance_agent.lookup_claims"));
    assert!(message.contains("warehouse unavailable"));
    Ok(())
}
