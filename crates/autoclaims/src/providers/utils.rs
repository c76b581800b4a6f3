use anyhow::{anyhow, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};

use super::base::Usage;
use crate::errors::AgentError;
use crate::models::content::Content;
use crate::models::message::{Message, MessageContent};
use crate::models::tool::{Tool, ToolCall};

lazy_static! {
    static ref INVALID_NAME_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
    static ref VALID_NAME: Regex = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

/// Convert internal Message format to OpenAI's chat-completions message specification
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut messages_spec = Vec::new();

    for message in messages {
        let mut converted = json!({
            "role": message.role
        });

        let mut output = Vec::new();

        for content in &message.content {
            match content {
                MessageContent::Text(text) => {
                    let text = text.to_model_string();
                    if !text.is_empty() {
                        converted["content"] = json!(text);
                    }
                }
                MessageContent::ToolRequest(request) => {
                    // A malformed call still has to appear in the history; its error
                    // comes back to the model as the matching tool response.
                    let (name, arguments) = match &request.tool_call {
                        Ok(tool_call) => (
                            sanitize_function_name(&tool_call.name),
                            tool_call.arguments.to_string(),
                        ),
                        Err(_) => ("invalid_tool_call".to_string(), "{}".to_string()),
                    };
                    let entry = json!({
                        "id": request.id,
                        "type": "function",
                        "function": {
                            "name": name,
                            "arguments": arguments,
                        }
                    });
                    match converted.get_mut("tool_calls").and_then(Value::as_array_mut) {
                        Some(tool_calls) => tool_calls.push(entry),
                        None => converted["tool_calls"] = json!([entry]),
                    }
                }
                MessageContent::ToolResponse(response) => {
                    let content = match &response.tool_result {
                        Ok(contents) => contents
                            .iter()
                            .map(Content::to_model_string)
                            .collect::<Vec<_>>()
                            .join("\n"),
                        // A tool error is shown as output so the model can interpret it
                        Err(e) => format!("The tool call returned the following error:\n{}", e),
                    };
                    output.push(json!({
                        "role": "tool",
                        "content": content,
                        "tool_call_id": response.id
                    }));
                }
            }
        }

        if converted.get("content").is_some() || converted.get("tool_calls").is_some() {
            output.insert(0, converted);
        }
        messages_spec.extend(output);
    }

    messages_spec
}

/// Convert internal Tool format to OpenAI's API tool specification
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": tool.name,
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

/// Build a chat-completions payload. `model` is only set for hosts that route by body.
pub fn build_chat_payload(
    model: Option<&str>,
    system: &str,
    messages: &[Message],
    tools: &[Tool],
    temperature: Option<f32>,
    max_tokens: Option<i32>,
) -> Result<Value> {
    let mut messages_array = vec![json!({ "role": "system", "content": system })];
    messages_array.extend(messages_to_openai_spec(messages));

    let mut payload = json!({ "messages": messages_array });
    if let Some(model) = model {
        payload["model"] = json!(model);
    }
    if !tools.is_empty() {
        payload["tools"] = json!(tools_to_openai_spec(tools)?);
    }
    if let Some(temp) = temperature {
        payload["temperature"] = json!(temp);
    }
    if let Some(tokens) = max_tokens {
        payload["max_tokens"] = json!(tokens);
    }
    Ok(payload)
}

/// Convert OpenAI's API response to internal Message format
pub fn openai_response_to_message(response: &Value) -> Result<Message> {
    let original = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .ok_or_else(|| anyhow!("Response has no choices: {}", response))?;
    let mut message = Message::assistant();

    if let Some(text) = original.get("content").and_then(Value::as_str) {
        message = message.with_text(text);
    }

    if let Some(tool_calls) = original.get("tool_calls").and_then(Value::as_array) {
        for tool_call in tool_calls {
            let id = tool_call["id"].as_str().unwrap_or_default().to_string();
            let function_name = tool_call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();

            if !is_valid_function_name(&function_name) {
                let error = AgentError::ToolNotFound(format!(
                    "The provided function name '{}' had invalid characters, it must match this regex [a-zA-Z0-9_-]+",
                    function_name
                ));
                message = message.with_tool_request(id, Err(error));
                continue;
            }

            // Some endpoints send an empty string for parameterless calls
            let parsed = if arguments.trim().is_empty() {
                Ok(json!({}))
            } else {
                serde_json::from_str::<Value>(arguments)
            };
            match parsed {
                Ok(params) => {
                    message =
                        message.with_tool_request(id, Ok(ToolCall::new(function_name, params)));
                }
                Err(e) => {
                    let error = AgentError::InvalidParameters(format!(
                        "Could not interpret tool use parameters for id {}: {}",
                        id, e
                    ));
                    message = message.with_tool_request(id, Err(error));
                }
            }
        }
    }

    Ok(message)
}

/// Token usage as reported in an OpenAI-compatible response
pub fn get_usage(data: &Value) -> Usage {
    let Some(usage) = data.get("usage") else {
        return Usage::default();
    };
    let count = |key: &str| usage.get(key).and_then(Value::as_i64).map(|v| v as i32);

    let input_tokens = count("prompt_tokens");
    let output_tokens = count("completion_tokens");
    let total_tokens = count("total_tokens").or(match (input_tokens, output_tokens) {
        (Some(input), Some(output)) => Some(input + output),
        _ => None,
    });

    Usage::new(input_tokens, output_tokens, total_tokens)
}

pub fn sanitize_function_name(name: &str) -> String {
    INVALID_NAME_CHARS.replace_all(name, "_").to_string()
}

pub fn is_valid_function_name(name: &str) -> bool {
    VALID_NAME.is_match(name)
}

#[derive(Debug, thiserror::Error)]
#[error("Context length exceeded. Message: {0}")]
pub struct ContextLengthExceededError(String);

pub fn check_openai_context_length_error(error: &Value) -> Option<ContextLengthExceededError> {
    let code = error.get("code")?.as_str()?;
    if code == "context_length_exceeded" || code == "string_above_max_length" {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("Unknown error")
            .to_string();
        Some(ContextLengthExceededError(message))
    } else {
        None
    }
}
