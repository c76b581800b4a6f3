use anyhow::Result;
use autoclaims::chat::{ChatAgentMessage, ChatAgentRequest, ChatContext, InsuranceChatAgent};
use cliclack::{input, spinner};
use console::style;
use uuid::Uuid;

use super::render;

/// The request for the next turn: the visible history under a fixed conversation id
fn turn_request(history: &[ChatAgentMessage], conversation_id: &str) -> ChatAgentRequest {
    ChatAgentRequest {
        messages: history.to_vec(),
        context: Some(ChatContext {
            conversation_id: Some(conversation_id.to_string()),
            user_id: None,
        }),
        custom_inputs: None,
    }
}

pub async fn execute(agent: InsuranceChatAgent) -> Result<()> {
    println!(
        "{} {}",
        style("Insurance assistant").bold().green(),
        style("- type \"exit\" to end the session").dim()
    );
    println!();

    let conversation_id = Uuid::new_v4().to_string();
    let mut history: Vec<ChatAgentMessage> = Vec::new();

    loop {
        let text: String = input("Message:").placeholder("").interact()?;
        if text.trim().eq_ignore_ascii_case("exit") {
            break;
        }
        history.push(ChatAgentMessage::user(text));

        let spin = spinner();
        spin.start("awaiting reply");
        let result = agent.predict(&turn_request(&history, &conversation_id)).await;
        spin.stop("");

        match result {
            Ok(response) => {
                for message in response.messages {
                    render(&message.content)?;
                    history.push(message);
                }
            }
            Err(e) => {
                // Drop the unanswered message so the history stays in turn order
                history.pop();
                println!("{} {:#}", style("Error:").red().bold(), e);
            }
        }
        println!();
    }
    Ok(())
}
