use anyhow::Result;
use autoclaims::chat::{ChatAgentMessage, ChatAgentRequest, InsuranceChatAgent};

use super::render;

pub async fn execute(agent: InsuranceChatAgent, message: String) -> Result<()> {
    let request = ChatAgentRequest {
        messages: vec![ChatAgentMessage::user(message)],
        ..Default::default()
    };
    let response = agent.predict(&request).await?;
    for message in response.messages {
        render(&message.content)?;
    }
    Ok(())
}
