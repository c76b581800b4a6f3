pub mod ask;
pub mod chat;
pub mod resources;

use anyhow::{anyhow, Result};
use autoclaims::chat::InsuranceChatAgent;
use autoclaims::config::Settings;
use autoclaims::key_manager::{KeyRetrievalStrategy, Secrets};
use bat::PrettyPrinter;

pub fn build_agent() -> Result<InsuranceChatAgent> {
    let settings = Settings::new()?;
    let secrets = Secrets::load(KeyRetrievalStrategy::default(), &settings.provider)?;
    InsuranceChatAgent::from_settings(&settings, &secrets)
}

pub fn render(content: &str) -> Result<()> {
    PrettyPrinter::new()
        .input_from_bytes(content.as_bytes())
        .language("markdown")
        .print()
        .map_err(|e| anyhow!("Failed to render reply: {}", e))?;
    println!();
    Ok(())
}
