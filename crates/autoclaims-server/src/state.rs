use autoclaims::chat::InsuranceChatAgent;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<InsuranceChatAgent>,
}

impl AppState {
    pub fn new(agent: InsuranceChatAgent) -> Self {
        Self {
            agent: Arc::new(agent),
        }
    }
}
