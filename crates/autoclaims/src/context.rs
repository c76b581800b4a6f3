use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

/// What we know about the customer for the current turn
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    pub customer_id: Option<String>,
    pub policy_number: Option<String>,
    pub conversation_id: Option<String>,
    pub user_id: Option<String>,
}

/// Shared handle to the turn's [`UserContext`].
///
/// Created once per turn and handed to every tool call in that turn, so a tool
/// can record what it learned for the ones that run after it.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    inner: Arc<Mutex<UserContext>>,
}

impl RunContext {
    pub fn new(context: UserContext) -> Self {
        Self {
            inner: Arc::new(Mutex::new(context)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, UserContext> {
        // A panicking tool must not wedge the rest of the turn
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> UserContext {
        self.lock().clone()
    }

    pub fn set_policy_number(&self, policy_number: impl Into<String>) {
        self.lock().policy_number = Some(policy_number.into());
    }

    pub fn policy_number(&self) -> Option<String> {
        self.lock().policy_number.clone()
    }

    /// Customer details worth telling the model about, one `- key: value` line
    /// each, or `None` when nothing is known yet
    pub fn known_details(&self) -> Option<String> {
        let context = self.lock();
        let lines: Vec<String> = [
            ("customer id", &context.customer_id),
            ("policy number", &context.policy_number),
        ]
        .into_iter()
        .filter_map(|(label, value)| value.as_ref().map(|v| format!("- {}: {}", label, v)))
        .collect();

        if lines.is_empty() {
            None
        } else {
            Some(lines.join("\n"))
        }
    }
}
