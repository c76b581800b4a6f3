use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
}

/// Structured output, usually a governed function result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataContent {
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
/// Content produced by a tool and handed back to the LLM
pub enum Content {
    Text(TextContent),
    Data(DataContent),
}

impl Content {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Content::Text(TextContent { text: text.into() })
    }

    pub fn data(data: Value) -> Self {
        Content::Data(DataContent { data })
    }

    /// Get the text content if this is a TextContent variant
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(&text.text),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&Value> {
        match self {
            Content::Data(data) => Some(&data.data),
            _ => None,
        }
    }

    /// Render the content the way it is shown to the model
    pub fn to_model_string(&self) -> String {
        match self {
            Content::Text(text) => text.text.clone(),
            Content::Data(data) => data.data.to_string(),
        }
    }
}
