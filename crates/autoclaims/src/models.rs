//! These models represent the objects passed around by the runner
//!
//! There are a few related formats we need to interact with:
//! - chat agent request/response envelopes, sent from callers to the adapter
//! - openai chat-completion messages/tools, sent from the runner to the LLM
//! - governed function results, returned from the data platform to tools
//!
//! We always immediately convert those formats into the internal structs here,
//! so the internal models are not an exact match to any of them.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
