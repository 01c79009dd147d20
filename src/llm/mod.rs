pub mod tensorzero;

pub use tensorzero::{ContentBlock, LlmClient, LlmConfig, LlmError, LlmMessage, MessageContent};
