//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Scripted Mock）

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::{tool_reply, LlmRequest, ScriptedLlmClient};
pub use openai::{compose_system_prompt, parse_reply, OpenAiClient};
pub use traits::{LlmClient, LlmError};
