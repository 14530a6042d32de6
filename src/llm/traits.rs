//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Scripted Mock）实现 LlmClient::generate：
//! 输入 system prompt、历史与可用工具，返回一条 assistant 消息（可能带 ToolCall）。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;
use crate::tools::ToolSchema;

/// 模型调用故障
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("malformed model output: {0}")]
    Parse(String),

    #[error("unknown tool requested: {0}")]
    UnknownTool(String),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// tools 为空时模型只能给出文本回复（Critic 用法）
    async fn generate(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<Message, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
