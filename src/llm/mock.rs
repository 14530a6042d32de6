//! Scripted LLM 客户端（用于测试，无需 API）
//!
//! 按顺序回放预先排好的回复，并记录每次请求（system prompt、历史、可用工具），
//! 便于断言 Proposer / Critic 看到了什么。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, ToolCall};
use crate::tools::{ToolKind, ToolSchema};

/// 一次被记录的请求
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolKind>,
}

/// 回放脚本的客户端；脚本耗尽后返回 fallback，没有 fallback 则返回请求错误
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<Message, LlmError>>>,
    fallback: Option<Message>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedLlmClient {
    pub fn new(replies: Vec<Message>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            ..Self::default()
        }
    }

    /// 脚本耗尽后一直返回这条消息
    pub fn with_fallback(mut self, msg: Message) -> Self {
        self.fallback = Some(msg);
        self
    }

    /// 追加一次故障
    pub fn then_error(self, err: LlmError) -> Self {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Err(err));
        }
        self
    }

    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

/// 构造带单个工具调用的 assistant 回复
pub fn tool_reply(tool: ToolKind, args: Value) -> Message {
    Message::assistant_with_tool_calls("", vec![ToolCall::new(tool, args)])
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn generate(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<Message, LlmError> {
        if let Ok(mut r) = self.requests.lock() {
            r.push(LlmRequest {
                system_prompt: system_prompt.to_string(),
                messages: messages.to_vec(),
                tools: tools.iter().map(|t| t.kind).collect(),
            });
        }
        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(reply) => reply,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| LlmError::Request("script exhausted".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_in_order_then_fallback() {
        let client = ScriptedLlmClient::new(vec![Message::assistant("one")])
            .with_fallback(Message::assistant("again"));
        assert_eq!(client.generate("s", &[], &[]).await.unwrap().content, "one");
        assert_eq!(client.generate("s", &[], &[]).await.unwrap().content, "again");
        assert_eq!(client.generate("s", &[], &[]).await.unwrap().content, "again");
        assert_eq!(client.call_count(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_script_errors() {
        let client = ScriptedLlmClient::new(vec![]).then_error(LlmError::Request("down".into()));
        assert!(client.generate("s", &[], &[]).await.is_err());
        assert!(client.generate("s", &[], &[]).await.is_err());
    }
}
