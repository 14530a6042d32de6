//! Proposer：由模型决定调用工具还是给出最终回复
//!
//! 固定 system prompt + 完整历史 + 两个工具 schema 交给模型；每次调用 Proposer 计数加一。
//! 不做内部重试，模型故障直接交给 Orchestrator。

use std::sync::Arc;

use crate::core::{AgentError, ConversationState};
use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;
use crate::tools::{tool_schemas, ToolSchema};

pub struct Proposer {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    tools: Vec<ToolSchema>,
}

impl Proposer {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
            tools: tool_schemas(),
        }
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 调用模型一次；计数在调用前增加，故障时同样计入
    pub async fn propose(&self, state: &mut ConversationState) -> Result<Message, AgentError> {
        state.record_proposal();
        let reply = self
            .llm
            .generate(&self.system_prompt, state.history().messages(), &self.tools)
            .await
            .map_err(|e| match e {
                LlmError::UnknownTool(name) => AgentError::HallucinatedTool(name),
                other => AgentError::LlmError(other),
            })?;
        Ok(Message::assistant_with_tool_calls(reply.content, reply.tool_calls))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{tool_reply, ScriptedLlmClient};
    use crate::memory::Role;
    use crate::tools::ToolKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_propose_increments_counter_and_sends_history() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![tool_reply(
            ToolKind::RetrieveContext,
            json!({ "query": "port scan" }),
        )]));
        let proposer = Proposer::new(llm.clone(), "SYSTEM");
        let mut state = ConversationState::new("scan 127.0.0.1");

        let msg = proposer.propose(&mut state).await.unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.tool_calls[0].tool, ToolKind::RetrieveContext);
        assert_eq!(state.llm_calls(), 1);

        let req = &llm.requests()[0];
        assert_eq!(req.system_prompt, "SYSTEM");
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.tools, ToolKind::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_model_fault_propagates_and_still_counts() {
        let llm = Arc::new(
            ScriptedLlmClient::new(vec![]).then_error(LlmError::Request("connection refused".into())),
        );
        let proposer = Proposer::new(llm, "SYSTEM");
        let mut state = ConversationState::new("q");
        let err = proposer.propose(&mut state).await.unwrap_err();
        assert!(matches!(err, AgentError::LlmError(LlmError::Request(_))));
        assert_eq!(state.llm_calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_hallucinated_tool() {
        let llm = Arc::new(
            ScriptedLlmClient::new(vec![]).then_error(LlmError::UnknownTool("rm".into())),
        );
        let proposer = Proposer::new(llm, "SYSTEM");
        let mut state = ConversationState::new("q");
        let err = proposer.propose(&mut state).await.unwrap_err();
        assert!(matches!(err, AgentError::HallucinatedTool(ref n) if n == "rm"));
    }
}
