//! 状态定义：状态机阶段 GraphState 与单次运行的 ConversationState
//!
//! ConversationState 由 Orchestrator 独占持有，不跨运行共享。
//! 最近一次检索输出作为显式字段 grounding 随状态传递，Critic 直接读取。

use serde::Serialize;

use crate::memory::{History, Message, Role};
use crate::tools::ToolKind;

/// 状态机阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GraphState {
    Propose,
    Critique,
    AwaitingApproval,
    Execute,
    Done,
}

impl std::fmt::Display for GraphState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            GraphState::Propose => "PROPOSE",
            GraphState::Critique => "CRITIQUE",
            GraphState::AwaitingApproval => "AWAITING_APPROVAL",
            GraphState::Execute => "EXECUTE",
            GraphState::Done => "DONE",
        };
        f.write_str(s)
    }
}

/// 单次运行的对话状态：只追加历史 + Proposer 调用计数 + 最近检索上下文
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    history: History,
    llm_calls: usize,
    grounding: Option<String>,
}

impl ConversationState {
    /// 以一条用户查询作为种子
    pub fn new(query: impl Into<String>) -> Self {
        let mut state = Self::default();
        state.append(Message::user(query));
        state
    }

    /// 追加消息；检索工具的输出同时成为新的 grounding
    pub fn append(&mut self, msg: Message) {
        if msg.role == Role::Tool && msg.tool_name == Some(ToolKind::RetrieveContext) {
            self.grounding = Some(msg.content.clone());
        }
        self.history.push(msg);
    }

    /// Proposer 每轮调用一次
    pub(crate) fn record_proposal(&mut self) {
        self.llm_calls += 1;
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn llm_calls(&self) -> usize {
        self.llm_calls
    }

    pub fn grounding(&self) -> Option<&str> {
        self.grounding.as_deref()
    }

    pub fn into_history(self) -> History {
        self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ToolCall;
    use serde_json::json;

    #[test]
    fn test_new_seeds_single_user_message() {
        let state = ConversationState::new("scan 127.0.0.1");
        assert_eq!(state.history().len(), 1);
        assert_eq!(state.history().messages()[0].role, Role::User);
        assert_eq!(state.llm_calls(), 0);
        assert!(state.grounding().is_none());
    }

    #[test]
    fn test_grounding_tracks_latest_retrieval() {
        let mut state = ConversationState::new("q");
        let r1 = ToolCall::new(ToolKind::RetrieveContext, json!({ "query": "a" }));
        let r2 = ToolCall::new(ToolKind::RetrieveContext, json!({ "query": "b" }));
        let scan = ToolCall::new(ToolKind::ExecuteNmapScan, json!({ "command": "nmap x" }));
        state.append(Message::tool(&r1, "first"));
        state.append(Message::tool(&r2, "second"));
        state.append(Message::tool(&scan, "scan output"));
        assert_eq!(state.grounding(), Some("second"));
        let scanned = state
            .history()
            .latest_tool_output(ToolKind::RetrieveContext)
            .map(|m| m.content.as_str());
        assert_eq!(state.grounding(), scanned);
    }

    #[test]
    fn test_display_uses_screaming_names() {
        assert_eq!(GraphState::AwaitingApproval.to_string(), "AWAITING_APPROVAL");
        assert_eq!(
            serde_json::to_value(GraphState::AwaitingApproval).unwrap(),
            json!("AWAITING_APPROVAL")
        );
    }
}
