//! 对话历史
//!
//! Message 一经创建不再修改；History 只追加、不删除，供 Proposer / Critic / 序列化回放使用。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::ToolKind;

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// 模型请求的一次工具调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool: ToolKind,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(tool: ToolKind, args: Value) -> Self {
        Self {
            call_id: format!("call_{}", uuid::Uuid::new_v4().simple()),
            tool,
            args,
        }
    }

    /// 取字符串参数；缺失、非字符串或全空白时返回 None
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// 该工具必填参数的值
    pub fn required_arg(&self) -> Option<&str> {
        self.arg_str(self.tool.required_arg())
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<ToolKind>,
}

impl Message {
    fn plain(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content.into())
    }

    /// 带工具调用的 assistant 消息
    pub fn assistant_with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content.into())
        }
    }

    /// 工具输出消息，关联发起它的调用
    pub fn tool(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call.call_id.clone()),
            tool_name: Some(call.tool),
            ..Self::plain(Role::Tool, content.into())
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// 指定工具的全部调用，按出现顺序
    pub fn calls_to(&self, tool: ToolKind) -> impl Iterator<Item = &ToolCall> + '_ {
        self.tool_calls.iter().filter(move |tc| tc.tool == tool)
    }
}

/// 只追加的对话历史
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    messages: Vec<Message>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// 最近一条 assistant 消息
    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    /// 从后向前查找最近一条由指定工具产生的输出
    pub fn latest_tool_output(&self, tool: ToolKind) -> Option<&Message> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Tool && m.tool_name == Some(tool))
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl FromIterator<Message> for History {
    fn from_iter<I: IntoIterator<Item = Message>>(iter: I) -> Self {
        Self {
            messages: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_arg_str_rejects_missing_and_blank() {
        let tc = ToolCall::new(ToolKind::ExecuteNmapScan, json!({ "cmd": "nmap" }));
        assert_eq!(tc.arg_str("command"), None);
        let tc = ToolCall::new(ToolKind::ExecuteNmapScan, json!({ "command": "   " }));
        assert_eq!(tc.arg_str("command"), None);
        let tc = ToolCall::new(ToolKind::ExecuteNmapScan, json!({ "command": 42 }));
        assert_eq!(tc.arg_str("command"), None);
        let tc = ToolCall::new(ToolKind::ExecuteNmapScan, json!({ "command": " nmap -sV x " }));
        assert_eq!(tc.arg_str("command"), Some("nmap -sV x"));
    }

    #[test]
    fn test_required_arg_follows_tool_kind() {
        let scan = ToolCall::new(ToolKind::ExecuteNmapScan, json!({ "query": "nmap -sV x" }));
        assert_eq!(scan.required_arg(), None);
        let lookup = ToolCall::new(ToolKind::RetrieveContext, json!({ "query": "mtu" }));
        assert_eq!(lookup.required_arg(), Some("mtu"));
    }

    #[test]
    fn test_calls_to_keeps_order() {
        let msg = Message::assistant_with_tool_calls(
            "",
            vec![
                ToolCall::new(ToolKind::ExecuteNmapScan, json!({ "command": "nmap a" })),
                ToolCall::new(ToolKind::RetrieveContext, json!({ "query": "b" })),
                ToolCall::new(ToolKind::ExecuteNmapScan, json!({ "command": "nmap c" })),
            ],
        );
        let scans: Vec<_> = msg
            .calls_to(ToolKind::ExecuteNmapScan)
            .filter_map(|tc| tc.required_arg())
            .collect();
        assert_eq!(scans, vec!["nmap a", "nmap c"]);
    }

    #[test]
    fn test_call_ids_are_unique() {
        let a = ToolCall::new(ToolKind::RetrieveContext, json!({}));
        let b = ToolCall::new(ToolKind::RetrieveContext, json!({}));
        assert_ne!(a.call_id, b.call_id);
    }

    #[test]
    fn test_tool_message_links_call() {
        let tc = ToolCall::new(ToolKind::RetrieveContext, json!({ "query": "mtu" }));
        let msg = Message::tool(&tc, "docs");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some(tc.call_id.as_str()));
        assert_eq!(msg.tool_name, Some(ToolKind::RetrieveContext));
    }

    #[test]
    fn test_latest_tool_output_scans_backward() {
        let first = ToolCall::new(ToolKind::RetrieveContext, json!({ "query": "a" }));
        let second = ToolCall::new(ToolKind::RetrieveContext, json!({ "query": "b" }));
        let scan = ToolCall::new(ToolKind::ExecuteNmapScan, json!({ "command": "nmap x" }));
        let history: History = vec![
            Message::user("q"),
            Message::tool(&first, "old docs"),
            Message::tool(&second, "new docs"),
            Message::tool(&scan, "scan output"),
        ]
        .into_iter()
        .collect();
        let found = history.latest_tool_output(ToolKind::RetrieveContext).unwrap();
        assert_eq!(found.content, "new docs");
    }

    #[test]
    fn test_append_and_replay_preserves_order() {
        let mut history = History::new();
        let input: Vec<Message> = (0..10).map(|i| Message::user(format!("m{i}"))).collect();
        for m in &input {
            history.push(m.clone());
        }
        let replayed: History = history.messages().iter().cloned().collect();
        assert_eq!(replayed.messages(), input.as_slice());
        assert_eq!(replayed, history);
    }
}
