//! 运行过程事件：用于 CLI / 前端展示状态迁移、提议、裁决、审批与工具结果

use serde::Serialize;

use crate::core::GraphState;
use crate::react::{ApprovalDecision, Verdict};
use crate::tools::ToolKind;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// 进入某个状态
    StateEntered { state: GraphState, llm_calls: usize },
    /// Proposer 返回（内容预览 + 请求的工具）
    Proposal { preview: String, tools: Vec<ToolKind> },
    /// Critic 裁决（本条消息中的全部扫描命令）
    Verdict { commands: Vec<String>, verdict: Verdict },
    /// 等待人工审批
    ApprovalRequested { command: String },
    /// 审批结果
    ApprovalResolved { decision: ApprovalDecision },
    /// 工具返回（预览，避免过长）
    ToolResult { tool: ToolKind, preview: String },
    /// 运行结束
    Done { llm_calls: usize, cancelled: bool },
    /// 错误
    Error { state: GraphState, text: String },
}
