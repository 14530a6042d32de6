//! 工具注册表
//!
//! 工具集合在编译期封闭：ToolKind 只有 retrieve_context 与 execute_nmap_scan 两个变体，
//! 模型输出中的工具名在解析阶段即解析为 ToolKind，未注册的名字得到类型化错误而不是查表失败。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::schema::{execute_nmap_scan_schema, retrieve_context_schema};

/// 已注册的工具（封闭集合）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// 检索文档（Retrieval Client）
    RetrieveContext,
    /// 执行扫描命令（Action Executor）
    ExecuteNmapScan,
}

impl ToolKind {
    pub const ALL: [ToolKind; 2] = [ToolKind::RetrieveContext, ToolKind::ExecuteNmapScan];

    /// 工具名称（模型 JSON 中的 "tool" 字段）
    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::RetrieveContext => "retrieve_context",
            ToolKind::ExecuteNmapScan => "execute_nmap_scan",
        }
    }

    /// 按名称解析；未注册的名称返回 None，由调用方决定错误类型
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name.trim())
    }

    /// 工具描述（供 LLM 理解功能）
    pub fn description(&self) -> &'static str {
        match self {
            ToolKind::RetrieveContext => {
                "Search the documentation/guide for a specific query. Always call this before \
                 proposing a scan command for the same technical question."
            }
            ToolKind::ExecuteNmapScan => {
                "Execute an Nmap scan command and return the results. The command is audited \
                 against the retrieved documentation before it runs."
            }
        }
    }

    /// 必填参数名
    pub fn required_arg(&self) -> &'static str {
        match self {
            ToolKind::RetrieveContext => "query",
            ToolKind::ExecuteNmapScan => "command",
        }
    }

    /// 参数 JSON Schema（schemars 生成）
    pub fn parameters_schema(&self) -> Value {
        match self {
            ToolKind::RetrieveContext => retrieve_context_schema(),
            ToolKind::ExecuteNmapScan => execute_nmap_scan_schema(),
        }
    }

    pub fn schema(&self) -> ToolSchema {
        ToolSchema {
            kind: *self,
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 暴露给模型的工具描述
#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    #[serde(skip)]
    pub kind: ToolKind,
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 全部已注册工具的 schema
pub fn tool_schemas() -> Vec<ToolSchema> {
    ToolKind::ALL.iter().map(ToolKind::schema).collect()
}

/// 生成工具 schema JSON，可拼入 system prompt
pub fn to_schema_json(tools: &[ToolSchema]) -> String {
    serde_json::to_string_pretty(tools).unwrap_or_else(|_| "[]".to_string())
}
