//! 工具参数 JSON Schema 生成（schemars）
//!
//! 参数结构体上的文档注释即为字段描述，生成的 schema 通过 ToolKind::parameters_schema 暴露给模型。

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// retrieve_context 的参数
#[allow(dead_code)]
#[derive(JsonSchema)]
struct RetrieveContextArgs {
    /// Search string to look up in the documents
    pub query: String,
}

/// execute_nmap_scan 的参数
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ExecuteNmapScanArgs {
    /// The full Nmap command string to execute
    pub command: String,
}

/// 工具调用请求格式：{"tool": "...", "args": {...}}（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名：retrieve_context 或 execute_nmap_scan
    pub tool: String,
    /// 工具参数（query 或 command）
    pub args: std::collections::HashMap<String, String>,
}

fn to_value<T: serde::Serialize>(schema: T) -> Value {
    serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({ "type": "object" }))
}

pub(crate) fn retrieve_context_schema() -> Value {
    to_value(schema_for!(RetrieveContextArgs))
}

pub(crate) fn execute_nmap_scan_schema() -> Value {
    to_value(schema_for!(ExecuteNmapScanArgs))
}

/// 返回工具调用的 JSON Schema 字符串，可拼入 system prompt
pub fn tool_call_schema_json() -> String {
    let schema = schema_for!(ToolCallFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_is_required() {
        let schema = execute_nmap_scan_schema();
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "command"));
    }

    #[test]
    fn test_tool_call_schema_mentions_args() {
        let json = tool_call_schema_json();
        assert!(json.contains("\"tool\""));
        assert!(json.contains("\"args\""));
    }
}
