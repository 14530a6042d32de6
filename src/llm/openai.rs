//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 Ollama、OpenAI、DeepSeek 等。
//! 工具调用走文本协议：工具 schema 与调用格式拼入 system prompt，
//! 回复中的 {"tool": "...", "args": {...}} 被解析为 ToolCall，其余文本作为最终回复。

use std::sync::atomic::{AtomicU64, Ordering};

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role, ToolCall};
use crate::tools::{to_schema_json, tool_call_schema_json, ToolKind, ToolSchema};

/// 累计 token 数：prompt / completion
#[derive(Debug, Default)]
struct TokenCounter {
    prompt: AtomicU64,
    completion: AtomicU64,
}

impl TokenCounter {
    fn record(&self, prompt: u32, completion: u32) {
        self.prompt.fetch_add(u64::from(prompt), Ordering::Relaxed);
        self.completion.fetch_add(u64::from(completion), Ordering::Relaxed);
    }

    fn totals(&self) -> (u64, u64, u64) {
        let prompt = self.prompt.load(Ordering::Relaxed);
        let completion = self.completion.load(Ordering::Relaxed);
        (prompt, completion, prompt + completion)
    }
}

/// 拼接工具说明：schema + 调用格式
pub fn compose_system_prompt(system_prompt: &str, tools: &[ToolSchema]) -> String {
    if tools.is_empty() {
        return system_prompt.to_string();
    }
    format!(
        "{}\n\nAvailable tools:\n{}\n\nTo call a tool, reply with exactly one JSON object matching \
         this schema and nothing else after it:\n{}\n\
         When no further tool is needed, reply with the final answer in plain text.",
        system_prompt,
        to_schema_json(tools),
        tool_call_schema_json()
    )
}

/// 去掉推理模型输出的 <think>...</think> 段
fn strip_think(output: &str) -> &str {
    match output.rfind("</think>") {
        Some(end) => &output[end + "</think>".len()..],
        None => output,
    }
}

/// 解析模型文本输出：含 "tool" 字段的 JSON 为 ToolCall，其余为最终回复
pub fn parse_reply(output: &str) -> Result<Message, LlmError> {
    let trimmed = strip_think(output).trim();

    // 尝试提取 JSON 块（```json ... ``` 或纯 JSON）
    let (prefix, json_str) = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let body = rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim());
        (&trimmed[..start], body)
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end < start {
            return Ok(Message::assistant(trimmed));
        }
        (&trimmed[..start], &trimmed[start..=end])
    } else {
        return Ok(Message::assistant(trimmed));
    };

    let value: Value = match serde_json::from_str(json_str) {
        Ok(v) => v,
        // 回复正文里恰好带花括号，按最终回复处理
        Err(_) => return Ok(Message::assistant(trimmed)),
    };
    let Some(tool) = value.get("tool") else {
        return Ok(Message::assistant(trimmed));
    };
    let name = tool
        .as_str()
        .ok_or_else(|| LlmError::Parse(format!("\"tool\" must be a string: {json_str}")))?;
    if name.trim().is_empty() {
        return Ok(Message::assistant(trimmed));
    }
    let kind = ToolKind::from_name(name).ok_or_else(|| LlmError::UnknownTool(name.to_string()))?;
    let args = value.get("args").cloned().unwrap_or_else(|| serde_json::json!({}));

    Ok(Message::assistant_with_tool_calls(
        prefix.trim(),
        vec![ToolCall::new(kind, args)],
    ))
}

fn render_tool_calls(msg: &Message) -> String {
    let calls = msg
        .tool_calls
        .iter()
        .map(|tc| serde_json::json!({ "tool": tc.tool.name(), "args": tc.args }).to_string())
        .collect::<Vec<_>>()
        .join("\n");
    if msg.content.is_empty() {
        calls
    } else {
        format!("{}\n{}", msg.content, calls)
    }
}

/// OpenAI 兼容客户端（Ollama、OpenAI、DeepSeek 等）
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    tokens: TokenCounter,
}

impl OpenAiClient {
    /// api_key 缺省时读 OPENAI_API_KEY；本地 Ollama 不校验 key
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let key = match api_key {
            Some(k) => k.to_string(),
            None => std::env::var("OPENAI_API_KEY").unwrap_or_else(|_| "ollama".to_string()),
        };
        let mut config = OpenAIConfig::new().with_api_key(key);
        if let Some(url) = base_url {
            config = config.with_api_base(url);
        }
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            tokens: TokenCounter::default(),
        }
    }

    fn to_openai_messages(
        &self,
        system_prompt: &str,
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        let build_err = |e: async_openai::error::OpenAIError| LlmError::Request(e.to_string());
        let mut out = Vec::with_capacity(messages.len() + 1);
        out.push(ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt.to_string())
                .build()
                .map_err(build_err)?,
        ));
        for m in messages {
            let converted = match m.role {
                Role::System => ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(build_err)?,
                ),
                Role::User => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(build_err)?,
                ),
                Role::Assistant => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .content(render_tool_calls(m))
                        .build()
                        .map_err(build_err)?,
                ),
                // 文本协议下工具输出以 Observation 形式回给模型
                Role::Tool => ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(format!(
                            "Observation from {}: {}",
                            m.tool_name.map(|t| t.name()).unwrap_or("tool"),
                            m.content
                        ))
                        .build()
                        .map_err(build_err)?,
                ),
            };
            out.push(converted);
        }
        Ok(out)
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.tokens.totals()
    }

    async fn generate(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<Message, LlmError> {
        let system = compose_system_prompt(system_prompt, tools);
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(0.0)
            .messages(self.to_openai_messages(&system, messages)?)
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        if let Some(usage) = &response.usage {
            self.tokens.record(usage.prompt_tokens, usage.completion_tokens);
        }

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        tracing::debug!(model = %self.model, reply = %content, "model reply");

        if tools.is_empty() {
            Ok(Message::assistant(strip_think(&content).trim()))
        } else {
            parse_reply(&content)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::tool_schemas;

    #[test]
    fn test_plain_text_is_final_answer() {
        let msg = parse_reply("Port 22 is open.").unwrap();
        assert!(!msg.has_tool_calls());
        assert_eq!(msg.content, "Port 22 is open.");
    }

    #[test]
    fn test_json_tool_call_with_reasoning_prefix() {
        let out = "Disallowed: -sT with -f.\n{\"tool\": \"execute_nmap_scan\", \"args\": {\"command\": \"nmap -sV 127.0.0.1\"}}";
        let msg = parse_reply(out).unwrap();
        assert_eq!(msg.content, "Disallowed: -sT with -f.");
        let tc = &msg.tool_calls[0];
        assert_eq!(tc.tool, ToolKind::ExecuteNmapScan);
        assert_eq!(tc.arg_str("command"), Some("nmap -sV 127.0.0.1"));
    }

    #[test]
    fn test_fenced_json_and_think_block() {
        let out = "<think>need docs first</think>\n```json\n{\"tool\": \"retrieve_context\", \"args\": {\"query\": \"port scan\"}}\n```";
        let msg = parse_reply(out).unwrap();
        assert_eq!(msg.tool_calls[0].tool, ToolKind::RetrieveContext);
        assert_eq!(msg.tool_calls[0].arg_str("query"), Some("port scan"));
    }

    #[test]
    fn test_unknown_tool_is_error() {
        let err = parse_reply(r#"{"tool": "shell", "args": {"command": "ls"}}"#).unwrap_err();
        assert_eq!(err, LlmError::UnknownTool("shell".to_string()));
    }

    #[test]
    fn test_braces_without_tool_field_are_text() {
        let msg = parse_reply("Result: {22/tcp open}").unwrap();
        assert!(!msg.has_tool_calls());
        let msg = parse_reply(r#"Summary {"ports": [22]}"#).unwrap();
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn test_compose_system_prompt_mentions_tools_only_when_given() {
        assert_eq!(compose_system_prompt("audit", &[]), "audit");
        let full = compose_system_prompt("base", &tool_schemas());
        assert!(full.starts_with("base"));
        assert!(full.contains("execute_nmap_scan"));
        assert!(full.contains("\"args\""));
    }

    #[test]
    fn test_token_counter_accumulates() {
        let counter = TokenCounter::default();
        counter.record(10, 4);
        counter.record(5, 1);
        assert_eq!(counter.totals(), (15, 5, 20));
    }
}
