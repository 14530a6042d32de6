//! Critic：执行前的命令审核
//!
//! 在扫描命令执行前，用独立提示词的第二次模型调用，把提议的命令与最近一次检索到的文档对照，
//! 给出 VALID / INVALID(reason)。参数缺失在本地直接驳回，不调用模型。
//!
//! 通过配置可以：
//! - 使用与 Proposer 不同的模型（避免自我认同）
//! - 调整裸 VALID 回复的长度上限

use std::sync::Arc;

use serde::Serialize;

use crate::config::AgentSection;
use crate::core::{AgentError, ConversationState};
use crate::llm::LlmClient;
use crate::memory::{Message, ToolCall};
use crate::react::prompts::critic_request;
use crate::tools::ToolKind;

/// Critic 裁决
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Valid,
    Invalid(String),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }
}

/// 解析 Critic 回复：优先结构化 JSON，否则只接受足够短的裸 VALID
pub fn parse_verdict(reply: &str, valid_max_chars: usize) -> Verdict {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return Verdict::Invalid("critic returned an empty verdict".to_string());
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&trimmed[start..=end]) {
                if let Some(verdict) = value.get("verdict").and_then(|v| v.as_str()) {
                    if verdict.trim().eq_ignore_ascii_case("VALID") {
                        return Verdict::Valid;
                    }
                    let reason = value
                        .get("reason")
                        .and_then(|r| r.as_str())
                        .map(str::trim)
                        .filter(|r| !r.is_empty())
                        .unwrap_or(trimmed);
                    return Verdict::Invalid(reason.to_string());
                }
            }
        }
    }

    let bare = trimmed
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*'))
        .trim_end_matches('.')
        .trim();
    if bare.eq_ignore_ascii_case("VALID") && trimmed.chars().count() < valid_max_chars {
        Verdict::Valid
    } else {
        Verdict::Invalid(trimmed.to_string())
    }
}

pub struct Critic {
    llm: Arc<dyn LlmClient>,
    prompt: String,
    valid_max_chars: usize,
}

impl Critic {
    /// 从配置创建 Critic（需要外部传入 LLM 实例）
    pub fn from_config(llm: Arc<dyn LlmClient>, config: &AgentSection) -> Self {
        Self {
            llm,
            prompt: config.critic_prompt.clone(),
            valid_max_chars: config.critic_valid_max_chars,
        }
    }

    pub fn new(llm: Arc<dyn LlmClient>, prompt: impl Into<String>) -> Self {
        Self {
            llm,
            prompt: prompt.into(),
            valid_max_chars: 100,
        }
    }

    pub fn with_valid_max_chars(mut self, n: usize) -> Self {
        self.valid_max_chars = n;
        self
    }

    /// 审核最近一条 assistant 消息里的全部扫描调用，遇到第一个 INVALID 即停止
    pub async fn critique(&self, state: &ConversationState) -> Result<Verdict, AgentError> {
        let Some(msg) = state.history().last_assistant() else {
            return Ok(Verdict::Valid);
        };
        let context = state.grounding().unwrap_or("");
        for call in msg.calls_to(ToolKind::ExecuteNmapScan) {
            let verdict = self.critique_call(call, context).await?;
            if !verdict.is_valid() {
                return Ok(verdict);
            }
        }
        Ok(Verdict::Valid)
    }

    async fn critique_call(&self, call: &ToolCall, context: &str) -> Result<Verdict, AgentError> {
        let Some(command) = call.required_arg() else {
            return Ok(Verdict::Invalid(format!(
                "SYSTEM ERROR: The '{}' tool requires a '{}' argument containing the full Nmap \
                 command string. You provided arguments: {}. Please retry with the correct format.",
                call.tool,
                call.tool.required_arg(),
                call.args
            )));
        };

        if context.is_empty() {
            tracing::warn!(command = %command, "critiquing command without retrieved documentation");
        }

        let request = [Message::user(critic_request(context, command))];
        let reply = self.llm.generate(&self.prompt, &request, &[]).await?;
        let verdict = parse_verdict(&reply.content, self.valid_max_chars);
        tracing::info!(command = %command, valid = verdict.is_valid(), "critic verdict");
        Ok(verdict)
    }
}
