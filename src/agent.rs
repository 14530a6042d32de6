//! Agent 组装
//!
//! build_agent 按配置构建完整 Agent：OpenAI 兼容模型（Critic 可用独立模型）、
//! 本地文档关键词索引、Shell 执行器与进程上限。
//! assemble_agent 接收已构建的依赖，便于替换为测试替身。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::ProcessLimiter;
use crate::llm::{LlmClient, OpenAiClient};
use crate::react::{Agent, Critic, Proposer};
use crate::tools::{
    ActionExecutor, ChunkingConfig, CommandRunner, KeywordIndex, RetrievalClient, SearchBackend,
    ShellRunner,
};

/// 用给定依赖按配置组装 Agent（不含审批方）
pub fn assemble_agent(
    cfg: &AppConfig,
    proposer_llm: Arc<dyn LlmClient>,
    critic_llm: Arc<dyn LlmClient>,
    search: Arc<dyn SearchBackend>,
    runner: Arc<dyn CommandRunner>,
) -> Agent {
    let proposer = Proposer::new(proposer_llm, cfg.agent.system_prompt.clone());
    let critic = Critic::from_config(critic_llm, &cfg.agent);
    let retrieval = RetrievalClient::new(search, cfg.retrieval.k);
    let executor = ActionExecutor::new(runner, &cfg.executor.command_prefix, cfg.executor.timeout_secs)
        .with_limiter(ProcessLimiter::new(
            cfg.executor.max_concurrent,
            cfg.executor.limit_policy,
        ));
    Agent::new(proposer, critic, retrieval, executor).with_max_iterations(cfg.agent.max_iterations)
}

/// 从配置构建真实 Agent
pub fn build_agent(cfg: &AppConfig) -> Agent {
    let base_url = cfg.llm.base_url.as_deref();
    let api_key = cfg.llm.api_key.as_deref();
    let proposer_llm: Arc<dyn LlmClient> =
        Arc::new(OpenAiClient::new(base_url, &cfg.llm.model, api_key));
    let critic_llm: Arc<dyn LlmClient> = if cfg.llm.critic_model() == cfg.llm.model {
        proposer_llm.clone()
    } else {
        Arc::new(OpenAiClient::new(base_url, cfg.llm.critic_model(), api_key))
    };

    let chunking = ChunkingConfig {
        chunk_size: cfg.retrieval.chunk_size,
        chunk_overlap: cfg.retrieval.chunk_overlap,
        ..ChunkingConfig::default()
    };
    let index = KeywordIndex::load_dir(&cfg.retrieval.docs_dir, &chunking);
    if index.is_empty() {
        tracing::warn!(dir = %cfg.retrieval.docs_dir.display(), "no documentation indexed; critic will see empty context");
    } else {
        tracing::info!(chunks = index.len(), dir = %cfg.retrieval.docs_dir.display(), "documentation indexed");
    }

    tracing::info!(
        model = %cfg.llm.model,
        critic_model = %cfg.llm.critic_model(),
        max_iterations = cfg.agent.max_iterations,
        "agent built"
    );
    assemble_agent(
        cfg,
        proposer_llm,
        critic_llm,
        Arc::new(index),
        Arc::new(ShellRunner),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{tool_reply, ScriptedLlmClient};
    use crate::memory::Message;
    use crate::tools::{RetrievedPassage, StaticSearch, ToolKind};
    use serde_json::json;

    #[tokio::test]
    async fn test_assembled_agent_honours_configured_bound() {
        let mut cfg = AppConfig::default();
        cfg.agent.max_iterations = 2;
        let proposer = Arc::new(
            ScriptedLlmClient::new(vec![]).with_fallback(tool_reply(
                ToolKind::RetrieveContext,
                json!({ "query": "syn scan" }),
            )),
        );
        let critic = Arc::new(ScriptedLlmClient::new(vec![]));
        let search = Arc::new(StaticSearch::new(vec![RetrievedPassage::new(
            "-sS is a SYN scan",
            "nmap.md",
        )]));
        let agent = assemble_agent(
            &cfg,
            proposer.clone(),
            critic.clone(),
            search,
            Arc::new(ShellRunner),
        );

        let err = agent.run("syn scan localhost").await.unwrap_err();
        assert!(err.is_bound_exceeded());
        assert_eq!(proposer.call_count(), 2);
        // 只有检索调用时不会请求 Critic 模型
        assert_eq!(critic.call_count(), 0);
    }

    #[tokio::test]
    async fn test_assembled_agent_uses_configured_prompt() {
        let mut cfg = AppConfig::default();
        cfg.agent.system_prompt = "CUSTOM".to_string();
        let proposer = Arc::new(ScriptedLlmClient::new(vec![Message::assistant("done")]));
        let agent = assemble_agent(
            &cfg,
            proposer.clone(),
            Arc::new(ScriptedLlmClient::new(vec![])),
            Arc::new(StaticSearch::new(vec![])),
            Arc::new(ShellRunner),
        );
        let outcome = agent.run("hi").await.unwrap();
        assert_eq!(outcome.answer().map(|m| m.content.as_str()), Some("done"));
        assert_eq!(proposer.requests()[0].system_prompt, "CUSTOM");
    }
}
