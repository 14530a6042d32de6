//! RedTeam - 带 Critic 闸门的 nmap 扫描智能体
//!
//! 模块划分：
//! - **agent**: 按配置组装 Agent
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与运行级失败、状态机阶段、扫描进程上限
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Scripted Mock）
//! - **memory**: 只追加的对话历史与 JSONL 持久化
//! - **observability**: tracing 初始化
//! - **react**: Proposer、Critic、人工审批与 Orchestrator 状态机
//! - **tools**: 封闭工具集合、文档检索、nmap 执行器

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use agent::{assemble_agent, build_agent};
pub use react::{Agent, RunEvent, RunOptions, RunOutcome};
