//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `REDTEAM__*` 覆盖（双下划线表示嵌套，如 `REDTEAM__AGENT__MAX_ITERATIONS=10`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::core::LimitPolicy;
use crate::react::prompts::{DEFAULT_CRITIC_PROMPT, DEFAULT_SYSTEM_PROMPT};
use crate::react::DEFAULT_MAX_ITERATIONS;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub executor: ExecutorSection,
    pub retrieval: RetrievalSection,
}

/// [llm] 段：OpenAI 兼容端点与模型
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_base_url")]
    pub base_url: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    /// Critic 使用的模型；未设置时与 Proposer 相同
    #[serde(default)]
    pub critic_model: Option<String>,
    /// 未设置时读取 OPENAI_API_KEY
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_base_url() -> Option<String> {
    Some("http://localhost:11434/v1".to_string())
}

fn default_model() -> String {
    "qwen3:8b".to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            critic_model: None,
            api_key: None,
        }
    }
}

impl LlmSection {
    pub fn critic_model(&self) -> &str {
        self.critic_model.as_deref().unwrap_or(&self.model)
    }
}

/// [agent] 段：迭代上限、提示词、Critic 与人工审批
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_critic_prompt")]
    pub critic_prompt: String,
    /// 裸 VALID 回复的最大长度，超过视为解释性回复
    #[serde(default = "default_critic_valid_max_chars")]
    pub critic_valid_max_chars: usize,
    /// 扫描命令执行前是否需要人工批准
    #[serde(default)]
    pub require_approval: bool,
}

fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_critic_prompt() -> String {
    DEFAULT_CRITIC_PROMPT.to_string()
}

fn default_critic_valid_max_chars() -> usize {
    100
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            system_prompt: default_system_prompt(),
            critic_prompt: default_critic_prompt(),
            critic_valid_max_chars: default_critic_valid_max_chars(),
            require_approval: false,
        }
    }
}

/// [executor] 段：命令前缀、超时与进程上限
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorSection {
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// 单次扫描超时（秒）
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default)]
    pub limit_policy: LimitPolicy,
}

fn default_command_prefix() -> String {
    "nmap".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_concurrent() -> usize {
    3
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            command_prefix: default_command_prefix(),
            timeout_secs: default_timeout_secs(),
            max_concurrent: default_max_concurrent(),
            limit_policy: LimitPolicy::default(),
        }
    }
}

/// [retrieval] 段：文档目录、分块与 top-k
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalSection {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_docs_dir")]
    pub docs_dir: PathBuf,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_k() -> usize {
    5
}

fn default_docs_dir() -> PathBuf {
    PathBuf::from("docs")
}

fn default_chunk_size() -> usize {
    1000
}

fn default_chunk_overlap() -> usize {
    200
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            k: default_k(),
            docs_dir: default_docs_dir(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 REDTEAM__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 REDTEAM__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("REDTEAM")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.max_iterations, 20);
        assert_eq!(cfg.agent.critic_valid_max_chars, 100);
        assert!(!cfg.agent.require_approval);
        assert_eq!(cfg.executor.command_prefix, "nmap");
        assert_eq!(cfg.executor.timeout_secs, 300);
        assert_eq!(cfg.executor.limit_policy, LimitPolicy::Queue);
        assert_eq!(cfg.retrieval.chunk_size, 1000);
        assert_eq!(cfg.retrieval.chunk_overlap, 200);
        assert_eq!(cfg.llm.critic_model(), "qwen3:8b");
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[llm]\nmodel = \"llama3\"\ncritic_model = \"qwen3:14b\"\n\n\
             [agent]\nmax_iterations = 7\nrequire_approval = true\n\n\
             [executor]\nlimit_policy = \"reject\"\nmax_concurrent = 1\n"
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.llm.model, "llama3");
        assert_eq!(cfg.llm.critic_model(), "qwen3:14b");
        assert_eq!(cfg.agent.max_iterations, 7);
        assert!(cfg.agent.require_approval);
        assert_eq!(cfg.executor.limit_policy, LimitPolicy::Reject);
        assert_eq!(cfg.executor.max_concurrent, 1);
        // 未出现的键保持默认
        assert_eq!(cfg.executor.command_prefix, "nmap");
        assert_eq!(cfg.retrieval.k, 5);
    }
}
