//! Agent 错误类型与运行级失败
//!
//! AgentError 是组件级故障（模型、检索、解析）；RunError 是一次运行的终止结果，
//! 附带失败时所处状态、最后一次裁决与完整历史，便于调用方诊断。

use thiserror::Error;

use crate::core::GraphState;
use crate::llm::LlmError;
use crate::memory::History;
use crate::react::Verdict;

/// 组件运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    LlmError(#[from] LlmError),

    #[error("Retrieval error: {0}")]
    RetrievalError(String),

    #[error("Hallucinated tool: {0}")]
    HallucinatedTool(String),
}

/// 运行失败的类别：依赖故障与无法收敛需要可区分
#[derive(Error, Debug)]
pub enum FailureKind {
    /// 模型或检索不可用、模型输出无法解析等
    #[error("infrastructure fault: {0}")]
    Infrastructure(#[source] AgentError),

    /// 达到最大 Proposer 调用次数仍未给出最终回复
    #[error("iteration bound exceeded after {limit} proposals")]
    BoundExceeded { limit: usize },
}

/// 一次运行的结构化失败
#[derive(Error, Debug)]
#[error("run failed in state {state}: {kind}")]
pub struct RunError {
    pub kind: FailureKind,
    /// 失败时所在状态
    pub state: GraphState,
    /// 最近一次 Critic 裁决
    pub last_verdict: Option<Verdict>,
    /// 失败前的完整历史
    pub history: History,
}

impl RunError {
    pub fn is_bound_exceeded(&self) -> bool {
        matches!(self.kind, FailureKind::BoundExceeded { .. })
    }

    pub fn is_infrastructure(&self) -> bool {
        matches!(self.kind, FailureKind::Infrastructure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_error_display_names_state() {
        let err = RunError {
            kind: FailureKind::BoundExceeded { limit: 3 },
            state: GraphState::Propose,
            last_verdict: Some(Verdict::Invalid("mtu".to_string())),
            history: History::new(),
        };
        let text = err.to_string();
        assert!(text.contains("PROPOSE"));
        assert!(text.contains("3 proposals"));
        assert!(err.is_bound_exceeded());
        assert!(!err.is_infrastructure());
    }

    #[test]
    fn test_llm_error_converts() {
        let err: AgentError = LlmError::Request("connection refused".to_string()).into();
        assert!(err.to_string().contains("connection refused"));
    }
}
