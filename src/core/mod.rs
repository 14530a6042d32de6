//! 核心层：错误与运行级失败、状态机阶段与对话状态、扫描进程上限

pub mod error;
pub mod process_limiter;
pub mod state;

pub use error::{AgentError, FailureKind, RunError};
pub use process_limiter::{LimitPolicy, ProcessLimiter};
pub use state::{ConversationState, GraphState};
