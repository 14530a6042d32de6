//! 推理层：Proposer、Critic、人工审批与 Orchestrator 状态机

pub mod approval;
pub mod critic;
pub mod events;
pub mod graph;
pub mod prompts;
pub mod proposer;

pub use approval::{
    approval_channel, ApprovalDecision, ApprovalRequest, Approver, ChannelApprover, PendingAction,
};
pub use critic::{parse_verdict, Critic, Verdict};
pub use events::RunEvent;
pub use graph::{Agent, RunOptions, RunOutcome, DEFAULT_MAX_ITERATIONS};
pub use proposer::Proposer;
