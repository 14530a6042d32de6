//! Orchestrator：带 Critic 闸门的有界状态机
//!
//! PROPOSE -> CRITIQUE -> [AWAITING_APPROVAL] -> EXECUTE -> PROPOSE ... -> DONE。
//! 每次迁移完整结束后才进入下一状态；取消信号在每次迁移前检查。
//! Proposer 调用次数达到上限仍未给出最终回复时以 BoundExceeded 结束，与依赖故障可区分。

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, ConversationState, FailureKind, GraphState, RunError};
use crate::memory::{History, Message, ToolCall};
use crate::react::prompts::{criticism_feedback, denial_feedback};
use crate::react::{
    ApprovalDecision, Approver, Critic, PendingAction, Proposer, RunEvent, Verdict,
};
use crate::tools::{render_passages, ActionExecutor, RetrievalClient, ToolKind};

/// 默认 Proposer 调用上限
pub const DEFAULT_MAX_ITERATIONS: usize = 20;
/// 事件预览最大字符数
const PREVIEW_CHARS: usize = 200;

/// 一次运行的正常结局
#[derive(Debug)]
pub enum RunOutcome {
    /// 模型给出了最终回复
    Completed {
        answer: Message,
        llm_calls: usize,
        history: History,
    },
    /// 调用方取消；state 为被取消时即将进入的状态
    Cancelled {
        state: GraphState,
        llm_calls: usize,
        history: History,
    },
}

impl RunOutcome {
    pub fn answer(&self) -> Option<&Message> {
        match self {
            RunOutcome::Completed { answer, .. } => Some(answer),
            RunOutcome::Cancelled { .. } => None,
        }
    }

    pub fn history(&self) -> &History {
        match self {
            RunOutcome::Completed { history, .. } | RunOutcome::Cancelled { history, .. } => history,
        }
    }

    pub fn llm_calls(&self) -> usize {
        match self {
            RunOutcome::Completed { llm_calls, .. } | RunOutcome::Cancelled { llm_calls, .. } => {
                *llm_calls
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled { .. })
    }
}

/// 运行选项：取消令牌（必需）与可选事件通道
#[derive(Default)]
pub struct RunOptions<'a> {
    pub cancel_token: CancellationToken,
    pub event_tx: Option<&'a UnboundedSender<RunEvent>>,
}

impl<'a> RunOptions<'a> {
    pub fn new(cancel_token: CancellationToken) -> Self {
        Self {
            cancel_token,
            event_tx: None,
        }
    }

    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }
}

fn preview(text: &str) -> String {
    let head: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().count() > PREVIEW_CHARS {
        format!("{}...", head)
    } else {
        head
    }
}

/// 单次运行的可变部分，只属于这一次运行
struct RunContext<'a> {
    conv: ConversationState,
    state: GraphState,
    /// 等待审核/执行的 assistant 消息；驳回或拒绝时清空，执行时取走
    pending: Option<Message>,
    answer: Option<Message>,
    last_verdict: Option<Verdict>,
    event_tx: Option<&'a UnboundedSender<RunEvent>>,
}

impl<'a> RunContext<'a> {
    fn new(query: &str, event_tx: Option<&'a UnboundedSender<RunEvent>>) -> Self {
        Self {
            conv: ConversationState::new(query),
            state: GraphState::Propose,
            pending: None,
            answer: None,
            last_verdict: None,
            event_tx,
        }
    }

    fn emit(&self, ev: RunEvent) {
        if let Some(tx) = self.event_tx {
            let _ = tx.send(ev);
        }
    }

    /// 待执行消息中的全部扫描命令，按出现顺序
    fn pending_scans(&self) -> Vec<PendingAction> {
        self.pending
            .iter()
            .flat_map(|m| m.calls_to(ToolKind::ExecuteNmapScan))
            .map(|tc| PendingAction {
                call_id: tc.call_id.clone(),
                command: tc.required_arg().unwrap_or_default().to_string(),
            })
            .collect()
    }

    fn fail(self, kind: FailureKind) -> RunError {
        tracing::error!(state = %self.state, error = %kind, "run failed");
        self.emit(RunEvent::Error {
            state: self.state,
            text: kind.to_string(),
        });
        RunError {
            kind,
            state: self.state,
            last_verdict: self.last_verdict,
            history: self.conv.into_history(),
        }
    }

    fn cancelled(self) -> RunOutcome {
        tracing::info!(state = %self.state, "run cancelled");
        self.emit(RunEvent::Done {
            llm_calls: self.conv.llm_calls(),
            cancelled: true,
        });
        RunOutcome::Cancelled {
            state: self.state,
            llm_calls: self.conv.llm_calls(),
            history: self.conv.into_history(),
        }
    }

    fn complete(mut self) -> RunOutcome {
        let llm_calls = self.conv.llm_calls();
        self.emit(RunEvent::StateEntered {
            state: GraphState::Done,
            llm_calls,
        });
        self.emit(RunEvent::Done {
            llm_calls,
            cancelled: false,
        });
        let answer = self
            .answer
            .take()
            .or_else(|| self.conv.history().last_assistant().cloned())
            .unwrap_or_else(|| Message::assistant(""));
        RunOutcome::Completed {
            answer,
            llm_calls,
            history: self.conv.into_history(),
        }
    }
}

/// 组装好的智能体：可被多个并发运行共享，每次运行拥有独立的 ConversationState
pub struct Agent {
    proposer: Proposer,
    critic: Critic,
    retrieval: RetrievalClient,
    executor: ActionExecutor,
    approver: Option<Arc<dyn Approver>>,
    max_iterations: usize,
}

impl Agent {
    pub fn new(
        proposer: Proposer,
        critic: Critic,
        retrieval: RetrievalClient,
        executor: ActionExecutor,
    ) -> Self {
        Self {
            proposer,
            critic,
            retrieval,
            executor,
            approver: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// 设置人工审批；Critic 通过的扫描命令须经批准才执行
    pub fn with_approver(mut self, approver: Arc<dyn Approver>) -> Self {
        self.approver = Some(approver);
        self
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn proposer(&self) -> &Proposer {
        &self.proposer
    }

    pub async fn run(&self, query: &str) -> Result<RunOutcome, RunError> {
        self.run_with(query, RunOptions::default()).await
    }

    pub async fn run_with(&self, query: &str, opts: RunOptions<'_>) -> Result<RunOutcome, RunError> {
        let mut run = RunContext::new(query, opts.event_tx);
        tracing::info!(query = %query, max_iterations = self.max_iterations, "run started");

        loop {
            if run.state == GraphState::Done {
                break;
            }
            if opts.cancel_token.is_cancelled() {
                return Ok(run.cancelled());
            }
            run.emit(RunEvent::StateEntered {
                state: run.state,
                llm_calls: run.conv.llm_calls(),
            });
            tracing::debug!(state = %run.state, llm_calls = run.conv.llm_calls(), "enter state");

            run.state = match run.state {
                GraphState::Propose => {
                    if run.conv.llm_calls() >= self.max_iterations {
                        let limit = self.max_iterations;
                        return Err(run.fail(FailureKind::BoundExceeded { limit }));
                    }
                    let msg = match self.proposer.propose(&mut run.conv).await {
                        Ok(m) => m,
                        Err(e) => return Err(run.fail(FailureKind::Infrastructure(e))),
                    };
                    run.emit(RunEvent::Proposal {
                        preview: preview(&msg.content),
                        tools: msg.tool_calls.iter().map(|tc| tc.tool).collect(),
                    });
                    run.conv.append(msg.clone());
                    if msg.has_tool_calls() {
                        run.pending = Some(msg);
                        GraphState::Critique
                    } else {
                        run.answer = Some(msg);
                        GraphState::Done
                    }
                }

                GraphState::Critique => {
                    if let Err(e) = self.retrieve_before_audit(&mut run).await {
                        return Err(run.fail(FailureKind::Infrastructure(e)));
                    }
                    let verdict = match self.critic.critique(&run.conv).await {
                        Ok(v) => v,
                        Err(e) => return Err(run.fail(FailureKind::Infrastructure(e))),
                    };
                    let scans = run.pending_scans();
                    run.emit(RunEvent::Verdict {
                        commands: scans.iter().map(|a| a.command.clone()).collect(),
                        verdict: verdict.clone(),
                    });
                    run.last_verdict = Some(verdict.clone());
                    match verdict {
                        Verdict::Invalid(reason) => {
                            tracing::warn!(reason = %preview(&reason), "proposal rejected by critic");
                            run.pending = None;
                            run.conv.append(Message::user(criticism_feedback(&reason)));
                            GraphState::Propose
                        }
                        Verdict::Valid if self.approver.is_some() && !scans.is_empty() => {
                            GraphState::AwaitingApproval
                        }
                        Verdict::Valid => GraphState::Execute,
                    }
                }

                GraphState::AwaitingApproval => {
                    let mut next = GraphState::Execute;
                    if let Some(approver) = self.approver.as_ref() {
                        // 每条扫描命令单独审批，任一被拒则整条消息作废
                        for action in run.pending_scans() {
                            run.emit(RunEvent::ApprovalRequested {
                                command: action.command.clone(),
                            });
                            let decision = tokio::select! {
                                d = approver.request(action) => d,
                                _ = opts.cancel_token.cancelled() => return Ok(run.cancelled()),
                            };
                            run.emit(RunEvent::ApprovalResolved {
                                decision: decision.clone(),
                            });
                            if let ApprovalDecision::Deny(reason) = decision {
                                tracing::warn!(reason = %reason, "scan denied by approver");
                                run.pending = None;
                                run.conv.append(Message::user(denial_feedback(&reason)));
                                next = GraphState::Propose;
                                break;
                            }
                        }
                    }
                    next
                }

                GraphState::Execute => {
                    if let Some(msg) = run.pending.take() {
                        for call in &msg.tool_calls {
                            if let Err(e) = self.execute_call(&mut run, call).await {
                                return Err(run.fail(FailureKind::Infrastructure(e)));
                            }
                        }
                    }
                    GraphState::Propose
                }

                GraphState::Done => break,
            };
        }

        tracing::info!(llm_calls = run.conv.llm_calls(), "run finished");
        Ok(run.complete())
    }

    /// 同一消息既检索又扫描时，先执行检索，使 Critic 看到本轮取回的文档；
    /// 已执行的检索调用从待执行消息中移除
    async fn retrieve_before_audit(&self, run: &mut RunContext<'_>) -> Result<(), AgentError> {
        let Some(msg) = run.pending.take() else {
            return Ok(());
        };
        if msg.calls_to(ToolKind::ExecuteNmapScan).next().is_none() {
            run.pending = Some(msg);
            return Ok(());
        }
        let (lookups, rest): (Vec<ToolCall>, Vec<ToolCall>) = msg
            .tool_calls
            .into_iter()
            .partition(|tc| tc.tool == ToolKind::RetrieveContext);
        for call in &lookups {
            self.execute_call(run, call).await?;
        }
        run.pending = Some(Message::assistant_with_tool_calls(msg.content, rest));
        Ok(())
    }

    /// 执行一次工具调用并把输出写入历史
    async fn execute_call(&self, run: &mut RunContext<'_>, call: &ToolCall) -> Result<(), AgentError> {
        let content = self.dispatch(call).await?;
        run.emit(RunEvent::ToolResult {
            tool: call.tool,
            preview: preview(&content),
        });
        run.conv.append(Message::tool(call, content));
        Ok(())
    }

    /// 只有检索后端故障是错误；参数缺失写成错误输出交还模型
    async fn dispatch(&self, call: &ToolCall) -> Result<String, AgentError> {
        let Some(arg) = call.required_arg() else {
            return Ok(format!(
                "Error: the '{}' tool requires a '{}' argument. You provided arguments: {}.",
                call.tool,
                call.tool.required_arg(),
                call.args
            ));
        };
        match call.tool {
            ToolKind::RetrieveContext => Ok(render_passages(&self.retrieval.retrieve(arg).await?)),
            ToolKind::ExecuteNmapScan => Ok(self.executor.execute(arg).await.render()),
        }
    }
}
