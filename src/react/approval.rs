//! 人工审批（HITL）
//!
//! Critic 通过后、真正执行前，运行可进入 AWAITING_APPROVAL：向 Approver 提交待执行动作并等待决定。
//! ChannelApprover 把请求发到 mpsc 通道，每个请求携带 oneshot 回执；调用方在另一端逐个批复。
//! 等待期间不轮询，Orchestrator 同时监听取消信号。

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

/// 待审批的扫描动作
#[derive(Debug, Clone, Serialize)]
pub struct PendingAction {
    pub call_id: String,
    pub command: String,
}

/// 审批结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approve,
    Deny(String),
}

#[async_trait]
pub trait Approver: Send + Sync {
    async fn request(&self, action: PendingAction) -> ApprovalDecision;
}

/// 通道另一端收到的审批请求
#[derive(Debug)]
pub struct ApprovalRequest {
    pub action: PendingAction,
    reply: oneshot::Sender<ApprovalDecision>,
}

impl ApprovalRequest {
    pub fn approve(self) {
        let _ = self.reply.send(ApprovalDecision::Approve);
    }

    pub fn deny(self, reason: impl Into<String>) {
        let _ = self.reply.send(ApprovalDecision::Deny(reason.into()));
    }
}

/// 基于通道的 Approver
#[derive(Clone, Debug)]
pub struct ChannelApprover {
    tx: mpsc::Sender<ApprovalRequest>,
}

/// 创建审批通道：Approver 交给 Agent，Receiver 交给审批方
pub fn approval_channel(buffer: usize) -> (ChannelApprover, mpsc::Receiver<ApprovalRequest>) {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    (ChannelApprover { tx }, rx)
}

#[async_trait]
impl Approver for ChannelApprover {
    async fn request(&self, action: PendingAction) -> ApprovalDecision {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(ApprovalRequest { action, reply }).await.is_err() {
            return ApprovalDecision::Deny("approval channel closed".to_string());
        }
        // 审批方丢弃请求视为拒绝
        rx.await
            .unwrap_or_else(|_| ApprovalDecision::Deny("approval request dropped".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action() -> PendingAction {
        PendingAction {
            call_id: "call_1".to_string(),
            command: "nmap -sV 127.0.0.1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_approve_round_trip() {
        let (approver, mut rx) = approval_channel(1);
        let reviewer = tokio::spawn(async move {
            let req = rx.recv().await.unwrap();
            assert_eq!(req.action.command, "nmap -sV 127.0.0.1");
            req.approve();
        });
        assert_eq!(approver.request(action()).await, ApprovalDecision::Approve);
        reviewer.await.unwrap();
    }

    #[tokio::test]
    async fn test_deny_carries_reason() {
        let (approver, mut rx) = approval_channel(1);
        tokio::spawn(async move {
            rx.recv().await.unwrap().deny("target out of scope");
        });
        assert_eq!(
            approver.request(action()).await,
            ApprovalDecision::Deny("target out of scope".to_string())
        );
    }

    #[tokio::test]
    async fn test_closed_channel_denies() {
        let (approver, rx) = approval_channel(1);
        drop(rx);
        assert!(matches!(approver.request(action()).await, ApprovalDecision::Deny(_)));

        let (approver, mut rx) = approval_channel(1);
        tokio::spawn(async move {
            drop(rx.recv().await);
        });
        assert!(matches!(approver.request(action()).await, ApprovalDecision::Deny(_)));
    }
}
