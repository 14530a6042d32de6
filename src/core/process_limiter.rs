//! 扫描进程数上限
//!
//! 多个运行共享同一个 ActionExecutor 时，用 Semaphore 限制同时存活的外部进程数。
//! 达到上限时按策略排队等待或立即拒绝。

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

/// 达到上限时的处理策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitPolicy {
    /// 等待空闲许可
    #[default]
    Queue,
    /// 立即拒绝
    Reject,
}

/// 进程许可池
#[derive(Clone, Debug)]
pub struct ProcessLimiter {
    semaphore: Arc<Semaphore>,
    policy: LimitPolicy,
}

impl ProcessLimiter {
    pub fn new(max_concurrent: usize, policy: LimitPolicy) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            policy,
        }
    }

    /// 获取一个进程许可；Reject 策略下无空闲许可时返回 None
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        match self.policy {
            LimitPolicy::Queue => self.semaphore.clone().acquire_owned().await.ok(),
            LimitPolicy::Reject => match self.semaphore.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(TryAcquireError::NoPermits) | Err(TryAcquireError::Closed) => None,
            },
        }
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

impl Default for ProcessLimiter {
    fn default() -> Self {
        Self::new(3, LimitPolicy::Queue)
    }
}
