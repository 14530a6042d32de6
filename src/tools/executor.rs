//! Action Executor
//!
//! 持有 CommandRunner、命令前缀、固定超时与进程上限。execute(command) 永不返回错误：
//! 前缀不符、超时、启动失败都转成带标签的 ExecutionResult，作为工具输出交给模型自行调整。
//! 每次调用输出一行结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::core::ProcessLimiter;
use crate::tools::runner::{CommandRunner, RunnerFault};

/// 执行结果标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// 进程正常结束（退出码可能非零）
    Completed { exit_code: i32 },
    /// 命令未通过前缀校验，未启动任何进程
    ValidationFailed,
    Timeout,
    SystemError,
}

/// 执行结果：标签 + 输出文本（stdout 在前，stderr 在后）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    #[serde(flatten)]
    pub status: ExecutionStatus,
    pub output: String,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self.status, ExecutionStatus::Completed { exit_code: 0 })
    }

    /// 渲染为写入历史的工具输出
    pub fn render(&self) -> String {
        match self.status {
            ExecutionStatus::Completed { exit_code: 0 } => {
                format!("Scan Execution Successful:\n{}", self.output)
            }
            ExecutionStatus::Completed { exit_code } => {
                format!("Nmap execution failed (Exit Code {}):\n{}", exit_code, self.output)
            }
            ExecutionStatus::ValidationFailed | ExecutionStatus::Timeout => {
                format!("Error: {}", self.output)
            }
            ExecutionStatus::SystemError => format!("System Error executing nmap: {}", self.output),
        }
    }

    fn outcome(&self) -> &'static str {
        match self.status {
            ExecutionStatus::Completed { exit_code: 0 } => "ok",
            ExecutionStatus::Completed { .. } => "nonzero_exit",
            ExecutionStatus::ValidationFailed => "validation_failed",
            ExecutionStatus::Timeout => "timeout",
            ExecutionStatus::SystemError => "system_error",
        }
    }
}

/// 扫描命令执行器
pub struct ActionExecutor {
    runner: Arc<dyn CommandRunner>,
    /// 小写的命令前缀，如 "nmap"
    prefix: String,
    timeout: Duration,
    limiter: ProcessLimiter,
}

impl ActionExecutor {
    pub fn new(runner: Arc<dyn CommandRunner>, prefix: &str, timeout_secs: u64) -> Self {
        Self {
            runner,
            prefix: prefix.trim().to_lowercase(),
            timeout: Duration::from_secs(timeout_secs),
            limiter: ProcessLimiter::default(),
        }
    }

    pub fn with_limiter(mut self, limiter: ProcessLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// 去首尾空白、转小写后必须以前缀开头
    pub fn is_allowed(&self, command: &str) -> bool {
        !self.prefix.is_empty() && command.trim().to_lowercase().starts_with(&self.prefix)
    }

    pub async fn execute(&self, command: &str) -> ExecutionResult {
        let start = Instant::now();
        let command = command.trim();
        let result = self.execute_inner(command).await;

        let audit = serde_json::json!({
            "event": "scan_audit",
            "command": command,
            "outcome": result.outcome(),
            "exit_code": match result.status {
                ExecutionStatus::Completed { exit_code } => Some(exit_code),
                _ => None,
            },
            "duration_ms": start.elapsed().as_millis() as u64,
        });
        tracing::info!(audit = %audit, "scan");
        result
    }

    async fn execute_inner(&self, command: &str) -> ExecutionResult {
        if !self.is_allowed(command) {
            return ExecutionResult {
                status: ExecutionStatus::ValidationFailed,
                output: format!("Command must start with '{}'.", self.prefix),
            };
        }

        let Some(_permit) = self.limiter.acquire().await else {
            return ExecutionResult {
                status: ExecutionStatus::SystemError,
                output: "process ceiling reached, try again later".to_string(),
            };
        };

        let timed_out = || ExecutionResult {
            status: ExecutionStatus::Timeout,
            output: format!("Nmap scan timed out (limit: {}s).", self.timeout.as_secs()),
        };

        match tokio::time::timeout(self.timeout, self.runner.run(command, self.timeout)).await {
            Err(_) | Ok(Err(RunnerFault::Timeout)) => timed_out(),
            Ok(Err(RunnerFault::Spawn(e))) => ExecutionResult {
                status: ExecutionStatus::SystemError,
                output: e,
            },
            Ok(Ok(raw)) => {
                let output = match (raw.stdout.is_empty(), raw.stderr.is_empty()) {
                    (_, true) => raw.stdout,
                    (true, false) => raw.stderr,
                    (false, false) => format!("{}\n{}", raw.stdout, raw.stderr),
                };
                ExecutionResult {
                    status: ExecutionStatus::Completed {
                        exit_code: raw.exit_code,
                    },
                    output,
                }
            }
        }
    }
}
