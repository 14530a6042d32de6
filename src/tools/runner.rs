//! 外部进程执行：CommandRunner trait 与基于 sh -c / cmd /C 的实现
//!
//! 前缀校验、并发上限与结果包装由 ActionExecutor 负责；这里只负责把命令跑完并带回原始输出。

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

/// 进程原始输出
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// 执行故障
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunnerFault {
    #[error("timed out")]
    Timeout,

    #[error("{0}")]
    Spawn(String),
}

/// 沙箱执行协作者：run(command, timeout) -> 输出 | 超时
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str, timeout: Duration) -> Result<RawOutput, RunnerFault>;
}

/// 通过系统 shell 执行命令；超时后子进程随 future 一起被 kill
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str, timeout: Duration) -> Result<RawOutput, RunnerFault> {
        tracing::info!(command = %command, "spawning scan process");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.kill_on_drop(true);

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| RunnerFault::Timeout)?
            .map_err(|e| RunnerFault::Spawn(e.to_string()))?;

        Ok(RawOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_both_streams_and_exit_code() {
        let out = ShellRunner
            .run("echo out; echo err 1>&2; exit 3", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_times_out() {
        let res = ShellRunner.run("sleep 5", Duration::from_millis(50)).await;
        assert_eq!(res, Err(RunnerFault::Timeout));
    }
}
