//! RedTeam - 带 Critic 闸门的 nmap 扫描智能体
//!
//! 入口：加载配置、初始化日志、组装 Agent，对命令行查询跑一次完整运行。
//!
//! 用法：redteam [--config <path>] [--save <path>] [query...]，参数由 clap 解析。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use redteam::config::load_config;
use redteam::memory::{History, HistoryLog};
use redteam::react::{approval_channel, ApprovalRequest};
use redteam::{build_agent, observability, RunEvent, RunOptions, RunOutcome};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const DEFAULT_QUERY: &str =
    "Run a service version detection scan (-sV) on 127.0.0.1 with light version intensity.";

#[derive(Parser, Debug)]
#[clap(
    name = "redteam",
    version = env!("CARGO_PKG_VERSION"),
    about = "Critic-gated nmap agent: retrieves documentation, audits each scan command, then runs it."
)]
struct Cli {
    /// Extra TOML config file layered over config/default.toml
    #[clap(long)]
    config: Option<PathBuf>,
    /// Write the run history as JSON Lines to this path
    #[clap(long)]
    save: Option<PathBuf>,
    /// The request for the agent; a demo scan request is used when empty
    #[clap(trailing_var_arg = true)]
    query: Vec<String>,
}

impl Cli {
    fn query(&self) -> String {
        if self.query.is_empty() {
            DEFAULT_QUERY.to_string()
        } else {
            self.query.join(" ")
        }
    }
}

/// 在终端上逐个批复扫描请求：y 批准，其余输入作为拒绝理由
async fn review_on_stdin(mut rx: mpsc::Receiver<ApprovalRequest>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(req) = rx.recv().await {
        eprintln!("\n[approval] {}", req.action.command);
        eprint!("approve? [y/N or reason] ");
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().eq_ignore_ascii_case("y") => req.approve(),
            Ok(Some(line)) if !line.trim().is_empty() && !line.trim().eq_ignore_ascii_case("n") => {
                req.deny(line.trim())
            }
            _ => req.deny("denied by operator"),
        }
    }
}

fn print_event(ev: &RunEvent) {
    match ev {
        RunEvent::StateEntered { state, llm_calls } => eprintln!("[{}] llm_calls={}", state, llm_calls),
        RunEvent::Proposal { preview, tools } => {
            if tools.is_empty() {
                eprintln!("  proposal: final answer");
            } else {
                let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
                eprintln!("  proposal: {} {}", names.join(", "), preview);
            }
        }
        RunEvent::Verdict { commands, verdict } => eprintln!(
            "  verdict: {} {}",
            serde_json::to_string(verdict).unwrap_or_default(),
            commands.join(" | ")
        ),
        RunEvent::ToolResult { tool, preview } => eprintln!("  {} -> {}", tool, preview),
        RunEvent::Error { state, text } => eprintln!("  error in {}: {}", state, text),
        other => eprintln!("  {}", serde_json::to_string(other).unwrap_or_default()),
    }
}

fn save_history(path: Option<&PathBuf>, history: &History) -> anyhow::Result<()> {
    if let Some(path) = path {
        HistoryLog::new(path).save(history)?;
        eprintln!("history saved to {}", path.display());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    observability::init();

    let cfg = load_config(args.config.clone()).context("Failed to load config")?;
    let mut agent = build_agent(&cfg);

    let reviewer = if cfg.agent.require_approval {
        let (approver, rx) = approval_channel(1);
        agent = agent.with_approver(Arc::new(approver));
        Some(tokio::spawn(review_on_stdin(rx)))
    } else {
        None
    };

    // Ctrl-C 取消当前运行
    let cancel_token = CancellationToken::new();
    let cancel = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(ev) = event_rx.recv().await {
            print_event(&ev);
        }
    });

    let result = agent
        .run_with(
            &args.query(),
            RunOptions::new(cancel_token).with_event_tx(&event_tx),
        )
        .await;
    drop(event_tx);
    let _ = printer.await;
    let (prompt_tokens, completion_tokens, total_tokens) = agent.proposer().token_usage();
    eprintln!(
        "proposer tokens: prompt={} completion={} total={} (bound {} calls)",
        prompt_tokens,
        completion_tokens,
        total_tokens,
        agent.max_iterations()
    );
    drop(agent);
    if let Some(reviewer) = reviewer {
        reviewer.abort();
    }

    match result {
        Ok(RunOutcome::Completed {
            answer,
            llm_calls,
            history,
        }) => {
            println!("{}", answer.content);
            eprintln!("completed after {} model calls", llm_calls);
            save_history(args.save.as_ref(), &history)?;
            Ok(())
        }
        Ok(RunOutcome::Cancelled { state, history, .. }) => {
            eprintln!("cancelled in {}", state);
            save_history(args.save.as_ref(), &history)?;
            Ok(())
        }
        Err(err) => {
            save_history(args.save.as_ref(), &err.history)?;
            Err(err).context("Run failed")
        }
    }
}
