//! 对话持久化
//!
//! 将一次运行的历史写成 JSON Lines（每行一条 Message），用于回放与调试。

use std::path::{Path, PathBuf};

use crate::memory::{History, Message};

/// 序列化为 JSONL 文本
pub fn to_jsonl(history: &History) -> serde_json::Result<String> {
    let mut out = String::new();
    for msg in history.messages() {
        out.push_str(&serde_json::to_string(msg)?);
        out.push('\n');
    }
    Ok(out)
}

/// 从 JSONL 文本恢复历史；空行忽略
pub fn from_jsonl(data: &str) -> serde_json::Result<History> {
    data.lines()
        .filter(|l| !l.trim().is_empty())
        .map(serde_json::from_str::<Message>)
        .collect()
}

/// 单文件 JSONL 持久化
#[derive(Debug)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// 加载历史；文件不存在时返回空历史
    pub fn load(&self) -> anyhow::Result<History> {
        if !self.path.exists() {
            return Ok(History::new());
        }
        let data = std::fs::read_to_string(&self.path)?;
        Ok(from_jsonl(&data)?)
    }

    /// 写入历史；父目录不存在时自动创建
    pub fn save(&self, history: &History) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, to_jsonl(history)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ToolCall;
    use crate::tools::ToolKind;
    use serde_json::json;

    fn sample() -> History {
        let call = ToolCall::new(ToolKind::ExecuteNmapScan, json!({ "command": "nmap -sV 127.0.0.1" }));
        vec![
            Message::user("scan 127.0.0.1"),
            Message::assistant_with_tool_calls("", vec![call.clone()]),
            Message::tool(&call, "Scan Execution Successful:\n22/tcp open ssh"),
            Message::assistant("done"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_jsonl_one_line_per_message() {
        let text = to_jsonl(&sample()).unwrap();
        assert_eq!(text.lines().count(), 4);
        assert!(text.lines().nth(1).unwrap().contains("execute_nmap_scan"));
    }

    #[test]
    fn test_history_log_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::new(dir.path().join("runs").join("run.jsonl"));
        let history = sample();
        log.save(&history).unwrap();
        assert_eq!(log.load().unwrap(), history);
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::new(dir.path().join("none.jsonl"));
        assert!(log.load().unwrap().is_empty());
    }
}
