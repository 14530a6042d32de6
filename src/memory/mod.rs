//! 记忆层：单次运行的只追加对话历史与 JSONL 持久化

pub mod conversation;
pub mod persistence;

pub use conversation::{History, Message, Role, ToolCall};
pub use persistence::{from_jsonl, to_jsonl, HistoryLog};
