//! 关键词检索后端
//!
//! 从文档目录加载 .md / .txt，按分隔符优先级分块（带重叠），检索时按查询词与块内词的重合度打分。
//! 目录不存在或为空时得到空索引，检索返回空列表。

use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use walkdir::WalkDir;

use crate::tools::retrieval::{RetrievedPassage, SearchBackend};

/// 分块策略
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// 目标块大小（字符数）
    pub chunk_size: usize,
    /// 块之间的重叠（字符数）
    pub chunk_overlap: usize,
    /// 分隔符优先级（从高到低）
    pub separators: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            separators: vec![
                "\n\n".to_string(),
                "\n".to_string(),
                ". ".to_string(),
                " ".to_string(),
            ],
        }
    }
}

/// 文档块
#[derive(Debug, Clone)]
pub struct Chunk {
    pub text: String,
    pub source: String,
    pub index: usize,
    tokens: HashSet<String>,
}

/// 将文本分割为块（UTF-8 安全）
pub fn chunk_text(config: &ChunkingConfig, text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let size = config.chunk_size.max(1);
    let mut out = Vec::new();
    let mut current = 0;

    while current < total {
        let target_end = (current + size).min(total);
        let mut end = target_end;

        // 不是文末时尽量在分隔符处断开
        if target_end < total {
            let slice: String = chars[current..target_end].iter().collect();
            for sep in &config.separators {
                if let Some(pos) = slice.rfind(sep.as_str()) {
                    let to_sep = slice[..pos].chars().count() + sep.chars().count();
                    if to_sep > 0 {
                        end = current + to_sep;
                        break;
                    }
                }
            }
        }
        if end <= current {
            end = (current + 1).min(total);
        }

        let piece: String = chars[current..end].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            out.push(trimmed.to_string());
        }
        if end >= total {
            break;
        }

        let overlap = config.chunk_overlap.min(end - current);
        let next = end.saturating_sub(overlap);
        current = if next > current { next } else { end };
    }
    out
}

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // 保留 -sV、--mtu 这类选项
    RE.get_or_init(|| {
        Regex::new(r"-{0,2}[A-Za-z0-9](?:[A-Za-z0-9_.\-]*[A-Za-z0-9])?").expect("valid token regex")
    })
}

/// 小写分词
pub fn tokenize(text: &str) -> HashSet<String> {
    token_re()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .filter(|t| t.len() > 1)
        .collect()
}

/// 内存关键词索引
#[derive(Debug, Default)]
pub struct KeywordIndex {
    chunks: Vec<Chunk>,
}

impl KeywordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入一篇文档
    pub fn add_document(&mut self, source: &str, text: &str, config: &ChunkingConfig) -> usize {
        let pieces = chunk_text(config, text);
        let added = pieces.len();
        for (index, piece) in pieces.into_iter().enumerate() {
            self.chunks.push(Chunk {
                tokens: tokenize(&piece),
                text: piece,
                source: source.to_string(),
                index,
            });
        }
        added
    }

    /// 递归加载目录下的 .md / .txt；读取失败的文件跳过并记录
    pub fn load_dir(dir: &Path, config: &ChunkingConfig) -> Self {
        let mut index = Self::new();
        if !dir.exists() {
            tracing::warn!(dir = %dir.display(), "docs directory does not exist, retrieval corpus is empty");
            return index;
        }
        for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
            let path = entry.path();
            let is_doc = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e.to_ascii_lowercase().as_str(), "md" | "txt"))
                .unwrap_or(false);
            if !entry.file_type().is_file() || !is_doc {
                continue;
            }
            match std::fs::read_to_string(path) {
                Ok(text) => {
                    let n = index.add_document(&path.display().to_string(), &text, config);
                    tracing::info!(file = %path.display(), chunks = n, "loaded document");
                }
                Err(e) => tracing::warn!(file = %path.display(), error = %e, "skipping unreadable document"),
            }
        }
        index
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// 按重合词数降序返回前 k 块；无重合的块不返回
    pub fn top_k(&self, query: &str, k: usize) -> Vec<&Chunk> {
        let query_tokens = tokenize(query);
        let mut scored: Vec<(usize, &Chunk)> = self
            .chunks
            .iter()
            .map(|c| (c.tokens.intersection(&query_tokens).count(), c))
            .filter(|(score, _)| *score > 0)
            .collect();
        // 稳定排序：同分时保持文档顺序
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(k).map(|(_, c)| c).collect()
    }
}

#[async_trait]
impl SearchBackend for KeywordIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>, String> {
        Ok(self
            .top_k(query, k)
            .into_iter()
            .map(|c| {
                RetrievedPassage::new(c.text.clone(), c.source.clone())
                    .with_meta("chunk", c.index.to_string())
            })
            .collect())
    }
}
