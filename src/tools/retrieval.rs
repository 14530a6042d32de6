//! Retrieval Client
//!
//! 包装外部检索协作者 SearchBackend::search(query, k)；空语料返回空列表而不是错误，
//! 后端故障则作为基础设施错误向上传递。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::AgentError;

/// 检索到的一段文档：正文 + 来源元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub content: String,
    #[serde(default)]
    pub source: BTreeMap<String, String>,
}

impl RetrievedPassage {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        let mut meta = BTreeMap::new();
        meta.insert("source".to_string(), source.into());
        Self {
            content: content.into(),
            source: meta,
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.source.insert(key.into(), value.into());
        self
    }
}

/// 外部检索协作者
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>, String>;
}

/// 固定段落的检索后端：按顺序返回前 k 段（用于演示与测试）
#[derive(Debug, Default, Clone)]
pub struct StaticSearch {
    passages: Vec<RetrievedPassage>,
}

impl StaticSearch {
    pub fn new(passages: Vec<RetrievedPassage>) -> Self {
        Self { passages }
    }
}

#[async_trait]
impl SearchBackend for StaticSearch {
    async fn search(&self, _query: &str, k: usize) -> Result<Vec<RetrievedPassage>, String> {
        Ok(self.passages.iter().take(k).cloned().collect())
    }
}

pub struct RetrievalClient {
    backend: Arc<dyn SearchBackend>,
    k: usize,
}

impl RetrievalClient {
    pub fn new(backend: Arc<dyn SearchBackend>, k: usize) -> Self {
        Self {
            backend,
            k: k.max(1),
        }
    }

    /// 每次调用都重新查询后端
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedPassage>, AgentError> {
        tracing::info!(query = %query, k = self.k, "retrieve context");
        let mut passages = self
            .backend
            .search(query, self.k)
            .await
            .map_err(AgentError::RetrievalError)?;
        passages.truncate(self.k);
        Ok(passages)
    }
}

/// 渲染为写入历史的工具输出
pub fn render_passages(passages: &[RetrievedPassage]) -> String {
    if passages.is_empty() {
        return "No matching documentation found.".to_string();
    }
    passages
        .iter()
        .map(|p| {
            let meta = p
                .source
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("Source: {{{}}}\nContent: {}", meta, p.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSearch;

    #[async_trait]
    impl SearchBackend for FailingSearch {
        async fn search(&self, _query: &str, _k: usize) -> Result<Vec<RetrievedPassage>, String> {
            Err("vector store unreachable".to_string())
        }
    }

    #[tokio::test]
    async fn test_empty_corpus_is_not_an_error() {
        let client = RetrievalClient::new(Arc::new(StaticSearch::default()), 5);
        let passages = client.retrieve("port scan").await.unwrap();
        assert!(passages.is_empty());
        assert_eq!(render_passages(&passages), "No matching documentation found.");
    }

    #[tokio::test]
    async fn test_respects_k() {
        let passages = (0..8)
            .map(|i| RetrievedPassage::new(format!("chunk {i}"), "guide.md"))
            .collect();
        let client = RetrievalClient::new(Arc::new(StaticSearch::new(passages)), 3);
        let got = client.retrieve("anything").await.unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].content, "chunk 0");
    }

    #[tokio::test]
    async fn test_backend_fault_is_retrieval_error() {
        let client = RetrievalClient::new(Arc::new(FailingSearch), 5);
        let err = client.retrieve("q").await.unwrap_err();
        assert!(matches!(err, AgentError::RetrievalError(ref m) if m.contains("unreachable")));
    }

    #[test]
    fn test_render_includes_source_and_content() {
        let p = RetrievedPassage::new("MTU must be a multiple of 8", "nmap.md").with_meta("chunk", "4");
        let text = render_passages(&[p]);
        assert_eq!(text, "Source: {chunk: 4, source: nmap.md}\nContent: MTU must be a multiple of 8");
    }
}
