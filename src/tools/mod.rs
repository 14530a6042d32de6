//! 工具层：封闭工具集合、参数 schema、文档检索、扫描执行

pub mod executor;
pub mod keyword_index;
pub mod registry;
pub mod retrieval;
pub mod runner;
pub mod schema;

pub use executor::{ActionExecutor, ExecutionResult, ExecutionStatus};
pub use keyword_index::{ChunkingConfig, KeywordIndex};
pub use registry::{to_schema_json, tool_schemas, ToolKind, ToolSchema};
pub use retrieval::{render_passages, RetrievalClient, RetrievedPassage, SearchBackend, StaticSearch};
pub use runner::{CommandRunner, RawOutput, RunnerFault, ShellRunner};
pub use schema::tool_call_schema_json;
