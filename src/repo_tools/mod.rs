pub mod dispatcher;
pub mod fs;
pub mod runner;
pub mod safety;
pub mod schemas;
pub mod summary;

pub use dispatcher::{ToolDispatcher, ToolRequest};
pub use schemas::{repo_tool_schemas, tool_definitions, ToolDefinition};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid tool arguments: {0}")]
    Argument(String),
    #[error("{0}")]
    Execution(String),
}
