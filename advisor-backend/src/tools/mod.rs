//! Tools managed agents can call while working on a delegated task.
//!
//! A tool describes itself with a [`ToolDefinition`] that is rendered into the
//! agent's system prompt, and runs with the JSON arguments the agent chose.

pub mod registry;
pub mod types;
pub mod web_search;

pub use registry::{Tool, ToolRegistry};
pub use types::{ToolDefinition, ToolResult};
pub use web_search::{WebSearchTool, DEFAULT_SEARCH_ENDPOINT};
