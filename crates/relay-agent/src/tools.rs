//! Tool set provisioning
//!
//! Sessions never execute tools themselves; the backend does. A session only
//! needs the tool definitions to hand over with each query.

use async_trait::async_trait;
use relay_ai::{ToolDefinition, ToolSet};

use crate::error::Result;

/// Builds the tool set offered to the backend for a query
#[async_trait]
pub trait ToolSource: Send + Sync {
    /// Build the tool set. Failure aborts the query before the backend runs.
    async fn tool_set(&self) -> Result<ToolSet>;
}

/// A fixed set of tools
#[derive(Debug, Clone, Default)]
pub struct StaticTools {
    tools: ToolSet,
}

impl StaticTools {
    /// Create a source that always yields these tools
    pub fn new(tools: ToolSet) -> Self {
        Self { tools }
    }

    /// Add a tool
    pub fn with_tool(mut self, tool: ToolDefinition) -> Self {
        self.tools.push(tool);
        self
    }

    /// Get tool names
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }
}

#[async_trait]
impl ToolSource for StaticTools {
    async fn tool_set(&self) -> Result<ToolSet> {
        Ok(self.tools.clone())
    }
}
