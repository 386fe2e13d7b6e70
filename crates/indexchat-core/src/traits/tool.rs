//! Tool trait: something the model can invoke by name.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ToolDefinition, ToolResult};

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn definition(&self) -> ToolDefinition;

    /// Execute with the raw JSON argument string from the model.
    async fn execute(&self, arguments: &str) -> Result<ToolResult>;
}
