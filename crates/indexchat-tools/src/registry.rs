//! Tool registry: lookup and argument checks for model-issued tool calls.

use indexchat_core::traits::Tool;
use indexchat_core::types::ToolDefinition;

/// Find a tool by name from a list.
pub fn find_tool<'a>(tools: &'a [Box<dyn Tool>], name: &str) -> Option<&'a dyn Tool> {
    tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
}

/// Get all tool definitions from a list.
pub fn list_definitions(tools: &[Box<dyn Tool>]) -> Vec<ToolDefinition> {
    tools.iter().map(|t| t.definition()).collect()
}

/// Validate that a tool call has the required arguments.
pub fn validate_args(definition: &ToolDefinition, args: &serde_json::Value) -> Result<(), String> {
    if !args.is_object() {
        return Err("Arguments must be a JSON object".into());
    }
    let params = &definition.parameters;
    if let Some(required) = params.get("required").and_then(|r| r.as_array()) {
        for req in required {
            if let Some(key) = req.as_str() {
                if args.get(key).is_none_or(|v| v.is_null()) {
                    return Err(format!("Missing required argument: {key}"));
                }
            }
        }
    }
    Ok(())
}
