// Vendor tool servers. Each module builds its client from configuration and
// exposes a `ToolRegistry` over it.

pub mod calendar;
pub mod cloudwatch;
pub mod games;
pub mod maps;
pub mod postgres;
pub mod s3;
pub mod search;

use toolhouse_core::{render, Mapping, ToolError, ToolResult};
use toolhouse_mcp::protocol::CallToolResult;

/// Render `mapping` as the text of a successful tool result.
pub(crate) fn markdown(mapping: &Mapping, skip: &[&str]) -> ToolResult<CallToolResult> {
    Ok(CallToolResult::text(render(mapping, skip)?))
}

/// Trimmed `value`, or `InvalidInput` naming `field` when it is blank.
pub(crate) fn non_empty<'a>(value: &'a str, field: &str) -> ToolResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ToolError::invalid_input(format!("{} cannot be empty", field)));
    }
    Ok(trimmed)
}
