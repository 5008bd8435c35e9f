// MCP (Model Context Protocol) plumbing shared by every toolhouse server:
// JSON-RPC types, the tool trait and registry, and the stdio server loop.

pub mod protocol;
pub mod server;
pub mod tools;

pub use server::McpServer;
pub use tools::{Tool, ToolRegistry};
