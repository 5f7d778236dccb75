//! Agent protocol for InputBridge.
//!
//! The agent talks Model Context Protocol over stdio: newline-delimited
//! JSON-RPC 2.0 on stdin/stdout.
//! - `types`: JSON-RPC envelopes and the MCP payloads we use
//! - `tools`: the tool trait, registry, and the blocking input tool
//! - `server`: the read/dispatch/write loop

pub mod server;
pub mod tools;
pub mod types;

pub use server::McpServer;
pub use tools::{GetInputTool, Tool, ToolError, ToolRegistry};
pub use types::{CallToolResult, Content, RpcError, RpcRequest, RpcResponse, ToolDescriptor};
