//! Dispatcher error type. Maps every failure either to a JSON-RPC error or
//! to an `isError` tool result.

use serde_json::{json, Value};
use thiserror::Error;

use crate::loader::LoaderError;

/// Standard JSON-RPC 2.0 error codes.
const PARSE_ERROR: i32 = -32700;
const INVALID_REQUEST: i32 = -32600;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const INTERNAL_ERROR: i32 = -32603;
/// Application-level server error (implementation-defined).
const SERVER_ERROR: i32 = -32000;

#[derive(Error, Debug)]
pub enum ToolscoutError {
    #[error("Method not found: {0}")]
    UnknownMethod(String),

    #[error("Parse error: {0}")]
    MalformedRequest(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Unknown tool '{name}'")]
    UnknownTool { name: String, suggestions: Vec<String> },

    #[error("Tool '{name}' is not loaded. Call load_toolset with toolset='{toolset}' first.")]
    ToolNotLoaded { name: String, toolset: String },

    #[error("{0}")]
    UnknownToolset(#[from] LoaderError),

    #[error("Tool '{tool}' failed: {message}")]
    HandlerError { tool: String, message: String },

    #[error("Tool '{tool}' timed out after {after_ms} ms")]
    Timeout { tool: String, after_ms: u64 },

    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl ToolscoutError {
    /// Stable machine-readable kind, used in `structuredContent.error.kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownMethod(_) => "UnknownMethod",
            Self::MalformedRequest(_) => "MalformedRequest",
            Self::InvalidRequest(_) => "MalformedRequest",
            Self::InvalidParams(_) => "InvalidParams",
            Self::UnknownTool { .. } => "UnknownTool",
            Self::ToolNotLoaded { .. } => "ToolNotLoaded",
            Self::UnknownToolset(_) => "UnknownToolset",
            Self::HandlerError { .. } => "HandlerError",
            Self::Timeout { .. } => "Timeout",
            Self::Internal(_) => "Internal",
        }
    }

    /// JSON-RPC error code for this error variant.
    pub fn rpc_code(&self) -> i32 {
        match self {
            Self::MalformedRequest(_) => PARSE_ERROR,
            Self::InvalidRequest(_) => INVALID_REQUEST,
            Self::UnknownMethod(_) => METHOD_NOT_FOUND,
            Self::InvalidParams(_) => INVALID_PARAMS,
            Self::UnknownTool { .. }
            | Self::ToolNotLoaded { .. }
            | Self::UnknownToolset(_)
            | Self::HandlerError { .. }
            | Self::Timeout { .. } => SERVER_ERROR,
            Self::Internal(_) => INTERNAL_ERROR,
        }
    }

    /// Convert to (code, message) pair for RpcResponse::error.
    pub fn into_rpc(self) -> (i32, String) {
        let code = self.rpc_code();
        (code, self.to_string())
    }

    /// Extra fields for `structuredContent.error`.
    fn details(&self) -> Value {
        match self {
            Self::UnknownTool { name, suggestions } => json!({
                "tool": name,
                "suggestions": suggestions,
                "hint": "Use discover_tools to find tools by description.",
            }),
            Self::ToolNotLoaded { name, toolset } => json!({
                "tool": name,
                "toolset": toolset,
                "hint": format!("load_toolset {{\"toolset\": \"{}\"}}", toolset),
            }),
            Self::UnknownToolset(LoaderError::UnknownToolset { key, available }) => json!({
                "toolset": key,
                "available": available,
            }),
            Self::HandlerError { tool, .. } => json!({ "tool": tool }),
            Self::Timeout { tool, after_ms } => json!({ "tool": tool, "after_ms": after_ms }),
            _ => json!({}),
        }
    }

    /// `tools/call` result for a failed call: `isError`, a readable text block
    /// and the structured error.
    pub fn to_tool_result(&self) -> Value {
        let message = self.to_string();
        let mut error = json!({
            "kind": self.kind(),
            "message": message,
        });
        if let (Some(obj), Value::Object(extra)) = (error.as_object_mut(), self.details()) {
            obj.extend(extra);
        }
        json!({
            "content": [{ "type": "text", "text": format!("Error: {}", message) }],
            "structuredContent": { "error": error },
            "isError": true,
        })
    }
}
