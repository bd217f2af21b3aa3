//! Tool handler seam.
//!
//! The dispatcher only needs a callable per tool name. Real tool logic lives
//! outside this crate; the bundled catalog is wired to [`AckHandler`], which
//! validates required arguments and echoes a deterministic acknowledgement.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use smol_str::SmolStr;

use crate::registry::Registry;

/// External tool implementation.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool. Errors surface to the client as `HandlerError`.
    async fn call(&self, args: Value) -> anyhow::Result<Value>;
}

/// Tool name -> handler.
#[derive(Default, Clone)]
pub struct HandlerTable {
    handlers: HashMap<SmolStr, Arc<dyn ToolHandler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<SmolStr>, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// An [`AckHandler`] for every tool in `registry`.
    pub fn builtin(registry: &Registry) -> Self {
        let mut table = Self::new();
        for tool in registry.all() {
            let required: Vec<String> = tool
                .input_schema
                .get("required")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            let handler = AckHandler {
                tool: tool.name.clone(),
                toolset: registry.toolset_of(&tool.name).cloned(),
                required,
                next: tool.quick_ref.next_tools.clone(),
            };
            table.insert(tool.name.clone(), Arc::new(handler));
        }
        table
    }
}

/// Deterministic stand-in for an external tool.
pub struct AckHandler {
    tool: SmolStr,
    toolset: Option<SmolStr>,
    required: Vec<String>,
    next: Vec<SmolStr>,
}

#[async_trait::async_trait]
impl ToolHandler for AckHandler {
    async fn call(&self, args: Value) -> anyhow::Result<Value> {
        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|field| args.get(field.as_str()).map_or(true, Value::is_null))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            anyhow::bail!("Missing required argument(s): {}", missing.join(", "));
        }

        Ok(json!({
            "tool": self.tool,
            "toolset": self.toolset,
            "status": "accepted",
            "arguments": args,
            "next": self.next,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::catalog;

    #[tokio::test]
    async fn test_ack_handler_checks_required_args() {
        let reg = catalog::builtin().unwrap();
        let table = HandlerTable::builtin(&reg);
        assert_eq!(table.len(), reg.len());

        let send = table.get("send_email").unwrap();
        let err = send.call(json!({ "to": "team@example.com" })).await.unwrap_err();
        assert!(err.to_string().contains("subject"));

        let ok = send
            .call(json!({ "to": "team@example.com", "subject": "hi", "body": "hello" }))
            .await
            .unwrap();
        assert_eq!(ok["status"], "accepted");
        assert_eq!(ok["toolset"], "email");
    }

    #[tokio::test]
    async fn test_optional_args_accept_empty_object() {
        let reg = catalog::builtin().unwrap();
        let table = HandlerTable::builtin(&reg);
        let read = table.get("read_email").unwrap();
        assert!(read.call(json!({})).await.is_ok());
        assert!(table.get("not_a_tool").is_none());
    }
}
