//! Always-visible meta-tools: discovery, toolset loading and the proxy call.

use std::time::Instant;

use serde_json::{json, Map, Value};
use smol_str::SmolStr;

use crate::error::ToolscoutError;
use crate::search::{ScoredResult, SearchMode, SearchOptions};
use crate::state::ServerState;

use super::server::call_tool;

pub const DISCOVER_TOOLS: &str = "discover_tools";
pub const LIST_AVAILABLE_TOOLSETS: &str = "list_available_toolsets";
pub const LOAD_TOOLSET: &str = "load_toolset";
pub const UNLOAD_TOOLSET: &str = "unload_toolset";
pub const CALL_LOADED_TOOL: &str = "call_loaded_tool";
pub const GET_TOOL_QUICK_REF: &str = "get_tool_quick_ref";

const META_TOOLS: [&str; 6] = [
    DISCOVER_TOOLS,
    LIST_AVAILABLE_TOOLSETS,
    LOAD_TOOLSET,
    UNLOAD_TOOLSET,
    CALL_LOADED_TOOL,
    GET_TOOL_QUICK_REF,
];

pub fn is_meta_tool(name: &str) -> bool {
    META_TOOLS.contains(&name)
}

/// `tools/list` entries for the meta-tools, listed before any loaded tool.
pub fn meta_tools_list() -> Vec<Value> {
    let modes: Vec<&str> = SearchMode::ALL.iter().map(|m| m.as_str()).collect();
    vec![
        json!({
            "name": DISCOVER_TOOLS,
            "description": "Search every registered tool, loaded or not, by natural-language query. \
                Returns ranked tools with their toolset and whether they are loaded.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "What you want to do" },
                    "category": { "type": "string", "description": "Restrict to one category" },
                    "phase": { "type": "string", "description": "Restrict to one workflow phase" },
                    "limit": { "type": "integer", "minimum": 1, "maximum": 50, "default": 10 },
                    "mode": { "type": "string", "enum": modes, "default": "hybrid" },
                    "explain": { "type": "boolean", "description": "Include per-signal score breakdown" },
                    "intent": { "type": "string", "description": "Named intent that narrows categories, e.g. security_audit" },
                    "compact": { "type": "boolean", "description": "Return only name, score, toolset and loaded" }
                },
                "required": ["query"]
            }
        }),
        json!({
            "name": LIST_AVAILABLE_TOOLSETS,
            "description": "List every toolset with its tools and whether it is currently loaded.",
            "inputSchema": { "type": "object", "properties": {} }
        }),
        json!({
            "name": LOAD_TOOLSET,
            "description": "Load a toolset so its tools become callable. Loading an already loaded toolset is a no-op.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "toolset": { "type": "string", "description": "Toolset key from list_available_toolsets" }
                },
                "required": ["toolset"]
            }
        }),
        json!({
            "name": UNLOAD_TOOLSET,
            "description": "Unload a toolset and hide its tools again.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "toolset": { "type": "string" }
                },
                "required": ["toolset"]
            }
        }),
        json!({
            "name": CALL_LOADED_TOOL,
            "description": "Call a loaded tool by name. Use this when your client does not refresh its tool list.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "tool": { "type": "string", "description": "Name of a loaded tool" },
                    "arguments": { "type": "object", "description": "Arguments for the tool" }
                },
                "required": ["tool"]
            }
        }),
        json!({
            "name": GET_TOOL_QUICK_REF,
            "description": "Show what to do after a tool: next action, suggested follow-up tools and methodology.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "Tool name" }
                },
                "required": ["name"]
            }
        }),
    ]
}

/// Run a meta-tool. Errors become `isError` tool results in the caller.
pub async fn dispatch(
    state: &ServerState,
    name: &str,
    args: &Value,
) -> Result<Value, ToolscoutError> {
    match name {
        DISCOVER_TOOLS => discover_tools(state, args),
        LIST_AVAILABLE_TOOLSETS => Ok(list_available_toolsets(state)),
        LOAD_TOOLSET => load_toolset(state, args),
        UNLOAD_TOOLSET => unload_toolset(state, args),
        CALL_LOADED_TOOL => call_loaded_tool(state, args).await,
        GET_TOOL_QUICK_REF => get_tool_quick_ref(state, args),
        other => Err(ToolscoutError::UnknownTool {
            name: other.to_string(),
            suggestions: Vec::new(),
        }),
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolscoutError> {
    match args.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
        Some(Value::String(_)) | Some(Value::Null) | None => Err(ToolscoutError::InvalidParams(
            format!("Missing required argument '{}'", key),
        )),
        Some(_) => Err(ToolscoutError::InvalidParams(format!(
            "Argument '{}' must be a string",
            key
        ))),
    }
}

fn optional_str(args: &Value, key: &str) -> Result<Option<String>, ToolscoutError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ToolscoutError::InvalidParams(format!(
            "Argument '{}' must be a string",
            key
        ))),
    }
}

fn optional_bool(args: &Value, key: &str) -> Result<bool, ToolscoutError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(ToolscoutError::InvalidParams(format!(
            "Argument '{}' must be a boolean",
            key
        ))),
    }
}

fn discover_tools(state: &ServerState, args: &Value) -> Result<Value, ToolscoutError> {
    let query = match args.get("query") {
        Some(Value::String(s)) => s.clone(),
        None | Some(Value::Null) => {
            return Err(ToolscoutError::InvalidParams(
                "Missing required argument 'query'".into(),
            ))
        }
        Some(_) => {
            return Err(ToolscoutError::InvalidParams(
                "Argument 'query' must be a string".into(),
            ))
        }
    };

    let limit = match args.get("limit") {
        None | Some(Value::Null) => None,
        Some(v) => match v.as_u64() {
            Some(n) => Some(n as usize),
            None => {
                return Err(ToolscoutError::InvalidParams(
                    "Argument 'limit' must be a positive integer".into(),
                ))
            }
        },
    };

    let mode = match optional_str(args, "mode")? {
        None => SearchMode::default(),
        Some(m) => SearchMode::parse(&m).ok_or_else(|| {
            let known: Vec<&str> = SearchMode::ALL.iter().map(|m| m.as_str()).collect();
            ToolscoutError::InvalidParams(format!(
                "Unknown mode '{}'. Expected one of: {}",
                m,
                known.join(", ")
            ))
        })?,
    };

    let opts = SearchOptions {
        category: optional_str(args, "category")?,
        phase: optional_str(args, "phase")?,
        limit,
        mode,
        explain: optional_bool(args, "explain")?,
        intent: optional_str(args, "intent")?,
    };
    let compact = optional_bool(args, "compact")? && state.settings.compact_enabled;

    let start = Instant::now();
    let mut outcome = state.search.search(&query, &opts);
    state
        .metrics
        .record_search(start.elapsed().as_micros() as usize);

    let snapshot = state.loader.snapshot();
    for r in outcome.results.iter_mut() {
        r.loaded = snapshot.is_visible(&r.name);
    }

    // unloaded owners, in result order
    let mut suggested: Vec<(SmolStr, Vec<SmolStr>)> = Vec::new();
    for r in outcome.results.iter().filter(|r| !r.loaded) {
        let Some(ts) = &r.toolset else { continue };
        match suggested.iter_mut().find(|(key, _)| key == ts) {
            Some((_, tools)) => tools.push(r.name.clone()),
            None => suggested.push((ts.clone(), vec![r.name.clone()])),
        }
    }

    tracing::debug!(
        query = %query,
        mode = outcome.mode.as_str(),
        results = outcome.results.len(),
        degraded = outcome.degraded,
        "discover_tools"
    );

    let results: Vec<Value> = outcome
        .results
        .iter()
        .map(|r| {
            if compact {
                compact_result(r)
            } else {
                full_result(state, r)
            }
        })
        .collect();

    let mut body = json!({
        "query": query,
        "mode": outcome.mode.as_str(),
        "count": results.len(),
        "results": results,
        "suggested_toolsets": suggested
            .iter()
            .map(|(key, tools)| json!({
                "toolset": key,
                "tools": tools,
                "hint": format!("load_toolset {{\"toolset\": \"{}\"}}", key),
            }))
            .collect::<Vec<_>>(),
        "degraded": outcome.degraded,
        "intent_categories": outcome.intent_categories,
    });
    if !outcome.warnings.is_empty() {
        body["warnings"] = json!(outcome.warnings);
    }
    Ok(body)
}

fn round4(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

fn compact_result(r: &ScoredResult) -> Value {
    json!({
        "name": r.name,
        "score": round4(r.score),
        "toolset": r.toolset,
        "loaded": r.loaded,
    })
}

fn full_result(state: &ServerState, r: &ScoredResult) -> Value {
    let mut v = serde_json::to_value(r).unwrap_or_else(|_| compact_result(r));
    if let Some(obj) = v.as_object_mut() {
        obj.insert("score".into(), json!(round4(r.score)));
        if let Some(tool) = state.registry.get(&r.name) {
            obj.insert("description".into(), json!(tool.description));
        }
    }
    v
}

fn list_available_toolsets(state: &ServerState) -> Value {
    let snapshot = state.loader.snapshot();
    let toolsets: Vec<Value> = state
        .registry
        .toolsets()
        .iter()
        .map(|ts| {
            json!({
                "key": ts.key,
                "name": ts.name,
                "description": ts.description,
                "loaded": snapshot.is_loaded(&ts.key),
                "tool_count": ts.tools.len(),
                "tools": ts.tools,
            })
        })
        .collect();

    json!({
        "mode": state.settings.mode.as_str(),
        "total": toolsets.len(),
        "loaded_count": snapshot.loaded.len(),
        "visible_tool_count": snapshot.visible.len(),
        "toolsets": toolsets,
    })
}

fn load_toolset(state: &ServerState, args: &Value) -> Result<Value, ToolscoutError> {
    let key = required_str(args, "toolset")?.trim();
    let outcome = state.loader.load(key)?;
    if outcome.changed {
        state.metrics.record_load();
    }
    let tools = state
        .registry
        .toolset(key)
        .map(|ts| ts.tools.clone())
        .unwrap_or_default();
    let message = if outcome.changed {
        format!("Loaded toolset '{}' ({} new tools).", key, outcome.added_tool_count)
    } else {
        format!("Toolset '{}' is already loaded.", key)
    };
    Ok(json!({
        "toolset": key,
        "loaded": true,
        "changed": outcome.changed,
        "added_tool_count": outcome.added_tool_count,
        "tools": tools,
        "message": message,
    }))
}

fn unload_toolset(state: &ServerState, args: &Value) -> Result<Value, ToolscoutError> {
    let key = required_str(args, "toolset")?.trim();
    let outcome = state.loader.unload(key)?;
    if outcome.changed {
        state.metrics.record_unload();
    }
    let message = if outcome.changed {
        format!("Unloaded toolset '{}' ({} tools hidden).", key, outcome.removed_tool_count)
    } else {
        format!("Toolset '{}' was not loaded.", key)
    };
    Ok(json!({
        "toolset": key,
        "loaded": false,
        "changed": outcome.changed,
        "removed_tool_count": outcome.removed_tool_count,
        "message": message,
    }))
}

async fn call_loaded_tool(state: &ServerState, args: &Value) -> Result<Value, ToolscoutError> {
    let tool = required_str(args, "tool")?;
    if is_meta_tool(tool) {
        return Err(ToolscoutError::InvalidParams(format!(
            "call_loaded_tool cannot proxy meta-tool '{}'; call it directly",
            tool
        )));
    }
    let arguments = match args.get("arguments") {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(v @ Value::Object(_)) => v.clone(),
        Some(_) => {
            return Err(ToolscoutError::InvalidParams(
                "Argument 'arguments' must be an object".into(),
            ))
        }
    };
    call_tool(state, tool, arguments).await
}

fn get_tool_quick_ref(state: &ServerState, args: &Value) -> Result<Value, ToolscoutError> {
    let name = required_str(args, "name")?.trim();
    let Some(tool) = state.registry.get(name) else {
        return Err(ToolscoutError::UnknownTool {
            name: name.to_string(),
            suggestions: super::server::suggest_tools(state, name),
        });
    };
    let toolset = state.registry.toolset_of(name).cloned();
    Ok(json!({
        "name": tool.name,
        "toolset": toolset,
        "loaded": state.loader.snapshot().is_visible(name),
        "category": tool.category,
        "phase": tool.phase,
        "complexity": tool.complexity,
        "quickRef": tool.quick_ref,
        "inputSchema": tool.input_schema,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolscoutConfig;
    use std::sync::Arc;

    fn state() -> Arc<ServerState> {
        ServerState::from_config(&ToolscoutConfig::default()).unwrap()
    }

    #[test]
    fn test_meta_tool_listing() {
        let list = meta_tools_list();
        assert_eq!(list.len(), META_TOOLS.len());
        for (entry, name) in list.iter().zip(META_TOOLS) {
            assert_eq!(entry["name"], name);
            assert_eq!(entry["inputSchema"]["type"], "object");
        }
        assert!(is_meta_tool("load_toolset"));
        assert!(!is_meta_tool("send_email"));
    }

    #[tokio::test]
    async fn test_discover_marks_unloaded_and_suggests_toolset() {
        let state = state();
        let out = dispatch(&state, DISCOVER_TOOLS, &json!({ "query": "send an email to the team" }))
            .await
            .unwrap();
        assert_eq!(out["results"][0]["name"], "send_email");
        assert_eq!(out["results"][0]["loaded"], false);
        assert_eq!(out["results"][0]["toolset"], "email");
        assert_eq!(out["suggested_toolsets"][0]["toolset"], "email");
        assert!(out["results"][0]["description"].is_string());
    }

    #[tokio::test]
    async fn test_loaded_toolset_is_no_longer_suggested() {
        let state = state();
        let query = json!({ "query": "send an email to the team" });
        let before = dispatch(&state, DISCOVER_TOOLS, &query).await.unwrap();
        let suggested = |out: &Value| -> Vec<String> {
            out["suggested_toolsets"]
                .as_array()
                .unwrap()
                .iter()
                .map(|s| s["toolset"].as_str().unwrap().to_string())
                .collect()
        };
        assert!(suggested(&before).contains(&"email".to_string()));

        dispatch(&state, LOAD_TOOLSET, &json!({ "toolset": "email" })).await.unwrap();

        let after = dispatch(&state, DISCOVER_TOOLS, &query).await.unwrap();
        assert!(!suggested(&after).contains(&"email".to_string()));
        assert_eq!(after["results"][0]["name"], "send_email");
        assert_eq!(after["results"][0]["loaded"], true);
    }

    #[tokio::test]
    async fn test_discover_compact_and_bad_mode() {
        let state = state();
        let out = dispatch(
            &state,
            DISCOVER_TOOLS,
            &json!({ "query": "verification cycle", "compact": true, "limit": 2 }),
        )
        .await
        .unwrap();
        let first = out["results"][0].as_object().unwrap();
        assert_eq!(first.len(), 4);
        assert_eq!(out["results"][0]["loaded"], true);
        assert!(out["count"].as_u64().unwrap() <= 2);

        let err = dispatch(&state, DISCOVER_TOOLS, &json!({ "query": "x", "mode": "psychic" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolscoutError::InvalidParams(_)));

        let err = dispatch(&state, DISCOVER_TOOLS, &json!({ "query": "x", "limit": "ten" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolscoutError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_load_list_unload() {
        let state = state();
        let out = dispatch(&state, LOAD_TOOLSET, &json!({ "toolset": "email" })).await.unwrap();
        assert_eq!(out["changed"], true);
        assert_eq!(out["added_tool_count"], 3);

        let again = dispatch(&state, LOAD_TOOLSET, &json!({ "toolset": "email" })).await.unwrap();
        assert_eq!(again["changed"], false);

        let list = dispatch(&state, LIST_AVAILABLE_TOOLSETS, &json!({})).await.unwrap();
        let email = list["toolsets"]
            .as_array()
            .unwrap()
            .iter()
            .find(|t| t["key"] == "email")
            .unwrap();
        assert_eq!(email["loaded"], true);

        let out = dispatch(&state, UNLOAD_TOOLSET, &json!({ "toolset": "email" })).await.unwrap();
        assert_eq!(out["removed_tool_count"], 3);

        let err = dispatch(&state, LOAD_TOOLSET, &json!({ "toolset": "crm" })).await.unwrap_err();
        assert_eq!(err.kind(), "UnknownToolset");
        let err = dispatch(&state, LOAD_TOOLSET, &json!({})).await.unwrap_err();
        assert_eq!(err.kind(), "InvalidParams");
    }

    #[tokio::test]
    async fn test_call_loaded_tool_proxies_and_refuses_meta() {
        let state = state();
        let err = dispatch(
            &state,
            CALL_LOADED_TOOL,
            &json!({ "tool": "read_email", "arguments": {} }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "ToolNotLoaded");

        state.loader.load("email").unwrap();
        let out = dispatch(&state, CALL_LOADED_TOOL, &json!({ "tool": "read_email" }))
            .await
            .unwrap();
        assert_eq!(out["tool"], "read_email");
        assert_eq!(out["status"], "accepted");

        let err = dispatch(&state, CALL_LOADED_TOOL, &json!({ "tool": "load_toolset" }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidParams");
    }

    #[tokio::test]
    async fn test_quick_ref_and_did_you_mean() {
        let state = state();
        let out = dispatch(&state, GET_TOOL_QUICK_REF, &json!({ "name": "send_email" }))
            .await
            .unwrap();
        assert_eq!(out["toolset"], "email");
        assert!(out["quickRef"]["nextTools"].is_array());

        let err = dispatch(&state, GET_TOOL_QUICK_REF, &json!({ "name": "send_emial" }))
            .await
            .unwrap_err();
        match err {
            ToolscoutError::UnknownTool { suggestions, .. } => {
                assert!(suggestions.iter().any(|s| s == "send_email"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
