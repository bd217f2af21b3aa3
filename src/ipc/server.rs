//! Line-delimited JSON-RPC server: reads frames, routes MCP methods and
//! pushes `tools/list_changed` when the loaded toolsets change.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::broadcast::{self, error::TryRecvError};

use super::meta_tools;
use super::protocol::{negotiate_version, RpcNotification, RpcRequest, RpcResponse};
use crate::error::ToolscoutError;
use crate::loader::LoaderEvent;
use crate::search::{SearchMode, SearchOptions};
use crate::state::ServerState;

/// Per-connection protocol state.
#[derive(Debug, Default)]
struct Session {
    protocol_version: Option<&'static str>,
    client_name: Option<String>,
    initialized: bool,
    requests: u64,
    /// Highest numeric request id seen on this connection
    max_request_id: Option<i64>,
}

/// Serve one connection until EOF or shutdown.
pub async fn serve<R, W>(state: Arc<ServerState>, reader: R, writer: W) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(reader).lines();
    let mut session = Session::default();
    let mut events = state.loader.subscribe();
    let mut events_open = true;

    // Channel for writing responses and notifications to the connection
    let (write_tx, mut write_rx) = tokio::sync::mpsc::channel::<String>(64);

    // Writer task: drains channel and writes to the stream
    let writer_handle = tokio::spawn(async move {
        let mut writer = BufWriter::new(writer);
        while let Some(msg) = write_rx.recv().await {
            if let Err(e) = async {
                writer.write_all(msg.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
                Ok::<(), std::io::Error>(())
            }
            .await
            {
                tracing::error!("Write error: {}", e);
                break;
            }
        }
    });

    let token = state.shutdown.clone();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    tracing::debug!(
                        requests = session.requests,
                        max_request_id = ?session.max_request_id,
                        "Client closed input"
                    );
                    break;
                };
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let response = handle_frame(trimmed, &state, &mut session).await;

                // list_changed goes out before the response that caused it
                if drain_events(&mut events, &mut events_open) {
                    send_list_changed(&write_tx, &state).await;
                }
                if let Some(out) = response {
                    if write_tx.send(out).await.is_err() {
                        break;
                    }
                }
            }
            event = events.recv(), if events_open => {
                match event {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                        drain_events(&mut events, &mut events_open);
                        send_list_changed(&write_tx, &state).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => events_open = false,
                }
            }
            _ = token.cancelled() => {
                tracing::info!("Shutdown requested, closing connection");
                break;
            }
        }
    }

    drop(write_tx);
    let _ = writer_handle.await;
    Ok(())
}

/// True when at least one loader event (or a lag) was pending.
fn drain_events(events: &mut broadcast::Receiver<LoaderEvent>, open: &mut bool) -> bool {
    let mut pending = false;
    loop {
        match events.try_recv() {
            Ok(event) => {
                tracing::debug!(?event, "Coalescing loader event");
                pending = true;
            }
            Err(TryRecvError::Lagged(n)) => {
                tracing::debug!("Loader events lagged by {}", n);
                pending = true;
            }
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Closed) => {
                *open = false;
                break;
            }
        }
    }
    pending
}

async fn send_list_changed(write_tx: &tokio::sync::mpsc::Sender<String>, state: &ServerState) {
    if let Some(msg) = encode(&RpcNotification::tools_list_changed()) {
        if write_tx.send(msg).await.is_ok() {
            state.metrics.record_notification();
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::error!("Failed to encode frame: {}", e);
            None
        }
    }
}

/// One input line: a single message or a batch. `None` when nothing is owed.
async fn handle_frame(frame: &str, state: &ServerState, session: &mut Session) -> Option<String> {
    let parsed: Value = match serde_json::from_str(frame) {
        Ok(v) => v,
        Err(e) => {
            state.metrics.record_malformed();
            tracing::warn!("Malformed frame: {}", e);
            return encode(&RpcResponse::from_error(
                Value::Null,
                ToolscoutError::MalformedRequest(e.to_string()),
            ));
        }
    };

    match parsed {
        Value::Array(batch) if batch.is_empty() => {
            state.metrics.record_malformed();
            encode(&RpcResponse::from_error(
                Value::Null,
                ToolscoutError::InvalidRequest("Empty batch".into()),
            ))
        }
        Value::Array(batch) => {
            // sequential so loader mutations keep request order
            let mut responses = Vec::with_capacity(batch.len());
            for item in batch {
                if let Some(resp) = handle_message(item, state, session).await {
                    responses.push(resp);
                }
            }
            if responses.is_empty() {
                None
            } else {
                encode(&responses)
            }
        }
        other => {
            let resp = handle_message(other, state, session).await?;
            encode(&resp)
        }
    }
}

async fn handle_message(
    value: Value,
    state: &ServerState,
    session: &mut Session,
) -> Option<RpcResponse> {
    let raw_id = value.get("id").cloned().unwrap_or(Value::Null);
    let req: RpcRequest = match serde_json::from_value(value) {
        Ok(r) => r,
        Err(e) => {
            state.metrics.record_malformed();
            return Some(RpcResponse::from_error(
                raw_id,
                ToolscoutError::InvalidRequest(e.to_string()),
            ));
        }
    };

    if req.jsonrpc != "2.0" {
        state.metrics.record_malformed();
        return req.id.map(|id| {
            RpcResponse::from_error(
                id,
                ToolscoutError::InvalidRequest(format!(
                    "Unsupported jsonrpc version '{}'",
                    req.jsonrpc
                )),
            )
        });
    }

    if req.is_notification() {
        handle_notification(&req, session);
        return None;
    }
    Some(handle_request(req, state, session).await)
}

fn handle_notification(req: &RpcRequest, session: &mut Session) {
    match req.method.as_str() {
        "notifications/initialized" | "initialized" => {
            session.initialized = true;
            tracing::debug!(client = ?session.client_name, "Client initialized");
        }
        "notifications/cancelled" => {
            // calls run to completion or timeout; nothing to cancel mid-flight
            tracing::debug!("Cancellation notice: {}", req.params);
        }
        other => tracing::debug!("Ignoring notification {}", other),
    }
}

async fn handle_request(req: RpcRequest, state: &ServerState, session: &mut Session) -> RpcResponse {
    let id = req.id.clone().unwrap_or(Value::Null);
    state.metrics.record_request();
    session.requests += 1;
    if let Some(n) = id.as_i64() {
        session.max_request_id = Some(session.max_request_id.map_or(n, |m| m.max(n)));
    }

    let result = match req.method.as_str() {
        "initialize" => initialize(&req.params, session),
        "ping" => Ok(json!({})),
        "tools/list" => Ok(tools_list(state)),
        "tools/call" => tools_call(&req.params, state).await,
        "prompts/list" => Ok(prompts_list()),
        "prompts/get" => prompts_get(&req.params, state),
        "toolscout/stats" => Ok(stats(state, session)),
        other => Err(ToolscoutError::UnknownMethod(other.to_string())),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(e) => {
            tracing::debug!(method = %req.method, "Request failed: {}", e);
            RpcResponse::from_error(id, e)
        }
    }
}

fn initialize(params: &Value, session: &mut Session) -> Result<Value, ToolscoutError> {
    if !(params.is_object() || params.is_null()) {
        return Err(ToolscoutError::InvalidParams(
            "initialize params must be an object".into(),
        ));
    }
    let version = negotiate_version(params.get("protocolVersion").and_then(Value::as_str));
    session.protocol_version = Some(version);
    session.client_name = params
        .get("clientInfo")
        .and_then(|c| c.get("name"))
        .and_then(Value::as_str)
        .map(String::from);

    tracing::info!(
        protocol = version,
        client = session.client_name.as_deref().unwrap_or("unknown"),
        "Client connected"
    );

    Ok(json!({
        "protocolVersion": version,
        "serverInfo": {
            "name": "toolscout",
            "version": env!("CARGO_PKG_VERSION")
        },
        "capabilities": {
            "tools": { "listChanged": true },
            "prompts": { "listChanged": false }
        },
        "instructions": "Use discover_tools to find tools by task, load_toolset to enable them, \
            then call them directly or through call_loaded_tool."
    }))
}

/// Meta-tools first, then every visible tool in registration order.
fn tools_list(state: &ServerState) -> Value {
    let snapshot = state.loader.snapshot();
    let mut tools = meta_tools::meta_tools_list();
    tools.extend(
        state
            .registry
            .all()
            .iter()
            .filter(|t| snapshot.is_visible(&t.name))
            .map(|t| t.to_mcp_json()),
    );
    json!({ "tools": tools })
}

async fn tools_call(params: &Value, state: &ServerState) -> Result<Value, ToolscoutError> {
    let name = params
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ToolscoutError::InvalidParams("tools/call requires a string 'name'".into()))?;

    let args = match params.get("arguments") {
        None | Some(Value::Null) => json!({}),
        Some(v @ Value::Object(_)) => v.clone(),
        Some(_) => {
            return Ok(ToolscoutError::InvalidParams(
                "Argument 'arguments' must be an object".into(),
            )
            .to_tool_result())
        }
    };

    let outcome = if meta_tools::is_meta_tool(name) {
        meta_tools::dispatch(state, name, &args).await
    } else {
        call_tool(state, name, args).await
    };

    Ok(match outcome {
        Ok(value) => tool_result(value),
        Err(e) => {
            tracing::debug!(tool = name, kind = e.kind(), "Tool call failed: {}", e);
            e.to_tool_result()
        }
    })
}

fn tool_result(value: Value) -> Value {
    let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
    let mut out = json!({ "content": [{ "type": "text", "text": text }] });
    if value.is_object() {
        out["structuredContent"] = value;
    }
    out
}

/// Route a call to a registered, visible tool with the dispatch timeout.
pub(crate) async fn call_tool(
    state: &ServerState,
    name: &str,
    args: Value,
) -> Result<Value, ToolscoutError> {
    if state.registry.get(name).is_none() {
        return Err(ToolscoutError::UnknownTool {
            name: name.to_string(),
            suggestions: suggest_tools(state, name),
        });
    }

    if !state.loader.snapshot().is_visible(name) {
        return Err(match state.registry.toolset_of(name) {
            Some(toolset) => ToolscoutError::ToolNotLoaded {
                name: name.to_string(),
                toolset: toolset.to_string(),
            },
            None => ToolscoutError::UnknownTool {
                name: name.to_string(),
                suggestions: Vec::new(),
            },
        });
    }

    let handler = state.handlers.get(name).ok_or_else(|| ToolscoutError::HandlerError {
        tool: name.to_string(),
        message: "No handler registered".into(),
    })?;

    let start = Instant::now();
    let outcome = tokio::time::timeout(state.settings.call_timeout, handler.call(args)).await;
    let latency_us = start.elapsed().as_micros() as usize;

    let result = match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ToolscoutError::HandlerError {
            tool: name.to_string(),
            message: format!("{:#}", e),
        }),
        Err(_) => Err(ToolscoutError::Timeout {
            tool: name.to_string(),
            after_ms: state.settings.call_timeout.as_millis() as u64,
        }),
    };
    state.metrics.record_tool_call(latency_us, result.is_err());
    tracing::debug!(tool = name, latency_us, ok = result.is_ok(), "Tool call");
    result
}

/// "Did you mean" candidates for a mistyped tool name.
pub(crate) fn suggest_tools(state: &ServerState, name: &str) -> Vec<String> {
    let query = name.replace(['_', '-'], " ");
    let mut opts = SearchOptions {
        mode: SearchMode::Fuzzy,
        limit: Some(3),
        ..Default::default()
    };
    let mut found = state.search.search(&query, &opts).results;
    if found.is_empty() {
        opts.mode = SearchMode::Hybrid;
        found = state.search.search(&query, &opts).results;
    }
    found.into_iter().map(|r| r.name.to_string()).collect()
}

fn prompts_list() -> Value {
    json!({
        "prompts": [
            {
                "name": "find_tools_for_task",
                "description": "Walk through discovering, loading and calling the right tools for a task.",
                "arguments": [
                    { "name": "task", "description": "What you want to get done", "required": true }
                ]
            },
            {
                "name": "toolset_overview",
                "description": "Summarize every toolset and which ones are loaded right now.",
                "arguments": []
            }
        ]
    })
}

fn prompts_get(params: &Value, state: &ServerState) -> Result<Value, ToolscoutError> {
    let name = params.get("name").and_then(Value::as_str).unwrap_or("");
    let args = params.get("arguments").cloned().unwrap_or(json!({}));

    let text = match name {
        "find_tools_for_task" => {
            let task = args.get("task").and_then(Value::as_str).unwrap_or("").trim();
            if task.is_empty() {
                return Err(ToolscoutError::InvalidParams("'task' argument is required".into()));
            }
            format!(
                "Task: {}\n\n1. Call discover_tools with query=\"{}\".\n\
                 2. For results with loaded=false, call load_toolset with the suggested toolset.\n\
                 3. Call the tool directly, or through call_loaded_tool if your tool list is stale.\n\
                 4. Use get_tool_quick_ref to see the recommended next step.",
                task, task
            )
        }
        "toolset_overview" => {
            let snapshot = state.loader.snapshot();
            let lines: Vec<String> = state
                .registry
                .toolsets()
                .iter()
                .map(|ts| {
                    format!(
                        "- {} [{}] {} ({} tools)",
                        ts.key,
                        if snapshot.is_loaded(&ts.key) { "loaded" } else { "available" },
                        ts.description,
                        ts.tools.len()
                    )
                })
                .collect();
            format!("Toolsets:\n{}", lines.join("\n"))
        }
        _ => {
            return Err(ToolscoutError::InvalidParams(format!("Unknown prompt: {}", name)));
        }
    };

    Ok(json!({
        "messages": [{
            "role": "user",
            "content": { "type": "text", "text": text }
        }]
    }))
}

fn stats(state: &ServerState, session: &Session) -> Value {
    let snapshot = state.loader.snapshot();
    json!({
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "mode": state.settings.mode.as_str(),
        "tools": state.registry.len(),
        "loaded_toolsets": snapshot.loaded,
        "visible_tools": snapshot.visible.len(),
        "embeddings_available": state.search.embeddings_available(),
        "metrics": state.metrics.snapshot(),
        "session": {
            "protocol_version": session.protocol_version,
            "client": session.client_name,
            "initialized": session.initialized,
            "requests": session.requests,
            "max_request_id": session.max_request_id,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::ToolscoutConfig;
    use crate::handlers::{HandlerTable, ToolHandler};
    use crate::ipc::client::{Reply, RpcClient};
    use crate::registry::catalog;
    use crate::search::embedding::NoEmbeddings;
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    type TestClient = RpcClient<ReadHalf<DuplexStream>, WriteHalf<DuplexStream>>;

    fn connect(state: Arc<ServerState>) -> TestClient {
        let (client_io, server_io) = tokio::io::duplex(256 * 1024);
        let (sr, sw) = tokio::io::split(server_io);
        tokio::spawn(serve(state, sr, sw));
        let (cr, cw) = tokio::io::split(client_io);
        RpcClient::new(cr, cw)
    }

    fn dynamic_state() -> Arc<ServerState> {
        ServerState::from_config(&ToolscoutConfig::default()).unwrap()
    }

    fn tool_names(list: &Value) -> Vec<String> {
        list["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_initialize_negotiates_version() {
        let mut client = connect(dynamic_state());
        let result = client
            .call("initialize", json!({ "protocolVersion": "2024-11-05", "capabilities": {} }))
            .await
            .unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["capabilities"]["tools"]["listChanged"], true);
        assert_eq!(result["serverInfo"]["name"], "toolscout");
    }

    #[tokio::test]
    async fn test_discover_load_call_scenario() {
        let mut client = connect(dynamic_state());
        client.initialize("test").await.unwrap();

        let before = tool_names(&client.call("tools/list", json!({})).await.unwrap());
        assert!(!before.contains(&"send_email".to_string()));
        assert_eq!(before[0], "discover_tools");

        let found = client
            .call(
                "tools/call",
                json!({ "name": "discover_tools", "arguments": { "query": "send an email to the team" } }),
            )
            .await
            .unwrap();
        let top = &found["structuredContent"]["results"][0];
        assert_eq!(top["name"], "send_email");
        assert_eq!(top["loaded"], false);

        let loaded = client
            .call("tools/call", json!({ "name": "load_toolset", "arguments": { "toolset": "email" } }))
            .await
            .unwrap();
        assert_eq!(loaded["structuredContent"]["changed"], true);
        let notes = client.take_notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0]["method"], "notifications/tools/list_changed");

        let after = tool_names(&client.call("tools/list", json!({})).await.unwrap());
        assert!(after.contains(&"send_email".to_string()));

        let sent = client
            .call(
                "tools/call",
                json!({
                    "name": "send_email",
                    "arguments": { "to": "team@example.com", "subject": "hi", "body": "hello" }
                }),
            )
            .await
            .unwrap();
        assert!(sent.get("isError").is_none());
        assert_eq!(sent["structuredContent"]["status"], "accepted");

        client
            .call("tools/call", json!({ "name": "unload_toolset", "arguments": { "toolset": "email" } }))
            .await
            .unwrap();
        assert_eq!(client.take_notifications().len(), 1);
        let end = tool_names(&client.call("tools/list", json!({})).await.unwrap());
        assert_eq!(end, before);
    }

    #[tokio::test]
    async fn test_notification_precedes_response() {
        let mut client = connect(dynamic_state());
        client
            .send_raw(r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"load_toolset","arguments":{"toolset":"web"}}}"#)
            .await
            .unwrap();
        let first = client.read_message().await.unwrap();
        assert_eq!(first["method"], "notifications/tools/list_changed");
        assert!(first.get("id").is_none());
        let second = client.read_message().await.unwrap();
        assert_eq!(second["id"], 1);
    }

    #[tokio::test]
    async fn test_idempotent_load_sends_no_notification() {
        let mut client = connect(dynamic_state());
        // verification is preloaded in dynamic mode
        let out = client
            .call(
                "tools/call",
                json!({ "name": "load_toolset", "arguments": { "toolset": "verification" } }),
            )
            .await
            .unwrap();
        assert_eq!(out["structuredContent"]["changed"], false);
        client.call("ping", json!({})).await.unwrap();
        assert!(client.take_notifications().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tool_vs_not_loaded() {
        let mut client = connect(dynamic_state());
        let out = client
            .call("tools/call", json!({ "name": "send_email", "arguments": {} }))
            .await
            .unwrap();
        assert_eq!(out["isError"], true);
        assert_eq!(out["structuredContent"]["error"]["kind"], "ToolNotLoaded");
        assert_eq!(out["structuredContent"]["error"]["toolset"], "email");

        let out = client
            .call("tools/call", json!({ "name": "definitely_not_a_tool" }))
            .await
            .unwrap();
        assert_eq!(out["isError"], true);
        assert_eq!(out["structuredContent"]["error"]["kind"], "UnknownTool");
    }

    #[tokio::test]
    async fn test_handler_error_is_tool_result() {
        let mut client = connect(dynamic_state());
        let out = client
            .call("tools/call", json!({ "name": "log_gap", "arguments": {} }))
            .await
            .unwrap();
        assert_eq!(out["isError"], true);
        assert_eq!(out["structuredContent"]["error"]["kind"], "HandlerError");
    }

    struct Sleepy;

    #[async_trait::async_trait]
    impl ToolHandler for Sleepy {
        async fn call(&self, _args: Value) -> anyhow::Result<Value> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(json!({}))
        }
    }

    #[tokio::test]
    async fn test_slow_handler_times_out() {
        let registry = Arc::new(catalog::builtin().unwrap());
        let mut handlers = HandlerTable::builtin(&registry);
        handlers.insert("get_verification_status", Arc::new(Sleepy));
        let mut state = ServerState::new(
            registry,
            Arc::new(NoEmbeddings),
            &ToolscoutConfig::default(),
            handlers,
        )
        .unwrap();
        state.settings.call_timeout = Duration::from_millis(50);

        let mut client = connect(Arc::new(state));
        let out = client
            .call("tools/call", json!({ "name": "get_verification_status" }))
            .await
            .unwrap();
        assert_eq!(out["structuredContent"]["error"]["kind"], "Timeout");
    }

    #[tokio::test]
    async fn test_malformed_frames_keep_connection_alive() {
        let mut client = connect(dynamic_state());
        client.send_raw("{not json").await.unwrap();
        let resp = client.read_message().await.unwrap();
        assert_eq!(resp["error"]["code"], -32700);
        assert_eq!(resp["id"], Value::Null);

        client.send_raw(r#"{"jsonrpc":"2.0","id":9}"#).await.unwrap();
        let resp = client.read_message().await.unwrap();
        assert_eq!(resp["error"]["code"], -32600);
        assert_eq!(resp["id"], 9);

        client.send_raw("[]").await.unwrap();
        let resp = client.read_message().await.unwrap();
        assert_eq!(resp["error"]["code"], -32600);

        assert_eq!(client.call("ping", json!({})).await.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_null_id_request_is_answered() {
        let mut client = connect(dynamic_state());
        client
            .send_raw(r#"{"jsonrpc":"2.0","id":null,"method":"ping"}"#)
            .await
            .unwrap();
        let resp = tokio::time::timeout(Duration::from_secs(2), client.read_message())
            .await
            .expect("null-id request answered")
            .unwrap();
        assert_eq!(resp["id"], Value::Null);
        assert_eq!(resp["result"], json!({}));
    }

    #[tokio::test]
    async fn test_session_tracks_highest_request_id() {
        let mut client = connect(dynamic_state());
        for frame in [
            r#"{"jsonrpc":"2.0","id":41,"method":"ping"}"#,
            r#"{"jsonrpc":"2.0","id":7,"method":"ping"}"#,
            r#"{"jsonrpc":"2.0","id":"text","method":"ping"}"#,
        ] {
            client.send_raw(frame).await.unwrap();
            client.read_message().await.unwrap();
        }
        client
            .send_raw(r#"{"jsonrpc":"2.0","id":3,"method":"toolscout/stats"}"#)
            .await
            .unwrap();
        let stats = client.read_message().await.unwrap();
        assert_eq!(stats["id"], 3);
        assert_eq!(stats["result"]["session"]["max_request_id"], 41);
        assert_eq!(stats["result"]["session"]["requests"], 4);
    }

    #[tokio::test]
    async fn test_unknown_method_and_notifications() {
        let mut client = connect(dynamic_state());
        let reply = client.request("resources/list", json!({})).await.unwrap();
        assert!(matches!(reply, Reply::Error { code: -32601, .. }));

        // notifications get no response; the next reply answers the ping
        client.notify("notifications/initialized", json!({})).await.unwrap();
        client.notify("something/else", json!({})).await.unwrap();
        assert_eq!(client.call("ping", json!({})).await.unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_batch_is_answered_in_order() {
        let mut client = connect(dynamic_state());
        client
            .send_raw(
                r#"[{"jsonrpc":"2.0","id":1,"method":"ping"},{"jsonrpc":"2.0","method":"notifications/initialized"},{"jsonrpc":"2.0","id":2,"method":"tools/list"}]"#,
            )
            .await
            .unwrap();
        let resp = client.read_message().await.unwrap();
        let items = resp.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["id"], 1);
        assert_eq!(items[1]["id"], 2);
    }

    #[tokio::test]
    async fn test_other_connection_mutation_is_pushed() {
        let state = dynamic_state();
        let mut watcher = connect(state.clone());
        let mut actor = connect(state);
        watcher.call("ping", json!({})).await.unwrap();

        actor
            .call("tools/call", json!({ "name": "load_toolset", "arguments": { "toolset": "github" } }))
            .await
            .unwrap();
        let pushed = watcher.read_message().await.unwrap();
        assert_eq!(pushed["method"], "notifications/tools/list_changed");
    }

    #[tokio::test]
    async fn test_prompts_and_stats() {
        let mut client = connect(dynamic_state());
        let list = client.call("prompts/list", json!({})).await.unwrap();
        assert_eq!(list["prompts"].as_array().unwrap().len(), 2);

        let prompt = client
            .call(
                "prompts/get",
                json!({ "name": "find_tools_for_task", "arguments": { "task": "audit secrets" } }),
            )
            .await
            .unwrap();
        assert!(prompt["messages"][0]["content"]["text"]
            .as_str()
            .unwrap()
            .contains("audit secrets"));

        let reply = client.request("prompts/get", json!({ "name": "nope" })).await.unwrap();
        assert!(matches!(reply, Reply::Error { code: -32602, .. }));

        let stats = client.call("toolscout/stats", json!({})).await.unwrap();
        assert_eq!(stats["mode"], "dynamic");
        assert_eq!(stats["session"]["requests"], 4);
    }
}
