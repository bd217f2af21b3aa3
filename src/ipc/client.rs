//! JSON-RPC client over any line-delimited byte stream (child stdio, duplex pipes).

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, Lines};

/// Outcome of one request: the `result` member or the `error` member.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Result(Value),
    Error { code: i64, message: String },
}

impl Reply {
    pub fn into_result(self) -> Result<Value> {
        match self {
            Reply::Result(v) => Ok(v),
            Reply::Error { code, message } => anyhow::bail!("{} ({})", message, code),
        }
    }
}

pub struct RpcClient<R, W> {
    lines: Lines<BufReader<R>>,
    writer: BufWriter<W>,
    next_id: u64,
    /// Server notifications seen while waiting for responses
    notifications: Vec<Value>,
}

impl<R, W> RpcClient<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            writer: BufWriter::new(writer),
            next_id: 1,
            notifications: Vec::new(),
        }
    }

    /// Send a request and wait for its response; JSON-RPC errors become `Err`.
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value> {
        self.request(method, params).await?.into_result()
    }

    /// Like [`call`](Self::call) but gives up after `timeout`.
    /// A late response is skipped by id on the next call.
    pub async fn call_with_timeout(
        &mut self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        tokio::time::timeout(timeout, self.call(method, params))
            .await
            .with_context(|| format!("{} timed out after {:?}", method, timeout))?
    }

    /// Send a request and return the raw reply.
    pub async fn request(&mut self, method: &str, params: Value) -> Result<Reply> {
        let id = self.next_id;
        self.next_id += 1;

        self.send(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .await?;

        loop {
            let msg = self.read_message().await?;
            if msg.get("id").and_then(Value::as_u64) != Some(id) {
                if msg.get("method").is_some() && msg.get("id").is_none() {
                    self.notifications.push(msg);
                } else {
                    tracing::debug!("Skipping unmatched message: {}", msg);
                }
                continue;
            }
            if let Some(err) = msg.get("error") {
                return Ok(Reply::Error {
                    code: err.get("code").and_then(Value::as_i64).unwrap_or(0),
                    message: err
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("Unknown error")
                        .to_string(),
                });
            }
            return Ok(Reply::Result(msg.get("result").cloned().unwrap_or(Value::Null)));
        }
    }

    /// Fire-and-forget notification.
    pub async fn notify(&mut self, method: &str, params: Value) -> Result<()> {
        self.send(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        }))
        .await
    }

    /// Write one raw frame, unvalidated.
    pub async fn send_raw(&mut self, frame: &str) -> Result<()> {
        self.writer.write_all(frame.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read the next frame of any kind.
    pub async fn read_message(&mut self) -> Result<Value> {
        loop {
            let line = self
                .lines
                .next_line()
                .await?
                .context("Server closed the connection")?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            return serde_json::from_str(trimmed)
                .with_context(|| format!("Invalid JSON from server: {}", trimmed));
        }
    }

    /// Drain notifications collected so far.
    pub fn take_notifications(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.notifications)
    }

    /// Standard MCP handshake: `initialize` then `notifications/initialized`.
    pub async fn initialize(&mut self, client_name: &str) -> Result<Value> {
        let result = self
            .call(
                "initialize",
                json!({
                    "protocolVersion": super::protocol::SUPPORTED_PROTOCOL_VERSIONS[0],
                    "capabilities": {},
                    "clientInfo": { "name": client_name, "version": env!("CARGO_PKG_VERSION") },
                }),
            )
            .await?;
        self.notify("notifications/initialized", json!({})).await?;
        Ok(result)
    }

    async fn send(&mut self, msg: &Value) -> Result<()> {
        let data = serde_json::to_string(msg)?;
        self.send_raw(&data).await
    }
}
