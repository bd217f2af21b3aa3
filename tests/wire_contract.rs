//! Drives the real `toolscout serve` binary over stdio.

use std::process::Stdio;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

struct Server {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

impl Server {
    async fn spawn(args: &[&str]) -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_toolscout"))
            .arg("serve")
            .args(args)
            .env("TOOLSCOUT_LOG_TEXT", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .expect("spawn toolscout");

        let stderr = child.stderr.take().unwrap();
        let mut lines = BufReader::new(stderr).lines();
        tokio::time::timeout(Duration::from_secs(20), async {
            while let Some(line) = lines.next_line().await.unwrap() {
                if line.contains("toolscout ready") {
                    return;
                }
            }
            panic!("server exited before ready");
        })
        .await
        .expect("server ready in time");
        tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });

        Self {
            stdin: child.stdin.take().unwrap(),
            stdout: BufReader::new(child.stdout.take().unwrap()).lines(),
            child,
            next_id: 1,
        }
    }

    async fn send(&mut self, frame: Value) {
        let mut data = serde_json::to_string(&frame).unwrap();
        data.push('\n');
        self.stdin.write_all(data.as_bytes()).await.unwrap();
        self.stdin.flush().await.unwrap();
    }

    async fn next(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(10), self.stdout.next_line())
            .await
            .expect("frame in time")
            .unwrap()
            .expect("server still running");
        serde_json::from_str(&line).unwrap()
    }

    /// Returns (notifications seen before the response, result).
    async fn call(&mut self, method: &str, params: Value) -> (Vec<Value>, Value) {
        let id = self.next_id;
        self.next_id += 1;
        self.send(json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }))
            .await;
        let mut notes = Vec::new();
        loop {
            let msg = self.next().await;
            if msg["id"] == id {
                return (notes, msg["result"].clone());
            }
            notes.push(msg);
        }
    }

    async fn tool_names(&mut self) -> Vec<String> {
        let (_, list) = self.call("tools/list", json!({})).await;
        list["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect()
    }
}

#[tokio::test]
async fn list_changed_precedes_load_response() {
    let mut server = Server::spawn(&["--mode", "dynamic"]).await;
    let (_, init) = server
        .call("initialize", json!({ "protocolVersion": "2025-06-18", "capabilities": {} }))
        .await;
    assert_eq!(init["capabilities"]["tools"]["listChanged"], true);
    server
        .send(json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .await;

    let before = server.tool_names().await;
    assert!(!before.iter().any(|n| n == "fetch_url"));

    let (notes, loaded) = server
        .call("tools/call", json!({ "name": "load_toolset", "arguments": { "toolset": "web" } }))
        .await;
    assert_eq!(loaded["structuredContent"]["changed"], true);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0]["method"], "notifications/tools/list_changed");

    let during = server.tool_names().await;
    assert!(during.iter().any(|n| n == "fetch_url"));

    let (notes, _) = server
        .call("tools/call", json!({ "name": "unload_toolset", "arguments": { "toolset": "web" } }))
        .await;
    assert_eq!(notes.len(), 1);
    assert_eq!(server.tool_names().await, before);

    // closing stdin is a graceful shutdown
    drop(server.stdin);
    let status = tokio::time::timeout(Duration::from_secs(5), server.child.wait())
        .await
        .expect("exit after stdin closes")
        .unwrap();
    assert!(status.success());
}

#[tokio::test]
async fn static_mode_exposes_everything_and_parse_errors_survive() {
    let mut server = Server::spawn(&["--mode", "static"]).await;
    let names = server.tool_names().await;
    assert!(names.iter().any(|n| n == "send_email"));
    assert!(names.iter().any(|n| n == "discover_tools"));

    server.stdin.write_all(b"{oops\n").await.unwrap();
    server.stdin.flush().await.unwrap();
    let err = server.next().await;
    assert_eq!(err["error"]["code"], -32700);

    let (_, sent) = server
        .call(
            "tools/call",
            json!({ "name": "send_email", "arguments": { "to": "a@b.c", "subject": "s", "body": "b" } }),
        )
        .await;
    assert_eq!(sent["structuredContent"]["status"], "accepted");
}
