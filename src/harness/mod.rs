//! Black-box comparison of server configurations over the wire.
//!
//! Each round spawns one `serve` child per configuration, replays the
//! scripted session, checks the list-changed contract and stores the run.
//! Children are independent and driven concurrently.

pub mod process;
pub mod scenarios;
pub mod store;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value};

use crate::ipc::client::Reply;
use crate::ipc::protocol::TOOLS_LIST_CHANGED;
use process::{ChildClient, ServerProcess};
use store::{ConfigSummary, ResultStore};

/// One configuration under test: label and extra `serve` flags.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub label: String,
    pub args: Vec<String>,
}

impl ServerConfig {
    pub fn new(label: &str, args: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// `static` (everything preloaded) against `dynamic` (discover and load).
    pub fn default_pair() -> [ServerConfig; 2] {
        [
            ServerConfig::new("static", &["--mode", "static"]),
            ServerConfig::new("dynamic", &["--mode", "dynamic"]),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct HarnessOptions {
    pub rounds: usize,
    pub call_timeout: Duration,
    pub ready_timeout: Duration,
    pub grace: Duration,
    pub store: PathBuf,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CallRecord {
    pub step: String,
    pub tool: String,
    pub latency_ms: f64,
    pub success: bool,
    /// Step probes an error or empty path on purpose
    pub expected_error: bool,
    pub excerpt: Value,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ContractVerdict {
    pub passed: bool,
    pub notification_seen: bool,
    pub toolset: String,
    /// `load_first` or `unload_first` when everything starts loaded
    pub direction: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: String,
    pub label: String,
    pub round: usize,
    pub started_at: i64,
    pub calls: Vec<CallRecord>,
    pub contract: Option<ContractVerdict>,
    /// Set when the run could not complete (spawn, handshake, transport)
    pub error: Option<String>,
}

impl RunRecord {
    fn new(label: &str, round: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            label: label.to_string(),
            round,
            started_at: chrono::Utc::now().timestamp(),
            calls: Vec::new(),
            contract: None,
            error: None,
        }
    }
}

/// Run every round for both configurations and return the stored aggregates.
pub async fn run_comparison(
    opts: &HarnessOptions,
    configs: &[ServerConfig; 2],
) -> Result<Vec<ConfigSummary>> {
    let store = ResultStore::open(&opts.store)
        .await
        .with_context(|| format!("Opening result store {:?}", opts.store))?;

    for round in 1..=opts.rounds.max(1) {
        let (a, b) = tokio::join!(
            run_session(&configs[0], round, opts),
            run_session(&configs[1], round, opts),
        );
        for run in [a, b] {
            let ok = run.calls.iter().filter(|c| c.success).count();
            tracing::info!(
                label = %run.label,
                round,
                calls = run.calls.len(),
                ok,
                contract = ?run.contract.as_ref().map(|c| c.passed),
                error = ?run.error,
                "Round finished"
            );
            store.insert_run(&run).await?;
        }
    }

    store.summary().await
}

/// One child, one scripted session. Failures are recorded, never raised.
async fn run_session(config: &ServerConfig, round: usize, opts: &HarnessOptions) -> RunRecord {
    let mut run = RunRecord::new(&config.label, round);

    let mut server = match ServerProcess::spawn(&config.label, &config.args, opts.ready_timeout).await {
        Ok(s) => s,
        Err(e) => {
            run.error = Some(format!("{:#}", e));
            return run;
        }
    };

    if let Err(e) = drive(&mut server, &mut run, opts.call_timeout).await {
        tracing::warn!(label = %config.label, round, "Session aborted: {:#}", e);
        run.error = Some(format!("{:#}", e));
    }

    if let Err(e) = server.shutdown(opts.grace).await {
        tracing::warn!(label = %config.label, "Shutdown failed: {:#}", e);
    }
    run
}

async fn drive(server: &mut ServerProcess, run: &mut RunRecord, call_timeout: Duration) -> Result<()> {
    tracing::debug!(server = server.label(), round = run.round, "Driving scripted session");
    let client = server.client()?;
    tokio::time::timeout(call_timeout, client.initialize("toolscout-harness"))
        .await
        .context("Handshake timed out")??;

    for step in scenarios::script() {
        let start = Instant::now();
        let outcome = tokio::time::timeout(
            call_timeout,
            client.request(
                "tools/call",
                json!({ "name": step.tool, "arguments": step.arguments }),
            ),
        )
        .await;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        let (success, excerpt) = match outcome {
            Ok(Ok(Reply::Result(result))) => {
                (scenarios::evaluate(&step.expect, &result), scenarios::excerpt(&result))
            }
            Ok(Ok(Reply::Error { code, message })) => {
                (false, json!({ "rpc_error": { "code": code, "message": message } }))
            }
            // the transport is gone; nothing further can succeed
            Ok(Err(e)) => return Err(e.context(format!("step {}", step.name))),
            Err(_) => (false, json!({ "timeout_ms": call_timeout.as_millis() as u64 })),
        };

        if !success && !step.is_probe() {
            tracing::debug!(step = step.name, %excerpt, "Step failed");
        }
        run.calls.push(CallRecord {
            step: step.name.to_string(),
            tool: step.tool.to_string(),
            latency_ms,
            success,
            expected_error: step.is_probe(),
            excerpt,
        });
    }

    run.contract = Some(check_contract(client, call_timeout).await?);
    Ok(())
}

async fn list_tool_names(client: &mut ChildClient, timeout: Duration) -> Result<BTreeSet<String>> {
    let list = client.call_with_timeout("tools/list", json!({}), timeout).await?;
    Ok(list["tools"]
        .as_array()
        .map(|tools| {
            tools
                .iter()
                .filter_map(|t| t["name"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default())
}

async fn call_meta(
    client: &mut ChildClient,
    name: &str,
    arguments: Value,
    timeout: Duration,
) -> Result<Value> {
    let result = client
        .call_with_timeout("tools/call", json!({ "name": name, "arguments": arguments }), timeout)
        .await?;
    if result["isError"].as_bool().unwrap_or(false) {
        anyhow::bail!("{} failed: {}", name, result["content"][0]["text"]);
    }
    Ok(result["structuredContent"].clone())
}

/// list, toggle one toolset, list again, toggle back, list again.
async fn check_contract(client: &mut ChildClient, timeout: Duration) -> Result<ContractVerdict> {
    client.take_notifications();

    let toolsets = call_meta(client, "list_available_toolsets", json!({}), timeout).await?;
    let entries = toolsets["toolsets"].as_array().cloned().unwrap_or_default();
    let target = entries
        .iter()
        .find(|t| t["loaded"] == false)
        .or_else(|| entries.first())
        .context("Server reported no toolsets")?;
    let key = target["key"].as_str().unwrap_or_default().to_string();
    let members: Vec<String> = target["tools"]
        .as_array()
        .map(|t| t.iter().filter_map(|n| n.as_str().map(String::from)).collect())
        .unwrap_or_default();
    let load_first = target["loaded"] == false;

    let (first, second) = if load_first {
        ("load_toolset", "unload_toolset")
    } else {
        ("unload_toolset", "load_toolset")
    };

    let before = list_tool_names(client, timeout).await?;
    call_meta(client, first, json!({ "toolset": key }), timeout).await?;
    let notified_first = saw_list_changed(client);
    let middle = list_tool_names(client, timeout).await?;
    call_meta(client, second, json!({ "toolset": key }), timeout).await?;
    let notified_second = saw_list_changed(client);
    let after = list_tool_names(client, timeout).await?;

    let present = |names: &BTreeSet<String>| members.iter().all(|m| names.contains(m));
    let absent = |names: &BTreeSet<String>| members.iter().all(|m| !names.contains(m));

    let (visibility_ok, detail) = if load_first {
        (
            absent(&before) && present(&middle) && absent(&after),
            format!("loaded then unloaded '{}' ({} tools)", key, members.len()),
        )
    } else {
        (
            present(&before) && absent(&middle) && present(&after),
            format!("unloaded then reloaded '{}' ({} tools)", key, members.len()),
        )
    };
    let notification_seen = notified_first && notified_second;

    Ok(ContractVerdict {
        passed: visibility_ok && notification_seen && before == after,
        notification_seen,
        toolset: key,
        direction: if load_first { "load_first" } else { "unload_first" }.to_string(),
        detail,
    })
}

fn saw_list_changed(client: &mut ChildClient) -> bool {
    client
        .take_notifications()
        .iter()
        .any(|n| n["method"] == TOOLS_LIST_CHANGED)
}

/// Plain-text table for `toolscout report`.
pub fn render_report(summaries: &[ConfigSummary]) -> String {
    if summaries.is_empty() {
        return "No comparison runs stored yet. Run `toolscout compare` first.".to_string();
    }
    let mut out = format!(
        "{:<10} {:>5} {:>6} {:>9} {:>9} {:>10} {:>9} {:>7}\n",
        "config", "runs", "calls", "success", "scripted", "latency_ms", "contract", "failed"
    );
    for s in summaries {
        out.push_str(&format!(
            "{:<10} {:>5} {:>6} {:>8.1}% {:>8.1}% {:>10.2} {:>8.1}% {:>7}\n",
            s.label,
            s.runs,
            s.calls,
            s.success_rate * 100.0,
            s.scripted_success_rate * 100.0,
            s.mean_latency_ms,
            s.contract_pass_rate * 100.0,
            s.failed_runs,
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_report() {
        assert!(render_report(&[]).contains("No comparison runs"));
        let text = render_report(&[ConfigSummary {
            label: "dynamic".into(),
            runs: 3,
            calls: 33,
            success_rate: 1.0,
            scripted_success_rate: 1.0,
            mean_latency_ms: 1.25,
            contract_pass_rate: 1.0,
            failed_runs: 0,
        }]);
        let row = text.lines().nth(1).unwrap();
        assert!(row.starts_with("dynamic"));
        assert!(row.contains("100.0%"));
        assert!(row.contains("1.25"));
    }

    #[test]
    fn test_default_pair_labels() {
        let [a, b] = ServerConfig::default_pair();
        assert_eq!(a.label, "static");
        assert_eq!(b.args, vec!["--mode", "dynamic"]);
    }
}
