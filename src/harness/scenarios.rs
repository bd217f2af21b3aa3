//! Scripted session replayed against every configuration.

use serde_json::{json, Value};

/// What a step's result must look like to count as a success.
#[derive(Debug, Clone, PartialEq)]
pub enum Expect {
    /// Any non-error result
    Ok,
    /// `results[0].name`
    TopResult(&'static str),
    /// Named tool among the first five results
    Contains(&'static str),
    /// Non-empty and every result in the category
    AllInCategory(&'static str),
    /// Zero results, not an error
    NoResults,
    /// `isError` with this `structuredContent.error.kind`
    ToolError(&'static str),
}

#[derive(Debug, Clone)]
pub struct Step {
    pub name: &'static str,
    pub tool: &'static str,
    pub arguments: Value,
    pub expect: Expect,
}

impl Step {
    fn new(name: &'static str, tool: &'static str, arguments: Value, expect: Expect) -> Self {
        Self {
            name,
            tool,
            arguments,
            expect,
        }
    }

    /// Steps that deliberately exercise an error or empty path.
    pub fn is_probe(&self) -> bool {
        matches!(self.expect, Expect::NoResults | Expect::ToolError(_))
    }
}

pub fn script() -> Vec<Step> {
    vec![
        Step::new(
            "discover_email",
            "discover_tools",
            json!({ "query": "send an email to the team" }),
            Expect::TopResult("send_email"),
        ),
        Step::new(
            "discover_screenshot_semantic",
            "discover_tools",
            json!({ "query": "take a picture of the page", "mode": "semantic" }),
            Expect::Contains("capture_ui_screenshot"),
        ),
        Step::new(
            "discover_fuzzy_typo",
            "discover_tools",
            json!({ "query": "verificaton cycle", "mode": "fuzzy" }),
            Expect::Contains("start_verification_cycle"),
        ),
        Step::new("list_toolsets", "list_available_toolsets", json!({}), Expect::Ok),
        Step::new(
            "load_email",
            "load_toolset",
            json!({ "toolset": "email" }),
            Expect::Ok,
        ),
        Step::new(
            "send_email_direct",
            "send_email",
            json!({ "to": "team@example.com", "subject": "Release notes", "body": "Shipping today." }),
            Expect::Ok,
        ),
        Step::new(
            "read_email_proxied",
            "call_loaded_tool",
            json!({ "tool": "read_email", "arguments": { "folder": "inbox" } }),
            Expect::Ok,
        ),
        Step::new(
            "intent_security_audit",
            "discover_tools",
            json!({ "query": "check for problems", "intent": "security_audit" }),
            Expect::AllInCategory("security"),
        ),
        Step::new(
            "zero_match_probe",
            "discover_tools",
            json!({ "query": "xyzzy plugh" }),
            Expect::NoResults,
        ),
        Step::new(
            "unknown_tool_probe",
            "send_emial",
            json!({}),
            Expect::ToolError("UnknownTool"),
        ),
        Step::new(
            "unload_email",
            "unload_toolset",
            json!({ "toolset": "email" }),
            Expect::Ok,
        ),
    ]
}

fn result_names(result: &Value) -> Vec<&str> {
    result["structuredContent"]["results"]
        .as_array()
        .map(|items| items.iter().filter_map(|r| r["name"].as_str()).collect())
        .unwrap_or_default()
}

/// Judge a `tools/call` result against the step's expectation.
pub fn evaluate(expect: &Expect, result: &Value) -> bool {
    let is_error = result["isError"].as_bool().unwrap_or(false);
    match expect {
        Expect::ToolError(kind) => {
            is_error && result["structuredContent"]["error"]["kind"].as_str() == Some(*kind)
        }
        _ if is_error => false,
        Expect::Ok => true,
        Expect::TopResult(name) => result_names(result).first() == Some(name),
        Expect::Contains(name) => result_names(result).iter().take(5).any(|n| n == name),
        Expect::AllInCategory(category) => {
            let items = result["structuredContent"]["results"].as_array();
            items.is_some_and(|items| {
                !items.is_empty() && items.iter().all(|r| r["category"].as_str() == Some(*category))
            })
        }
        Expect::NoResults => result["structuredContent"]["count"].as_u64() == Some(0),
    }
}

/// Small structured summary of a result, stored with the call.
pub fn excerpt(result: &Value) -> Value {
    let suggested: Vec<&str> = result["structuredContent"]["suggested_toolsets"]
        .as_array()
        .map(|items| items.iter().filter_map(|s| s["toolset"].as_str()).collect())
        .unwrap_or_default();
    let top: Vec<&str> = result_names(result).into_iter().take(3).collect();
    json!({
        "top": top,
        "suggested_toolsets": suggested,
        "error_kind": result["structuredContent"]["error"]["kind"],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovery(names: &[&str], category: &str) -> Value {
        let results: Vec<Value> = names
            .iter()
            .map(|n| json!({ "name": n, "category": category }))
            .collect();
        json!({
            "content": [],
            "structuredContent": { "count": results.len(), "results": results }
        })
    }

    #[test]
    fn test_script_steps_are_unique() {
        let steps = script();
        let mut names: Vec<_> = steps.iter().map(|s| s.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), steps.len());
        assert_eq!(steps.iter().filter(|s| s.is_probe()).count(), 2);
    }

    #[test]
    fn test_evaluate_expectations() {
        let found = discovery(&["send_email", "read_email"], "email");
        assert!(evaluate(&Expect::TopResult("send_email"), &found));
        assert!(!evaluate(&Expect::TopResult("read_email"), &found));
        assert!(evaluate(&Expect::Contains("read_email"), &found));
        assert!(evaluate(&Expect::AllInCategory("email"), &found));
        assert!(!evaluate(&Expect::AllInCategory("security"), &found));
        assert!(!evaluate(&Expect::NoResults, &found));
        assert!(evaluate(&Expect::NoResults, &discovery(&[], "email")));
        assert!(!evaluate(&Expect::AllInCategory("email"), &discovery(&[], "email")));

        let err = json!({
            "isError": true,
            "structuredContent": { "error": { "kind": "UnknownTool" } }
        });
        assert!(evaluate(&Expect::ToolError("UnknownTool"), &err));
        assert!(!evaluate(&Expect::ToolError("ToolNotLoaded"), &err));
        assert!(!evaluate(&Expect::Ok, &err));
        assert_eq!(excerpt(&err)["error_kind"], "UnknownTool");
    }
}
