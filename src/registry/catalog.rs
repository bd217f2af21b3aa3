//! Bundled tool catalog and loading presets.
//!
//! These are declarations only: the business logic behind each tool lives in
//! external handlers (see `crate::handlers`).

use serde_json::{json, Map, Value};

use super::{Category, Complexity, Phase, Registry, RegistryError, ToolDescriptor, ToolsetDefinition};

/// Build an object schema from `(name, type, description)` triples.
fn schema(props: &[(&str, &str, &str)], required: &[&str]) -> Value {
    let mut properties = Map::new();
    for (name, ty, desc) in props {
        properties.insert(
            name.to_string(),
            json!({ "type": ty, "description": desc }),
        );
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Preset name -> toolset keys. `full` is every toolset.
pub const PRESETS: &[(&str, &[&str])] = &[
    ("lite", &["verification", "learning"]),
    (
        "default",
        &["verification", "quality_gate", "learning", "recon", "web"],
    ),
];

/// Resolve a preset to toolset keys against `registry`.
pub fn preset_toolsets(registry: &Registry, preset: &str) -> Option<Vec<String>> {
    if preset == "full" {
        return Some(registry.toolsets().iter().map(|t| t.key.to_string()).collect());
    }
    PRESETS
        .iter()
        .find(|(name, _)| *name == preset)
        .map(|(_, keys)| keys.iter().map(|k| k.to_string()).collect())
}

/// The catalog shipped with the server.
pub fn builtin() -> Result<Registry, RegistryError> {
    let mut b = Registry::builder();

    // ── verification ─────────────────────────────────────────────
    b.register(
        ToolDescriptor::new(
            "start_verification_cycle",
            "Start a structured verification cycle for a change: context gathering, gap analysis, implementation, testing and sign-off.",
            Category::Verification,
            Phase::Verify,
        )
        .with_tags(&["verify", "cycle", "checklist", "gap"])
        .with_schema(schema(
            &[
                ("title", "string", "Short name of the change under verification"),
                ("description", "string", "What is being verified"),
            ],
            &["title"],
        ))
        .with_quick_ref(
            "Log findings for each phase as you go",
            &["log_phase_findings", "log_gap"],
            "six-phase verification",
        )
        .with_complexity(Complexity::Medium),
    )?;
    b.register(
        ToolDescriptor::new(
            "log_phase_findings",
            "Record findings for the current phase of a verification cycle and advance to the next phase.",
            Category::Verification,
            Phase::Verify,
        )
        .with_tags(&["verify", "findings", "phase"])
        .with_schema(schema(
            &[
                ("cycle_id", "string", "Verification cycle id"),
                ("phase", "integer", "Phase number (1-6)"),
                ("findings", "string", "What was found"),
            ],
            &["cycle_id", "phase", "findings"],
        ))
        .with_quick_ref(
            "Log gaps you discovered, then continue",
            &["log_gap", "get_verification_status"],
            "six-phase verification",
        ),
    )?;
    b.register(
        ToolDescriptor::new(
            "log_gap",
            "Record a gap (missing test, bug, unhandled edge case) found during verification with a severity.",
            Category::Verification,
            Phase::Verify,
        )
        .with_tags(&["gap", "bug", "issue", "severity"])
        .with_schema(schema(
            &[
                ("cycle_id", "string", "Verification cycle id"),
                ("severity", "string", "CRITICAL, HIGH, MEDIUM or LOW"),
                ("title", "string", "Gap summary"),
            ],
            &["cycle_id", "severity", "title"],
        ))
        .with_quick_ref("Fix the gap, then resolve it", &["resolve_gap"], "gap tracking"),
    )?;
    b.register(
        ToolDescriptor::new(
            "resolve_gap",
            "Mark a previously logged verification gap as resolved with a note on the fix.",
            Category::Verification,
            Phase::Verify,
        )
        .with_tags(&["gap", "fix", "resolve"])
        .with_schema(schema(
            &[
                ("gap_id", "string", "Gap id"),
                ("resolution", "string", "How it was fixed"),
            ],
            &["gap_id"],
        ))
        .with_quick_ref(
            "Check overall cycle status",
            &["get_verification_status"],
            "gap tracking",
        ),
    )?;
    b.register(
        ToolDescriptor::new(
            "get_verification_status",
            "Show the status of a verification cycle: current phase, open gaps and completion.",
            Category::Verification,
            Phase::Verify,
        )
        .with_tags(&["status", "progress", "verify"])
        .with_schema(schema(&[("cycle_id", "string", "Verification cycle id")], &["cycle_id"]))
        .with_quick_ref(
            "Run quality gates before shipping",
            &["run_quality_gate"],
            "six-phase verification",
        ),
    )?;

    // ── evaluation ───────────────────────────────────────────────
    b.register(
        ToolDescriptor::new(
            "start_eval_run",
            "Start an evaluation run with a set of test cases to measure agent or model quality.",
            Category::Evaluation,
            Phase::Verify,
        )
        .with_tags(&["eval", "benchmark", "test cases", "score"])
        .with_schema(schema(
            &[
                ("name", "string", "Run name"),
                ("cases", "array", "Test cases with input and expected output"),
            ],
            &["name"],
        ))
        .with_quick_ref("Record a result for each case", &["record_eval_result"], "eval-driven development")
        .with_complexity(Complexity::Medium),
    )?;
    b.register(
        ToolDescriptor::new(
            "record_eval_result",
            "Record the actual output and verdict of one evaluation case.",
            Category::Evaluation,
            Phase::Verify,
        )
        .with_tags(&["eval", "result", "verdict"])
        .with_schema(schema(
            &[
                ("run_id", "string", "Evaluation run id"),
                ("case_id", "string", "Case id"),
                ("passed", "boolean", "Verdict"),
            ],
            &["run_id", "case_id", "passed"],
        ))
        .with_quick_ref("Compare against a baseline run", &["compare_eval_runs"], "eval-driven development"),
    )?;
    b.register(
        ToolDescriptor::new(
            "compare_eval_runs",
            "Compare two evaluation runs and report regressions and improvements per case.",
            Category::Evaluation,
            Phase::Verify,
        )
        .with_tags(&["eval", "compare", "regression", "baseline"])
        .with_schema(schema(
            &[
                ("baseline_run_id", "string", "Baseline run"),
                ("candidate_run_id", "string", "Candidate run"),
            ],
            &["baseline_run_id", "candidate_run_id"],
        ))
        .with_quick_ref("Gate the release on the comparison", &["run_quality_gate"], "eval-driven development"),
    )?;
    b.register(
        ToolDescriptor::new(
            "list_eval_runs",
            "List recent evaluation runs with pass rates.",
            Category::Evaluation,
            Phase::Verify,
        )
        .with_tags(&["eval", "history"])
        .with_quick_ref("Open a run to compare", &["compare_eval_runs"], "eval-driven development"),
    )?;

    // ── quality gates ────────────────────────────────────────────
    b.register(
        ToolDescriptor::new(
            "run_quality_gate",
            "Run a quality gate: evaluate a list of boolean checks (tests pass, lint clean, no secrets) and return pass or fail.",
            Category::QualityGate,
            Phase::Ship,
        )
        .with_tags(&["gate", "checks", "lint", "tests", "release"])
        .with_schema(schema(
            &[
                ("gate", "string", "Gate name or preset"),
                ("checks", "array", "Checks with name and passed flag"),
            ],
            &["gate"],
        ))
        .with_quick_ref("Record the gate result for the audit trail", &["record_gate_result"], "quality gates"),
    )?;
    b.register(
        ToolDescriptor::new(
            "get_gate_preset",
            "Get the rules of a built-in quality gate preset (engagement, ui_ux_qa, deploy_readiness).",
            Category::QualityGate,
            Phase::Ship,
        )
        .with_tags(&["gate", "preset", "rules"])
        .with_schema(schema(&[("preset", "string", "Preset name")], &["preset"]))
        .with_quick_ref("Run the gate with the preset's checks", &["run_quality_gate"], "quality gates"),
    )?;
    b.register(
        ToolDescriptor::new(
            "record_gate_result",
            "Persist a quality gate outcome so trends can be tracked across releases.",
            Category::QualityGate,
            Phase::Ship,
        )
        .with_tags(&["gate", "history", "audit"])
        .with_schema(schema(
            &[
                ("gate", "string", "Gate name"),
                ("passed", "boolean", "Outcome"),
            ],
            &["gate", "passed"],
        ))
        .with_quick_ref("Capture what you learned", &["record_learning"], "quality gates"),
    )?;

    // ── learning ─────────────────────────────────────────────────
    b.register(
        ToolDescriptor::new(
            "record_learning",
            "Save a learning (pattern, gotcha, fix) to the persistent knowledge base for future sessions.",
            Category::Learning,
            Phase::Learn,
        )
        .with_tags(&["knowledge", "memory", "lesson", "gotcha"])
        .with_schema(schema(
            &[
                ("key", "string", "Short unique key"),
                ("content", "string", "What was learned"),
                ("category", "string", "pattern, gotcha, fix or convention"),
            ],
            &["key", "content"],
        ))
        .with_quick_ref("Search learnings before starting new work", &["search_learnings"], "knowledge flywheel"),
    )?;
    b.register(
        ToolDescriptor::new(
            "search_learnings",
            "Search the knowledge base for past learnings relevant to the current task.",
            Category::Learning,
            Phase::Research,
        )
        .with_tags(&["knowledge", "memory", "lookup"])
        .with_schema(schema(&[("query", "string", "What to look for")], &["query"]))
        .with_quick_ref("Apply the learnings, then verify", &["start_verification_cycle"], "knowledge flywheel"),
    )?;
    b.register(
        ToolDescriptor::new(
            "list_learnings",
            "List stored learnings, optionally filtered by category.",
            Category::Learning,
            Phase::Learn,
        )
        .with_tags(&["knowledge", "memory"])
        .with_quick_ref("Search for specifics", &["search_learnings"], "knowledge flywheel"),
    )?;

    // ── recon ────────────────────────────────────────────────────
    b.register(
        ToolDescriptor::new(
            "run_recon",
            "Start a reconnaissance session: research the codebase, dependencies and upstream changes before implementing.",
            Category::Recon,
            Phase::Research,
        )
        .with_tags(&["research", "investigate", "context", "explore"])
        .with_schema(schema(
            &[
                ("target", "string", "What to investigate"),
                ("scope", "string", "Optional scope limit"),
            ],
            &["target"],
        ))
        .with_quick_ref("Log each finding", &["log_recon_finding"], "recon before code")
        .with_complexity(Complexity::Medium),
    )?;
    b.register(
        ToolDescriptor::new(
            "log_recon_finding",
            "Record a reconnaissance finding such as a breaking change, API quirk or relevant pattern.",
            Category::Recon,
            Phase::Research,
        )
        .with_tags(&["research", "finding", "note"])
        .with_schema(schema(
            &[
                ("session_id", "string", "Recon session id"),
                ("finding", "string", "The finding"),
            ],
            &["session_id", "finding"],
        ))
        .with_quick_ref("Summarize once done", &["get_recon_summary"], "recon before code"),
    )?;
    b.register(
        ToolDescriptor::new(
            "get_recon_summary",
            "Summarize all findings of a reconnaissance session into an implementation brief.",
            Category::Recon,
            Phase::Research,
        )
        .with_tags(&["research", "summary", "brief"])
        .with_schema(schema(&[("session_id", "string", "Recon session id")], &["session_id"]))
        .with_quick_ref("Start verification for the change", &["start_verification_cycle"], "recon before code"),
    )?;

    // ── flywheel ─────────────────────────────────────────────────
    b.register(
        ToolDescriptor::new(
            "run_closed_loop",
            "Run the closed loop: compile, lint, test and self-debug until green.",
            Category::Flywheel,
            Phase::Implement,
        )
        .with_tags(&["build", "compile", "test", "loop", "debug"])
        .with_schema(schema(
            &[("steps", "array", "Commands to run in order")],
            &[],
        ))
        .with_quick_ref("Promote stable fixes into evals", &["promote_to_eval"], "AI flywheel")
        .with_complexity(Complexity::High),
    )?;
    b.register(
        ToolDescriptor::new(
            "get_flywheel_status",
            "Show the state of the development flywheel: open loops, recent gates and eval coverage.",
            Category::Flywheel,
            Phase::Learn,
        )
        .with_tags(&["status", "overview", "dashboard"])
        .with_quick_ref("Close open loops", &["run_closed_loop"], "AI flywheel"),
    )?;
    b.register(
        ToolDescriptor::new(
            "promote_to_eval",
            "Promote a verified fix or bug into a permanent evaluation case to prevent regressions.",
            Category::Flywheel,
            Phase::Learn,
        )
        .with_tags(&["eval", "regression", "promote"])
        .with_schema(schema(
            &[
                ("title", "string", "Case title"),
                ("input", "string", "Case input"),
                ("expected", "string", "Expected behaviour"),
            ],
            &["title", "input"],
        ))
        .with_quick_ref("Start an eval run with the new case", &["start_eval_run"], "AI flywheel"),
    )?;

    // ── ui capture ───────────────────────────────────────────────
    b.register(
        ToolDescriptor::new(
            "capture_ui_screenshot",
            "Capture a screenshot of a URL or running app at a given viewport for visual review.",
            Category::UiCapture,
            Phase::Verify,
        )
        .with_tags(&["screenshot", "visual", "capture", "browser"])
        .with_schema(schema(
            &[
                ("url", "string", "Page to capture"),
                ("viewport", "string", "mobile, tablet or desktop"),
            ],
            &["url"],
        ))
        .with_quick_ref("Analyze the capture", &["analyze_screenshot"], "visual QA"),
    )?;
    b.register(
        ToolDescriptor::new(
            "capture_responsive_suite",
            "Capture screenshots of a page at mobile, tablet and desktop breakpoints in one call.",
            Category::UiCapture,
            Phase::Verify,
        )
        .with_tags(&["screenshot", "responsive", "breakpoints", "visual"])
        .with_schema(schema(&[("url", "string", "Page to capture")], &["url"]))
        .with_quick_ref("Compare against the baseline", &["diff_screenshots"], "visual QA"),
    )?;
    b.register(
        ToolDescriptor::new(
            "diff_screenshots",
            "Pixel-diff two screenshots and report changed regions.",
            Category::UiCapture,
            Phase::Verify,
        )
        .with_tags(&["screenshot", "diff", "regression", "visual"])
        .with_schema(schema(
            &[
                ("before", "string", "Baseline image path"),
                ("after", "string", "New image path"),
            ],
            &["before", "after"],
        ))
        .with_quick_ref("Log visual regressions as gaps", &["log_gap"], "visual QA"),
    )?;

    // ── vision ───────────────────────────────────────────────────
    b.register(
        ToolDescriptor::new(
            "analyze_screenshot",
            "Analyze a screenshot with a vision model: layout issues, contrast, overlapping elements.",
            Category::Vision,
            Phase::Verify,
        )
        .with_tags(&["vision", "image", "ui", "accessibility"])
        .with_schema(schema(
            &[
                ("image", "string", "Image path or base64 data"),
                ("prompt", "string", "What to look for"),
            ],
            &["image"],
        ))
        .with_quick_ref("Log findings as gaps", &["log_gap"], "visual QA")
        .with_complexity(Complexity::Medium),
    )?;
    b.register(
        ToolDescriptor::new(
            "describe_ui_layout",
            "Describe the component hierarchy and layout of a UI image in structured form.",
            Category::Vision,
            Phase::Research,
        )
        .with_tags(&["vision", "layout", "components"])
        .with_schema(schema(&[("image", "string", "Image path")], &["image"]))
        .with_quick_ref("Capture the live page to compare", &["capture_ui_screenshot"], "visual QA"),
    )?;
    b.register(
        ToolDescriptor::new(
            "discover_vision_env",
            "Check which vision providers and browser drivers are available in this environment.",
            Category::Vision,
            Phase::Research,
        )
        .with_tags(&["vision", "environment", "providers"])
        .with_quick_ref("Capture a screenshot", &["capture_ui_screenshot"], "visual QA"),
    )?;

    // ── web ──────────────────────────────────────────────────────
    b.register(
        ToolDescriptor::new(
            "fetch_url",
            "Fetch a URL and return its content as markdown or raw text.",
            Category::Web,
            Phase::Research,
        )
        .with_tags(&["http", "download", "page", "scrape"])
        .with_schema(schema(
            &[
                ("url", "string", "URL to fetch"),
                ("format", "string", "markdown or text"),
            ],
            &["url"],
        ))
        .with_quick_ref("Extract links to go deeper", &["extract_page_links"], "web research"),
    )?;
    b.register(
        ToolDescriptor::new(
            "web_search",
            "Search the web and return ranked results with titles, URLs and snippets.",
            Category::Web,
            Phase::Research,
        )
        .with_tags(&["search", "internet", "lookup", "google"])
        .with_schema(schema(
            &[
                ("query", "string", "Search query"),
                ("limit", "integer", "Max results"),
            ],
            &["query"],
        ))
        .with_quick_ref("Fetch the most relevant result", &["fetch_url"], "web research"),
    )?;
    b.register(
        ToolDescriptor::new(
            "extract_page_links",
            "Extract all links from a web page, optionally filtered by domain.",
            Category::Web,
            Phase::Research,
        )
        .with_tags(&["links", "crawl", "page"])
        .with_schema(schema(&[("url", "string", "Page URL")], &["url"]))
        .with_quick_ref("Fetch linked pages", &["fetch_url"], "web research"),
    )?;

    // ── email ────────────────────────────────────────────────────
    b.register(
        ToolDescriptor::new(
            "send_email",
            "Send an email message to one or more recipients with a subject and body.",
            Category::Email,
            Phase::Ship,
        )
        .with_tags(&["mail", "message", "notify", "smtp"])
        .with_schema(schema(
            &[
                ("to", "string", "Recipient address"),
                ("subject", "string", "Subject line"),
                ("body", "string", "Message body"),
            ],
            &["to", "subject", "body"],
        ))
        .with_quick_ref("Check the inbox for replies", &["read_email"], "async communication"),
    )?;
    b.register(
        ToolDescriptor::new(
            "read_email",
            "Read recent email messages from the inbox, optionally filtered by sender or subject.",
            Category::Email,
            Phase::Research,
        )
        .with_tags(&["mail", "inbox", "message", "imap"])
        .with_schema(schema(
            &[
                ("folder", "string", "Mailbox folder"),
                ("limit", "integer", "Max messages"),
            ],
            &[],
        ))
        .with_quick_ref("Reply to a message", &["draft_email_reply", "send_email"], "async communication"),
    )?;
    b.register(
        ToolDescriptor::new(
            "draft_email_reply",
            "Draft a reply to an email message using the thread as context.",
            Category::Email,
            Phase::Implement,
        )
        .with_tags(&["mail", "reply", "draft"])
        .with_schema(schema(
            &[
                ("message_id", "string", "Message to reply to"),
                ("tone", "string", "Desired tone"),
            ],
            &["message_id"],
        ))
        .with_quick_ref("Send the draft", &["send_email"], "async communication"),
    )?;

    // ── security ─────────────────────────────────────────────────
    b.register(
        ToolDescriptor::new(
            "scan_dependencies",
            "Scan project dependencies for known vulnerabilities (CVE advisories) and outdated packages.",
            Category::Security,
            Phase::Verify,
        )
        .with_tags(&["security", "cve", "vulnerability", "audit", "dependencies"])
        .with_schema(schema(&[("manifest", "string", "Path to the manifest file")], &[]))
        .with_quick_ref("Audit the repo for leaked secrets", &["audit_secrets"], "security audit")
        .with_complexity(Complexity::Medium),
    )?;
    b.register(
        ToolDescriptor::new(
            "audit_secrets",
            "Audit the repository for leaked credentials, API keys and tokens.",
            Category::Security,
            Phase::Verify,
        )
        .with_tags(&["security", "secrets", "credentials", "audit", "leak"])
        .with_schema(schema(&[("path", "string", "Directory to audit")], &[]))
        .with_quick_ref("Check deployed headers", &["check_security_headers"], "security audit"),
    )?;
    b.register(
        ToolDescriptor::new(
            "check_security_headers",
            "Check HTTP security headers (CSP, HSTS, X-Frame-Options) of a deployed URL.",
            Category::Security,
            Phase::Ship,
        )
        .with_tags(&["security", "headers", "http", "csp"])
        .with_schema(schema(&[("url", "string", "Deployed URL")], &["url"]))
        .with_quick_ref("Gate the release", &["run_quality_gate"], "security audit"),
    )?;

    // ── github ───────────────────────────────────────────────────
    b.register(
        ToolDescriptor::new(
            "search_github",
            "Search GitHub repositories, code and issues for prior art.",
            Category::Github,
            Phase::Research,
        )
        .with_tags(&["github", "repository", "code search", "issues"])
        .with_schema(schema(
            &[
                ("query", "string", "Search query"),
                ("kind", "string", "repositories, code or issues"),
            ],
            &["query"],
        ))
        .with_quick_ref("Analyze a promising repository", &["analyze_repo"], "prior art research"),
    )?;
    b.register(
        ToolDescriptor::new(
            "analyze_repo",
            "Analyze a repository: structure, tech stack, activity and notable patterns.",
            Category::Github,
            Phase::Research,
        )
        .with_tags(&["github", "repository", "architecture"])
        .with_schema(schema(&[("repo", "string", "owner/name")], &["repo"]))
        .with_quick_ref("Record what to reuse", &["record_learning"], "prior art research"),
    )?;
    b.register(
        ToolDescriptor::new(
            "create_pull_request",
            "Open a pull request with a title, description and target branch.",
            Category::Github,
            Phase::Ship,
        )
        .with_tags(&["github", "pull request", "pr", "review"])
        .with_schema(schema(
            &[
                ("repo", "string", "owner/name"),
                ("title", "string", "PR title"),
                ("head", "string", "Source branch"),
                ("base", "string", "Target branch"),
            ],
            &["repo", "title", "head"],
        ))
        .with_quick_ref("Run the deploy readiness gate", &["run_quality_gate"], "ship"),
    )?;

    // ── docs ─────────────────────────────────────────────────────
    b.register(
        ToolDescriptor::new(
            "update_agents_md",
            "Update the AGENTS.md instructions file with new conventions and learnings.",
            Category::Documentation,
            Phase::Learn,
        )
        .with_tags(&["docs", "agents", "instructions", "markdown"])
        .with_schema(schema(&[("section", "string", "Section to update"), ("content", "string", "New content")], &["content"]))
        .with_quick_ref("Record the learning too", &["record_learning"], "living documentation"),
    )?;
    b.register(
        ToolDescriptor::new(
            "generate_report",
            "Generate a markdown report summarizing verification, evals and gates for a change.",
            Category::Documentation,
            Phase::Ship,
        )
        .with_tags(&["docs", "report", "summary", "markdown"])
        .with_schema(schema(&[("title", "string", "Report title")], &["title"]))
        .with_quick_ref("Share the report", &["send_email", "create_pull_request"], "living documentation"),
    )?;
    b.register(
        ToolDescriptor::new(
            "search_docs",
            "Search project documentation and methodology guides.",
            Category::Documentation,
            Phase::Research,
        )
        .with_tags(&["docs", "methodology", "guide", "lookup"])
        .with_schema(schema(&[("query", "string", "What to look for")], &["query"]))
        .with_quick_ref("Apply the guide", &["start_verification_cycle"], "living documentation"),
    )?;

    // ── llm ──────────────────────────────────────────────────────
    b.register(
        ToolDescriptor::new(
            "call_llm",
            "Call a language model provider with a prompt and return the completion.",
            Category::Llm,
            Phase::Implement,
        )
        .with_tags(&["llm", "model", "prompt", "completion", "ai"])
        .with_schema(schema(
            &[
                ("prompt", "string", "Prompt text"),
                ("model", "string", "Provider model id"),
            ],
            &["prompt"],
        ))
        .with_quick_ref("Extract structure from the answer", &["extract_structured_data"], "LLM bridging"),
    )?;
    b.register(
        ToolDescriptor::new(
            "extract_structured_data",
            "Extract structured JSON fields from unstructured text using a language model.",
            Category::Llm,
            Phase::Implement,
        )
        .with_tags(&["llm", "json", "extraction", "parse"])
        .with_schema(schema(
            &[
                ("text", "string", "Input text"),
                ("fields", "array", "Field names to extract"),
            ],
            &["text", "fields"],
        ))
        .with_quick_ref("Evaluate extraction quality", &["start_eval_run"], "LLM bridging"),
    )?;
    b.register(
        ToolDescriptor::new(
            "benchmark_models",
            "Benchmark several language models on the same prompts for latency, cost and quality.",
            Category::Llm,
            Phase::Verify,
        )
        .with_tags(&["llm", "benchmark", "latency", "cost"])
        .with_schema(schema(&[("models", "array", "Model ids"), ("prompts", "array", "Prompts")], &["models"]))
        .with_quick_ref("Store the comparison as an eval", &["start_eval_run"], "LLM bridging")
        .with_complexity(Complexity::High),
    )?;

    // ── toolsets ─────────────────────────────────────────────────
    let toolsets = [
        ToolsetDefinition::new(
            "verification",
            "Verification",
            "Structured verification cycles and gap tracking",
            &[
                "start_verification_cycle",
                "log_phase_findings",
                "log_gap",
                "resolve_gap",
                "get_verification_status",
            ],
        ),
        ToolsetDefinition::new(
            "eval",
            "Evaluation",
            "Evaluation runs and regression comparison",
            &["start_eval_run", "record_eval_result", "compare_eval_runs", "list_eval_runs"],
        ),
        ToolsetDefinition::new(
            "quality_gate",
            "Quality gates",
            "Boolean release gates and their history",
            &["run_quality_gate", "get_gate_preset", "record_gate_result"],
        ),
        ToolsetDefinition::new(
            "learning",
            "Learning",
            "Persistent knowledge base",
            &["record_learning", "search_learnings", "list_learnings"],
        ),
        ToolsetDefinition::new(
            "recon",
            "Recon",
            "Research sessions before implementation",
            &["run_recon", "log_recon_finding", "get_recon_summary"],
        ),
        ToolsetDefinition::new(
            "flywheel",
            "Flywheel",
            "Closed-loop build/test and eval promotion",
            &["run_closed_loop", "get_flywheel_status", "promote_to_eval"],
        ),
        ToolsetDefinition::new(
            "ui_capture",
            "UI capture",
            "Screenshots and visual diffs",
            &["capture_ui_screenshot", "capture_responsive_suite", "diff_screenshots"],
        ),
        ToolsetDefinition::new(
            "vision",
            "Vision",
            "Vision-model analysis of UI images",
            &["analyze_screenshot", "describe_ui_layout", "discover_vision_env"],
        ),
        ToolsetDefinition::new(
            "web",
            "Web",
            "Fetching and searching the web",
            &["fetch_url", "web_search", "extract_page_links"],
        ),
        ToolsetDefinition::new(
            "email",
            "Email",
            "Reading and sending email",
            &["send_email", "read_email", "draft_email_reply"],
        ),
        ToolsetDefinition::new(
            "security",
            "Security",
            "Dependency, secret and header audits",
            &["scan_dependencies", "audit_secrets", "check_security_headers"],
        ),
        ToolsetDefinition::new(
            "github",
            "GitHub",
            "Repository search, analysis and pull requests",
            &["search_github", "analyze_repo", "create_pull_request"],
        ),
        ToolsetDefinition::new(
            "docs",
            "Docs",
            "Project documentation and reports",
            &["update_agents_md", "generate_report", "search_docs"],
        ),
        ToolsetDefinition::new(
            "llm",
            "LLM",
            "Language model bridging and benchmarking",
            &["call_llm", "extract_structured_data", "benchmark_models"],
        ),
    ];
    for ts in toolsets {
        b.register_toolset(ts)?;
    }

    Ok(b.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog_is_consistent() {
        let reg = builtin().unwrap();
        assert_eq!(reg.toolsets().len(), 14);
        for tool in reg.all() {
            assert!(reg.toolset_of(&tool.name).is_some(), "{} has no toolset", tool.name);
            for next in &tool.quick_ref.next_tools {
                assert!(reg.get(next).is_some(), "{} points at unknown {}", tool.name, next);
            }
        }
    }

    #[test]
    fn test_presets_resolve() {
        let reg = builtin().unwrap();
        assert_eq!(preset_toolsets(&reg, "full").unwrap().len(), 14);
        let lite = preset_toolsets(&reg, "lite").unwrap();
        assert_eq!(lite, vec!["verification".to_string(), "learning".to_string()]);
        for (_, keys) in PRESETS {
            for key in *keys {
                assert!(reg.toolset(key).is_some());
            }
        }
        assert!(preset_toolsets(&reg, "mega").is_none());
    }
}
