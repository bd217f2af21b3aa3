//! Tool registry: the immutable catalog of tool descriptors and toolsets.
//!
//! A [`Registry`] is assembled once at startup through [`RegistryBuilder`] and
//! shared by `Arc` with the search engine, loader and dispatcher. It exposes no
//! mutation API, so every index derived from it stays valid for the lifetime
//! of the process. Only *loaded-ness* changes at runtime, and that lives in
//! the capability loader.

pub mod catalog;

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use serde_json::{json, Value};
use smol_str::SmolStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Duplicate tool name: {0}")]
    DuplicateTool(String),

    #[error("Duplicate toolset key: {0}")]
    DuplicateToolset(String),

    #[error("Toolset '{toolset}' references unregistered tool '{tool}'")]
    UnknownMember { toolset: String, tool: String },

    #[error("Tool name '{0}' is reserved for a meta-tool")]
    ReservedName(String),
}

/// Functional area a tool belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Verification,
    Evaluation,
    QualityGate,
    Learning,
    Recon,
    Flywheel,
    UiCapture,
    Vision,
    Web,
    Email,
    Security,
    Github,
    Documentation,
    Llm,
}

impl Category {
    pub const ALL: [Category; 14] = [
        Category::Verification,
        Category::Evaluation,
        Category::QualityGate,
        Category::Learning,
        Category::Recon,
        Category::Flywheel,
        Category::UiCapture,
        Category::Vision,
        Category::Web,
        Category::Email,
        Category::Security,
        Category::Github,
        Category::Documentation,
        Category::Llm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Verification => "verification",
            Category::Evaluation => "evaluation",
            Category::QualityGate => "quality_gate",
            Category::Learning => "learning",
            Category::Recon => "recon",
            Category::Flywheel => "flywheel",
            Category::UiCapture => "ui_capture",
            Category::Vision => "vision",
            Category::Web => "web",
            Category::Email => "email",
            Category::Security => "security",
            Category::Github => "github",
            Category::Documentation => "documentation",
            Category::Llm => "llm",
        }
    }

    /// Parse a category name. Unknown names yield `None`, never an error.
    pub fn parse(s: &str) -> Option<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL.into_iter().find(|c| c.as_str() == wanted)
    }
}

/// Workflow stage a tool is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Research,
    Implement,
    Verify,
    Ship,
    Learn,
    /// Discovery and loading tools themselves
    Meta,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Research,
        Phase::Implement,
        Phase::Verify,
        Phase::Ship,
        Phase::Learn,
        Phase::Meta,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Research => "research",
            Phase::Implement => "implement",
            Phase::Verify => "verify",
            Phase::Ship => "ship",
            Phase::Learn => "learn",
            Phase::Meta => "meta",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|p| p.as_str() == wanted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    #[default]
    Low,
    Medium,
    High,
}

/// Short "what next" pointer attached to every tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickRef {
    pub next_action: String,
    pub next_tools: Vec<SmolStr>,
    pub methodology: String,
}

/// Static metadata for one callable tool.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: SmolStr,
    pub description: String,
    pub category: Category,
    pub phase: Phase,
    pub tags: BTreeSet<SmolStr>,
    pub input_schema: Value,
    pub quick_ref: QuickRef,
    pub complexity: Complexity,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<SmolStr>,
        description: impl Into<String>,
        category: Category,
        phase: Phase,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category,
            phase,
            tags: BTreeSet::new(),
            input_schema: json!({ "type": "object", "properties": {} }),
            quick_ref: QuickRef::default(),
            complexity: Complexity::default(),
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags.extend(tags.iter().map(|t| SmolStr::new(t)));
        self
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn with_quick_ref(mut self, next_action: &str, next_tools: &[&str], methodology: &str) -> Self {
        self.quick_ref = QuickRef {
            next_action: next_action.to_string(),
            next_tools: next_tools.iter().map(|t| SmolStr::new(t)).collect(),
            methodology: methodology.to_string(),
        };
        self
    }

    pub fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = complexity;
        self
    }

    /// Wire shape used by `tools/list`.
    pub fn to_mcp_json(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema,
        })
    }
}

/// A named group of tools loaded and unloaded as one unit.
#[derive(Debug, Clone, Serialize)]
pub struct ToolsetDefinition {
    pub key: SmolStr,
    pub name: String,
    pub description: String,
    pub tools: Vec<SmolStr>,
}

impl ToolsetDefinition {
    pub fn new(key: &str, name: &str, description: &str, tools: &[&str]) -> Self {
        Self {
            key: SmolStr::new(key),
            name: name.to_string(),
            description: description.to_string(),
            tools: tools.iter().map(|t| SmolStr::new(t)).collect(),
        }
    }
}

/// Startup-only assembly of a [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    tools: Vec<ToolDescriptor>,
    by_name: HashMap<SmolStr, usize>,
    toolsets: Vec<ToolsetDefinition>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Fails fast on a duplicate or meta-tool name.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<&mut Self, RegistryError> {
        if crate::ipc::meta_tools::is_meta_tool(&descriptor.name) {
            return Err(RegistryError::ReservedName(descriptor.name.to_string()));
        }
        if self.by_name.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateTool(descriptor.name.to_string()));
        }
        self.by_name.insert(descriptor.name.clone(), self.tools.len());
        self.tools.push(descriptor);
        Ok(self)
    }

    /// Register a toolset. Every member must already be a registered tool.
    pub fn register_toolset(&mut self, def: ToolsetDefinition) -> Result<&mut Self, RegistryError> {
        if self.toolsets.iter().any(|t| t.key == def.key) {
            return Err(RegistryError::DuplicateToolset(def.key.to_string()));
        }
        if let Some(missing) = def.tools.iter().find(|t| !self.by_name.contains_key(*t)) {
            return Err(RegistryError::UnknownMember {
                toolset: def.key.to_string(),
                tool: missing.to_string(),
            });
        }
        self.toolsets.push(def);
        Ok(self)
    }

    pub fn build(self) -> Registry {
        let mut owner: HashMap<SmolStr, usize> = HashMap::new();
        for (idx, ts) in self.toolsets.iter().enumerate() {
            for tool in &ts.tools {
                owner.entry(tool.clone()).or_insert(idx);
            }
        }

        let orphans = self
            .tools
            .iter()
            .filter(|t| !owner.contains_key(&t.name))
            .count();
        if orphans > 0 {
            tracing::warn!("{} registered tools belong to no toolset and can never be listed", orphans);
        }

        Registry {
            tools: self.tools,
            by_name: self.by_name,
            toolsets: self.toolsets,
            owner,
        }
    }
}

/// Immutable tool catalog.
#[derive(Debug)]
pub struct Registry {
    tools: Vec<ToolDescriptor>,
    by_name: HashMap<SmolStr, usize>,
    toolsets: Vec<ToolsetDefinition>,
    /// tool name -> index of the first toolset listing it
    owner: HashMap<SmolStr, usize>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.by_name.get(name).map(|&i| &self.tools[i])
    }

    /// Position of a tool in registration order (the search index doc id).
    pub fn position(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// All tools in registration order.
    pub fn all(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn toolsets(&self) -> &[ToolsetDefinition] {
        &self.toolsets
    }

    pub fn toolset(&self, key: &str) -> Option<&ToolsetDefinition> {
        self.toolsets.iter().find(|t| t.key == key)
    }

    /// Key of the toolset owning `name`, regardless of load state.
    pub fn toolset_of(&self, name: &str) -> Option<&SmolStr> {
        self.owner.get(name).map(|&i| &self.toolsets[i].key)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RegistryBuilder {
        let mut b = Registry::builder();
        b.register(ToolDescriptor::new("send_email", "Send an email message", Category::Email, Phase::Ship))
            .unwrap();
        b.register(ToolDescriptor::new("read_email", "Read the inbox", Category::Email, Phase::Research))
            .unwrap();
        b.register(ToolDescriptor::new("fetch_url", "Fetch a web page", Category::Web, Phase::Research))
            .unwrap();
        b
    }

    #[test]
    fn test_duplicate_tool_rejected() {
        let mut b = sample();
        let err = b
            .register(ToolDescriptor::new("fetch_url", "again", Category::Web, Phase::Research))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateTool("fetch_url".into()));
    }

    #[test]
    fn test_meta_tool_names_reserved() {
        let mut b = sample();
        let err = b
            .register(ToolDescriptor::new("discover_tools", "shadow", Category::Web, Phase::Research))
            .unwrap_err();
        assert_eq!(err, RegistryError::ReservedName("discover_tools".into()));
        let err = b
            .register(ToolDescriptor::new("load_toolset", "shadow", Category::Web, Phase::Research))
            .unwrap_err();
        assert_eq!(err, RegistryError::ReservedName("load_toolset".into()));
        assert_eq!(b.build().len(), 3);
    }

    #[test]
    fn test_toolset_members_must_exist() {
        let mut b = sample();
        let err = b
            .register_toolset(ToolsetDefinition::new("web", "Web", "", &["fetch_url", "crawl"]))
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownMember { ref tool, .. } if tool == "crawl"));

        b.register_toolset(ToolsetDefinition::new("web", "Web", "", &["fetch_url"]))
            .unwrap();
        let err = b
            .register_toolset(ToolsetDefinition::new("web", "Web 2", "", &[]))
            .unwrap_err();
        assert_eq!(err, RegistryError::DuplicateToolset("web".into()));
    }

    #[test]
    fn test_lookups() {
        let mut b = sample();
        b.register_toolset(ToolsetDefinition::new("email", "Email", "", &["send_email", "read_email"]))
            .unwrap();
        b.register_toolset(ToolsetDefinition::new("web", "Web", "", &["fetch_url"]))
            .unwrap();
        let reg = b.build();

        assert_eq!(reg.len(), 3);
        assert_eq!(reg.get("read_email").unwrap().category, Category::Email);
        assert!(reg.get("nope").is_none());
        assert_eq!(reg.all()[2].name, "fetch_url");
        assert!(!reg.is_empty());
        assert_eq!(reg.toolset_of("send_email").map(|k| k.as_str()), Some("email"));
        assert_eq!(reg.toolset("web").unwrap().tools.len(), 1);
        assert!(reg.toolset_of("nope").is_none());
    }

    #[test]
    fn test_category_parse() {
        assert_eq!(Category::parse("Quality-Gate"), Some(Category::QualityGate));
        assert_eq!(Category::parse("astrology"), None);
        assert_eq!(Phase::parse("VERIFY"), Some(Phase::Verify));
        assert_eq!(Phase::parse("deploy"), None);
    }
}
