//! Capability loader: the authoritative set of loaded toolsets.
//!
//! State is published as an immutable [`LoaderSnapshot`] behind an `Arc`.
//! Readers clone the `Arc` and always see a whole pre- or post-mutation view.
//! Mutations are serialized by one mutex that is held across the snapshot
//! swap and the event publish, so events arrive in mutation order.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use smol_str::SmolStr;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::registry::Registry;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoaderError {
    #[error("Unknown toolset '{key}'. Available: {}", .available.join(", "))]
    UnknownToolset { key: String, available: Vec<String> },
}

/// Immutable view of the loaded state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoaderSnapshot {
    pub loaded: BTreeSet<SmolStr>,
    /// Visible tool -> the loaded toolset it is visible through
    pub visible: BTreeMap<SmolStr, SmolStr>,
}

impl LoaderSnapshot {
    fn derive(registry: &Registry, loaded: BTreeSet<SmolStr>) -> Self {
        let mut visible = BTreeMap::new();
        // registry order keeps the owning toolset first
        for ts in registry.toolsets() {
            if !loaded.contains(&ts.key) {
                continue;
            }
            for tool in &ts.tools {
                visible.entry(tool.clone()).or_insert_with(|| ts.key.clone());
            }
        }
        Self { loaded, visible }
    }

    pub fn is_visible(&self, tool: &str) -> bool {
        self.visible.contains_key(tool)
    }

    pub fn is_loaded(&self, key: &str) -> bool {
        self.loaded.contains(key)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoaderEvent {
    Loaded { toolset: SmolStr, added_tool_count: usize },
    Unloaded { toolset: SmolStr, removed_tool_count: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LoadOutcome {
    pub added_tool_count: usize,
    pub changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnloadOutcome {
    pub removed_tool_count: usize,
    pub changed: bool,
}

pub struct CapabilityLoader {
    registry: Arc<Registry>,
    state: RwLock<Arc<LoaderSnapshot>>,
    mutation: Mutex<()>,
    events: broadcast::Sender<LoaderEvent>,
}

impl CapabilityLoader {
    /// Create a loader with `initial` toolsets already loaded (no events).
    pub fn new<S: AsRef<str>>(registry: Arc<Registry>, initial: &[S]) -> Result<Self, LoaderError> {
        let mut loaded = BTreeSet::new();
        for key in initial {
            let key = key.as_ref().trim();
            if key.is_empty() {
                continue;
            }
            let def = registry
                .toolset(key)
                .ok_or_else(|| unknown_toolset(&registry, key))?;
            loaded.insert(def.key.clone());
        }
        let snapshot = LoaderSnapshot::derive(&registry, loaded);
        let (events, _) = broadcast::channel(64);
        Ok(Self {
            registry,
            state: RwLock::new(Arc::new(snapshot)),
            mutation: Mutex::new(()),
            events,
        })
    }

    /// Current state. Never a partially applied mutation.
    pub fn snapshot(&self) -> Arc<LoaderSnapshot> {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoaderEvent> {
        self.events.subscribe()
    }

    pub fn load(&self, key: &str) -> Result<LoadOutcome, LoaderError> {
        self.registry
            .toolset(key)
            .ok_or_else(|| unknown_toolset(&self.registry, key))?;

        let _guard = self.mutation.lock().unwrap_or_else(|e| e.into_inner());
        let before = self.snapshot();
        if before.is_loaded(key) {
            return Ok(LoadOutcome {
                added_tool_count: 0,
                changed: false,
            });
        }

        let mut loaded = before.loaded.clone();
        loaded.insert(SmolStr::new(key));
        let after = LoaderSnapshot::derive(&self.registry, loaded);
        let added = after.visible.len() - before.visible.len();
        self.swap(after);

        tracing::info!(toolset = key, added, "Toolset loaded");
        self.publish(LoaderEvent::Loaded {
            toolset: SmolStr::new(key),
            added_tool_count: added,
        });
        Ok(LoadOutcome {
            added_tool_count: added,
            changed: true,
        })
    }

    pub fn unload(&self, key: &str) -> Result<UnloadOutcome, LoaderError> {
        self.registry
            .toolset(key)
            .ok_or_else(|| unknown_toolset(&self.registry, key))?;

        let _guard = self.mutation.lock().unwrap_or_else(|e| e.into_inner());
        let before = self.snapshot();
        if !before.is_loaded(key) {
            return Ok(UnloadOutcome {
                removed_tool_count: 0,
                changed: false,
            });
        }

        let mut loaded = before.loaded.clone();
        loaded.remove(key);
        let after = LoaderSnapshot::derive(&self.registry, loaded);
        let removed = before.visible.len() - after.visible.len();
        self.swap(after);

        tracing::info!(toolset = key, removed, "Toolset unloaded");
        self.publish(LoaderEvent::Unloaded {
            toolset: SmolStr::new(key),
            removed_tool_count: removed,
        });
        Ok(UnloadOutcome {
            removed_tool_count: removed,
            changed: true,
        })
    }

    /// Names of all currently visible tools.
    pub fn list_loaded(&self) -> BTreeSet<SmolStr> {
        self.snapshot().visible.keys().cloned().collect()
    }

    /// Owning toolset of a tool, regardless of load state.
    pub fn tool_to_toolset(&self, name: &str) -> Option<SmolStr> {
        self.registry.toolset_of(name).cloned()
    }

    pub fn is_loaded(&self, key: &str) -> bool {
        self.snapshot().is_loaded(key)
    }

    fn swap(&self, next: LoaderSnapshot) {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(next);
    }

    /// Best-effort: no subscribers is not an error and never undoes the mutation.
    fn publish(&self, event: LoaderEvent) {
        if let Err(e) = self.events.send(event) {
            tracing::debug!("No subscribers for loader event: {:?}", e.0);
        }
    }
}

fn unknown_toolset(registry: &Registry, key: &str) -> LoaderError {
    LoaderError::UnknownToolset {
        key: key.to_string(),
        available: registry.toolsets().iter().map(|t| t.key.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Category, Phase, ToolDescriptor, ToolsetDefinition};

    fn registry() -> Arc<Registry> {
        let mut b = Registry::builder();
        for (name, cat) in [
            ("send_email", Category::Email),
            ("read_email", Category::Email),
            ("fetch_url", Category::Web),
        ] {
            b.register(ToolDescriptor::new(name, name, cat, Phase::Research)).unwrap();
        }
        b.register_toolset(ToolsetDefinition::new("email", "Email", "", &["send_email", "read_email"]))
            .unwrap();
        b.register_toolset(ToolsetDefinition::new("web", "Web", "", &["fetch_url"]))
            .unwrap();
        // overlaps with email
        b.register_toolset(ToolsetDefinition::new("outbox", "Outbox", "", &["send_email"]))
            .unwrap();
        Arc::new(b.build())
    }

    #[test]
    fn test_load_unload_round_trip() {
        let loader = CapabilityLoader::new(registry(), &["web"]).unwrap();
        let before = loader.list_loaded();
        assert_eq!(before.len(), 1);

        let out = loader.load("email").unwrap();
        assert_eq!(out, LoadOutcome { added_tool_count: 2, changed: true });
        assert!(loader.list_loaded().contains("send_email"));

        let out = loader.unload("email").unwrap();
        assert_eq!(out.removed_tool_count, 2);
        assert_eq!(loader.list_loaded(), before);
    }

    #[test]
    fn test_idempotent_load_publishes_nothing() {
        let loader = CapabilityLoader::new(registry(), &["email"]).unwrap();
        let mut rx = loader.subscribe();
        let out = loader.load("email").unwrap();
        assert_eq!(out, LoadOutcome { added_tool_count: 0, changed: false });
        let out = loader.unload("web").unwrap();
        assert!(!out.changed);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_events_follow_mutations() {
        let loader = CapabilityLoader::new(registry(), &[] as &[&str]).unwrap();
        let mut rx = loader.subscribe();
        loader.load("web").unwrap();
        loader.unload("web").unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            LoaderEvent::Loaded { toolset: "web".into(), added_tool_count: 1 }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            LoaderEvent::Unloaded { toolset: "web".into(), removed_tool_count: 1 }
        );
    }

    #[test]
    fn test_unknown_toolset() {
        let loader = CapabilityLoader::new(registry(), &["web"]).unwrap();
        let err = loader.load("crm").unwrap_err();
        let LoaderError::UnknownToolset { key, available } = err;
        assert_eq!(key, "crm");
        assert_eq!(available, vec!["email", "web", "outbox"]);
        assert!(loader.unload("crm").is_err());
        assert!(CapabilityLoader::new(registry(), &["crm"]).is_err());
    }

    #[test]
    fn test_overlapping_toolsets_count_only_new_tools() {
        let loader = CapabilityLoader::new(registry(), &["outbox"]).unwrap();
        assert_eq!(loader.load("email").unwrap().added_tool_count, 1);
        // send_email stays visible through outbox
        assert_eq!(loader.unload("email").unwrap().removed_tool_count, 1);
        assert!(loader.snapshot().is_visible("send_email"));
        assert_eq!(loader.tool_to_toolset("send_email").as_deref(), Some("email"));
        assert!(loader.tool_to_toolset("nope").is_none());
    }

    #[test]
    fn test_send_without_subscribers_keeps_state() {
        let loader = CapabilityLoader::new(registry(), &[] as &[&str]).unwrap();
        loader.load("email").unwrap();
        assert!(loader.is_loaded("email"));
    }
}
