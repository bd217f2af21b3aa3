//! Process-wide server state shared by every connection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::config::{LoadingMode, ToolscoutConfig};
use crate::handlers::HandlerTable;
use crate::loader::CapabilityLoader;
use crate::registry::{catalog, Registry};
use crate::search::embedding::{provider_from_config, EmbeddingProvider};
use crate::search::SearchEngine;

/// Dispatcher knobs resolved from config and CLI flags.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub mode: LoadingMode,
    pub call_timeout: Duration,
    /// `discover_tools` honours `compact=true`
    pub compact_enabled: bool,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            mode: LoadingMode::Dynamic,
            call_timeout: Duration::from_secs(30),
            compact_enabled: true,
        }
    }
}

pub struct ServerState {
    pub registry: Arc<Registry>,
    pub search: SearchEngine,
    pub loader: CapabilityLoader,
    pub handlers: HandlerTable,
    pub settings: DispatchSettings,
    pub metrics: DispatchMetrics,
    pub started_at: Instant,
    /// Cancelled on SIGTERM/SIGINT
    pub shutdown: CancellationToken,
}

impl ServerState {
    pub fn new(
        registry: Arc<Registry>,
        embeddings: Arc<dyn EmbeddingProvider>,
        config: &ToolscoutConfig,
        handlers: HandlerTable,
    ) -> Result<Self> {
        if registry.is_empty() {
            anyhow::bail!("Tool registry is empty");
        }
        let initial = initial_toolsets(&registry, config)?;
        let loader = CapabilityLoader::new(registry.clone(), &initial)
            .context("Invalid initial toolsets")?;
        let search = SearchEngine::new(registry.clone(), embeddings, &config.search);

        tracing::info!(
            mode = config.loader.mode.as_str(),
            tools = registry.len(),
            toolsets = registry.toolsets().len(),
            handlers = handlers.len(),
            loaded = ?loader.snapshot().loaded,
            "Server state ready"
        );

        Ok(Self {
            registry,
            search,
            loader,
            handlers,
            settings: DispatchSettings {
                mode: config.loader.mode,
                call_timeout: Duration::from_secs(config.dispatch.call_timeout_secs.max(1)),
                compact_enabled: config.dispatch.compact,
            },
            metrics: DispatchMetrics::new(),
            started_at: Instant::now(),
            shutdown: CancellationToken::new(),
        })
    }

    /// Bundled catalog, acknowledgement handlers and the configured embedding provider.
    pub fn from_config(config: &ToolscoutConfig) -> Result<Arc<Self>> {
        let registry = Arc::new(catalog::builtin().context("Bundled catalog is inconsistent")?);
        let handlers = HandlerTable::builtin(&registry);
        let embeddings = provider_from_config(&config.embedding);
        Ok(Arc::new(Self::new(registry, embeddings, config, handlers)?))
    }
}

/// Toolsets loaded at startup.
///
/// An explicit `initial_toolsets` list always wins. Otherwise static mode
/// loads the configured preset and dynamic mode loads `lite`.
pub fn initial_toolsets(registry: &Registry, config: &ToolscoutConfig) -> Result<Vec<String>> {
    if !config.loader.initial_toolsets.is_empty() {
        return Ok(config.loader.initial_toolsets.clone());
    }
    let preset = match config.loader.mode {
        LoadingMode::Static => config.loader.preset.as_str(),
        LoadingMode::Dynamic => "lite",
    };
    catalog::preset_toolsets(registry, preset).with_context(|| {
        format!("Unknown preset '{}' (expected full, default or lite)", preset)
    })
}

/// Lock-free runtime metrics for the server process.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    pub requests: AtomicUsize,
    pub malformed_frames: AtomicUsize,
    pub tool_calls: AtomicUsize,
    pub tool_errors: AtomicUsize,
    /// Cumulative handler latency in microseconds
    pub tool_latency_us: AtomicUsize,
    pub searches: AtomicUsize,
    pub search_latency_us: AtomicUsize,
    pub loads: AtomicUsize,
    pub unloads: AtomicUsize,
    pub notifications_sent: AtomicUsize,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tool_call(&self, latency_us: usize, is_error: bool) {
        self.tool_calls.fetch_add(1, Ordering::Relaxed);
        self.tool_latency_us.fetch_add(latency_us, Ordering::Relaxed);
        if is_error {
            self.tool_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_search(&self, latency_us: usize) {
        self.searches.fetch_add(1, Ordering::Relaxed);
        self.search_latency_us.fetch_add(latency_us, Ordering::Relaxed);
    }

    pub fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unload(&self) {
        self.unloads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notification(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> serde_json::Value {
        let avg = |total: &AtomicUsize, count: usize| {
            if count > 0 {
                total.load(Ordering::Relaxed) / count
            } else {
                0
            }
        };
        let tool_calls = self.tool_calls.load(Ordering::Relaxed);
        let searches = self.searches.load(Ordering::Relaxed);

        serde_json::json!({
            "requests": self.requests.load(Ordering::Relaxed),
            "malformed_frames": self.malformed_frames.load(Ordering::Relaxed),
            "tool_calls": tool_calls,
            "tool_errors": self.tool_errors.load(Ordering::Relaxed),
            "avg_tool_latency_us": avg(&self.tool_latency_us, tool_calls),
            "searches": searches,
            "avg_search_latency_us": avg(&self.search_latency_us, searches),
            "loads": self.loads.load(Ordering::Relaxed),
            "unloads": self.unloads.load(Ordering::Relaxed),
            "notifications_sent": self.notifications_sent.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_toolsets_by_mode() {
        let registry = catalog::builtin().unwrap();
        let mut config = ToolscoutConfig::default();
        assert_eq!(initial_toolsets(&registry, &config).unwrap(), vec!["verification", "learning"]);

        config.loader.mode = LoadingMode::Static;
        assert_eq!(initial_toolsets(&registry, &config).unwrap().len(), registry.toolsets().len());

        config.loader.preset = "default".into();
        assert!(initial_toolsets(&registry, &config).unwrap().contains(&"web".to_string()));

        config.loader.preset = "mega".into();
        assert!(initial_toolsets(&registry, &config).is_err());

        config.loader.initial_toolsets = vec!["email".into()];
        assert_eq!(initial_toolsets(&registry, &config).unwrap(), vec!["email"]);
    }

    #[test]
    fn test_from_config_rejects_unknown_toolset() {
        let mut config = ToolscoutConfig::default();
        config.loader.initial_toolsets = vec!["crm".into()];
        assert!(ServerState::from_config(&config).is_err());
    }

    #[test]
    fn test_metrics_snapshot() {
        let m = DispatchMetrics::new();
        m.record_tool_call(100, false);
        m.record_tool_call(300, true);
        m.record_search(50);
        let snap = m.snapshot();
        assert_eq!(snap["tool_calls"], 2);
        assert_eq!(snap["tool_errors"], 1);
        assert_eq!(snap["avg_tool_latency_us"], 200);
        assert_eq!(snap["avg_search_latency_us"], 50);
    }
}
