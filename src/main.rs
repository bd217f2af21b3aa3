#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

mod config;
mod error;
mod error_recovery;
mod handlers;
mod harness;
mod ipc;
mod loader;
mod registry;
mod search;
mod state;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{load_config, toolscout_home, LoadingMode, ToolscoutConfig};
use search::{SearchMode, SearchOptions};
use state::ServerState;

#[derive(Parser)]
#[command(name = "toolscout")]
#[command(about = "Tool discovery and on-demand capability loading for MCP agents", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level filter (e.g. debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Config file (defaults to ~/.toolscout/config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server over stdin/stdout
    Serve(ServeArgs),

    /// Search the tool catalog offline
    Search {
        /// Search query
        query: String,
        /// Search mode (exact, fuzzy, prefix, semantic, regex, dense, embedding, hybrid)
        #[arg(short, long, default_value = "hybrid")]
        mode: String,
        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        phase: Option<String>,
        #[arg(long)]
        intent: Option<String>,
        /// Show the per-signal score breakdown
        #[arg(long)]
        explain: bool,
    },

    /// List toolsets and their tools
    Toolsets,

    /// Run the static vs dynamic comparison and store the results
    Compare {
        #[arg(long)]
        rounds: Option<usize>,
        /// SQLite result store (defaults to ~/.toolscout/compare.sqlite)
        #[arg(long)]
        store: Option<PathBuf>,
        #[arg(long)]
        call_timeout_secs: Option<u64>,
    },

    /// Print aggregates from a comparison store
    Report {
        #[arg(long)]
        store: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Loading mode: static or dynamic
    #[arg(long)]
    mode: Option<LoadingMode>,
    /// Preset loaded in static mode (full, default, lite)
    #[arg(long)]
    preset: Option<String>,
    /// Comma-separated toolsets to load at startup
    #[arg(long, value_delimiter = ',')]
    toolsets: Option<Vec<String>>,
    /// Disable the neural embedding provider
    #[arg(long)]
    no_embeddings: bool,
    /// Ignore `compact=true` in discover_tools
    #[arg(long)]
    no_compact: bool,
    /// Per-call timeout for tool handlers
    #[arg(long)]
    call_timeout_secs: Option<u64>,
}

impl ServeArgs {
    fn apply(self, config: &mut ToolscoutConfig) {
        if let Some(mode) = self.mode {
            config.loader.mode = mode;
        }
        if let Some(preset) = self.preset {
            config.loader.preset = preset;
        }
        if let Some(toolsets) = self.toolsets {
            config.loader.initial_toolsets = toolsets
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
        if self.no_embeddings {
            config.embedding.enabled = false;
        }
        if self.no_compact {
            config.dispatch.compact = false;
        }
        if let Some(secs) = self.call_timeout_secs {
            config.dispatch.call_timeout_secs = secs;
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = load_config(cli.config.as_deref());

    match cli.command {
        Commands::Serve(args) => handle_serve(config, args),
        Commands::Search {
            query,
            mode,
            limit,
            category,
            phase,
            intent,
            explain,
        } => {
            let mode = SearchMode::parse(&mode)
                .with_context(|| format!("Unknown search mode '{}'", mode))?;
            handle_search(
                &config,
                &query,
                SearchOptions {
                    category,
                    phase,
                    limit,
                    mode,
                    explain,
                    intent,
                },
            )
        }
        Commands::Toolsets => handle_toolsets(),
        Commands::Compare {
            rounds,
            store,
            call_timeout_secs,
        } => handle_compare(config, cli.config, rounds, store, call_timeout_secs),
        Commands::Report { store } => handle_report(&config, store),
    }
}

/// Logs go to stderr; stdout carries protocol frames.
/// Structured JSON by default, plain text with TOOLSCOUT_LOG_TEXT=1.
fn init_tracing(log_level: &str) {
    let text_logging = std::env::var("TOOLSCOUT_LOG_TEXT")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("toolscout={}", log_level).into());

    if text_logging {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    }
}

fn store_path(config: &ToolscoutConfig, flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| config.harness.store.as_ref().map(PathBuf::from))
        .unwrap_or_else(|| toolscout_home().join("compare.sqlite"))
}

// === Server entry point ===

fn handle_serve(mut config: ToolscoutConfig, args: ServeArgs) -> anyhow::Result<()> {
    args.apply(&mut config);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let result = rt.block_on(async {
        tracing::info!("toolscout server starting (pid {})", std::process::id());
        let state = ServerState::from_config(&config)?;

        // Register signal handlers to trigger graceful shutdown
        let token = state.shutdown.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            let (mut sigterm, mut sigint) =
                match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                    (Ok(t), Ok(i)) => (t, i),
                    (Err(e), _) | (_, Err(e)) => {
                        tracing::warn!("Failed to register signal handlers: {}", e);
                        return;
                    }
                };

            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("SIGTERM received, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    tracing::info!("SIGINT received, initiating graceful shutdown");
                }
            }
            token.cancel();
        });

        let snapshot = state.loader.snapshot();
        eprintln!(
            "{} mode={} tools={} loaded={}",
            harness::process::READY_MARKER,
            state.settings.mode.as_str(),
            state.registry.len(),
            snapshot.loaded.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(",")
        );

        let served = ipc::server::serve(state.clone(), tokio::io::stdin(), tokio::io::stdout()).await;
        tracing::info!(metrics = %state.metrics.snapshot(), "toolscout server stopped");
        served
    });

    // a blocked stdin read must not hold the process open
    rt.shutdown_timeout(Duration::from_millis(200));
    result
}

// === CLI handlers ===

fn handle_search(config: &ToolscoutConfig, query: &str, opts: SearchOptions) -> anyhow::Result<()> {
    let state = ServerState::from_config(config)?;
    let outcome = state.search.search(query, &opts);

    for warning in &outcome.warnings {
        eprintln!("warning: {}", warning);
    }
    if outcome.degraded {
        eprintln!("warning: embeddings unavailable, results degraded");
    }
    if outcome.results.is_empty() {
        println!("No tools match '{}'", query);
        return Ok(());
    }

    for r in &outcome.results {
        println!(
            "{:.3}  {:<30} {:<14} {:<14} {}",
            r.score,
            r.name,
            r.toolset.as_deref().unwrap_or("-"),
            r.category.as_str(),
            r.quick_ref.next_action
        );
        if let Some(breakdown) = &r.breakdown {
            for c in breakdown {
                println!("         {:<10} {:.5}", c.signal.as_str(), c.score);
            }
        }
    }
    Ok(())
}

fn handle_toolsets() -> anyhow::Result<()> {
    let registry = registry::catalog::builtin()?;
    for ts in registry.toolsets() {
        let presets: Vec<&str> = registry::catalog::PRESETS
            .iter()
            .filter(|(_, members)| members.contains(&ts.key.as_str()))
            .map(|(name, _)| *name)
            .collect();
        println!(
            "{:<14} {:>2} tools  [{}]  {}",
            ts.key,
            ts.tools.len(),
            presets.join(","),
            ts.description
        );
        println!("               {}", ts.tools.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(", "));
    }
    Ok(())
}

/// Helper: build a multi-threaded tokio runtime for CLI commands.
fn cli_runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Runtime::new()?)
}

fn handle_compare(
    config: ToolscoutConfig,
    config_path: Option<PathBuf>,
    rounds: Option<usize>,
    store: Option<PathBuf>,
    call_timeout_secs: Option<u64>,
) -> anyhow::Result<()> {
    let opts = harness::HarnessOptions {
        rounds: rounds.unwrap_or(config.harness.rounds),
        call_timeout: Duration::from_secs(call_timeout_secs.unwrap_or(config.harness.call_timeout_secs)),
        ready_timeout: Duration::from_secs(config.harness.ready_timeout_secs),
        grace: Duration::from_secs(config.harness.grace_secs),
        store: store_path(&config, store),
    };

    let mut configs = harness::ServerConfig::default_pair();
    if let Some(path) = &config_path {
        for c in configs.iter_mut() {
            c.args.push("--config".into());
            c.args.push(path.to_string_lossy().to_string());
        }
    }

    let rt = cli_runtime()?;
    rt.block_on(async {
        let summaries = harness::run_comparison(&opts, &configs).await?;
        print!("{}", harness::render_report(&summaries));
        println!("Results stored in {}", opts.store.display());
        anyhow::Ok(())
    })
}

fn handle_report(config: &ToolscoutConfig, store: Option<PathBuf>) -> anyhow::Result<()> {
    let path = store_path(config, store);
    if !path.exists() {
        anyhow::bail!("No result store at {} (run `toolscout compare` first)", path.display());
    }
    let rt = cli_runtime()?;
    rt.block_on(async {
        let store = harness::store::ResultStore::open(&path).await?;
        print!("{}", harness::render_report(&store.summary().await?));
        anyhow::Ok(())
    })
}
