use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use fm_domain::config::{Config, ConfigSeverity};
use fm_gateway::api;
use fm_gateway::runtime::cache::ThreadCache;
use fm_gateway::runtime::cancel::CancelMap;
use fm_gateway::runtime::locks::TurnLockMap;
use fm_gateway::state::AppState;
use fm_history::{
    HistoryStore, MemoryHistoryStore, NoopHistoryStore, PgHistoryStore, TitleGenerator,
};
use fm_llm::{ClientShape, LlmClients};
use fm_rpc_client::RpcToolManager;
use fm_tools::canned::CannedTool;
use fm_tools::docs::DocSearchTool;
use fm_tools::rpc::RpcTool;
use fm_tools::sql::SqlTool;
use fm_tools::web::WebSearchTool;
use fm_tools::ToolCatalog;

#[derive(Parser)]
#[command(name = "fathom", about = "Conversational analytics gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway (default).
    Serve,
    /// Validate the environment configuration and exit.
    ConfigValidate,
    /// Print the version.
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let config = Arc::new(Config::from_env());
            report_config(&config)?;
            run_server(config).await
        }
        Some(Command::ConfigValidate) => {
            let config = Config::from_env();
            let issues = config.issues();
            for issue in &issues {
                println!("{issue}");
            }
            if issues
                .iter()
                .any(|i| i.severity == ConfigSeverity::Error)
                && !config.runtime.demo_mode
            {
                std::process::exit(1);
            }
            println!("configuration ok");
            Ok(())
        }
        Some(Command::Version) => {
            println!("fathom {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Log configuration issues; hard errors abort startup unless demo mode
/// covers the missing upstream.
fn report_config(config: &Config) -> anyhow::Result<()> {
    for issue in config.issues() {
        match issue.severity {
            ConfigSeverity::Error if !config.runtime.demo_mode => {
                anyhow::bail!("configuration error: {issue}");
            }
            ConfigSeverity::Error => {
                tracing::warn!(%issue, "config error covered by demo mode");
            }
            ConfigSeverity::Warning => tracing::warn!(%issue, "config warning"),
        }
    }
    Ok(())
}

async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    let llm = Arc::new(LlmClients::from_config(
        &config.llm,
        config.runtime.demo_mode,
    )?);

    let catalog = Arc::new(build_catalog(&config).await);
    let history = build_history(&config, &llm).await;

    let state = AppState {
        config: config.clone(),
        llm,
        catalog,
        history,
        threads: Arc::new(ThreadCache::new(
            config.runtime.thread_cache_capacity,
            Duration::from_secs(config.runtime.thread_ttl_secs),
        )),
        cancel_map: Arc::new(CancelMap::new()),
        turn_locks: Arc::new(TurnLockMap::new()),
    };

    spawn_maintenance(&state);

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    tracing::info!(bind = %config.server.bind, "fathom gateway listening");

    axum::serve(listener, app).await.context("server error")
}

/// Register every configured tool adapter. In demo mode the catalog holds
/// canned adapters so turns run end-to-end with no upstreams.
async fn build_catalog(config: &Config) -> ToolCatalog {
    let mut catalog = ToolCatalog::new();

    if config.runtime.demo_mode {
        for tool in CannedTool::demo_set() {
            catalog.register(Arc::new(tool));
        }
        return catalog;
    }

    if let Some(dsn) = config.sql.connection_string() {
        match PgPoolOptions::new()
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy(&dsn)
        {
            Ok(pool) => {
                catalog.register(Arc::new(SqlTool::new(pool, config.sql.timeout_secs)));
            }
            Err(e) => tracing::warn!(error = %e, "warehouse pool init failed, SQL tool disabled"),
        }
    }

    if let Some(endpoint) = &config.docs.endpoint {
        match DocSearchTool::new(
            endpoint.clone(),
            config.docs.knowledge_base.clone(),
            config.docs.default_effort,
        ) {
            Ok(tool) => catalog.register(Arc::new(tool)),
            Err(e) => tracing::warn!(error = %e, "doc retrieval tool init failed"),
        }
    }

    if let Some(endpoint) = &config.web.project_endpoint {
        match WebSearchTool::new(
            endpoint.clone(),
            config.web.connection_name.clone(),
            config.web.timeout_secs,
        ) {
            Ok(tool) => catalog.register(Arc::new(tool)),
            Err(e) => tracing::warn!(error = %e, "web search tool init failed"),
        }
    }

    let rpc = Arc::new(RpcToolManager::discover(&config.rpc).await);
    for tool in RpcTool::all(rpc) {
        catalog.register(Arc::new(tool));
    }

    catalog
}

async fn build_history(config: &Config, llm: &Arc<LlmClients>) -> Arc<dyn HistoryStore> {
    if !config.history.enabled {
        tracing::info!("history persistence disabled");
        return Arc::new(NoopHistoryStore);
    }

    let Some(url) = &config.history.url else {
        if config.runtime.demo_mode {
            tracing::info!("demo mode without HISTORY_URL, using in-memory history");
            return MemoryHistoryStore::new();
        }
        tracing::warn!("HISTORY_URL missing, conversations will not be persisted");
        return Arc::new(NoopHistoryStore);
    };

    let pool = match PgPoolOptions::new()
        .max_connections(8)
        .acquire_timeout(Duration::from_secs(10))
        .connect_lazy(url)
    {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(error = %e, "history pool init failed, persistence disabled");
            return Arc::new(NoopHistoryStore);
        }
    };

    // Titles come from the secondary model through whichever client shape
    // is configured.
    let titler = llm
        .for_shape(ClientShape::Chat)
        .or_else(|_| llm.for_shape(ClientShape::Responses))
        .ok()
        .map(|client| {
            TitleGenerator::new(
                client,
                llm.deployment(fm_domain::turn::ModelChoice::Secondary),
                config.history.title_max_chars,
            )
        });

    let store = PgHistoryStore::new(pool, titler, config.history.title_max_chars);
    if let Err(e) = store.bootstrap().await {
        tracing::warn!(error = %e, "history schema bootstrap failed, writes may fail");
    }
    Arc::new(store)
}

/// Periodic cache maintenance: expire idle provider threads and drop
/// released turn locks.
fn spawn_maintenance(state: &AppState) {
    let threads = state.threads.clone();
    let locks = state.turn_locks.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            threads.sweep_expired();
            locks.prune_idle();
        }
    });
}
