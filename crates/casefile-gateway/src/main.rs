use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use casefile_domain::config::{Config, ConfigSeverity};
use casefile_gateway::cli::{Cli, Command};
use casefile_gateway::state::AppState;
use casefile_gateway::{api, cli, runtime_http};
use casefile_sessions::SessionManager;
use casefile_store::JsonFileStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, _path, issues) = cli::load_config()?;
            log_config_issues(&issues);
            run_server(Arc::new(config)).await
        }
        Some(Command::Doctor) => {
            let (config, config_path, issues) = cli::load_config()?;
            log_config_issues(&issues);
            let passed = cli::doctor::run(&config, &config_path).await?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

/// Initialize structured JSON tracing (spec SPEC_FULL §12).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,casefile_gateway=debug")),
        )
        .json()
        .init();
}

fn log_config_issues(issues: &[casefile_domain::config::ConfigIssue]) {
    for issue in issues {
        tracing::warn!("config: {issue}");
    }
}

/// Start the gateway server with the given configuration.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("casefile-gateway starting");

    // ── Config validation (refuse to start only on an Error-severity
    // issue; Warnings are logged and the process keeps going) ──────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Document store ────────────────────────────────────────────────
    // DOCUMENT_STORE_ENDPOINT is an external collaborator (spec §1) with
    // no in-scope wire protocol; when unset, dev/test runs against a
    // JSON-file-backed store instead of refusing to start.
    if config.store.endpoint.is_some() {
        tracing::warn!(
            "DOCUMENT_STORE_ENDPOINT is set but no remote document-store client is \
             implemented in this gateway (spec §1 — external collaborator, interface \
             only) — falling back to the local JSON-file store"
        );
    } else {
        tracing::info!("DOCUMENT_STORE_ENDPOINT unset — using local JSON-file store");
    }
    let store: Arc<dyn casefile_store::DocumentStore> = Arc::new(
        JsonFileStore::new(std::path::Path::new("./casefile-data"))
            .context("initializing document store")?,
    );

    // ── Agent runtime + bridge ───────────────────────────────────────
    let runtime = runtime_http::build(config.bridge.runtime_endpoint.clone())?;
    let bridge = Arc::new(casefile_bridge::AgentBridge::new(
        runtime,
        config.bridge.max_attempts,
    ));
    tracing::info!(max_attempts = config.bridge.max_attempts, "agent bridge ready");

    // ── Session manager (runs the crash-recovery pass) ──────────────
    let sessions = SessionManager::bootstrap(store, bridge, &config.sessions).await;
    tracing::info!(
        max_active = config.sessions.max_active,
        max_recent = config.sessions.max_recent,
        "session manager ready"
    );

    let state = AppState {
        config: config.clone(),
        sessions,
    };

    let app = api::router().with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "casefile-gateway listening");

    axum::serve(listener, app)
        .await
        .context("axum server error")?;

    Ok(())
}
