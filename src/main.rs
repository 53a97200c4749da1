#![forbid(unsafe_code)]

//! `agent-rooms` room server binary.
//!
//! Bootstraps configuration, builds the agent catalog and room registry,
//! then serves the WebSocket gateway and the IPC socket for
//! `agent-rooms-ctl` until a shutdown signal arrives.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use agent_rooms::agent::AgentCatalog;
use agent_rooms::config::GlobalConfig;
use agent_rooms::gateway::{ipc, ws};
use agent_rooms::orchestrator::{RoomManager, RoomSettings};
use agent_rooms::worktree::WorktreeManager;
use agent_rooms::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-rooms", about = "Coding-agent room server", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the listen address.
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Run agents in the requested directory instead of a git worktree.
    #[arg(long)]
    no_worktrees: bool,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("agent-rooms server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if args.no_worktrees {
        config.worktrees.enabled = false;
    }
    config.validate()?;
    info!(
        worktrees = config.worktrees.enabled,
        base_dir = %config.worktrees.base_dir.display(),
        "configuration loaded"
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|err| AppError::Config(format!("invalid listen address: {err}")))?;

    // ── Build shared state ──────────────────────────────
    let catalog = AgentCatalog::from_profiles(config.agent_profiles());
    info!(agents = ?catalog.kinds(), "agent catalog ready");
    let worktrees = Arc::new(WorktreeManager::new(config.worktrees.base_dir.clone()));
    let manager = Arc::new(RoomManager::new(
        catalog,
        worktrees,
        RoomSettings::from_config(&config),
    ));

    // ── Start transports ────────────────────────────────
    let ct = CancellationToken::new();

    let ws_ct = ct.clone();
    let ws_manager = Arc::clone(&manager);
    let ws_handle = tokio::spawn(async move {
        if let Err(err) = ws::serve(addr, ws_manager, ws_ct.clone()).await {
            error!(%err, "websocket gateway failed");
            ws_ct.cancel();
        }
    });

    let ipc_handle = if config.ipc_enabled {
        match ipc::spawn_ipc_server(&config.ipc_name, Arc::clone(&manager), ct.clone()) {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(%err, "ipc server not started");
                None
            }
        }
    } else {
        info!("ipc disabled");
        None
    };

    info!("agent-rooms ready");

    // ── Wait for shutdown ───────────────────────────────
    tokio::select! {
        () = shutdown_signal() => info!("shutdown signal received"),
        () = ct.cancelled() => warn!("transport failure, shutting down"),
    }
    ct.cancel();

    // ── Tear down rooms and worktrees ───────────────────
    manager.destroy_all().await;

    let _ = ws_handle.await;
    if let Some(handle) = ipc_handle {
        let _ = handle.await;
    }
    info!("agent-rooms shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
