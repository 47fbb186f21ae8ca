//! Tealforge daemon
//!
//! Accepts TEALScript contract source over HTTP, compiles it in an isolated
//! workspace, and returns the generated ARC artifacts.

use anyhow::Context;
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use tealforge_daemon::{DaemonConfig, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Tealforge daemon CLI
#[derive(Parser)]
#[command(name = "tealforged")]
#[command(about = "Tealforge - TEALScript compile service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "TEALFORGE_CONFIG")]
    config: Option<String>,

    /// Bind address
    #[arg(long, env = "TEALFORGE_HOST")]
    host: Option<IpAddr>,

    /// Listen port
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Compiler timeout in milliseconds
    #[arg(long, env = "TEALSCRIPT_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Maximum request body size, e.g. 2mb
    #[arg(long, env = "BODY_LIMIT")]
    body_limit: Option<String>,

    /// Directory with package.json, tsconfig.json and node_modules to seed workspaces from
    #[arg(long, env = "TEALSCRIPT_TEMPLATE_DIR")]
    template_dir: Option<PathBuf>,

    /// Parent directory for per-request workspaces
    #[arg(long, env = "TEALFORGE_WORKSPACE_ROOT")]
    workspace_root: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "TEALFORGE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "TEALFORGE_LOG_JSON")]
    json: bool,
}

impl Cli {
    fn apply(self, config: &mut DaemonConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.compiler.timeout_ms = timeout_ms;
        }
        if let Some(body_limit) = self.body_limit {
            config.server.body_limit = body_limit;
        }
        if let Some(template_dir) = self.template_dir {
            config.workspace.template_dir = Some(template_dir);
        }
        if let Some(root) = self.workspace_root {
            config.workspace.root = Some(root);
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if self.json {
            config.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;
    cli.apply(&mut config);

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let server = Server::new(config)?;
    server.run().await?;
    Ok(())
}
