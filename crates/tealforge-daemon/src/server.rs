//! Server setup and lifecycle management

use crate::api::{create_router, AppState};
use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};
use tealforge_core::CompileService;
use tokio::net::TcpListener;

/// Tealforge daemon server
pub struct Server {
    config: DaemonConfig,
    compiler: CompileService,
}

impl Server {
    /// Create a new server with the given configuration
    pub fn new(config: DaemonConfig) -> DaemonResult<Self> {
        config.validate()?;
        let compiler = CompileService::new(config.pipeline());
        Ok(Self { config, compiler })
    }

    /// Run the server until Ctrl+C or SIGTERM
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr();
        let app = create_router(AppState::new(self.compiler), &self.config.server)?;

        let listener = TcpListener::bind(addr).await?;

        tracing::info!("tealforge daemon listening on {}", listener.local_addr()?);
        tracing::info!(
            timeout_ms = self.config.compiler.timeout_ms,
            body_limit = %self.config.server.body_limit,
            program = self.config.compiler.invocation.program(),
            "compiler configured"
        );
        match &self.config.workspace.template_dir {
            Some(dir) if dir.is_dir() => {
                tracing::info!(template = %dir.display(), "workspace template found")
            }
            Some(dir) => tracing::warn!(
                template = %dir.display(),
                "workspace template missing; workspaces will be seeded without it"
            ),
            None => tracing::info!("no workspace template configured"),
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()))?;

        tracing::info!("tealforge daemon shutting down");
        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
