//! Compile request lifecycle
//!
//! `WorkspaceSetup -> Compiling -> Collecting -> Cleanup`. Validation happens
//! before a [`CompileRequest`] exists, so every request reaching this module
//! gets exactly one workspace, and that workspace is removed before
//! [`CompileService::compile`] returns on every path. If the future is
//! dropped mid-compile, the runner kills the compiler's process group and
//! the workspace removes itself on drop.

use crate::artifacts::{self, ArtifactSet};
use crate::error::{CompileError, CompileResult};
use crate::invocation::{InvocationContext, InvocationShape};
use crate::request::CompileRequest;
use crate::runner::{ProcessRunner, SUPPRESSED_DISPOSAL_ERROR};
use crate::workspace::{Workspace, WorkspaceConfig, WorkspaceManager};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Compiler invocation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Invocation template
    #[serde(default)]
    pub invocation: InvocationShape,

    /// Wall-clock budget per compile, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Environment overrides for the compiler process
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Exact stderr texts tolerated on a non-zero exit
    #[serde(default = "default_benign_stderr")]
    pub benign_stderr: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            invocation: InvocationShape::default(),
            timeout_ms: default_timeout_ms(),
            env: BTreeMap::new(),
            benign_stderr: default_benign_stderr(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_benign_stderr() -> Vec<String> {
    vec![SUPPRESSED_DISPOSAL_ERROR.to_string()]
}

/// Which generated files a caller receives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    /// Path suffixes kept in the response; empty keeps everything
    #[serde(default = "default_suffixes")]
    pub suffixes: Vec<String>,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            suffixes: default_suffixes(),
        }
    }
}

fn default_suffixes() -> Vec<String> {
    vec![
        ".arc32.json".to_string(),
        ".arc4.json".to_string(),
        ".arc56.json".to_string(),
    ]
}

/// Everything a [`CompileService`] needs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub compiler: CompilerConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub artifacts: ArtifactConfig,
}

/// Runs compile requests end to end
#[derive(Debug, Clone)]
pub struct CompileService {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    compiler: CompilerConfig,
    artifacts: ArtifactConfig,
    workspaces: WorkspaceManager,
    runner: ProcessRunner,
}

impl CompileService {
    pub fn new(config: PipelineConfig) -> Self {
        let PipelineConfig {
            compiler,
            workspace,
            artifacts,
        } = config;
        let runner = ProcessRunner::new(compiler.benign_stderr.clone());
        Self {
            inner: Arc::new(Inner {
                compiler,
                artifacts,
                workspaces: WorkspaceManager::new(workspace),
                runner,
            }),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.inner.compiler.timeout_ms)
    }

    /// Compile one request and return the filtered artifacts.
    pub async fn compile(&self, request: CompileRequest) -> CompileResult<ArtifactSet> {
        let started = Instant::now();

        let inner = self.inner.clone();
        let workspace = tokio::task::spawn_blocking(move || {
            inner
                .workspaces
                .create_seeded(request.filename.as_deref(), &request.code)
        })
        .await??;
        let id = workspace.id();

        let outcome = self.compile_in(&workspace).await;

        // Cleanup precedes the response on every path; its failures are only logged.
        let released = tokio::task::spawn_blocking(move || workspace.destroy()).await;
        if let Err(err) = released {
            tracing::warn!(workspace = %id, error = %err, "workspace cleanup task failed");
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(files) => tracing::info!(workspace = %id, files = files.len(), elapsed_ms, "compile succeeded"),
            Err(err) => tracing::warn!(workspace = %id, elapsed_ms, error = %err, "compile failed"),
        }
        outcome
    }

    async fn compile_in(&self, workspace: &Workspace) -> CompileResult<ArtifactSet> {
        let ws_config = self.inner.workspaces.config();
        let source = workspace
            .source_path()
            .map(|path| path.to_string_lossy().replace('\\', "/"))
            .ok_or_else(|| CompileError::Internal("workspace was not seeded".to_string()))?;
        let source_glob = ws_config.source_glob();

        let ctx = InvocationContext {
            workspace: workspace.path(),
            source: &source,
            source_glob: &source_glob,
            out_dir: &ws_config.output_dir,
        };
        let invocation = self.inner.compiler.invocation.render(
            &ctx,
            &self.inner.compiler.env,
            self.timeout(),
        );

        tracing::info!(
            workspace = %workspace.id(),
            program = %invocation.program,
            args = ?invocation.args,
            "running compiler"
        );
        let output = self.inner.runner.run(&invocation).await?;
        tracing::debug!(workspace = %workspace.id(), stdout = %output.stdout, "compiler stdout");
        tracing::debug!(workspace = %workspace.id(), stderr = %output.stderr, "compiler stderr");

        let out_dir = workspace.path().join(&ws_config.output_dir);
        let generated = tokio::task::spawn_blocking(move || artifacts::collect(&out_dir)).await??;
        tracing::debug!(
            workspace = %workspace.id(),
            generated = ?generated.keys().collect::<Vec<_>>(),
            "collected compiler output"
        );

        let suffixes = &self.inner.artifacts.suffixes;
        let files = artifacts::filter(generated, suffixes);
        if files.is_empty() {
            let expected = if suffixes.is_empty() {
                vec!["any file".to_string()]
            } else {
                suffixes.clone()
            };
            return Err(CompileError::NoArtifacts { expected });
        }
        Ok(files)
    }
}
