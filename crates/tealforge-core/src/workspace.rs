//! Per-request build workspaces
//!
//! Every compile gets its own uniquely named directory under the configured
//! root. The directory is seeded from an optional template (manifest,
//! compiler config, pre-installed dependencies), receives the submitted
//! source last, and is removed when the [`Workspace`] is destroyed or
//! dropped, whichever comes first.

use crate::request::sanitize_filename;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use uuid::Uuid;
use walkdir::WalkDir;

/// Workspace creation/seeding failures
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Failed to create workspace under {}: {source}", root.display())]
    Create {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to seed workspace at {}: {source}", path.display())]
    Seed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Workspace layout and scaffolding sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Parent directory for workspaces; the system temp dir when unset
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Directory name prefix, followed by a fresh UUID
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Source subfolder, relative to the workspace
    #[serde(default = "default_source_dir")]
    pub source_dir: String,

    /// Compiler output subfolder, relative to the workspace
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Filename used when the request carries none
    #[serde(default = "default_filename")]
    pub default_filename: String,

    /// Pre-populated scaffolding copied into every workspace, if present
    #[serde(default)]
    pub template_dir: Option<PathBuf>,

    /// Entries of `template_dir` that are copied
    #[serde(default = "default_template_entries")]
    pub template_entries: Vec<String>,

    /// Project-level compiler config used when the template has none
    #[serde(default)]
    pub fallback_config: Option<PathBuf>,

    /// Name of the compiler config file inside the workspace
    #[serde(default = "default_compiler_config_file")]
    pub compiler_config_file: String,

    /// Also place the compiler config at `tmp/<workspace name>/`
    #[serde(default = "default_true")]
    pub nested_config: bool,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: None,
            prefix: default_prefix(),
            source_dir: default_source_dir(),
            output_dir: default_output_dir(),
            default_filename: default_filename(),
            template_dir: None,
            template_entries: default_template_entries(),
            fallback_config: None,
            compiler_config_file: default_compiler_config_file(),
            nested_config: true,
        }
    }
}

fn default_prefix() -> String {
    "tealscript".to_string()
}

fn default_source_dir() -> String {
    "src".to_string()
}

fn default_output_dir() -> String {
    "artifacts".to_string()
}

fn default_filename() -> String {
    "contract.algo.ts".to_string()
}

fn default_template_entries() -> Vec<String> {
    vec![
        "package.json".to_string(),
        "tsconfig.json".to_string(),
        "node_modules".to_string(),
    ]
}

fn default_compiler_config_file() -> String {
    "tsconfig.json".to_string()
}

fn default_true() -> bool {
    true
}

impl WorkspaceConfig {
    /// Glob handed to package-style compilers, e.g. `src/*.algo.ts`.
    pub fn source_glob(&self) -> String {
        let suffix = self
            .default_filename
            .split_once('.')
            .map(|(_, ext)| format!("*.{ext}"))
            .unwrap_or_else(|| "*".to_string());
        format!("{}/{}", self.source_dir, suffix)
    }
}

/// Creates workspaces according to a [`WorkspaceConfig`]
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    config: WorkspaceConfig,
}

impl WorkspaceManager {
    pub fn new(config: WorkspaceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    fn root(&self) -> PathBuf {
        self.config
            .root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Create a fresh, empty, uniquely named workspace.
    pub fn create(&self) -> Result<Workspace, WorkspaceError> {
        let root = self.root();
        let id = Uuid::new_v4();
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-{}-", self.config.prefix, id))
            .tempdir_in(&root)
            .map_err(|source| WorkspaceError::Create {
                root: root.clone(),
                source,
            })?;

        let path = dir.path().to_path_buf();
        tracing::debug!(workspace = %id, path = %path.display(), "created workspace");

        Ok(Workspace {
            id,
            path,
            dir: Some(dir),
            source_path: None,
        })
    }

    /// Create a workspace and seed it. A workspace that fails to seed is
    /// removed before the error is returned.
    pub fn create_seeded(&self, filename: Option<&str>, code: &str) -> Result<Workspace, WorkspaceError> {
        let mut workspace = self.create()?;
        match workspace.seed(&self.config, filename, code) {
            Ok(()) => Ok(workspace),
            Err(err) => {
                workspace.destroy();
                Err(err)
            }
        }
    }
}

/// An exclusively owned per-request directory
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    path: PathBuf,
    dir: Option<TempDir>,
    source_path: Option<PathBuf>,
}

impl Workspace {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Workspace-relative path of the written source, once seeded.
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Lay out directories, copy scaffolding, then write the source.
    pub fn seed(
        &mut self,
        config: &WorkspaceConfig,
        filename: Option<&str>,
        code: &str,
    ) -> Result<(), WorkspaceError> {
        let safe_name = sanitize_filename(
            filename.unwrap_or(&config.default_filename),
            &config.default_filename,
        );
        let src_dir = self.path.join(&config.source_dir);
        let out_dir = self.path.join(&config.output_dir);
        fs::create_dir_all(&src_dir).map_err(seed_error(&src_dir))?;
        fs::create_dir_all(&out_dir).map_err(seed_error(&out_dir))?;

        if let Some(template) = config.template_dir.as_deref().filter(|dir| dir.is_dir()) {
            for entry in &config.template_entries {
                let from = template.join(entry);
                if !from.exists() {
                    continue;
                }
                let to = self.path.join(entry);
                copy_entry(&from, &to).map_err(seed_error(&to))?;
            }
        } else if let Some(template) = &config.template_dir {
            tracing::debug!(
                workspace = %self.id,
                template = %template.display(),
                "template directory absent, seeding without scaffolding"
            );
        }

        let config_path = self.path.join(&config.compiler_config_file);
        if !config_path.exists() {
            if let Some(fallback) = config.fallback_config.as_deref().filter(|p| p.is_file()) {
                fs::copy(fallback, &config_path).map_err(seed_error(&config_path))?;
            }
        }

        // Written after scaffolding so a template entry can never clobber it.
        let source_path = src_dir.join(&safe_name);
        fs::write(&source_path, code).map_err(seed_error(&source_path))?;
        self.source_path = Some(PathBuf::from(&config.source_dir).join(&safe_name));

        // TEALScript resolves its config relative to tmp/<cwd basename>.
        if config.nested_config && config_path.is_file() {
            if let Some(name) = self.path.file_name() {
                let nested_dir = self.path.join("tmp").join(name);
                fs::create_dir_all(&nested_dir).map_err(seed_error(&nested_dir))?;
                let nested = nested_dir.join(&config.compiler_config_file);
                fs::copy(&config_path, &nested).map_err(seed_error(&nested))?;
            }
        }

        tracing::debug!(workspace = %self.id, source = %source_path.display(), "seeded workspace");
        Ok(())
    }

    /// Remove the workspace recursively. Failures are logged, never returned.
    pub fn destroy(mut self) {
        self.release();
    }

    fn release(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        match dir.close() {
            Ok(()) => tracing::debug!(workspace = %self.id, "removed workspace"),
            Err(err) => tracing::warn!(
                workspace = %self.id,
                path = %self.path.display(),
                error = %err,
                "failed to remove workspace"
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.release();
    }
}

fn seed_error(path: &Path) -> impl FnOnce(io::Error) -> WorkspaceError {
    let path = path.to_path_buf();
    move |source| WorkspaceError::Seed { path, source }
}

fn copy_entry(from: &Path, to: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(from)?;
    if !meta.is_dir() {
        return copy_file_or_link(from, to, &meta);
    }

    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(io::Error::other)?;
        let target = to.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            let meta = entry.metadata().map_err(io::Error::from)?;
            copy_file_or_link(entry.path(), &target, &meta)?;
        }
    }
    Ok(())
}

fn copy_file_or_link(from: &Path, to: &Path, meta: &fs::Metadata) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    #[cfg(unix)]
    if meta.file_type().is_symlink() {
        let target = fs::read_link(from)?;
        return std::os::unix::fs::symlink(target, to);
    }
    #[cfg(not(unix))]
    let _ = meta;
    fs::copy(from, to).map(|_| ())
}
