//! Tealforge core
//!
//! The compile-request lifecycle behind the tealforge HTTP service:
//! - `workspace`: isolated per-request directories, seeded from a template
//! - `runner`: compiler subprocesses with timeout and output capture
//! - `artifacts`: recursive collection and suffix filtering of output files
//! - `pipeline`: the setup, invoke, collect, cleanup sequence

#![deny(unsafe_code)]

pub mod artifacts;
pub mod error;
pub mod invocation;
pub mod pipeline;
pub mod request;
pub mod runner;
pub mod workspace;

pub use artifacts::{Artifact, ArtifactSet, CollectError, Encoding};
pub use error::{CompileError, CompileResult, FailureClass};
pub use invocation::{Invocation, InvocationContext, InvocationShape};
pub use pipeline::{ArtifactConfig, CompileService, CompilerConfig, PipelineConfig};
pub use request::{parse_payload, sanitize_filename, CompileRequest, PayloadError};
pub use runner::{ProcessOutput, ProcessRunner, RunError, SUPPRESSED_DISPOSAL_ERROR};
pub use workspace::{Workspace, WorkspaceConfig, WorkspaceError, WorkspaceManager};
