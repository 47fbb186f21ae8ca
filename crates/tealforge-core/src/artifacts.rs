//! Compiler output collection

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// How an artifact's `data` is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Utf8,
    Base64,
}

/// A single generated file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub encoding: Encoding,
    pub data: String,
}

impl Artifact {
    /// Text when the bytes are valid UTF-8, standard base64 otherwise.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(data) => Self {
                encoding: Encoding::Utf8,
                data,
            },
            Err(err) => Self {
                encoding: Encoding::Base64,
                data: base64::engine::general_purpose::STANDARD.encode(err.into_bytes()),
            },
        }
    }
}

/// Relative path (always `/`-separated) to artifact
pub type ArtifactSet = BTreeMap<String, Artifact>;

#[derive(Debug, Error)]
#[error("Failed to read artifacts under {}: {source}", path.display())]
pub struct CollectError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Read every regular file below `output_dir`.
///
/// A missing directory yields an empty set. Files that disappear between
/// listing and reading are skipped.
pub fn collect(output_dir: &Path) -> Result<ArtifactSet, CollectError> {
    let mut artifacts = ArtifactSet::new();
    if !output_dir.is_dir() {
        return Ok(artifacts);
    }

    for entry in WalkDir::new(output_dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if is_vanished(err.io_error()) => continue,
            Err(err) => {
                let path = err
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| output_dir.to_path_buf());
                return Err(CollectError {
                    path,
                    source: io::Error::from(err),
                });
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let bytes = match std::fs::read(entry.path()) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %entry.path().display(), "artifact vanished before read");
                continue;
            }
            Err(source) => {
                return Err(CollectError {
                    path: entry.path().to_path_buf(),
                    source,
                })
            }
        };

        let Ok(rel) = entry.path().strip_prefix(output_dir) else {
            continue;
        };
        artifacts.insert(relative_key(rel), Artifact::from_bytes(bytes));
    }

    Ok(artifacts)
}

fn is_vanished(err: Option<&io::Error>) -> bool {
    matches!(err, Some(err) if err.kind() == io::ErrorKind::NotFound)
}

fn relative_key(rel: &Path) -> String {
    rel.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Keep entries whose path ends with one of `suffixes`; an empty list keeps
/// everything.
pub fn filter(artifacts: ArtifactSet, suffixes: &[String]) -> ArtifactSet {
    if suffixes.is_empty() {
        return artifacts;
    }
    artifacts
        .into_iter()
        .filter(|(path, _)| suffixes.iter().any(|suffix| path.ends_with(suffix.as_str())))
        .collect()
}
