//! Configuration for tealforge-daemon

use crate::error::{DaemonError, DaemonResult};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use tealforge_core::{ArtifactConfig, CompilerConfig, PipelineConfig, WorkspaceConfig};

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Compiler invocation
    #[serde(default)]
    pub compiler: CompilerConfig,

    /// Workspace layout and scaffolding
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Artifact filtering
    #[serde(default)]
    pub artifacts: ArtifactConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum request body size, e.g. `2mb` or `1048576`
    #[serde(default = "default_body_limit")]
    pub body_limit: String,

    /// Enable permissive CORS
    #[serde(default)]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit: default_body_limit(),
            enable_cors: false,
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn body_limit_bytes(&self) -> DaemonResult<usize> {
        parse_byte_size(&self.body_limit)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    3000
}

fn default_body_limit() -> String {
    "2mb".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Parse a human byte size: plain bytes or a `b`/`kb`/`mb`/`gb` suffix
/// (binary multiples, case-insensitive, optional whitespace).
pub fn parse_byte_size(value: &str) -> DaemonResult<usize> {
    let normalized = value.trim().to_ascii_lowercase();
    let split = normalized
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(normalized.len());
    let (number, unit) = normalized.split_at(split);

    let multiplier: f64 = match unit.trim() {
        "" | "b" => 1.0,
        "kb" | "k" => 1024.0,
        "mb" | "m" => 1024.0 * 1024.0,
        "gb" | "g" => 1024.0 * 1024.0 * 1024.0,
        other => {
            return Err(DaemonError::Config(format!(
                "Invalid size unit '{}' in '{}'",
                other, value
            )))
        }
    };
    let number: f64 = number
        .parse()
        .map_err(|_| DaemonError::Config(format!("Invalid size '{}'", value)))?;
    if !number.is_finite() || number <= 0.0 {
        return Err(DaemonError::Config(format!("Size must be positive: '{}'", value)));
    }

    Ok((number * multiplier).floor() as usize)
}

impl DaemonConfig {
    /// Load configuration: defaults, then an optional file, then
    /// `TEALFORGE__SECTION__FIELD` environment variables.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("TEALFORGE")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Reject settings that would only fail at request time.
    pub fn validate(&self) -> DaemonResult<()> {
        self.server.body_limit_bytes()?;
        if self.compiler.timeout_ms == 0 {
            return Err(DaemonError::Config(
                "compiler.timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.workspace.source_dir.trim().is_empty() || self.workspace.output_dir.trim().is_empty() {
            return Err(DaemonError::Config(
                "workspace.source_dir and workspace.output_dir must be set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            compiler: self.compiler.clone(),
            workspace: self.workspace.clone(),
            artifacts: self.artifacts.clone(),
        }
    }
}
