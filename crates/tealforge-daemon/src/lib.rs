//! Tealforge daemon library
//!
//! HTTP surface over `tealforge-core`:
//! - `POST /compile` and `GET /health`
//! - Layered configuration
//! - Server lifecycle management

#![deny(unsafe_code)]

pub mod api;
pub mod config;
pub mod error;
pub mod server;

pub use api::{create_router, AppState};
pub use config::{DaemonConfig, LoggingConfig, ServerConfig};
pub use error::{ApiError, CompileResponse, DaemonError, DaemonResult};
pub use server::Server;
