//! Compile handler

use crate::api::rest::state::AppState;
use crate::error::{ApiError, ApiResult, CompileResponse};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{header, HeaderMap},
    Json,
};
use tealforge_core::{parse_payload, CompileError};

/// `POST /compile`: validate, compile in a fresh workspace, return artifacts.
pub async fn compile(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Json<CompileResponse>> {
    let body = body.map_err(|rejection| ApiError::Http {
        status: rejection.status(),
        message: rejection.body_text(),
    })?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    let request = parse_payload(content_type, &body).map_err(CompileError::from)?;

    tracing::debug!(
        filename = request.filename.as_deref().unwrap_or("<default>"),
        bytes = request.code.len(),
        "compile request accepted"
    );

    let files = state.compiler.compile(request).await?;
    Ok(Json(CompileResponse::success(files)))
}

#[cfg(test)]
mod tests {
    use crate::api::{create_router, AppState};
    use crate::config::ServerConfig;
    use crate::error::CompileResponse;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use std::path::Path;
    use tealforge_core::{CompileService, InvocationShape, PipelineConfig, WorkspaceConfig};
    use tower::ServiceExt;

    fn app(workspace_root: &Path, server: ServerConfig) -> Router {
        let compiler = CompileService::new(PipelineConfig {
            workspace: WorkspaceConfig {
                root: Some(workspace_root.to_path_buf()),
                ..WorkspaceConfig::default()
            },
            compiler: tealforge_core::CompilerConfig {
                invocation: InvocationShape::Direct {
                    executable: "tealforge-no-such-compiler".to_string(),
                    out_dir_flag: "--outDir".to_string(),
                },
                ..Default::default()
            },
            ..PipelineConfig::default()
        });
        create_router(AppState::new(compiler), &server).unwrap()
    }

    async fn post(app: Router, content_type: Option<&str>, body: impl Into<Body>) -> (StatusCode, CompileResponse) {
        let mut builder = Request::builder().method("POST").uri("/compile");
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        let response = app.oneshot(builder.body(body.into()).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn invalid_payloads_are_400_without_a_workspace() {
        let root = tempfile::tempdir().unwrap();
        let cases: Vec<(Option<&str>, &str)> = vec![
            (Some("application/json"), r#"{"code":""}"#),
            (Some("application/json"), r#"{"code":"   "}"#),
            (Some("application/json"), r#"{"filename":"a.algo.ts"}"#),
            (Some("application/json"), r#"{"code":5}"#),
            (Some("application/json"), r#"["code"]"#),
            (Some("application/json"), "not json at all"),
            (Some("text/plain"), r#"{"code":"x"}"#),
            (None, r#"{"code":"x"}"#),
        ];

        for (content_type, body) in cases {
            let (status, envelope) = post(
                app(root.path(), ServerConfig::default()),
                content_type,
                body.to_string(),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
            assert!(!envelope.ok);
            assert!(envelope.error.is_some());
            assert!(envelope.files.is_none());
        }
        assert!(is_empty(root.path()));
    }

    #[tokio::test]
    async fn oversized_body_uses_the_envelope() {
        let root = tempfile::tempdir().unwrap();
        let server = ServerConfig {
            body_limit: "1kb".to_string(),
            ..ServerConfig::default()
        };
        let body = format!(r#"{{"code":"{}"}}"#, "x".repeat(4096));
        let (status, envelope) = post(app(root.path(), server), Some("application/json"), body).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(!envelope.ok);
        assert!(is_empty(root.path()));
    }

    #[tokio::test]
    async fn launch_failure_is_500_and_cleans_up() {
        let root = tempfile::tempdir().unwrap();
        let (status, envelope) = post(
            app(root.path(), ServerConfig::default()),
            Some("application/json"),
            r#"{"code":"export default class A {}"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(envelope
            .error
            .unwrap()
            .contains("tealforge-no-such-compiler"));
        assert!(is_empty(root.path()));
    }
}
