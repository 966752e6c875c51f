//! HTTP surface for the optimizer gateway
//!
//! - `GET /healthz` — liveness check
//! - `POST /v1/optimize` — runs a chat request through the optimizer
//!   pipeline (or straight through, in baseline mode) and returns the
//!   provider's reply alongside the optimization report

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Result, SpectyraError};
use crate::pipeline::{self, OptimizeRequest, OptimizeResponse, PipelineDeps};
use crate::provider::resolve_provider;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub deps: Arc<PipelineDeps>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/healthz", get(health))
        .route("/v1/optimize", post(optimize))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn optimize(
    State(state): State<AppState>,
    Json(req): Json<OptimizeRequest>,
) -> Result<Json<OptimizeResponse>> {
    let provider = resolve_provider(
        &req.provider,
        state.config.openai_api_key.as_deref(),
        state.config.deepseek_api_key.as_deref(),
    )
    .ok_or_else(|| {
        SpectyraError::InvalidInput(format!(
            "provider '{}' is not configured (missing API key or unknown name)",
            req.provider
        ))
    })?;
    let provider: Arc<dyn crate::provider::ChatProvider> = Arc::from(provider);

    info!(provider = req.provider, model = req.model, mode = ?req.mode, "optimize request");

    let response = pipeline::run(req, provider, state.deps.as_ref()).await;
    if let Err(err) = &response {
        warn!(%err, "optimize request failed");
    }
    response.map(Json)
}

pub async fn serve(state: AppState, listen_addr: &str) -> anyhow::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!(addr = listen_addr, "spectyra gateway listening");
    axum::serve(listener, router).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemorySemanticCache;
    use crate::ledger::NoopSavingsLedger;
    use crate::provider::HashingEmbedder;
    use crate::state_store::InMemoryStateStore;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    fn state() -> AppState {
        AppState {
            config: Arc::new(Config::default()),
            deps: Arc::new(PipelineDeps {
                embedder: Arc::new(HashingEmbedder::default()),
                cache: Arc::new(InMemorySemanticCache::new()),
                state_store: Arc::new(InMemoryStateStore::new()),
                ledger: Arc::new(NoopSavingsLedger),
            }),
        }
    }

    #[tokio::test]
    async fn healthz_reports_ok() {
        let router = build_router(state());
        let response = router
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn optimize_rejects_unconfigured_provider() {
        let router = build_router(state());
        let body = json!({
            "path": "talk",
            "provider": "openai",
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hi"}]
        });
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/optimize")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
