use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::routing::{get, post, MethodRouter};
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::api::routes::{route_catalog, RouteDefinition};
use crate::config::AppSettings;
use crate::contract::HttpMethod;
use crate::tasks::default_task_orchestrator;
use crate::tasks::errors::TaskError;
use crate::tasks::orchestrator::{TaskOrchestrator, MAX_UPLOAD_BYTES};

const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub service_name: &'static str,
    pub service_version: &'static str,
    pub started_unix_ms: u128,
    pub route_count: usize,
    pub orchestrator: TaskOrchestrator,
}

impl AppState {
    pub fn new(route_count: usize, orchestrator: TaskOrchestrator) -> Self {
        Self {
            service_name: "taskrelay-backend-core",
            service_version: env!("CARGO_PKG_VERSION"),
            started_unix_ms: now_unix_ms(),
            route_count,
            orchestrator,
        }
    }
}

pub fn build_router(settings: &AppSettings) -> Result<Router, TaskError> {
    let orchestrator = default_task_orchestrator(settings.provider.clone())?;
    Ok(build_router_with_orchestrator(orchestrator))
}

pub fn build_router_with_orchestrator(orchestrator: TaskOrchestrator) -> Router {
    let catalog = route_catalog();
    let state = AppState::new(catalog.len(), orchestrator);
    build_router_with_catalog(catalog, state)
}

fn build_router_with_catalog(catalog: Vec<RouteDefinition>, state: AppState) -> Router {
    let mut router = Router::new();

    for route in catalog {
        match method_router_for(&route) {
            Some(method_router) => {
                debug!(
                    route = %route.spec,
                    domain = ?route.domain,
                    handler = %route.handler_id,
                    "registered route"
                );
                router = router.route(route.spec.path.as_str(), method_router);
            }
            None => warn!(route = %route.spec, "no handler attached for contract route"),
        }
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

pub async fn serve(addr: SocketAddr, settings: AppSettings) -> std::io::Result<()> {
    let missing = settings.provider.missing_required();
    if !missing.is_empty() {
        warn!(
            missing = ?missing,
            "provider credentials are incomplete; task requests will fail with ConfigurationError"
        );
    }
    let app = build_router(&settings).map_err(std::io::Error::other)?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        bind = %addr,
        provider = %settings.provider.base_url,
        "starting taskrelay-backend-core HTTP surface"
    );
    axum::serve(listener, app).await
}

fn method_router_for(route: &RouteDefinition) -> Option<MethodRouter<AppState>> {
    let method_router = match (route.spec.method, route.spec.path.as_str()) {
        (HttpMethod::Get, "/health") => get(health_handler),
        (HttpMethod::Get, "/variants") => get(crate::api::tasks::list_variants_handler),
        (HttpMethod::Post, "/upload") => post(crate::api::uploads::upload_handler)
            .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + MULTIPART_OVERHEAD_BYTES)),
        (HttpMethod::Post, "/status") => post(crate::api::tasks::task_status_handler),
        (HttpMethod::Post, "/{toolVariant}") => post(crate::api::tasks::submit_task_handler),
        _ => return None,
    };
    Some(method_router)
}

async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "status": "ok",
            "service": state.service_name,
            "version": state.service_version,
            "startedUnixMs": state.started_unix_ms,
            "routeCount": state.route_count,
        })),
    )
}

fn now_unix_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis())
}
