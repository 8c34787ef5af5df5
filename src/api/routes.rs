//! API Routes
//!
//! `GET /api/v1/nodes` pages over every stored node, and
//! `GET /api/v1/nodes/{address}` returns a single node by IP.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::api::{ApiError, Metrics};
use crate::store::Store;
use crate::types::{node_key, Node, Record, NODE_KEY_PREFIX};

/// Shared API state
pub struct ApiState {
    pub store: Arc<dyn Store>,
    pub metrics: Arc<Metrics>,
}

/// Pagination query parameters; absent or empty values use the defaults
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    page: Option<String>,
    limit: Option<String>,
}

/// A page of stored nodes
#[derive(Debug, Serialize, Deserialize)]
pub struct PaginatedNodes {
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub nodes: Vec<Node>,
}

/// Build the API router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics_prometheus))
        .route("/metrics/json", get(get_metrics_json))
        .route("/api/v1/nodes", get(get_nodes))
        .route("/api/v1/nodes/:address", get(get_node))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP API server until it fails
pub async fn run_api_server(
    listen_addr: String,
    store: Arc<dyn Store>,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    let app = router(Arc::new(ApiState { store, metrics }));

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!("📊 HTTP API server listening on {}", listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// GET /health - Simple health check
async fn health_check() -> impl IntoResponse {
    "OK"
}

/// GET /metrics - Prometheus format metrics
async fn get_metrics_prometheus(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.metrics.to_prometheus(),
    )
}

/// GET /metrics/json - JSON format metrics
async fn get_metrics_json(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.metrics.to_json())
}

/// GET /api/v1/nodes?page=&limit=
async fn get_nodes(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PaginatedNodes>, ApiError> {
    let page = parse_positive(query.page.as_deref(), 1).map_err(ApiError::InvalidPage)?;
    let limit = parse_positive(query.limit.as_deref(), 0).map_err(ApiError::InvalidLimit)?;

    let nodes = load_nodes(state.store.as_ref())?;
    let total = nodes.len();

    let nodes = match paginate(total, page, limit) {
        Some((start, end)) => nodes[start..end].to_vec(),
        None => Vec::new(),
    };

    Ok(Json(PaginatedNodes {
        total,
        page,
        limit,
        nodes,
    }))
}

/// GET /api/v1/nodes/{address}
async fn get_node(
    State(state): State<Arc<ApiState>>,
    Path(address): Path<String>,
) -> Result<Json<Node>, ApiError> {
    let bytes = state
        .store
        .get(&node_key(&address))?
        .ok_or_else(|| ApiError::NodeNotFound(address.clone()))?;

    Ok(Json(Node::decode(&bytes)?))
}

/// Parse an optional query value that must be a positive integer
fn parse_positive(value: Option<&str>, default: usize) -> Result<usize, String> {
    match value {
        None | Some("") => Ok(default),
        Some(raw) => match raw.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(raw.to_string()),
        },
    }
}

/// Every stored node, in key order. The first undecodable record fails the
/// whole scan.
fn load_nodes(store: &dyn Store) -> Result<Vec<Node>, ApiError> {
    let mut nodes = Vec::new();
    let mut decode_error = None;

    store.iterate_prefix(NODE_KEY_PREFIX, &mut |_, value| match Node::decode(value) {
        Ok(node) => {
            nodes.push(node);
            false
        }
        Err(e) => {
            decode_error = Some(e);
            true
        }
    })?;

    match decode_error {
        Some(e) => Err(e.into()),
        None => Ok(nodes),
    }
}

/// Slice bounds for `page` (1-based) of `limit` items out of `total`.
/// A zero `limit` means the whole set on one page. Returns `None` when the
/// page is past the end.
fn paginate(total: usize, page: usize, limit: usize) -> Option<(usize, usize)> {
    if page == 0 {
        return None;
    }

    let limit = if limit == 0 { total } else { limit };
    let start = (page - 1).checked_mul(limit)?;
    if start >= total {
        return None;
    }

    let end = start.saturating_add(limit).min(total);
    Some((start, end))
}
