//
// Copyright (c) The Topolink Contributors
//
// SPDX-License-Identifier: MIT
//

//! The axum router and its handlers. Every route is GET-only; axum
//! answers a mismatched method with 405 on its own, and an unmapped
//! path falls through to a 404 handler.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use topolink_export::serialize::{self, Snapshot};
use topolink_graph::{Graph, Metrics, MetricsSnapshot};

#[derive(Clone)]
struct AppState {
    graph: Arc<Graph>,
    metrics: Arc<Metrics>,
    show_segments: bool,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub show_segments: bool,
}

/// Builds the router without binding a listener, for use in tests.
pub fn router(graph: Arc<Graph>, metrics: Arc<Metrics>, show_segments: bool) -> Router {
    let state = AppState {
        graph,
        metrics,
        show_segments,
    };

    Router::new()
        .route("/health", get(health))
        .route("/graph", get(graph_json))
        .route("/graph.json", get(graph_json))
        .route("/graph.dot", get(graph_dot))
        .route("/graph.nwdiag", get(graph_nwdiag))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `config.bind_addr` and serves the router forever. Intended to
/// be wrapped in `topolink_utils::task::Task::spawn_supervised`.
pub async fn run(graph: Arc<Graph>, metrics: Arc<Metrics>, config: ServerConfig) {
    let app = router(graph, metrics, config.show_segments);

    let listener = match tokio::net::TcpListener::bind(config.bind_addr).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(addr = %config.bind_addr, %error, "failed to bind HTTP listener");
            return;
        }
    };

    info!(addr = %config.bind_addr, "HTTP API listening");
    if let Err(error) = axum::serve(listener, app).await {
        tracing::error!(%error, "HTTP server exited");
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    node_count: usize,
    counters: MetricsSnapshot,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    debug!("received health request");
    let node_count = state.graph.get_nodes().len();
    Json(HealthResponse {
        status: "ok",
        node_count,
        counters: state.metrics.snapshot(),
    })
}

fn snapshot(state: &AppState) -> Snapshot {
    let nodes = state.graph.get_nodes();
    let edges = state.graph.get_edges();
    let segments = state
        .show_segments
        .then(|| state.graph.get_network_segments());
    Snapshot::new(nodes, edges, segments)
}

async fn graph_json(State(state): State<AppState>) -> impl IntoResponse {
    debug!("received graph (json) request");
    let bytes = serialize::to_json(&snapshot(&state));
    ([(header::CONTENT_TYPE, "application/json")], bytes)
}

async fn graph_dot(State(state): State<AppState>) -> impl IntoResponse {
    debug!("received graph (dot) request");
    let bytes = serialize::to_dot(&snapshot(&state));
    ([(header::CONTENT_TYPE, "text/vnd.graphviz")], bytes)
}

async fn graph_nwdiag(State(state): State<AppState>) -> impl IntoResponse {
    debug!("received graph (nwdiag) request");
    let bytes = serialize::to_nwdiag(&snapshot(&state));
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], bytes)
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "not found").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::collections::BTreeMap;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let graph = Arc::new(Graph::new());
        let mut interfaces = BTreeMap::new();
        interfaces.insert(
            "e0".to_string(),
            topolink_graph::InterfaceDetails::default(),
        );
        graph.set_local_node("local", "host-a", interfaces);
        router(graph, Arc::new(Metrics::new()), false)
    }

    #[tokio::test]
    async fn health_returns_ok_status() {
        let response = test_router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn graph_json_and_alias_agree() {
        let router = test_router();
        let a = router
            .clone()
            .oneshot(Request::builder().uri("/graph").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let b = router
            .oneshot(
                Request::builder()
                    .uri("/graph.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(a.status(), StatusCode::OK);
        assert_eq!(b.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn post_to_health_is_method_not_allowed() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/nonexistent")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn graph_dot_has_graphviz_content_type() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/graph.dot")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/vnd.graphviz"
        );
    }
}
