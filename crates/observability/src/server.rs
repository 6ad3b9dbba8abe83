//! `/metrics` HTTP endpoint
//!
//! Pull-based: every request merges the registered worker snapshots afresh.

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use contracts::SnapshotStore;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::aggregate::MetricsAggregator;
use crate::exposition::CONTENT_TYPE;

/// Router exposing `GET /metrics`
pub fn router<S>(aggregator: MetricsAggregator<S>) -> Router
where
    S: SnapshotStore + Clone + Sync + 'static,
{
    Router::new()
        .route("/metrics", get(metrics_handler::<S>))
        .with_state(aggregator)
}

async fn metrics_handler<S>(State(aggregator): State<MetricsAggregator<S>>) -> Response
where
    S: SnapshotStore + Clone + Sync + 'static,
{
    match aggregator.aggregate().await {
        Ok(body) => ([(header::CONTENT_TYPE, CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to aggregate worker metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Serve the metrics endpoint on `0.0.0.0:port` until the task is dropped
pub async fn serve<S>(port: u16, aggregator: MetricsAggregator<S>) -> Result<()>
where
    S: SnapshotStore + Clone + Sync + 'static,
{
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind metrics listener on port {port}"))?;

    info!(
        "Metrics server running on http://localhost:{}/metrics",
        port
    );

    axum::serve(listener, router(aggregator))
        .await
        .context("Metrics server failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::InMemorySnapshotStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get_metrics(app: Router) -> (StatusCode, String, String) {
        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string())
            .unwrap_or_default();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_metrics_endpoint_without_workers() {
        let app = router(MetricsAggregator::new(InMemorySnapshotStore::new()));

        let (status, content_type, body) = get_metrics(app).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type, CONTENT_TYPE);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_metrics_endpoint_is_computed_per_request() {
        let store = InMemorySnapshotStore::new();
        let app = router(MetricsAggregator::new(store.clone()));

        store
            .register_snapshot("1", "# TYPE c_total counter\nc_total 1\n".into())
            .await
            .unwrap();
        let (_, _, first) = get_metrics(app.clone()).await;
        assert!(first.contains("c_total 1"));

        store
            .register_snapshot("2", "# TYPE c_total counter\nc_total 2\n".into())
            .await
            .unwrap();
        let (_, _, second) = get_metrics(app).await;
        assert!(second.contains("c_total 3"));
    }
}
