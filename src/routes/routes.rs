//! Defines routes for snapshot capture and retrieval.
//!
//! ## Structure
//! - **Link-scoped endpoints**
//!   - `POST   /links/{link_id}/snapshot`  capture the link's current content
//!   - `GET    /links/{link_id}/snapshots` list snapshots, newest first
//!
//! - **Snapshot endpoints**
//!   - `GET    /snapshots/{id}`        metadata
//!   - `GET    /snapshots/{id}/raw`    original bytes as an attachment
//!   - `GET    /snapshots/{id}/render` inline view, 415 when not renderable
//!   - `DELETE /snapshots/{id}`        remove row and payload

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        snapshot_handlers::{
            create_snapshot, delete_snapshot, get_snapshot, get_snapshot_raw, list_snapshots,
            render_snapshot,
        },
    },
    services::snapshot_service::SnapshotService,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build the router; every handler shares the `SnapshotService` state.
pub fn routes() -> Router<SnapshotService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Link-scoped routes
        .route("/links/{link_id}/snapshot", post(create_snapshot))
        .route("/links/{link_id}/snapshots", get(list_snapshots))
        // Snapshot routes
        .route("/snapshots/{id}", get(get_snapshot).delete(delete_snapshot))
        .route("/snapshots/{id}/raw", get(get_snapshot_raw))
        .route("/snapshots/{id}/render", get(render_snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_service, test_store};
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_endpoints_report_ok() {
        let (_dir, store) = test_store().await;
        let app = routes().with_state(test_service(store, 1024, ".*"));

        for uri in ["/healthz", "/readyz"] {
            let response = app
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{}", uri);
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body: Value = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body["status"], "ok");
        }
    }

    #[tokio::test]
    async fn readyz_fails_when_storage_is_unusable() {
        let (dir, store) = test_store().await;
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let mut service = test_service(store, 1024, ".*");
        service.store.base_path = blocker.join("payloads");
        let app = routes().with_state(service);

        let response = app
            .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
