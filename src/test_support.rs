//! Fixtures shared by the unit tests.

use crate::{
    db,
    services::{
        fetcher::HttpFetcher, policy::AdmissionPolicy, snapshot_service::SnapshotService,
        snapshot_store::SnapshotStore,
    },
};
use axum::Router;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Serve `router` on an ephemeral loopback port for the life of the runtime.
pub async fn spawn_upstream(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// File-backed SQLite plus a payload directory, both inside a temp dir that
/// lives as long as the returned guard.
pub async fn test_store() -> (TempDir, SnapshotStore) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("meta.db").display());
    let pool = db::connect(&url, 5).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    let store = SnapshotStore::new(Arc::new(pool), dir.path().join("payloads"));
    (dir, store)
}

pub fn test_service(store: SnapshotStore, max_size_bytes: u64, mime_regex: &str) -> SnapshotService {
    let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
    let policy = AdmissionPolicy::new(max_size_bytes, mime_regex).unwrap();
    SnapshotService::new(store, fetcher, policy)
}
