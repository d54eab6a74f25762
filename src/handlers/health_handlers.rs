//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks SQLite and the payload directory

use crate::services::snapshot_service::SnapshotService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::{collections::HashMap, path::Path};
use tokio::fs;
use uuid::Uuid;

/// `GET /healthz`
///
/// Liveness only; never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// `GET /readyz`
///
/// 200 when SQLite answers `SELECT 1` and a probe file can be written, read
/// back and removed under the payload directory; 503 otherwise.
pub async fn readyz(State(service): State<SnapshotService>) -> impl IntoResponse {
    let store = &service.store;
    let mut checks = HashMap::new();
    checks.insert("sqlite", check_sqlite(&store.db).await);
    checks.insert("disk", check_disk(&store.base_path).await);

    let ready = checks.values().all(|c| c.ok);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = ReadyResponse {
        status: if ready { "ok" } else { "error" },
        checks,
    };
    (status, Json(body))
}

async fn check_sqlite(db: &sqlx::SqlitePool) -> CheckStatus {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(db).await {
        Ok(1) => CheckStatus::pass(),
        Ok(v) => CheckStatus::fail(format!("unexpected result: {}", v)),
        Err(e) => CheckStatus::fail(format!("error: {}", e)),
    }
}

async fn check_disk(base_path: &Path) -> CheckStatus {
    const PROBE: &[u8] = b"readyz";
    if let Err(e) = fs::create_dir_all(base_path).await {
        return CheckStatus::fail(format!("could not create storage dir: {}", e));
    }
    let probe_path = base_path.join(format!(".readyz-{}", Uuid::new_v4()));
    if let Err(e) = fs::write(&probe_path, PROBE).await {
        return CheckStatus::fail(format!("could not write probe: {}", e));
    }
    let read_back = fs::read(&probe_path).await;
    let removed = fs::remove_file(&probe_path).await;
    match (read_back, removed) {
        (Ok(bytes), Ok(())) if bytes == PROBE => CheckStatus::pass(),
        (Ok(bytes), Err(e)) if bytes == PROBE => CheckStatus {
            ok: true,
            error: Some(format!("could not remove probe: {}", e)),
        },
        (Ok(_), _) => CheckStatus::fail("probe content mismatch".into()),
        (Err(e), _) => CheckStatus::fail(format!("could not read probe: {}", e)),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn pass() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn fail(error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
        }
    }
}
