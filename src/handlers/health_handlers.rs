//! Health & readiness handlers.
//!
//! - GET /healthz  -> liveness, never touches I/O
//! - GET /readyz   -> metadata database and storage root both usable

use crate::services::storage_service::StorageService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::SqlitePool;
use std::path::Path;
use tokio::fs;
use uuid::Uuid;

const PROBE_BYTES: &[u8] = b"readyz";

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    database: CheckStatus,
    storage: CheckStatus,
}

#[derive(Serialize, Debug)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn passed() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
        }
    }
}

/// `GET /healthz`
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// `GET /readyz`
///
/// 200 when both checks pass, 503 with per-check details otherwise.
pub async fn readyz(State(service): State<StorageService>) -> impl IntoResponse {
    let database = check_database(&service.db).await;
    let storage = check_storage(service.content().root()).await;
    let ready = database.ok && storage.ok;

    let status = if ready {
        StatusCode::OK
    } else {
        tracing::warn!(?database, ?storage, "readiness check failed");
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = ReadyResponse {
        status: if ready { "ok" } else { "error" },
        database,
        storage,
    };
    (status, Json(body))
}

async fn check_database(db: &SqlitePool) -> CheckStatus {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(db).await {
        Ok(1) => CheckStatus::passed(),
        Ok(v) => CheckStatus::failed(format!("unexpected result: {}", v)),
        Err(e) => CheckStatus::failed(format!("error: {}", e)),
    }
}

/// Write, read back and remove a probe file under the storage root.
async fn check_storage(root: &Path) -> CheckStatus {
    let probe = root.join(format!(".readyz-{}", Uuid::new_v4()));
    if let Err(e) = fs::write(&probe, PROBE_BYTES).await {
        return CheckStatus::failed(format!("could not write probe file: {}", e));
    }

    let status = match fs::read(&probe).await {
        Ok(bytes) if bytes == PROBE_BYTES => CheckStatus::passed(),
        Ok(_) => CheckStatus::failed("probe file content mismatch"),
        Err(e) => CheckStatus::failed(format!("could not read probe file: {}", e)),
    };
    if let Err(e) = fs::remove_file(&probe).await {
        tracing::debug!("could not remove probe file {}: {}", probe.display(), e);
    }
    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn storage_probe_cleans_up() {
        let temp = TempDir::new().unwrap();
        let status = check_storage(temp.path()).await;
        assert!(status.ok);

        let mut entries = fs::read_dir(temp.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn storage_probe_fails_without_root() {
        let temp = TempDir::new().unwrap();
        let status = check_storage(&temp.path().join("missing")).await;
        assert!(!status.ok);
        assert!(status.error.is_some());
    }
}
