//! Shared router state.

use crate::services::storage_service::StorageService;
use axum::extract::FromRef;

/// Limits that only apply to the S3-compatible surface.
#[derive(Clone, Copy, Debug)]
pub struct S3Settings {
    /// Ceiling for `max-keys` and for the bucket listing at `GET /`.
    pub max_keys: usize,
}

#[derive(Clone)]
pub struct AppState {
    pub storage: StorageService,
    pub s3: S3Settings,
}

impl AppState {
    pub fn new(storage: StorageService, s3: S3Settings) -> Self {
        Self { storage, s3 }
    }
}

impl FromRef<AppState> for StorageService {
    fn from_ref(state: &AppState) -> Self {
        state.storage.clone()
    }
}

impl FromRef<AppState> for S3Settings {
    fn from_ref(state: &AppState) -> Self {
        state.s3
    }
}
