#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, Bytes},
    http::{Request, Response},
};
use bucketd::{
    app,
    app_state::{AppState, S3Settings},
    db,
    handlers::auth::ACTOR_ID_HEADER,
    models::{actor::Actor, bucket::NewBucket},
    services::storage_service::StorageService,
};
use futures::{Stream, stream};
use std::{io, path::PathBuf};
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "bucketd-test-boundary";

pub struct TestApp {
    pub dir: TempDir,
    pub storage: StorageService,
    pub router: Router,
}

impl TestApp {
    pub fn objects_root(&self) -> PathBuf {
        self.dir.path().join("objects")
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

pub async fn setup() -> TestApp {
    setup_with_max_keys(1000).await
}

pub async fn setup_with_max_keys(max_keys: usize) -> TestApp {
    let dir = TempDir::new().unwrap();
    let url = format!("sqlite://{}", dir.path().join("meta.db").display());
    let pool = db::connect_sqlite(&url).await.unwrap();
    db::migrate(&pool).await.unwrap();

    let root = dir.path().join("objects");
    tokio::fs::create_dir_all(&root).await.unwrap();

    let storage = StorageService::new(pool, root);
    let router = app(AppState::new(storage.clone(), S3Settings { max_keys }));
    TestApp {
        dir,
        storage,
        router,
    }
}

pub fn bucket(name: &str, is_public: bool) -> NewBucket {
    NewBucket {
        name: name.into(),
        description: None,
        is_public,
    }
}

pub fn owner() -> Actor {
    Actor::user(1)
}

pub fn stranger() -> Actor {
    Actor::user(2)
}

pub fn body(data: &[u8]) -> impl Stream<Item = io::Result<Bytes>> + Send + use<> {
    stream::iter(vec![Ok(Bytes::copy_from_slice(data))])
}

pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

pub async fn read_body(response: Response<Body>) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

pub async fn read_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&read_body(response).await).unwrap()
}

pub fn as_actor(builder: axum::http::request::Builder, actor_id: i64) -> axum::http::request::Builder {
    builder.header(ACTOR_ID_HEADER, actor_id.to_string())
}

/// A multipart form with an optional `key` part followed by a `file` part.
pub fn multipart_upload(
    uri: &str,
    actor_id: i64,
    key: Option<&str>,
    file_name: &str,
    content_type: &str,
    data: &[u8],
) -> Request<Body> {
    let mut form = Vec::new();
    if let Some(key) = key {
        form.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"key\"\r\n\r\n{key}\r\n"
            )
            .as_bytes(),
        );
    }
    form.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    form.extend_from_slice(data);
    form.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    as_actor(Request::post(uri), actor_id)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(form))
        .unwrap()
}
